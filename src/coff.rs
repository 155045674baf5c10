//! COFF object reader.
//!
//! Decodes a relocatable object into its sections and symbol table. Each
//! reader carries the ordinal of its object within a linking session; the
//! ordinal is the tie-break key when sections are grouped.

use std::fmt;

use crate::error::Result;
use crate::records::{decode_array, FileHeader, Machine, Record, SectionHeader};
use crate::section::{Provenance, Section};
use crate::symbol::SymbolTable;

/// A decoded relocatable object.
#[derive(Debug, Clone)]
pub struct ObjectFile {
    ordinal: usize,
    source: Option<String>,
    file_header: FileHeader,
    sections: Vec<Section>,
    symbols: SymbolTable,
}

impl ObjectFile {
    /// Decodes `data` as a COFF object at position `ordinal` of its session.
    pub fn parse(data: &[u8], ordinal: usize) -> Result<Self> {
        let file_header = FileHeader::decode(data, 0)?;

        let headers_at = FileHeader::SIZE + file_header.size_of_optional_header as usize;
        let headers: Vec<SectionHeader> =
            decode_array(data, headers_at, file_header.number_of_sections as usize)?;
        let sections = headers
            .into_iter()
            .map(|header| Section::parse(header, data, ordinal, Provenance::Object))
            .collect::<Result<Vec<_>>>()?;

        let symbols = if file_header.number_of_symbols == 0 && file_header.pointer_to_symbol_table == 0
        {
            SymbolTable::default()
        } else {
            SymbolTable::decode(
                data,
                file_header.pointer_to_symbol_table as usize,
                file_header.number_of_symbols as usize,
            )?
        };

        tracing::debug!(
            "object #{}: {} sections, {} symbols ({} unresolved)",
            ordinal,
            sections.len(),
            symbols.len(),
            symbols.unresolved_count()
        );

        Ok(Self {
            ordinal,
            source: None,
            file_header,
            sections,
            symbols,
        })
    }

    /// Attaches a display name (usually the file name) for reports.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn machine(&self) -> Machine {
        self.file_header.machine()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Hands the decoded sections over to the caller.
    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }
}

impl fmt::Display for ObjectFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Object File: {}",
            self.source.as_deref().unwrap_or("<memory>")
        )?;
        writeln!(f, "{}", self.symbols)?;
        writeln!(f, "Sections:")?;
        for section in &self.sections {
            writeln!(f, "{section}")?;
        }
        Ok(())
    }
}
