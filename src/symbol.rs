//! Symbol table management.
//!
//! Builds the fixed symbol array of an object file and resolves names that
//! live in the trailing string table.

use std::fmt;

use object::pe;

use crate::error::{malformed, Result};
use crate::records::{
    ascii_lossy, decode_array, read_cstr_terminated, slice, Record, SymbolRecord,
};

/// Name state of one symbol slot.
///
/// A slot only ever moves from `Unresolved` to `Resolved`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolName {
    /// The name was stored inline in the record.
    Resolved(String),
    /// The name lives in the string table at this offset and has not been matched yet.
    Unresolved { offset: u32 },
}

/// How a symbol's section number is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSection {
    Undefined,
    Absolute,
    Debug,
    /// One-based index into the object's section table.
    Section(u16),
}

impl From<i16> for SymbolSection {
    fn from(raw: i16) -> Self {
        match raw {
            0 => SymbolSection::Undefined,
            -1 => SymbolSection::Absolute,
            n if n > 0 => SymbolSection::Section(n as u16),
            _ => SymbolSection::Debug,
        }
    }
}

impl fmt::Display for SymbolSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolSection::Undefined => f.write_str("UNDEFINED"),
            SymbolSection::Absolute => f.write_str("ABSOLUTE"),
            SymbolSection::Debug => f.write_str("DEBUG"),
            SymbolSection::Section(n) => write!(f, "{n}"),
        }
    }
}

/// One slot of the symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Slot index, fixed at construction.
    pub index: usize,
    pub value: u32,
    pub section_number: i16,
    pub typ: u16,
    pub storage_class: u8,
    pub number_of_aux_symbols: u8,
    name: SymbolName,
}

impl Symbol {
    /// Creates a slot from its raw record.
    ///
    /// Inline names keep all eight bytes as decoded; no NUL trimming is applied.
    pub fn new(record: &SymbolRecord, index: usize) -> Self {
        let name = match record.string_table_offset() {
            Some(offset) => SymbolName::Unresolved { offset },
            None => SymbolName::Resolved(ascii_lossy(&record.short_name)),
        };
        Self {
            index,
            value: record.value,
            section_number: record.section_number,
            typ: record.typ,
            storage_class: record.storage_class,
            number_of_aux_symbols: record.number_of_aux_symbols,
            name,
        }
    }

    /// The resolved name, or `None` while the slot is unresolved.
    pub fn name(&self) -> Option<&str> {
        match &self.name {
            SymbolName::Resolved(name) => Some(name),
            SymbolName::Unresolved { .. } => None,
        }
    }

    pub fn name_state(&self) -> &SymbolName {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.name, SymbolName::Resolved(_))
    }

    /// The pending string-table offset of an unresolved slot.
    pub fn pending_offset(&self) -> Option<u32> {
        match self.name {
            SymbolName::Unresolved { offset } => Some(offset),
            SymbolName::Resolved(_) => None,
        }
    }

    pub fn section(&self) -> SymbolSection {
        SymbolSection::from(self.section_number)
    }

    pub fn is_external(&self) -> bool {
        self.storage_class == pe::IMAGE_SYM_CLASS_EXTERNAL
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name().unwrap_or("").trim_end_matches('\0');
        write!(
            f,
            "\t[{:X}] Name: {:<25}\tType: 0x{:<18x}\tSection: {:<15}",
            self.index,
            name,
            self.typ,
            self.section().to_string()
        )
    }
}

/// The symbol array of one object file.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Builds one slot per record, in file order.
    pub fn new(records: &[SymbolRecord]) -> Self {
        Self {
            symbols: records
                .iter()
                .enumerate()
                .map(|(index, record)| Symbol::new(record, index))
                .collect(),
        }
    }

    /// Decodes `count` symbol records at `offset` followed by the string table.
    pub fn decode(buf: &[u8], offset: usize, count: usize) -> Result<Self> {
        let records: Vec<SymbolRecord> = decode_array(buf, offset, count)?;
        let mut table = Self::new(&records);
        table.read_string_table(buf, offset + count * SymbolRecord::SIZE)?;
        Ok(table)
    }

    /// Assigns `name` to every unresolved slot waiting on `offset`.
    ///
    /// Returns whether any slot matched.
    pub fn add_string(&mut self, name: &str, offset: u32) -> bool {
        let mut found = false;
        for symbol in &mut self.symbols {
            if symbol.pending_offset() == Some(offset) {
                symbol.name = SymbolName::Resolved(name.to_string());
                found = true;
            }
        }
        found
    }

    /// Walks the string table starting at `offset` and resolves matching slots.
    ///
    /// The leading 4-byte length counts itself; entries are scanned from
    /// relative offset 4 up to that length.
    pub fn read_string_table(&mut self, buf: &[u8], offset: usize) -> Result<()> {
        let raw_len = slice(buf, offset, 4, "string table length")?;
        let len = u32::from_le_bytes([raw_len[0], raw_len[1], raw_len[2], raw_len[3]]);
        if len < 4 {
            return Err(malformed!("string table length {len} is smaller than its own field"));
        }
        let table = slice(buf, offset, len as usize, "string table")?;

        let mut pos = 4usize;
        while pos < table.len() {
            let entry = read_cstr_terminated(table, pos, "string table entry")?;
            let name = ascii_lossy(entry);
            if self.add_string(&name, pos as u32) {
                tracing::trace!("resolved string table entry {:#x} -> {}", pos, name);
            }
            pos += entry.len() + 1;
        }

        let unresolved = self.unresolved_count();
        if unresolved > 0 {
            tracing::debug!("{} symbol(s) left without a string table match", unresolved);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// First slot whose resolved name equals `name`, ignoring inline NUL padding.
    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.name().map(|n| n.trim_end_matches('\0')) == Some(name))
    }

    pub fn unresolved_count(&self) -> usize {
        self.symbols.iter().filter(|s| !s.is_resolved()).count()
    }
}

impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Symbol Table:")?;
        for symbol in &self.symbols {
            writeln!(f, "{symbol}")?;
        }
        Ok(())
    }
}
