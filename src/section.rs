//! Section model.
//!
//! A [`Section`] is one decoded section: its header, an owned copy of its
//! data, its relocations, and the ordinal of the object it came from.

use std::fmt;

use object::pe;

use crate::error::Result;
use crate::records::{decode_array, encode_short_name, slice, RelocationRecord, SectionHeader};

/// Where a section came from. Decides how the header's `Misc` field reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Decoded from a relocatable object: `Misc` is an uninitialized-size hint.
    Object,
    /// Decoded from a laid-out image: `Misc` is the virtual size.
    Image,
    /// Synthesized by merging a section group, pending layout.
    Merged,
}

#[derive(Debug, Clone)]
pub struct Section {
    header: SectionHeader,
    name: String,
    data: Vec<u8>,
    relocations: Vec<RelocationRecord>,
    ordinal: usize,
    provenance: Provenance,
}

impl Section {
    /// Builds a section around an existing header and data buffer.
    pub fn new(header: SectionHeader, data: Vec<u8>, provenance: Provenance) -> Self {
        Self {
            name: header.name(),
            header,
            data,
            relocations: Vec::new(),
            ordinal: 0,
            provenance,
        }
    }

    /// Decodes the data and relocations that `header` points at inside `file`.
    ///
    /// `ordinal` is the position of the source object in its linking session.
    pub fn parse(
        header: SectionHeader,
        file: &[u8],
        ordinal: usize,
        provenance: Provenance,
    ) -> Result<Self> {
        let mut section = Self::new(header, Vec::new(), provenance).with_ordinal(ordinal);

        if !section.has_uninitialized_data() {
            let mut size = header.size_of_raw_data;
            if header.misc > 0 {
                size = size.min(header.misc);
            }
            section.data = slice(
                file,
                header.pointer_to_raw_data as usize,
                size as usize,
                "section data",
            )?
            .to_vec();
        }

        if section.has_relocations() {
            section.relocations = decode_array(
                file,
                header.pointer_to_relocations as usize,
                header.number_of_relocations as usize,
            )?;
        }

        tracing::trace!(
            "parsed section {} ({} bytes, {} relocations)",
            section.name,
            section.data.len(),
            section.relocations.len()
        );
        Ok(section)
    }

    /// Tags the section with the ordinal of its source object.
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the section; names longer than 8 bytes are rejected.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.header.name = encode_short_name(name)?;
        self.name = name.to_string();
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the data buffer wholesale.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn relocations(&self) -> &[RelocationRecord] {
        &self.relocations
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn has_code(&self) -> bool {
        self.header.characteristics & pe::IMAGE_SCN_CNT_CODE != 0
    }

    pub fn has_initialized_data(&self) -> bool {
        self.header.characteristics & pe::IMAGE_SCN_CNT_INITIALIZED_DATA != 0
    }

    pub fn has_uninitialized_data(&self) -> bool {
        self.header.characteristics & pe::IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0
    }

    pub fn has_relocations(&self) -> bool {
        self.header.number_of_relocations != 0
    }

    /// Whether the section occupies space in the image file.
    pub fn contributes_to_file_size(&self) -> bool {
        if self.has_initialized_data() {
            true
        } else {
            self.has_code() && !self.has_uninitialized_data()
        }
    }

    pub fn virtual_address(&self) -> u32 {
        self.header.virtual_address
    }

    pub fn set_virtual_address(&mut self, rva: u32) {
        self.header.virtual_address = rva;
    }

    /// The `Misc` field read as a virtual size.
    pub fn virtual_size(&self) -> u32 {
        self.header.misc
    }

    pub fn set_virtual_size(&mut self, size: u32) {
        self.header.misc = size;
    }

    /// The `Misc` field read as an uninitialized-size hint. Only objects carry one.
    pub fn uninitialized_size_hint(&self) -> Option<u32> {
        match self.provenance {
            Provenance::Object => Some(self.header.misc),
            Provenance::Image | Provenance::Merged => None,
        }
    }

    /// File offset of the raw data.
    pub fn physical_address(&self) -> u32 {
        self.header.pointer_to_raw_data
    }

    pub fn set_physical_address(&mut self, offset: u32) {
        self.header.pointer_to_raw_data = offset;
    }

    pub fn raw_size(&self) -> u32 {
        self.header.size_of_raw_data
    }

    pub fn set_raw_size(&mut self, size: u32) {
        self.header.size_of_raw_data = size;
    }

    /// Name up to the first `$`, or the whole name.
    pub fn group_key(&self) -> &str {
        match self.name.find('$') {
            Some(pos) => &self.name[..pos],
            None => &self.name,
        }
    }

    /// Text after the first `$`, if the name has one.
    pub fn dollar_suffix(&self) -> Option<&str> {
        self.name.find('$').map(|pos| &self.name[pos + 1..])
    }

    /// Turns this section into the synthesized result of a group merge.
    pub(crate) fn into_merged(mut self, data: Vec<u8>) -> Self {
        self.header.size_of_raw_data = data.len() as u32;
        self.header.pointer_to_raw_data = 0;
        self.header.pointer_to_relocations = 0;
        self.header.number_of_relocations = 0;
        self.data = data;
        self.relocations.clear();
        self.provenance = Provenance::Merged;
        self
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name: {:<15}\tVirt Addr: {:X}\tVirt Size: {:X}\tPhys Addr: {:X}\tRaw Size: {:X}",
            self.name,
            self.virtual_address(),
            self.virtual_size(),
            self.physical_address(),
            self.raw_size()
        )?;
        if self.relocations.is_empty() {
            return Ok(());
        }
        write!(f, "\n\tRelocation fixups:")?;
        for reloc in &self.relocations {
            write!(
                f,
                "\n\tIndex: {:X}\tVirt Addr: {:X} Type: 0x{:x}",
                reloc.symbol_table_index, reloc.virtual_address, reloc.typ
            )?;
        }
        Ok(())
    }
}
