//! COFF records: section headers, symbol records and relocation records.

use super::{decode_short_name, put_i16, put_u16, put_u32, FieldReader, Record};

/// `IMAGE_SECTION_HEADER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionHeader {
    /// Raw 8-byte name, NUL-padded.
    pub name: [u8; 8],
    /// The `Misc` union: virtual size in a laid-out image, an
    /// uninitialized-size hint in an object.
    pub misc: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        decode_short_name(&self.name)
    }
}

impl Record for SectionHeader {
    const SIZE: usize = 40;
    const NAME: &'static str = "section header";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            name: f.array(),
            misc: f.u32(),
            virtual_address: f.u32(),
            size_of_raw_data: f.u32(),
            pointer_to_raw_data: f.u32(),
            pointer_to_relocations: f.u32(),
            pointer_to_linenumbers: f.u32(),
            number_of_relocations: f.u16(),
            number_of_linenumbers: f.u16(),
            characteristics: f.u32(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name);
        put_u32(out, self.misc);
        put_u32(out, self.virtual_address);
        put_u32(out, self.size_of_raw_data);
        put_u32(out, self.pointer_to_raw_data);
        put_u32(out, self.pointer_to_relocations);
        put_u32(out, self.pointer_to_linenumbers);
        put_u16(out, self.number_of_relocations);
        put_u16(out, self.number_of_linenumbers);
        put_u32(out, self.characteristics);
    }
}

/// `IMAGE_SYMBOL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolRecord {
    /// Either an inline name, or four zero bytes followed by a string-table offset.
    pub short_name: [u8; 8],
    pub value: u32,
    pub section_number: i16,
    pub typ: u16,
    pub storage_class: u8,
    pub number_of_aux_symbols: u8,
}

impl SymbolRecord {
    /// The string-table offset, if the name is stored out of line.
    pub fn string_table_offset(&self) -> Option<u32> {
        if self.short_name[..4] == [0; 4] {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&self.short_name[4..]);
            Some(u32::from_le_bytes(raw))
        } else {
            None
        }
    }
}

impl Record for SymbolRecord {
    const SIZE: usize = 18;
    const NAME: &'static str = "symbol record";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            short_name: f.array(),
            value: f.u32(),
            section_number: f.i16(),
            typ: f.u16(),
            storage_class: f.u8(),
            number_of_aux_symbols: f.u8(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.short_name);
        put_u32(out, self.value);
        put_i16(out, self.section_number);
        put_u16(out, self.typ);
        out.push(self.storage_class);
        out.push(self.number_of_aux_symbols);
    }
}

/// `IMAGE_RELOCATION`. The type is kept raw; it is machine specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelocationRecord {
    pub virtual_address: u32,
    pub symbol_table_index: u32,
    pub typ: u16,
}

impl Record for RelocationRecord {
    const SIZE: usize = 10;
    const NAME: &'static str = "relocation record";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            virtual_address: f.u32(),
            symbol_table_index: f.u32(),
            typ: f.u16(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u32(out, self.virtual_address);
        put_u32(out, self.symbol_table_index);
        put_u16(out, self.typ);
    }
}
