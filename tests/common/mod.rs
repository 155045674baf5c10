//! Byte-level fixture builders for COFF objects and PE images.

#![allow(dead_code)]

use coffld::records::{
    encode_short_name, DataDirectories, DosHeader, FileHeader, NtSignature, OptionalHeader32,
    Record, RelocationRecord, SectionHeader, SymbolRecord,
};
use object::pe;

pub const CODE: u32 = pe::IMAGE_SCN_CNT_CODE;
pub const IDATA: u32 = pe::IMAGE_SCN_CNT_INITIALIZED_DATA;
pub const UDATA: u32 = pe::IMAGE_SCN_CNT_UNINITIALIZED_DATA;

struct FixtureSection {
    name: String,
    characteristics: u32,
    data: Vec<u8>,
    /// Size hint written to `Misc` for uninitialized sections.
    hint: u32,
    relocations: Vec<RelocationRecord>,
}

struct FixtureSymbol {
    name: String,
    value: u32,
    section_number: i16,
    storage_class: u8,
}

/// Assembles a COFF object: file header, section table, section data,
/// relocations, symbol table, string table.
pub struct ObjectBuilder {
    machine: u16,
    sections: Vec<FixtureSection>,
    symbols: Vec<FixtureSymbol>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self {
            machine: pe::IMAGE_FILE_MACHINE_I386,
            sections: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn section(mut self, name: &str, characteristics: u32, data: &[u8]) -> Self {
        self.sections.push(FixtureSection {
            name: name.to_string(),
            characteristics,
            data: data.to_vec(),
            hint: 0,
            relocations: Vec::new(),
        });
        self
    }

    /// An uninitialized-data section with no bytes on disk.
    pub fn bss(mut self, name: &str, size_hint: u32) -> Self {
        self.sections.push(FixtureSection {
            name: name.to_string(),
            characteristics: UDATA,
            data: Vec::new(),
            hint: size_hint,
            relocations: Vec::new(),
        });
        self
    }

    /// Adds a relocation to the most recently added section.
    pub fn relocation(mut self, virtual_address: u32, symbol_table_index: u32, typ: u16) -> Self {
        if let Some(section) = self.sections.last_mut() {
            section.relocations.push(RelocationRecord {
                virtual_address,
                symbol_table_index,
                typ,
            });
        }
        self
    }

    pub fn symbol(mut self, name: &str, value: u32, section_number: i16) -> Self {
        self.symbols.push(FixtureSymbol {
            name: name.to_string(),
            value,
            section_number,
            storage_class: pe::IMAGE_SYM_CLASS_EXTERNAL,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut cursor = FileHeader::SIZE + self.sections.len() * SectionHeader::SIZE;
        let mut headers = Vec::new();
        let mut body = Vec::new();
        for section in &self.sections {
            let mut header = SectionHeader {
                name: encode_short_name(&section.name).unwrap(),
                misc: section.hint,
                characteristics: section.characteristics,
                ..Default::default()
            };
            if !section.data.is_empty() {
                header.pointer_to_raw_data = cursor as u32;
                header.size_of_raw_data = section.data.len() as u32;
                body.extend_from_slice(&section.data);
                cursor += section.data.len();
            }
            if !section.relocations.is_empty() {
                header.pointer_to_relocations = cursor as u32;
                header.number_of_relocations = section.relocations.len() as u16;
                for reloc in &section.relocations {
                    reloc.write(&mut body);
                }
                cursor += section.relocations.len() * RelocationRecord::SIZE;
            }
            headers.push(header);
        }

        let symtab_at = cursor;
        let mut strings = Vec::new();
        for symbol in &self.symbols {
            let mut short_name = [0u8; 8];
            if symbol.name.len() <= 8 {
                short_name[..symbol.name.len()].copy_from_slice(symbol.name.as_bytes());
            } else {
                let offset = (strings.len() + 4) as u32;
                short_name[4..].copy_from_slice(&offset.to_le_bytes());
                strings.extend_from_slice(symbol.name.as_bytes());
                strings.push(0);
            }
            SymbolRecord {
                short_name,
                value: symbol.value,
                section_number: symbol.section_number,
                typ: 0,
                storage_class: symbol.storage_class,
                number_of_aux_symbols: 0,
            }
            .write(&mut body);
        }
        body.extend_from_slice(&((strings.len() + 4) as u32).to_le_bytes());
        body.extend_from_slice(&strings);

        let mut out = FileHeader {
            machine: self.machine,
            number_of_sections: self.sections.len() as u16,
            pointer_to_symbol_table: symtab_at as u32,
            number_of_symbols: self.symbols.len() as u32,
            ..Default::default()
        }
        .encode();
        for header in &headers {
            header.write(&mut out);
        }
        out.extend_from_slice(&body);
        out
    }
}

pub const STUB: &[u8] = b"\x0e\x1f\xba\x0e\x00\xb4\x09\xcd\x21\xb8\x01\x4c\xcd\x21This program cannot be run in DOS mode.\r\r\n$\0\0\0\0\0\0\0";

/// Assembles a laid-out 32-bit image with a DOS stub, 0x200 file alignment
/// and 0x1000 section alignment. Each section gets its own page and file slot;
/// for uninitialized sections only the slice length (the virtual size) is used.
pub fn build_image(sections: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let e_lfanew = (DosHeader::SIZE + STUB.len()) as u32;
    let size_of_headers = 0x400u32;

    let mut out = DosHeader {
        e_lfanew,
        ..DosHeader::minimal()
    }
    .encode();
    out.extend_from_slice(STUB);
    NtSignature::default().write(&mut out);
    FileHeader {
        machine: pe::IMAGE_FILE_MACHINE_I386,
        number_of_sections: sections.len() as u16,
        size_of_optional_header: (OptionalHeader32::SIZE + DataDirectories::SIZE) as u16,
        characteristics: pe::IMAGE_FILE_EXECUTABLE_IMAGE | pe::IMAGE_FILE_32BIT_MACHINE,
        ..Default::default()
    }
    .write(&mut out);
    OptionalHeader32 {
        magic: pe::IMAGE_NT_OPTIONAL_HDR32_MAGIC,
        image_base: 0x40_0000,
        section_alignment: 0x1000,
        file_alignment: 0x200,
        size_of_headers,
        size_of_image: 0x1000 * (sections.len() as u32 + 1),
        subsystem: pe::IMAGE_SUBSYSTEM_WINDOWS_CUI,
        number_of_rva_and_sizes: 16,
        ..Default::default()
    }
    .write(&mut out);
    DataDirectories::default().write(&mut out);

    let mut file_offset = size_of_headers;
    let mut data = Vec::new();
    for (index, (name, characteristics, bytes)) in sections.iter().enumerate() {
        let raw = if *characteristics & UDATA != 0 {
            0
        } else {
            (bytes.len() as u32 + 0x1ff) & !0x1ff
        };
        SectionHeader {
            name: encode_short_name(name).unwrap(),
            misc: bytes.len() as u32,
            virtual_address: 0x1000 * (index as u32 + 1),
            size_of_raw_data: raw,
            pointer_to_raw_data: if raw == 0 { 0 } else { file_offset },
            characteristics: *characteristics,
            ..Default::default()
        }
        .write(&mut out);
        if raw != 0 {
            let mut padded = bytes.to_vec();
            padded.resize(raw as usize, 0);
            data.extend_from_slice(&padded);
            file_offset += raw;
        }
    }
    assert!(out.len() <= size_of_headers as usize);
    out.resize(size_of_headers as usize, 0);
    out.extend_from_slice(&data);
    out
}
