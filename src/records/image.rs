//! Image-level records: DOS header, NT signature, file header, optional
//! headers and the data directory table.

use object::pe;

use super::{put_u16, put_u32, put_u64, FieldReader, Record};

/// `IMAGE_DOS_HEADER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// File offset of the NT headers.
    pub e_lfanew: u32,
}

impl DosHeader {
    /// A bare `MZ` header pointing at NT headers placed right after it.
    pub fn minimal() -> Self {
        Self {
            e_magic: pe::IMAGE_DOS_SIGNATURE,
            e_lfanew: Self::SIZE as u32,
            ..Self::default()
        }
    }
}

impl Record for DosHeader {
    const SIZE: usize = 64;
    const NAME: &'static str = "DOS header";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            e_magic: f.u16(),
            e_cblp: f.u16(),
            e_cp: f.u16(),
            e_crlc: f.u16(),
            e_cparhdr: f.u16(),
            e_minalloc: f.u16(),
            e_maxalloc: f.u16(),
            e_ss: f.u16(),
            e_sp: f.u16(),
            e_csum: f.u16(),
            e_ip: f.u16(),
            e_cs: f.u16(),
            e_lfarlc: f.u16(),
            e_ovno: f.u16(),
            e_res: std::array::from_fn(|_| f.u16()),
            e_oemid: f.u16(),
            e_oeminfo: f.u16(),
            e_res2: std::array::from_fn(|_| f.u16()),
            e_lfanew: f.u32(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        for v in [
            self.e_magic,
            self.e_cblp,
            self.e_cp,
            self.e_crlc,
            self.e_cparhdr,
            self.e_minalloc,
            self.e_maxalloc,
            self.e_ss,
            self.e_sp,
            self.e_csum,
            self.e_ip,
            self.e_cs,
            self.e_lfarlc,
            self.e_ovno,
        ] {
            put_u16(out, v);
        }
        self.e_res.iter().for_each(|&v| put_u16(out, v));
        put_u16(out, self.e_oemid);
        put_u16(out, self.e_oeminfo);
        self.e_res2.iter().for_each(|&v| put_u16(out, v));
        put_u32(out, self.e_lfanew);
    }
}

/// The `PE\0\0` signature that opens the NT headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtSignature(pub u32);

impl Default for NtSignature {
    fn default() -> Self {
        Self(pe::IMAGE_NT_SIGNATURE)
    }
}

impl NtSignature {
    pub fn is_valid(&self) -> bool {
        self.0 == pe::IMAGE_NT_SIGNATURE
    }
}

impl Record for NtSignature {
    const SIZE: usize = 4;
    const NAME: &'static str = "NT signature";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self(f.u32())
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u32(out, self.0);
    }
}

/// Target machine of a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,
    Amd64,
    Other(u16),
}

impl From<u16> for Machine {
    fn from(raw: u16) -> Self {
        match raw {
            pe::IMAGE_FILE_MACHINE_UNKNOWN => Machine::Unknown,
            pe::IMAGE_FILE_MACHINE_I386 => Machine::I386,
            pe::IMAGE_FILE_MACHINE_AMD64 => Machine::Amd64,
            other => Machine::Other(other),
        }
    }
}

impl From<Machine> for u16 {
    fn from(machine: Machine) -> u16 {
        match machine {
            Machine::Unknown => pe::IMAGE_FILE_MACHINE_UNKNOWN,
            Machine::I386 => pe::IMAGE_FILE_MACHINE_I386,
            Machine::Amd64 => pe::IMAGE_FILE_MACHINE_AMD64,
            Machine::Other(raw) => raw,
        }
    }
}

/// `IMAGE_FILE_HEADER`, shared by objects and images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl FileHeader {
    pub fn machine(&self) -> Machine {
        Machine::from(self.machine)
    }
}

impl Record for FileHeader {
    const SIZE: usize = 20;
    const NAME: &'static str = "file header";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            machine: f.u16(),
            number_of_sections: f.u16(),
            time_date_stamp: f.u32(),
            pointer_to_symbol_table: f.u32(),
            number_of_symbols: f.u32(),
            size_of_optional_header: f.u16(),
            characteristics: f.u16(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.machine);
        put_u16(out, self.number_of_sections);
        put_u32(out, self.time_date_stamp);
        put_u32(out, self.pointer_to_symbol_table);
        put_u32(out, self.number_of_symbols);
        put_u16(out, self.size_of_optional_header);
        put_u16(out, self.characteristics);
    }
}

/// `IMAGE_OPTIONAL_HEADER32`, without the trailing data directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionalHeader32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl Record for OptionalHeader32 {
    const SIZE: usize = 96;
    const NAME: &'static str = "optional header";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            magic: f.u16(),
            major_linker_version: f.u8(),
            minor_linker_version: f.u8(),
            size_of_code: f.u32(),
            size_of_initialized_data: f.u32(),
            size_of_uninitialized_data: f.u32(),
            address_of_entry_point: f.u32(),
            base_of_code: f.u32(),
            base_of_data: f.u32(),
            image_base: f.u32(),
            section_alignment: f.u32(),
            file_alignment: f.u32(),
            major_operating_system_version: f.u16(),
            minor_operating_system_version: f.u16(),
            major_image_version: f.u16(),
            minor_image_version: f.u16(),
            major_subsystem_version: f.u16(),
            minor_subsystem_version: f.u16(),
            win32_version_value: f.u32(),
            size_of_image: f.u32(),
            size_of_headers: f.u32(),
            check_sum: f.u32(),
            subsystem: f.u16(),
            dll_characteristics: f.u16(),
            size_of_stack_reserve: f.u32(),
            size_of_stack_commit: f.u32(),
            size_of_heap_reserve: f.u32(),
            size_of_heap_commit: f.u32(),
            loader_flags: f.u32(),
            number_of_rva_and_sizes: f.u32(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.magic);
        out.push(self.major_linker_version);
        out.push(self.minor_linker_version);
        put_u32(out, self.size_of_code);
        put_u32(out, self.size_of_initialized_data);
        put_u32(out, self.size_of_uninitialized_data);
        put_u32(out, self.address_of_entry_point);
        put_u32(out, self.base_of_code);
        put_u32(out, self.base_of_data);
        put_u32(out, self.image_base);
        put_u32(out, self.section_alignment);
        put_u32(out, self.file_alignment);
        put_u16(out, self.major_operating_system_version);
        put_u16(out, self.minor_operating_system_version);
        put_u16(out, self.major_image_version);
        put_u16(out, self.minor_image_version);
        put_u16(out, self.major_subsystem_version);
        put_u16(out, self.minor_subsystem_version);
        put_u32(out, self.win32_version_value);
        put_u32(out, self.size_of_image);
        put_u32(out, self.size_of_headers);
        put_u32(out, self.check_sum);
        put_u16(out, self.subsystem);
        put_u16(out, self.dll_characteristics);
        put_u32(out, self.size_of_stack_reserve);
        put_u32(out, self.size_of_stack_commit);
        put_u32(out, self.size_of_heap_reserve);
        put_u32(out, self.size_of_heap_commit);
        put_u32(out, self.loader_flags);
        put_u32(out, self.number_of_rva_and_sizes);
    }
}

/// `IMAGE_OPTIONAL_HEADER64`, without the trailing data directories.
///
/// Decoded so 64-bit images can be inspected; layout only handles the
/// 32-bit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionalHeader64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl Record for OptionalHeader64 {
    const SIZE: usize = 112;
    const NAME: &'static str = "optional header (PE32+)";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            magic: f.u16(),
            major_linker_version: f.u8(),
            minor_linker_version: f.u8(),
            size_of_code: f.u32(),
            size_of_initialized_data: f.u32(),
            size_of_uninitialized_data: f.u32(),
            address_of_entry_point: f.u32(),
            base_of_code: f.u32(),
            image_base: f.u64(),
            section_alignment: f.u32(),
            file_alignment: f.u32(),
            major_operating_system_version: f.u16(),
            minor_operating_system_version: f.u16(),
            major_image_version: f.u16(),
            minor_image_version: f.u16(),
            major_subsystem_version: f.u16(),
            minor_subsystem_version: f.u16(),
            win32_version_value: f.u32(),
            size_of_image: f.u32(),
            size_of_headers: f.u32(),
            check_sum: f.u32(),
            subsystem: f.u16(),
            dll_characteristics: f.u16(),
            size_of_stack_reserve: f.u64(),
            size_of_stack_commit: f.u64(),
            size_of_heap_reserve: f.u64(),
            size_of_heap_commit: f.u64(),
            loader_flags: f.u32(),
            number_of_rva_and_sizes: f.u32(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.magic);
        out.push(self.major_linker_version);
        out.push(self.minor_linker_version);
        put_u32(out, self.size_of_code);
        put_u32(out, self.size_of_initialized_data);
        put_u32(out, self.size_of_uninitialized_data);
        put_u32(out, self.address_of_entry_point);
        put_u32(out, self.base_of_code);
        put_u64(out, self.image_base);
        put_u32(out, self.section_alignment);
        put_u32(out, self.file_alignment);
        put_u16(out, self.major_operating_system_version);
        put_u16(out, self.minor_operating_system_version);
        put_u16(out, self.major_image_version);
        put_u16(out, self.minor_image_version);
        put_u16(out, self.major_subsystem_version);
        put_u16(out, self.minor_subsystem_version);
        put_u32(out, self.win32_version_value);
        put_u32(out, self.size_of_image);
        put_u32(out, self.size_of_headers);
        put_u32(out, self.check_sum);
        put_u16(out, self.subsystem);
        put_u16(out, self.dll_characteristics);
        put_u64(out, self.size_of_stack_reserve);
        put_u64(out, self.size_of_stack_commit);
        put_u64(out, self.size_of_heap_reserve);
        put_u64(out, self.size_of_heap_commit);
        put_u32(out, self.loader_flags);
        put_u32(out, self.number_of_rva_and_sizes);
    }
}

/// Either optional header form, selected by its `Magic` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeader {
    Pe32(OptionalHeader32),
    Pe32Plus(OptionalHeader64),
}

impl OptionalHeader {
    pub fn magic(&self) -> u16 {
        match self {
            OptionalHeader::Pe32(h) => h.magic,
            OptionalHeader::Pe32Plus(h) => h.magic,
        }
    }

    pub fn size_of_headers(&self) -> u32 {
        match self {
            OptionalHeader::Pe32(h) => h.size_of_headers,
            OptionalHeader::Pe32Plus(h) => h.size_of_headers,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            OptionalHeader::Pe32(_) => OptionalHeader32::SIZE,
            OptionalHeader::Pe32Plus(_) => OptionalHeader64::SIZE,
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            OptionalHeader::Pe32(h) => h.write(out),
            OptionalHeader::Pe32Plus(h) => h.write(out),
        }
    }
}

/// `IMAGE_DATA_DIRECTORY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl Record for DataDirectory {
    const SIZE: usize = 8;
    const NAME: &'static str = "data directory";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            virtual_address: f.u32(),
            size: f.u32(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u32(out, self.virtual_address);
        put_u32(out, self.size);
    }
}

/// The fixed table of 16 data directories following the optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectories {
    pub entries: [DataDirectory; pe::IMAGE_NUMBEROF_DIRECTORY_ENTRIES],
}

impl DataDirectories {
    pub fn get(&self, index: usize) -> Option<&DataDirectory> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DataDirectory> {
        self.entries.get_mut(index)
    }

    pub fn debug(&self) -> DataDirectory {
        self.entries[pe::IMAGE_DIRECTORY_ENTRY_DEBUG]
    }

    pub fn base_reloc(&self) -> DataDirectory {
        self.entries[pe::IMAGE_DIRECTORY_ENTRY_BASERELOC]
    }
}

impl Record for DataDirectories {
    const SIZE: usize = pe::IMAGE_NUMBEROF_DIRECTORY_ENTRIES * 8;
    const NAME: &'static str = "data directories";

    fn read(f: &mut FieldReader<'_>) -> Self {
        Self {
            entries: std::array::from_fn(|_| DataDirectory::read(f)),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            entry.write(out);
        }
    }
}
