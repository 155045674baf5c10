//! PE image builder.
//!
//! A [`PeImage`] is either decoded from an existing 32-bit image or
//! synthesized from a list of already-merged sections. [`PeImage::layout`]
//! assigns file offsets and RVAs to every section and patches the headers
//! that depend on them; [`PeImage::write_image`] then serializes the result.

use std::fmt;

use object::pe;

use crate::error::{malformed, Error, Result};
use crate::records::{
    decode_array, slice, DataDirectories, DataDirectory, DosHeader, FileHeader, Machine, NtSignature,
    OptionalHeader, OptionalHeader32, OptionalHeader64, Record, SectionHeader,
};
use crate::section::{Provenance, Section};
use crate::utils::{check_alignment, checked_align_up};
use crate::writer;

/// RVA of the first section.
const FIRST_SECTION_RVA: u32 = 0x1000;

/// Header values used when synthesizing an image from sections.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub machine: Machine,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub subsystem: u16,
    pub characteristics: u16,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            machine: Machine::I386,
            image_base: 0x40_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            subsystem: pe::IMAGE_SUBSYSTEM_WINDOWS_CUI,
            characteristics: pe::IMAGE_FILE_EXECUTABLE_IMAGE | pe::IMAGE_FILE_32BIT_MACHINE,
        }
    }
}

/// Geometry computed by [`PeImage::layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSummary {
    /// Length of the serialized image.
    pub file_size: u32,
    pub size_of_headers: u32,
    pub size_of_initialized_data: u32,
    pub size_of_image: u32,
    pub base_of_code: Option<u32>,
    pub base_of_data: Option<u32>,
    /// RVA written into the debug data directory.
    pub debug_directory: Option<u32>,
    /// RVA written into the base relocation data directory.
    pub base_reloc_directory: Option<u32>,
}

/// An in-memory PE image.
#[derive(Debug, Clone)]
pub struct PeImage {
    pub(crate) dos_header: DosHeader,
    pub(crate) dos_stub: Vec<u8>,
    pub(crate) nt_signature: NtSignature,
    pub(crate) file_header: FileHeader,
    pub(crate) optional_header: OptionalHeader,
    pub(crate) data_directories: DataDirectories,
    pub(crate) sections: Vec<Section>,
    pub(crate) layout: Option<LayoutSummary>,
}

impl PeImage {
    /// Decodes an existing image.
    ///
    /// The DOS stub between the DOS header and the NT headers is kept
    /// verbatim and survives any rebuild.
    pub fn read(data: &[u8]) -> Result<Self> {
        let dos_header = DosHeader::decode(data, 0)?;
        if dos_header.e_magic != pe::IMAGE_DOS_SIGNATURE {
            return Err(malformed!("bad DOS signature 0x{:04x}", dos_header.e_magic));
        }
        let nt_offset = dos_header.e_lfanew as usize;
        if nt_offset < DosHeader::SIZE {
            return Err(malformed!("e_lfanew 0x{nt_offset:x} overlaps the DOS header"));
        }
        let dos_stub = slice(data, DosHeader::SIZE, nt_offset - DosHeader::SIZE, "DOS stub")?.to_vec();

        let nt_signature = NtSignature::decode(data, nt_offset)?;
        if !nt_signature.is_valid() {
            return Err(malformed!("bad NT signature 0x{:08x}", nt_signature.0));
        }
        let mut offset = nt_offset + NtSignature::SIZE;
        let file_header = FileHeader::decode(data, offset)?;
        offset += FileHeader::SIZE;
        let optional_at = offset;

        let magic = slice(data, offset, 2, "optional header magic")?;
        let optional_header = match u16::from_le_bytes([magic[0], magic[1]]) {
            pe::IMAGE_NT_OPTIONAL_HDR32_MAGIC => {
                OptionalHeader::Pe32(OptionalHeader32::decode(data, offset)?)
            }
            pe::IMAGE_NT_OPTIONAL_HDR64_MAGIC => {
                OptionalHeader::Pe32Plus(OptionalHeader64::decode(data, offset)?)
            }
            other => return Err(malformed!("unknown optional header magic 0x{other:x}")),
        };
        offset += optional_header.encoded_len();

        // Only the directories that fit in SizeOfOptionalHeader are present.
        let declared = file_header.size_of_optional_header as usize;
        let directory_bytes = declared
            .checked_sub(optional_header.encoded_len())
            .ok_or_else(|| malformed!("SizeOfOptionalHeader 0x{declared:x} is too small"))?;
        let count =
            (directory_bytes / DataDirectory::SIZE).min(pe::IMAGE_NUMBEROF_DIRECTORY_ENTRIES);
        let mut data_directories = DataDirectories::default();
        for (slot, entry) in data_directories
            .entries
            .iter_mut()
            .zip(decode_array::<DataDirectory>(data, offset, count)?)
        {
            *slot = entry;
        }
        offset = optional_at + declared;
        if directory_bytes != DataDirectories::SIZE {
            tracing::debug!(
                "section table at 0x{:x}: {} data directories, SizeOfOptionalHeader 0x{:x}",
                offset,
                count,
                declared
            );
        }

        let headers: Vec<SectionHeader> =
            decode_array(data, offset, file_header.number_of_sections as usize)?;
        let sections = headers
            .into_iter()
            .map(|header| Section::parse(header, data, 0, Provenance::Image))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "image: machine {:?}, {} sections, {} byte DOS stub",
            file_header.machine(),
            sections.len(),
            dos_stub.len()
        );

        Ok(Self {
            dos_header,
            dos_stub,
            nt_signature,
            file_header,
            optional_header,
            data_directories,
            sections,
            layout: None,
        })
    }

    /// Starts a new 32-bit image from merged sections.
    pub fn from_sections(sections: Vec<Section>, options: &ImageOptions) -> Result<Self> {
        if options.machine == Machine::Amd64 {
            return Err(Error::Unsupported("PE32+ image layout"));
        }
        let file_alignment = check_alignment("FileAlignment", options.file_alignment)?;
        let section_alignment = check_alignment("SectionAlignment", options.section_alignment)?;
        let number_of_sections = u16::try_from(sections.len())
            .map_err(|_| malformed!("{} sections do not fit the file header", sections.len()))?;

        let mut image = Self {
            dos_header: DosHeader::minimal(),
            dos_stub: Vec::new(),
            nt_signature: NtSignature::default(),
            file_header: FileHeader {
                machine: options.machine.into(),
                number_of_sections,
                size_of_optional_header: (OptionalHeader32::SIZE + DataDirectories::SIZE) as u16,
                characteristics: options.characteristics,
                ..Default::default()
            },
            optional_header: OptionalHeader::Pe32(OptionalHeader32 {
                magic: pe::IMAGE_NT_OPTIONAL_HDR32_MAGIC,
                image_base: options.image_base,
                section_alignment,
                file_alignment,
                major_operating_system_version: 4,
                major_subsystem_version: 4,
                subsystem: options.subsystem,
                size_of_stack_reserve: 0x10_0000,
                size_of_stack_commit: 0x1000,
                size_of_heap_reserve: 0x10_0000,
                size_of_heap_commit: 0x1000,
                number_of_rva_and_sizes: pe::IMAGE_NUMBEROF_DIRECTORY_ENTRIES as u32,
                ..Default::default()
            }),
            data_directories: DataDirectories::default(),
            sections,
            layout: None,
        };
        let headers_len = image.headers_len()?;
        let size_of_headers = checked_align_up(headers_len, file_alignment)
            .ok_or_else(|| malformed!("header block of 0x{headers_len:x} bytes is too large"))?;
        if let OptionalHeader::Pe32(header) = &mut image.optional_header {
            header.size_of_headers = size_of_headers;
        }
        Ok(image)
    }

    /// Length of every header, including the section table.
    pub fn headers_len(&self) -> Result<u32> {
        let len = DosHeader::SIZE
            + self.dos_stub.len()
            + NtSignature::SIZE
            + FileHeader::SIZE
            + self.optional_header.encoded_len()
            + DataDirectories::SIZE
            + self.sections.len() * SectionHeader::SIZE;
        u32::try_from(len).map_err(|_| malformed!("header block of {len} bytes is too large"))
    }

    /// Assigns file offsets and RVAs to all sections and patches the headers.
    pub fn layout(&mut self) -> Result<LayoutSummary> {
        self.layout = None;
        let headers_len = self.headers_len()?;
        let number_of_sections = u16::try_from(self.sections.len())
            .map_err(|_| malformed!("{} sections do not fit the file header", self.sections.len()))?;
        let optional = match &mut self.optional_header {
            OptionalHeader::Pe32(header) => header,
            OptionalHeader::Pe32Plus(_) => return Err(Error::Unsupported("PE32+ image layout")),
        };
        let file_alignment = check_alignment("FileAlignment", optional.file_alignment)?;
        let section_alignment = check_alignment("SectionAlignment", optional.section_alignment)?;

        self.file_header.number_of_sections = number_of_sections;
        // The full directory table is always written back.
        self.file_header.size_of_optional_header =
            (OptionalHeader32::SIZE + DataDirectories::SIZE) as u16;
        optional.number_of_rva_and_sizes = pe::IMAGE_NUMBEROF_DIRECTORY_ENTRIES as u32;
        if headers_len > optional.size_of_headers {
            optional.size_of_headers = checked_align_up(headers_len, file_alignment)
                .ok_or_else(|| malformed!("header block of 0x{headers_len:x} bytes is too large"))?;
            tracing::debug!("grew SizeOfHeaders to 0x{:x}", optional.size_of_headers);
        }

        let mut file_size = optional.size_of_headers;
        for section in &self.sections {
            file_size = checked_align_up(data_len(section)?, file_alignment)
                .and_then(|raw_size| file_size.checked_add(raw_size))
                .ok_or_else(|| malformed!("image file size exceeds 4 GiB"))?;
        }

        // Physical pass.
        self.sections.sort_by_key(|s| s.physical_address());
        let mut file_position = optional.size_of_headers;
        let mut initialized_data = 0u32;
        for section in &mut self.sections {
            if !section.contributes_to_file_size() {
                continue;
            }
            let raw_size = checked_align_up(data_len(section)?, file_alignment)
                .ok_or_else(|| malformed!("section {} is too large to align", section.name()))?;
            section.set_raw_size(raw_size);
            section.set_physical_address(file_position);
            file_position += raw_size;
            initialized_data += raw_size;
            tracing::trace!(
                "{}: file offset 0x{:x}, raw size 0x{:x}",
                section.name(),
                section.physical_address(),
                raw_size
            );
        }
        optional.size_of_initialized_data = initialized_data;

        // Virtual pass.
        self.sections.sort_by_key(|s| s.virtual_address());
        let mut rva = FIRST_SECTION_RVA;
        let mut summary = LayoutSummary {
            file_size,
            size_of_headers: optional.size_of_headers,
            size_of_initialized_data: initialized_data,
            size_of_image: 0,
            base_of_code: None,
            base_of_data: None,
            debug_directory: None,
            base_reloc_directory: None,
        };
        for section in &mut self.sections {
            match section.name() {
                ".text" => {
                    optional.base_of_code = rva;
                    summary.base_of_code = Some(rva);
                }
                ".data" | ".rdata" if summary.base_of_data.is_none() => {
                    optional.base_of_data = rva;
                    summary.base_of_data = Some(rva);
                }
                _ => {}
            }
            if section.name() == ".rdata" {
                self.data_directories.entries[pe::IMAGE_DIRECTORY_ENTRY_DEBUG].virtual_address = rva;
                summary.debug_directory = Some(rva);
            }
            if section.name() == ".reloc" {
                self.data_directories.entries[pe::IMAGE_DIRECTORY_ENTRY_BASERELOC].virtual_address =
                    rva;
                summary.base_reloc_directory = Some(rva);
            }

            section.set_virtual_address(rva);
            let span = if section.has_uninitialized_data() {
                section.virtual_size()
            } else if section.has_initialized_data()
                && section.has_code()
                && section.virtual_size() > section.raw_size()
            {
                section.virtual_size()
            } else {
                let len = data_len(section)?;
                section.set_virtual_size(len);
                len
            };
            rva = checked_align_up(span, section_alignment)
                .and_then(|span| rva.checked_add(span))
                .ok_or_else(|| malformed!("image virtual size exceeds 4 GiB"))?;
            tracing::trace!(
                "{}: rva 0x{:x}, virtual size 0x{:x}",
                section.name(),
                section.virtual_address(),
                section.virtual_size()
            );
        }
        optional.size_of_image = rva;
        summary.size_of_image = rva;

        tracing::debug!(
            "layout: file size 0x{:x}, initialized data 0x{:x}, image size 0x{:x}",
            summary.file_size,
            summary.size_of_initialized_data,
            summary.size_of_image
        );
        self.layout = Some(summary);
        Ok(summary)
    }

    /// The summary of the last layout, if it is still current.
    pub fn layout_summary(&self) -> Option<&LayoutSummary> {
        self.layout.as_ref()
    }

    /// Serializes the laid-out image.
    pub fn write_image(&self) -> Result<Vec<u8>> {
        writer::serialize(self)
    }

    /// Data of the section named exactly `name`.
    pub fn get_section_data(&self, name: &str) -> Option<&[u8]> {
        self.section(name).map(|s| s.data())
    }

    /// Replaces the data of the section named exactly `name`.
    ///
    /// Returns the number of bytes written, or `None` if there is no such
    /// section. A successful write invalidates the current layout.
    pub fn write_section_data(&mut self, name: &str, data: &[u8]) -> Option<usize> {
        let section = self.sections.iter_mut().find(|s| s.name() == name)?;
        section.set_data(data.to_vec());
        self.layout = None;
        Some(data.len())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn dos_header(&self) -> &DosHeader {
        &self.dos_header
    }

    pub fn dos_stub(&self) -> &[u8] {
        &self.dos_stub
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional_header
    }

    pub fn data_directories(&self) -> &DataDirectories {
        &self.data_directories
    }

    /// Whether the file header carries `IMAGE_FILE_32BIT_MACHINE`.
    pub fn is_32bit_machine(&self) -> bool {
        self.file_header.characteristics & pe::IMAGE_FILE_32BIT_MACHINE != 0
    }
}

fn data_len(section: &Section) -> Result<u32> {
    u32::try_from(section.data().len())
        .map_err(|_| malformed!("section {} is larger than 4 GiB", section.name()))
}

impl fmt::Display for PeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PE Image: machine {:?}, {} sections{}",
            self.file_header.machine(),
            self.sections.len(),
            if self.is_32bit_machine() { ", 32-bit" } else { "" }
        )?;
        match &self.optional_header {
            OptionalHeader::Pe32(h) => writeln!(
                f,
                "Image Base: {:X}\tSection Align: {:X}\tFile Align: {:X}\tImage Size: {:X}\tHeaders Size: {:X}",
                h.image_base, h.section_alignment, h.file_alignment, h.size_of_image, h.size_of_headers
            )?,
            OptionalHeader::Pe32Plus(h) => writeln!(
                f,
                "Image Base: {:X}\tSection Align: {:X}\tFile Align: {:X}\tImage Size: {:X}\tHeaders Size: {:X} (PE32+)",
                h.image_base, h.section_alignment, h.file_alignment, h.size_of_image, h.size_of_headers
            )?,
        }
        writeln!(f, "Sections:")?;
        for section in &self.sections {
            writeln!(f, "{section}")?;
        }
        Ok(())
    }
}
