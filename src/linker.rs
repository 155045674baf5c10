//! Linking session.
//!
//! The `Linker` collects relocatable objects in input order, folds their
//! sections into groups and synthesizes a laid-out PE image:
//! 1. Input loading: each object is decoded with the next ordinal.
//! 2. Grouping: sections are filed by group key in total order.
//! 3. Merge: one output section per group.
//! 4. Layout: file offsets, RVAs and header fields are assigned.

use crate::coff::ObjectFile;
use crate::error::Result;
use crate::image::{ImageOptions, LayoutSummary, PeImage};
use crate::layout::SectionList;
use crate::records::Machine;

#[derive(Debug, Default)]
pub struct Linker {
    objects: Vec<ObjectFile>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an object and appends it to the session.
    ///
    /// The ordinal is the object's position in the session, independent of
    /// how or when its bytes were produced.
    pub fn add_object(&mut self, data: &[u8]) -> Result<usize> {
        self.push(|ordinal| ObjectFile::parse(data, ordinal))
    }

    /// Like [`Linker::add_object`], recording `source` for reports.
    pub fn add_named_object(&mut self, source: &str, data: &[u8]) -> Result<usize> {
        let ordinal = self.push(|ordinal| Ok(ObjectFile::parse(data, ordinal)?.with_source(source)))?;
        tracing::debug!("added {} as object #{}", source, ordinal);
        Ok(ordinal)
    }

    /// Assigns the next ordinal; nothing is added when `decode` fails.
    fn push(&mut self, decode: impl FnOnce(usize) -> Result<ObjectFile>) -> Result<usize> {
        let ordinal = self.objects.len();
        self.objects.push(decode(ordinal)?);
        Ok(ordinal)
    }

    pub fn objects(&self) -> &[ObjectFile] {
        &self.objects
    }

    /// Machine of the first object whose machine is known.
    pub fn machine(&self) -> Option<Machine> {
        self.objects
            .iter()
            .map(ObjectFile::machine)
            .find(|m| *m != Machine::Unknown)
    }

    /// Groups every object's sections, in ordinal order.
    pub fn group_sections(self) -> SectionList {
        let mut list = SectionList::new();
        for object in self.objects {
            list.add_range(object.into_sections());
        }
        list
    }

    /// Merges all input sections and lays them out as a new image.
    pub fn link(self, options: &ImageOptions) -> Result<(PeImage, LayoutSummary)> {
        let groups = self.group_sections();
        tracing::debug!("{} section group(s)", groups.len());
        let sections = groups.merge()?;
        let mut image = PeImage::from_sections(sections, options)?;
        let summary = image.layout()?;
        Ok((image, summary))
    }
}
