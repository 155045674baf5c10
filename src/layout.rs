//! Section grouping and merging.
//!
//! Sections contributed by several objects are collected into groups keyed
//! by the part of their name before the first `$`. Each group is folded into
//! a single output section, with members concatenated in a fixed order.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{malformed, Result};
use crate::section::Section;

/// Total order used for group membership.
///
/// Plain names come before `$` names. Plain names order by source ordinal;
/// `$` names order by the suffix after the first `$`, then by ordinal.
pub fn compare_sections(a: &Section, b: &Section) -> Ordering {
    match (a.dollar_suffix(), b.dollar_suffix()) {
        (None, None) => a.ordinal().cmp(&b.ordinal()),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y).then_with(|| a.ordinal().cmp(&b.ordinal())),
    }
}

/// Input sections that share a group key.
///
/// Members are kept sorted by [`compare_sections`]; equal members keep
/// their insertion order.
#[derive(Debug, Clone)]
pub struct SectionGroup {
    key: String,
    members: Vec<Section>,
}

impl SectionGroup {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            members: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn members(&self) -> &[Section] {
        &self.members
    }

    /// Total number of data bytes across all members.
    pub fn size(&self) -> usize {
        self.members.iter().map(|s| s.data().len()).sum()
    }

    fn insert(&mut self, section: Section) {
        let index = self
            .members
            .iter()
            .position(|existing| compare_sections(&section, existing) == Ordering::Less)
            .unwrap_or(self.members.len());
        self.members.insert(index, section);
    }

    /// Folds the group into one section named after the group key.
    ///
    /// The header comes from the first member; the data is every member's
    /// data concatenated in order.
    fn merge(self) -> Result<Section> {
        let mut data = Vec::with_capacity(self.size());
        let mut dropped_relocations = 0;
        for member in &self.members {
            data.extend_from_slice(member.data());
            dropped_relocations += member.relocations().len();
        }
        if dropped_relocations > 0 {
            tracing::warn!(
                "group {}: {} relocation(s) are not carried into the merged section",
                self.key,
                dropped_relocations
            );
        }

        let mut members = self.members.into_iter();
        let Some(first) = members.next() else {
            return Err(malformed!("section group {} has no members", self.key));
        };
        let mut merged = first.into_merged(data);
        merged.set_name(&self.key)?;
        tracing::debug!(
            "merged group {} ({} bytes)",
            self.key,
            merged.data().len()
        );
        Ok(merged)
    }
}

/// Section groups in first-seen key order.
#[derive(Debug, Clone, Default)]
pub struct SectionList {
    groups: Vec<SectionGroup>,
}

impl SectionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `section` into its group, creating the group on first sight.
    pub fn add(&mut self, section: Section) {
        let key = section.group_key();
        let index = match self.groups.iter().position(|g| g.key == key) {
            Some(index) => index,
            None => {
                self.groups.push(SectionGroup::new(key));
                self.groups.len() - 1
            }
        };
        self.groups[index].insert(section);
    }

    pub fn add_range(&mut self, sections: impl IntoIterator<Item = Section>) {
        for section in sections {
            self.add(section);
        }
    }

    pub fn groups(&self) -> &[SectionGroup] {
        &self.groups
    }

    pub fn group(&self, key: &str) -> Option<&SectionGroup> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Produces one merged section per group, in group order.
    pub fn merge(self) -> Result<Vec<Section>> {
        self.groups.into_iter().map(SectionGroup::merge).collect()
    }
}

impl fmt::Display for SectionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            writeln!(f, "Section Group: {}:", group.key)?;
            for section in &group.members {
                writeln!(
                    f,
                    "\tSource: {}\t\tSection: {}",
                    section.ordinal(),
                    section.name()
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{encode_short_name, SectionHeader};
    use crate::section::Provenance;
    use object::pe;

    fn section(name: &str, ordinal: usize, data: &[u8]) -> Section {
        let header = SectionHeader {
            name: encode_short_name(name).unwrap(),
            characteristics: pe::IMAGE_SCN_CNT_CODE,
            size_of_raw_data: data.len() as u32,
            pointer_to_raw_data: 0x1234,
            ..Default::default()
        };
        Section::new(header, data.to_vec(), Provenance::Object).with_ordinal(ordinal)
    }

    fn names(group: &SectionGroup) -> Vec<&str> {
        group.members().iter().map(|s| s.name()).collect()
    }

    #[test]
    fn plain_names_sort_before_dollar_names() {
        let plain = section(".text", 5, &[]);
        let dollar = section(".text$a", 0, &[]);
        assert_eq!(compare_sections(&plain, &dollar), Ordering::Less);
        assert_eq!(compare_sections(&dollar, &plain), Ordering::Greater);
    }

    #[test]
    fn ties_break_on_ordinal() {
        assert_eq!(
            compare_sections(&section(".text", 1, &[]), &section(".text", 0, &[])),
            Ordering::Greater
        );
        assert_eq!(
            compare_sections(&section(".text$x", 0, &[]), &section(".text$x", 2, &[])),
            Ordering::Less
        );
        assert_eq!(
            compare_sections(&section(".text$b", 0, &[]), &section(".text$a", 9, &[])),
            Ordering::Greater
        );
    }

    #[test]
    fn groups_follow_first_seen_order() {
        let mut list = SectionList::new();
        list.add_range([
            section(".text$zz", 2, b"zz"),
            section(".data", 0, b"d"),
            section(".text", 0, b"t"),
            section(".text$mn", 1, b"mn"),
        ]);

        let keys: Vec<&str> = list.groups().iter().map(|g| g.key()).collect();
        assert_eq!(keys, [".text", ".data"]);
        assert_eq!(names(list.group(".text").unwrap()), [".text", ".text$mn", ".text$zz"]);
        assert_eq!(names(list.group(".data").unwrap()), [".data"]);
    }

    #[test]
    fn equal_members_keep_insertion_order() {
        let mut list = SectionList::new();
        list.add(section(".rdata", 1, b"first"));
        list.add(section(".rdata", 1, b"second"));
        let group = list.group(".rdata").unwrap();
        assert_eq!(group.members()[0].data(), b"first");
        assert_eq!(group.members()[1].data(), b"second");
    }

    #[test]
    fn merge_concatenates_members_in_order() {
        let mut list = SectionList::new();
        list.add(section(".text$zz", 2, &[0xCC; 4]));
        list.add(section(".text", 0, &[0x90; 16]));
        list.add(section(".text$mn", 1, &[0xC3; 2]));
        list.add(section(".data", 0, &[1, 2, 3]));

        let merged = list.merge().unwrap();
        assert_eq!(merged.len(), 2);

        let text = &merged[0];
        assert_eq!(text.name(), ".text");
        let mut expected = vec![0x90; 16];
        expected.extend_from_slice(&[0xC3; 2]);
        expected.extend_from_slice(&[0xCC; 4]);
        assert_eq!(text.data(), expected.as_slice());
        assert_eq!(text.raw_size(), 22);
        assert_eq!(text.physical_address(), 0);
        assert_eq!(text.provenance(), Provenance::Merged);

        assert_eq!(merged[1].name(), ".data");
        assert_eq!(merged[1].data(), &[1, 2, 3]);
    }

    #[test]
    fn merged_header_comes_from_first_member() {
        let mut list = SectionList::new();
        let mut later = section(".data$b", 0, b"b");
        later.set_virtual_address(0x9999);
        list.add(later);
        list.add(section(".data$a", 3, b"a"));

        let merged = list.merge().unwrap();
        assert_eq!(merged[0].name(), ".data");
        assert_eq!(merged[0].data(), b"ab");
        assert_eq!(merged[0].virtual_address(), 0);
        assert_eq!(merged[0].ordinal(), 3);
    }

    #[test]
    fn report_lists_groups_and_sources() {
        let mut list = SectionList::new();
        list.add(section(".text", 0, &[]));
        list.add(section(".text$a", 1, &[]));
        let report = list.to_string();
        assert!(report.starts_with("Section Group: .text:\n"));
        assert!(report.contains("\tSource: 1\t\tSection: .text$a\n"));
    }
}
