//! Derived section regions
//!
//! The section index maps bars to the section governing them. It is
//! derived from the store's section items and rebuilt after every
//! mutation batch; regions are half-open bar ranges that tile the
//! whole document.

use std::ops::Range;

use crate::models::ItemId;

use super::ItemStore;

/// The bar range `[start, end)` governed by one section item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionRegion {
    pub section: ItemId,
    pub bars: Range<usize>,
}

/// Bar-ordered list of section regions covering `[0, size_in_bars)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionIndex {
    regions: Vec<SectionRegion>,
}

impl SectionIndex {
    /// Derive the region list from the store's section items.
    ///
    /// Each region runs from its section's bar to the next section's
    /// bar; the last one runs to the end of the document.
    pub fn rebuild(store: &ItemStore) -> Self {
        let sections: Vec<_> = store.sections().collect();
        debug_assert!(
            sections.first().map_or(false, |s| s.position().bar == 0),
            "no section at bar 0"
        );

        let mut regions = Vec::with_capacity(sections.len());
        for (index, section) in sections.iter().enumerate() {
            let start = section.position().bar;
            let end = sections
                .get(index + 1)
                .map(|next| next.position().bar)
                .unwrap_or_else(|| store.size_in_bars());
            regions.push(SectionRegion {
                section: section.id(),
                bars: start..end,
            });
        }
        Self { regions }
    }

    /// Id of the section governing `bar`, if `bar` is in bounds.
    pub fn section_at(&self, bar: usize) -> Option<ItemId> {
        self.regions
            .iter()
            .find(|region| region.bars.contains(&bar))
            .map(|region| region.section)
    }

    /// Region of a given section item.
    pub fn region_of(&self, section: ItemId) -> Option<&SectionRegion> {
        self.regions.iter().find(|region| region.section == section)
    }

    /// All regions in bar order.
    pub fn regions(&self) -> &[SectionRegion] {
        &self.regions
    }

    /// True if the regions are contiguous, non-overlapping, and cover
    /// exactly `[0, size_in_bars)`.
    pub fn covers(&self, size_in_bars: usize) -> bool {
        let mut expected_start = 0;
        for region in &self.regions {
            if region.bars.start != expected_start || region.bars.is_empty() {
                return false;
            }
            expected_start = region.bars.end;
        }
        expected_start == size_in_bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemData, Position, Section, TimeSignature};

    fn build_store(section_bars: &[usize], size: usize) -> ItemStore {
        let mut store = ItemStore::new(size);
        for (i, &bar) in section_bars.iter().enumerate() {
            store
                .insert(
                    ItemData::Section(Section::new(
                        format!("S{i}"),
                        TimeSignature::four_four(),
                    )),
                    Position::bar_start(bar),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_single_section_covers_all() {
        let store = build_store(&[0], 8);
        let index = SectionIndex::rebuild(&store);
        assert_eq!(index.regions().len(), 1);
        assert_eq!(index.regions()[0].bars, 0..8);
        assert!(index.covers(8));
    }

    #[test]
    fn test_regions_are_half_open_and_tiled() {
        let store = build_store(&[0, 4, 6], 10);
        let index = SectionIndex::rebuild(&store);
        let bars: Vec<_> = index.regions().iter().map(|r| r.bars.clone()).collect();
        assert_eq!(bars, vec![0..4, 4..6, 6..10]);
        assert!(index.covers(10));
    }

    #[test]
    fn test_section_at() {
        let store = build_store(&[0, 4], 8);
        let index = SectionIndex::rebuild(&store);
        let first = index.regions()[0].section;
        let second = index.regions()[1].section;

        assert_eq!(index.section_at(0), Some(first));
        assert_eq!(index.section_at(3), Some(first));
        assert_eq!(index.section_at(4), Some(second));
        assert_eq!(index.section_at(7), Some(second));
        assert_eq!(index.section_at(8), None);
    }

    #[test]
    fn test_region_of() {
        let store = build_store(&[0, 4], 8);
        let index = SectionIndex::rebuild(&store);
        let second = index.regions()[1].section;
        assert_eq!(index.region_of(second).unwrap().bars, 4..8);
        assert!(index.region_of(999).is_none());
    }
}
