//! Position-indexed item storage
//!
//! `ItemStore` owns every item of a document in an arena addressed by
//! stable `ItemId`s, kept sorted by `(position, id)` so that range
//! queries come back in document order with insertion-order ties.

pub mod section_index;

pub use section_index::{SectionIndex, SectionRegion};

use std::ops::Range;

use crate::error::{EditError, PreconditionError, UnsupportedEdit};
use crate::models::{Item, ItemData, ItemId, ItemKind, Position};

/// Ordered collection of positioned items plus the document bar count.
///
/// The store enforces the positional rules it can see on its own:
/// bars must be in range, section items must sit on bar starts, and
/// the sole bar-0 section cannot be removed. Time-signature validity
/// of beats is the owning document's concern, since only it knows
/// which section governs which bar.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemStore {
    size_in_bars: usize,
    /// Sorted by `(position, id)`; ids are monotonic, so ties keep
    /// insertion order.
    items: Vec<Item>,
    next_id: ItemId,
}

impl ItemStore {
    /// Create an empty store spanning `size_in_bars` bars.
    pub fn new(size_in_bars: usize) -> Self {
        Self {
            size_in_bars,
            items: Vec::new(),
            next_id: 0,
        }
    }

    pub fn size_in_bars(&self) -> usize {
        self.size_in_bars
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add an item, allocating its id.
    pub fn insert(&mut self, data: ItemData, position: Position) -> Result<ItemId, EditError> {
        if position.bar >= self.size_in_bars {
            return Err(PreconditionError::BarOutOfRange {
                bar: position.bar,
                size: self.size_in_bars,
            }
            .into());
        }
        if data.is_section() && !position.is_bar_start() {
            return Err(PreconditionError::SectionOffBarStart(position).into());
        }

        let id = self.alloc_id();
        self.insert_exact(Item::new(id, position, data));
        Ok(id)
    }

    /// Remove an item by id.
    ///
    /// Refuses to remove the only section at bar 0: the document must
    /// always have a current section.
    pub fn remove(&mut self, id: ItemId) -> Result<Item, EditError> {
        let item = self
            .get(id)
            .ok_or(PreconditionError::UnknownItem(id))?;
        if item.kind() == ItemKind::Section && item.position().bar == 0 {
            let other_bar0_section = self.items.iter().any(|other| {
                other.id() != id
                    && other.kind() == ItemKind::Section
                    && other.position().bar == 0
            });
            if !other_bar0_section {
                return Err(UnsupportedEdit::WouldOrphanOpening.into());
            }
        }
        Ok(self
            .remove_unchecked(id)
            .unwrap_or_else(|| unreachable!("item {id} disappeared during remove")))
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// All items in document order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Items whose bar falls in `bars`, optionally filtered by kind,
    /// in document order.
    pub fn items_in_range(&self, bars: Range<usize>, kind: Option<ItemKind>) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|item| bars.contains(&item.position().bar))
            .filter(|item| kind.map_or(true, |k| item.kind() == k))
            .collect()
    }

    /// Last item at or before `position`, optionally filtered by kind.
    pub fn item_at_or_before(&self, position: Position, kind: Option<ItemKind>) -> Option<&Item> {
        self.items
            .iter()
            .rev()
            .find(|item| item.position() <= position && kind.map_or(true, |k| item.kind() == k))
    }

    /// First item at or after `position`, optionally filtered by kind.
    pub fn item_at_or_after(&self, position: Position, kind: Option<ItemKind>) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.position() >= position && kind.map_or(true, |k| item.kind() == k))
    }

    /// Section items in bar order.
    pub fn sections(&self) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(|item| item.kind() == ItemKind::Section)
    }

    // ---- unchecked primitives -------------------------------------
    //
    // Used by edit replay, which re-applies sub-edits that were
    // validated when first recorded. Replay may pass through states
    // the checked API rejects (e.g. two sections at bar 0 mid-way
    // through reverting a delete), so these skip the guards.

    pub(crate) fn alloc_id(&mut self) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn set_size_in_bars(&mut self, size_in_bars: usize) {
        self.size_in_bars = size_in_bars;
    }

    pub(crate) fn insert_exact(&mut self, item: Item) {
        debug_assert!(
            self.get(item.id()).is_none(),
            "duplicate item id {}",
            item.id()
        );
        if item.id() >= self.next_id {
            self.next_id = item.id() + 1;
        }
        self.items.push(item);
        self.resort();
    }

    pub(crate) fn remove_unchecked(&mut self, id: ItemId) -> Option<Item> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        Some(self.items.remove(index))
    }

    pub(crate) fn set_position_unchecked(&mut self, id: ItemId, position: Position) -> Option<Position> {
        let item = self.items.iter_mut().find(|item| item.id() == id)?;
        let old = item.position();
        item.set_position(position);
        self.resort();
        Some(old)
    }

    pub(crate) fn set_data_unchecked(&mut self, id: ItemId, data: ItemData) -> Option<ItemData> {
        let item = self.items.iter_mut().find(|item| item.id() == id)?;
        let old = item.data().clone();
        item.set_data(data);
        Some(old)
    }

    fn resort(&mut self) {
        self.items
            .sort_by(|a, b| a.position().cmp(&b.position()).then(a.id().cmp(&b.id())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Annotation, Section, TimeSignature};
    use num_rational::Rational32;

    fn chord(text: &str) -> ItemData {
        ItemData::ChordSymbol(text.parse().unwrap())
    }

    fn section(name: &str) -> ItemData {
        ItemData::Section(Section::new(name, TimeSignature::four_four()))
    }

    fn store_with_opening() -> ItemStore {
        let mut store = ItemStore::new(8);
        store.insert(section("A"), Position::origin()).unwrap();
        store
    }

    #[test]
    fn test_insert_out_of_bounds_fails() {
        let mut store = store_with_opening();
        let err = store.insert(chord("C"), Position::bar_start(8)).unwrap_err();
        assert_eq!(
            err,
            EditError::Precondition(PreconditionError::BarOutOfRange { bar: 8, size: 8 })
        );
    }

    #[test]
    fn test_section_must_sit_on_bar_start() {
        let mut store = store_with_opening();
        let off = Position::new(2, Rational32::new(1, 2));
        let err = store.insert(section("B"), off).unwrap_err();
        assert_eq!(
            err,
            EditError::Precondition(PreconditionError::SectionOffBarStart(off))
        );
    }

    #[test]
    fn test_remove_sole_opening_section_fails() {
        let mut store = store_with_opening();
        let id = store.sections().next().unwrap().id();
        let err = store.remove(id).unwrap_err();
        assert_eq!(err, EditError::Unsupported(UnsupportedEdit::WouldOrphanOpening));
        // Still there
        assert!(store.get(id).is_some());
    }

    #[test]
    fn test_query_order_position_then_insertion() {
        let mut store = store_with_opening();
        let beat2 = Position::new(2, Rational32::from_integer(2));
        let first = store.insert(chord("C"), beat2).unwrap();
        let second = store.insert(chord("F"), beat2).unwrap();
        store.insert(chord("G"), Position::bar_start(1)).unwrap();

        let ids: Vec<ItemId> = store
            .items_in_range(0..8, Some(ItemKind::ChordSymbol))
            .iter()
            .map(|item| item.id())
            .collect();
        // Bar 1 chord first, then the two bar-2 chords in insertion order
        assert_eq!(ids.len(), 3);
        assert_eq!(&ids[1..], &[first, second]);
    }

    #[test]
    fn test_at_or_before_and_after() {
        let mut store = store_with_opening();
        store.insert(chord("C"), Position::bar_start(1)).unwrap();
        store.insert(chord("F"), Position::bar_start(4)).unwrap();
        store
            .insert(ItemData::Annotation(Annotation::new("bridge")), Position::bar_start(4))
            .unwrap();

        let probe = Position::new(3, Rational32::from_integer(1));
        let before = store
            .item_at_or_before(probe, Some(ItemKind::ChordSymbol))
            .unwrap();
        assert_eq!(before.position(), Position::bar_start(1));

        let after = store
            .item_at_or_after(probe, Some(ItemKind::Annotation))
            .unwrap();
        assert_eq!(after.position(), Position::bar_start(4));

        assert!(store
            .item_at_or_after(Position::bar_start(5), Some(ItemKind::ChordSymbol))
            .is_none());
    }

    #[test]
    fn test_ids_survive_moves() {
        let mut store = store_with_opening();
        let id = store.insert(chord("C"), Position::bar_start(1)).unwrap();
        store.set_position_unchecked(id, Position::bar_start(6));
        assert_eq!(store.get(id).unwrap().position(), Position::bar_start(6));
    }
}
