//! The lead sheet document model
//!
//! `LeadSheet` owns the item store and the derived section index, and
//! exposes the structural operations that mutate them. Every
//! operation is atomic: it validates first, then applies reversible
//! sub-edits inside a compound edit, firing fine-grained change
//! events along the way and an action started/completed bracket
//! around the whole thing. A failure rolls the partial work back
//! before the error is returned, so no partial mutation is ever
//! observable.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{EditError, PreconditionError, UnsupportedEdit};
use crate::events::{ActionEvent, ChangeEvent, EventBus, LeadSheetEvent, Subscription};
use crate::models::{Item, ItemData, ItemId, ItemKind, Position, Section, TimeSignature};
use crate::store::{ItemStore, SectionIndex};
use crate::structure::plan_bar_shift;
use crate::undo::{Reversible, UndoManager, UndoError};

/// Low-level reversible sub-edit of the item store.
///
/// Operations validate, then record these; replay is mechanical in
/// both directions.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    InsertItem {
        item: Item,
    },
    RemoveItem {
        item: Item,
    },
    MoveItem {
        id: ItemId,
        kind: ItemKind,
        from: Position,
        to: Position,
    },
    ChangeSection {
        id: ItemId,
        old: Section,
        new: Section,
    },
    SetSize {
        old_size: usize,
        new_size: usize,
    },
}

impl Reversible for Edit {
    type Target = ItemStore;

    fn apply(&self, store: &mut ItemStore) {
        match self {
            Edit::InsertItem { item } => store.insert_exact(item.clone()),
            Edit::RemoveItem { item } => {
                store.remove_unchecked(item.id());
            }
            Edit::MoveItem { id, to, .. } => {
                store.set_position_unchecked(*id, *to);
            }
            Edit::ChangeSection { id, new, .. } => {
                store.set_data_unchecked(*id, ItemData::Section(new.clone()));
            }
            Edit::SetSize { new_size, .. } => store.set_size_in_bars(*new_size),
        }
    }

    fn revert(&self, store: &mut ItemStore) {
        match self {
            Edit::InsertItem { item } => {
                store.remove_unchecked(item.id());
            }
            Edit::RemoveItem { item } => store.insert_exact(item.clone()),
            Edit::MoveItem { id, from, .. } => {
                store.set_position_unchecked(*id, *from);
            }
            Edit::ChangeSection { id, old, .. } => {
                store.set_data_unchecked(*id, ItemData::Section(old.clone()));
            }
            Edit::SetSize { old_size, .. } => store.set_size_in_bars(*old_size),
        }
    }
}

/// One item of the canonical persistence form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemSnapshot {
    pub position: Position,
    pub data: ItemData,
}

/// Canonical persistence form of a lead sheet: the bar count plus the
/// item list in document order. Sufficient to reconstruct the model
/// exactly (up to freshly allocated ids); the wire format around it
/// belongs to the caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LeadSheetSnapshot {
    pub size_in_bars: usize,
    pub items: Vec<ItemSnapshot>,
}

/// Tracking for one action bracket.
struct ActionCtx {
    name: &'static str,
    id: u64,
    owns_cedit: bool,
    mark: usize,
}

/// The editable chord lead sheet.
#[derive(Debug)]
pub struct LeadSheet {
    store: ItemStore,
    sections: SectionIndex,
    bus: EventBus<LeadSheetEvent>,
    undo: UndoManager<Edit>,
    next_action_id: u64,
}

impl LeadSheet {
    /// Create a sheet of `size_in_bars` bars with an opening section
    /// named "A" in `time_signature`.
    pub fn new(size_in_bars: usize, time_signature: TimeSignature) -> Result<Self, EditError> {
        Self::with_opening_section(size_in_bars, Section::new("A", time_signature))
    }

    /// Create a sheet with the given opening section at bar 0.
    pub fn with_opening_section(
        size_in_bars: usize,
        opening: Section,
    ) -> Result<Self, EditError> {
        if size_in_bars == 0 {
            return Err(PreconditionError::ZeroBarCount.into());
        }
        let mut store = ItemStore::new(size_in_bars);
        store.insert(ItemData::Section(opening), Position::origin())?;
        let sections = SectionIndex::rebuild(&store);
        Ok(Self {
            store,
            sections,
            bus: EventBus::new(),
            undo: UndoManager::new(),
            next_action_id: 0,
        })
    }

    // ---- queries --------------------------------------------------

    pub fn size_in_bars(&self) -> usize {
        self.store.size_in_bars()
    }

    /// Read-only access to the underlying store.
    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    /// The section item governing `bar`.
    pub fn section_at(&self, bar: usize) -> Option<&Item> {
        self.sections
            .section_at(bar)
            .and_then(|id| self.store.get(id))
    }

    /// The bar range governed by a section item.
    pub fn section_region(&self, id: ItemId) -> Option<Range<usize>> {
        self.sections.region_of(id).map(|region| region.bars.clone())
    }

    /// Time signature governing `bar`.
    pub fn time_signature_at(&self, bar: usize) -> Option<TimeSignature> {
        self.section_at(bar)
            .and_then(|item| item.data().as_section())
            .map(|section| section.time_signature)
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.store.get(id)
    }

    /// All items of a kind (or all items), in document order.
    pub fn items(&self, kind: Option<ItemKind>) -> Vec<&Item> {
        self.store.items_in_range(0..self.size_in_bars(), kind)
    }

    /// Items in a bar range, in document order.
    pub fn items_in_range(&self, bars: Range<usize>, kind: Option<ItemKind>) -> Vec<&Item> {
        self.store.items_in_range(bars, kind)
    }

    pub fn item_at_or_before(&self, position: Position, kind: Option<ItemKind>) -> Option<&Item> {
        self.store.item_at_or_before(position, kind)
    }

    pub fn item_at_or_after(&self, position: Position, kind: Option<ItemKind>) -> Option<&Item> {
        self.store.item_at_or_after(position, kind)
    }

    // ---- events ---------------------------------------------------

    /// Register a listener for change and action events.
    pub fn subscribe(&mut self, listener: impl FnMut(&LeadSheetEvent) + 'static) -> Subscription {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }

    // ---- undo -----------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Undo the newest user action, replaying its notifications in
    /// the inverse direction. Returns the action name.
    pub fn undo(&mut self) -> Result<String, UndoError> {
        let ce = self.undo.undo(&mut self.store)?;
        self.rebuild_sections();
        let id = self.next_action();
        self.publish_action(ActionEvent::Started {
            action: ce.name().to_string(),
            id,
        });
        for edit in ce.edits().iter().rev() {
            let event = Self::change_event(edit, true);
            self.bus.publish(&LeadSheetEvent::Change(event));
        }
        self.publish_action(ActionEvent::Completed {
            action: ce.name().to_string(),
            id,
            rolled_back: false,
        });
        Ok(ce.name().to_string())
    }

    /// Redo the next undone action.
    pub fn redo(&mut self) -> Result<String, UndoError> {
        let ce = self.undo.redo(&mut self.store)?;
        self.rebuild_sections();
        let id = self.next_action();
        self.publish_action(ActionEvent::Started {
            action: ce.name().to_string(),
            id,
        });
        for edit in ce.edits() {
            let event = Self::change_event(edit, false);
            self.bus.publish(&LeadSheetEvent::Change(event));
        }
        self.publish_action(ActionEvent::Completed {
            action: ce.name().to_string(),
            id,
            rolled_back: false,
        });
        Ok(ce.name().to_string())
    }

    /// Open a caller-level compound edit so several operations undo
    /// as one user action. Must be paired with `end_edit` (or
    /// `abort_edit` on the failure path).
    pub fn start_edit(&mut self, name: impl Into<String>) {
        self.assert_mutable();
        self.undo.start_cedit(name);
    }

    /// Close a caller-level compound edit. Returns false if nothing
    /// was recorded (the edit is discarded).
    pub fn end_edit(&mut self, name: &str) -> bool {
        self.undo.end_cedit(name)
    }

    /// Revert and discard the open compound edit; the recovery path
    /// when a grouped operation failed partway.
    pub fn abort_edit(&mut self) {
        self.undo.abort_cedit(&mut self.store);
        self.rebuild_sections();
    }

    /// Enable or disable undo recording (e.g. while importing).
    pub fn set_undo_enabled(&mut self, enabled: bool) {
        self.undo.set_enabled(enabled);
    }

    // ---- structural operations ------------------------------------

    /// Insert `count` bars before `at_bar` (`at_bar == size` appends).
    /// Items at `at_bar` and later shift forward.
    pub fn insert_bars(&mut self, at_bar: usize, count: usize) -> Result<(), EditError> {
        if count == 0 {
            return Err(PreconditionError::ZeroBarCount.into());
        }
        if at_bar > self.size_in_bars() {
            return Err(PreconditionError::BarOutOfRange {
                bar: at_bar,
                size: self.size_in_bars(),
            }
            .into());
        }

        let ctx = self.begin_action("insertBars");
        let result = self.do_insert_bars(at_bar, count);
        self.finish_action(ctx, result)
    }

    fn do_insert_bars(&mut self, at_bar: usize, count: usize) -> Result<(), EditError> {
        let old_size = self.size_in_bars();
        self.push_edit(Edit::SetSize {
            old_size,
            new_size: old_size + count,
        });

        // Inserting at bar 0 keeps the opening section anchored there
        // (the new bars join its region); everything else shifts.
        let units: Vec<_> = self
            .store
            .items()
            .iter()
            .filter(|item| {
                !(at_bar == 0 && item.kind() == ItemKind::Section && item.position().bar == 0)
            })
            .map(|item| ((item.id(), item.kind(), item.position()), item.position().bar))
            .collect();
        for ((id, kind, from), new_bar) in plan_bar_shift(units, at_bar, count as isize).moves {
            self.push_edit(Edit::MoveItem {
                id,
                kind,
                from,
                to: from.with_bar(new_bar),
            });
        }

        self.rebuild_sections();
        Ok(())
    }

    /// Delete the bars `[from_bar, from_bar + count)`. Items fully
    /// inside the range are removed; later items shift back.
    ///
    /// Deleting the bars that hold the bar-0 section requires either
    /// a section starting right after the deleted range (it becomes
    /// the new opening) or a `replacement` section, which is placed
    /// at bar 0.
    pub fn delete_bars(
        &mut self,
        from_bar: usize,
        count: usize,
        replacement: Option<Section>,
    ) -> Result<(), EditError> {
        let size = self.size_in_bars();
        if count == 0 {
            return Err(PreconditionError::ZeroBarCount.into());
        }
        if from_bar >= size {
            return Err(PreconditionError::BarOutOfRange { bar: from_bar, size }.into());
        }
        if from_bar + count > size {
            return Err(PreconditionError::BarOutOfRange {
                bar: from_bar + count - 1,
                size,
            }
            .into());
        }
        if replacement.is_some() && from_bar != 0 {
            return Err(PreconditionError::ReplacementNotNeeded.into());
        }

        let ctx = self.begin_action("deleteBars");
        let result = self.do_delete_bars(from_bar, count, replacement);
        self.finish_action(ctx, result)
    }

    fn do_delete_bars(
        &mut self,
        from_bar: usize,
        count: usize,
        replacement: Option<Section>,
    ) -> Result<(), EditError> {
        let size = self.size_in_bars();
        let end = from_bar + count;

        let successor_section = self
            .store
            .sections()
            .any(|item| item.position().bar == end);

        // The orphan check comes first: deleting the opening bars is
        // refused outright unless something re-covers bar 0.
        if from_bar == 0 && replacement.is_none() && !successor_section {
            return Err(UnsupportedEdit::WouldOrphanOpening.into());
        }
        if size - count == 0 {
            return Err(UnsupportedEdit::WouldBeEmpty.into());
        }
        if let Some(replacement) = &replacement {
            if successor_section {
                // The shifted successor would collide with the
                // replacement at bar 0
                return Err(UnsupportedEdit::SectionAlreadyAtBar(0).into());
            }
            let survivor_clash = self.store.sections().any(|item| {
                let bar = item.position().bar;
                !(from_bar..end).contains(&bar)
                    && item.data().as_section().map(|s| s.name.as_str())
                        == Some(replacement.name.as_str())
            });
            if survivor_clash {
                return Err(UnsupportedEdit::DuplicateSectionName(replacement.name.clone()).into());
            }
        }

        let doomed: Vec<Item> = self
            .store
            .items_in_range(from_bar..end, None)
            .into_iter()
            .cloned()
            .collect();
        for item in doomed {
            self.push_edit(Edit::RemoveItem { item });
        }

        let units: Vec<_> = self
            .store
            .items()
            .iter()
            .map(|item| ((item.id(), item.kind(), item.position()), item.position().bar))
            .collect();
        for ((id, kind, from), new_bar) in plan_bar_shift(units, end, -(count as isize)).moves {
            self.push_edit(Edit::MoveItem {
                id,
                kind,
                from,
                to: from.with_bar(new_bar),
            });
        }

        if let Some(replacement) = replacement {
            let id = self.store.alloc_id();
            self.push_edit(Edit::InsertItem {
                item: Item::new(id, Position::origin(), ItemData::Section(replacement)),
            });
        }

        self.push_edit(Edit::SetSize {
            old_size: size,
            new_size: size - count,
        });

        self.rebuild_sections();
        Ok(())
    }

    /// Add a section starting at `bar`. Returns its id and the items
    /// whose beat no longer fits the region's new time signature
    /// (reported, not removed).
    pub fn add_section(
        &mut self,
        section: Section,
        bar: usize,
    ) -> Result<(ItemId, Vec<ItemId>), EditError> {
        if bar >= self.size_in_bars() {
            return Err(PreconditionError::BarOutOfRange {
                bar,
                size: self.size_in_bars(),
            }
            .into());
        }

        let ctx = self.begin_action("addSection");
        let result = self.do_add_section(section, bar);
        self.finish_action(ctx, result)
    }

    fn do_add_section(
        &mut self,
        section: Section,
        bar: usize,
    ) -> Result<(ItemId, Vec<ItemId>), EditError> {
        if self.section_name_taken(&section.name, None) {
            return Err(UnsupportedEdit::DuplicateSectionName(section.name).into());
        }
        if self.store.sections().any(|item| item.position().bar == bar) {
            return Err(UnsupportedEdit::SectionAlreadyAtBar(bar).into());
        }

        let id = self.store.alloc_id();
        self.push_edit(Edit::InsertItem {
            item: Item::new(id, Position::bar_start(bar), ItemData::Section(section)),
        });
        self.rebuild_sections();

        let region = self.section_region(id).unwrap_or(bar..bar);
        Ok((id, self.invalid_items_in(region)))
    }

    /// Remove a section; its bars fall to the preceding section.
    /// Returns the items whose beat no longer fits (reported, not
    /// removed). The bar-0 section cannot be removed.
    pub fn remove_section(&mut self, id: ItemId) -> Result<Vec<ItemId>, EditError> {
        self.expect_section(id)?;

        let ctx = self.begin_action("removeSection");
        let result = self.do_remove_section(id);
        self.finish_action(ctx, result)
    }

    fn do_remove_section(&mut self, id: ItemId) -> Result<Vec<ItemId>, EditError> {
        let item = self
            .store
            .get(id)
            .ok_or(PreconditionError::UnknownItem(id))?
            .clone();
        if item.position().bar == 0 {
            return Err(UnsupportedEdit::WouldOrphanOpening.into());
        }

        let affected = self.section_region(id).unwrap_or(0..0);
        self.push_edit(Edit::RemoveItem { item });
        self.rebuild_sections();
        Ok(self.invalid_items_in(affected))
    }

    /// Move a section to a new bar. Other items keep their positions;
    /// the items whose governing time signature changed and whose
    /// beat no longer fits are returned (reported, not removed).
    pub fn move_section(&mut self, id: ItemId, new_bar: usize) -> Result<Vec<ItemId>, EditError> {
        self.expect_section(id)?;
        if new_bar >= self.size_in_bars() {
            return Err(PreconditionError::BarOutOfRange {
                bar: new_bar,
                size: self.size_in_bars(),
            }
            .into());
        }

        let ctx = self.begin_action("moveSection");
        let result = self.do_move_section(id, new_bar);
        self.finish_action(ctx, result)
    }

    fn do_move_section(&mut self, id: ItemId, new_bar: usize) -> Result<Vec<ItemId>, EditError> {
        let item = self
            .store
            .get(id)
            .ok_or(PreconditionError::UnknownItem(id))?;
        let old_bar = item.position().bar;
        let from = item.position();
        if old_bar == new_bar {
            return Ok(Vec::new());
        }
        if old_bar == 0 {
            return Err(UnsupportedEdit::WouldOrphanOpening.into());
        }
        if self
            .store
            .sections()
            .any(|other| other.id() != id && other.position().bar == new_bar)
        {
            return Err(UnsupportedEdit::SectionAlreadyAtBar(new_bar).into());
        }

        self.push_edit(Edit::MoveItem {
            id,
            kind: ItemKind::Section,
            from,
            to: Position::bar_start(new_bar),
        });
        self.rebuild_sections();

        // Both the vacated and the newly covered bars changed owners;
        // re-check everything from the first affected bar on.
        let affected = old_bar.min(new_bar)..self.size_in_bars();
        Ok(self.invalid_items_in(affected))
    }

    /// Rename a section. Names stay unique.
    pub fn set_section_name(&mut self, id: ItemId, name: impl Into<String>) -> Result<(), EditError> {
        let old = self.expect_section(id)?.clone();
        let name = name.into();

        let ctx = self.begin_action("setSectionName");
        let result = (|| {
            if old.name == name {
                return Ok(());
            }
            if self.section_name_taken(&name, Some(id)) {
                return Err(UnsupportedEdit::DuplicateSectionName(name).into());
            }
            let new = Section::new(name, old.time_signature);
            self.push_edit(Edit::ChangeSection { id, old, new });
            Ok(())
        })();
        self.finish_action(ctx, result)
    }

    /// Change a section's time signature. Returns the items in its
    /// region whose beat no longer fits (reported, not removed).
    pub fn set_section_time_signature(
        &mut self,
        id: ItemId,
        time_signature: TimeSignature,
    ) -> Result<Vec<ItemId>, EditError> {
        let old = self.expect_section(id)?.clone();

        let ctx = self.begin_action("setSectionTimeSignature");
        let result = (|| {
            if old.time_signature == time_signature {
                return Ok(Vec::new());
            }
            let new = Section::new(old.name.clone(), time_signature);
            self.push_edit(Edit::ChangeSection { id, old, new });
            let region = self.section_region(id).unwrap_or(0..0);
            Ok(self.invalid_items_in(region))
        })();
        self.finish_action(ctx, result)
    }

    /// Add a non-section item. The governing time signature of the
    /// target bar must accept the beat.
    pub fn add_item(&mut self, data: ItemData, position: Position) -> Result<ItemId, EditError> {
        if data.is_section() {
            return Err(PreconditionError::SectionViaItemApi.into());
        }
        self.check_position(position)?;

        let ctx = self.begin_action("addItem");
        let id = self.store.alloc_id();
        self.push_edit(Edit::InsertItem {
            item: Item::new(id, position, data),
        });
        self.finish_action(ctx, Ok(id))
    }

    /// Remove a non-section item. Returns the removed item.
    pub fn remove_item(&mut self, id: ItemId) -> Result<Item, EditError> {
        let item = self
            .store
            .get(id)
            .ok_or(PreconditionError::UnknownItem(id))?
            .clone();
        if item.kind() == ItemKind::Section {
            return Err(PreconditionError::SectionViaItemApi.into());
        }

        let ctx = self.begin_action("removeItem");
        self.push_edit(Edit::RemoveItem { item: item.clone() });
        self.finish_action(ctx, Ok(item))
    }

    /// Move a non-section item. Crossing a section boundary is fine
    /// as long as the destination time signature accepts the beat.
    pub fn move_item(&mut self, id: ItemId, new_position: Position) -> Result<(), EditError> {
        let item = self
            .store
            .get(id)
            .ok_or(PreconditionError::UnknownItem(id))?;
        if item.kind() == ItemKind::Section {
            return Err(PreconditionError::SectionViaItemApi.into());
        }
        let (kind, from) = (item.kind(), item.position());
        self.check_position(new_position)?;

        let ctx = self.begin_action("moveItem");
        if from != new_position {
            self.push_edit(Edit::MoveItem {
                id,
                kind,
                from,
                to: new_position,
            });
        }
        self.finish_action(ctx, Ok(()))
    }

    /// Grow or shrink the sheet at the tail. Shrinking over
    /// non-section items fails unless `discard` confirms dropping
    /// them; tail sections go silently with their bars.
    pub fn set_size_in_bars(&mut self, new_size: usize, discard: bool) -> Result<(), EditError> {
        let ctx = self.begin_action("setSize");
        let result = self.do_set_size(new_size, discard);
        self.finish_action(ctx, result)
    }

    fn do_set_size(&mut self, new_size: usize, discard: bool) -> Result<(), EditError> {
        let old_size = self.size_in_bars();
        if new_size == 0 {
            return Err(UnsupportedEdit::WouldBeEmpty.into());
        }
        if new_size == old_size {
            return Ok(());
        }

        if new_size < old_size {
            let doomed: Vec<Item> = self
                .store
                .items_in_range(new_size..old_size, None)
                .into_iter()
                .cloned()
                .collect();
            let musical = doomed
                .iter()
                .filter(|item| item.kind() != ItemKind::Section)
                .count();
            if musical > 0 && !discard {
                return Err(UnsupportedEdit::WouldDiscardItems {
                    new_size,
                    item_count: musical,
                }
                .into());
            }
            for item in doomed {
                self.push_edit(Edit::RemoveItem { item });
            }
        }

        self.push_edit(Edit::SetSize { old_size, new_size });
        self.rebuild_sections();
        Ok(())
    }

    // ---- persistence ----------------------------------------------

    /// The canonical item-list form of this sheet.
    pub fn snapshot(&self) -> LeadSheetSnapshot {
        LeadSheetSnapshot {
            size_in_bars: self.size_in_bars(),
            items: self
                .store
                .items()
                .iter()
                .map(|item| ItemSnapshot {
                    position: item.position(),
                    data: item.data().clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a sheet from its canonical form, re-validating every
    /// invariant. Ids are freshly allocated; undo history starts
    /// empty.
    pub fn from_snapshot(snapshot: &LeadSheetSnapshot) -> Result<Self, EditError> {
        if snapshot.size_in_bars == 0 {
            return Err(PreconditionError::ZeroBarCount.into());
        }
        let opening = snapshot.items.iter().any(|item| {
            item.data.is_section() && item.position == Position::origin()
        });
        if !opening {
            return Err(UnsupportedEdit::WouldOrphanOpening.into());
        }

        let mut store = ItemStore::new(snapshot.size_in_bars);
        let mut names: Vec<&str> = Vec::new();
        let mut section_bars: Vec<usize> = Vec::new();
        for item in &snapshot.items {
            if let Some(section) = item.data.as_section() {
                if names.contains(&section.name.as_str()) {
                    return Err(UnsupportedEdit::DuplicateSectionName(section.name.clone()).into());
                }
                if section_bars.contains(&item.position.bar) {
                    return Err(UnsupportedEdit::SectionAlreadyAtBar(item.position.bar).into());
                }
                names.push(&section.name);
                section_bars.push(item.position.bar);
            }
            store.insert(item.data.clone(), item.position)?;
        }

        let sections = SectionIndex::rebuild(&store);
        let sheet = Self {
            store,
            sections,
            bus: EventBus::new(),
            undo: UndoManager::new(),
            next_action_id: 0,
        };
        for item in sheet.store.items() {
            if item.kind() != ItemKind::Section {
                sheet.check_position(item.position())?;
            }
        }
        Ok(sheet)
    }

    // ---- internals ------------------------------------------------

    fn assert_mutable(&self) {
        assert!(
            !self.undo.is_in_progress(),
            "structural mutation during undo/redo replay"
        );
    }

    fn next_action(&mut self) -> u64 {
        let id = self.next_action_id;
        self.next_action_id += 1;
        id
    }

    fn begin_action(&mut self, name: &'static str) -> ActionCtx {
        self.assert_mutable();
        let owns_cedit = !self.undo.is_cedit_open();
        if owns_cedit {
            self.undo.start_cedit(name);
        }
        let mark = self.undo.open_len();
        let id = self.next_action();
        log::debug!("{name}: started (action {id})");
        self.publish_action(ActionEvent::Started {
            action: name.to_string(),
            id,
        });
        ActionCtx {
            name,
            id,
            owns_cedit,
            mark,
        }
    }

    fn finish_action<T>(
        &mut self,
        ctx: ActionCtx,
        result: Result<T, EditError>,
    ) -> Result<T, EditError> {
        if let Err(error) = &result {
            self.undo.rollback_open(ctx.mark, &mut self.store);
            self.rebuild_sections();
            log::warn!("{}: rolled back: {error}", ctx.name);
        }
        if ctx.owns_cedit {
            self.undo.end_cedit(ctx.name);
        }
        self.publish_action(ActionEvent::Completed {
            action: ctx.name.to_string(),
            id: ctx.id,
            rolled_back: result.is_err(),
        });
        result
    }

    fn publish_action(&mut self, event: ActionEvent) {
        self.bus.publish(&LeadSheetEvent::Action(event));
    }

    /// Apply, record, and announce one sub-edit.
    fn push_edit(&mut self, edit: Edit) {
        edit.apply(&mut self.store);
        let event = Self::change_event(&edit, false);
        self.undo.record(edit);
        self.bus.publish(&LeadSheetEvent::Change(event));
    }

    fn rebuild_sections(&mut self) {
        self.sections = SectionIndex::rebuild(&self.store);
    }

    /// The notification for a sub-edit; `reverted` flips it into the
    /// undo direction.
    fn change_event(edit: &Edit, reverted: bool) -> ChangeEvent {
        match edit {
            Edit::InsertItem { item } | Edit::RemoveItem { item } => {
                let added = matches!(edit, Edit::InsertItem { .. }) != reverted;
                if added {
                    ChangeEvent::ItemAdded {
                        id: item.id(),
                        kind: item.kind(),
                        position: item.position(),
                    }
                } else {
                    ChangeEvent::ItemRemoved {
                        id: item.id(),
                        kind: item.kind(),
                        position: item.position(),
                    }
                }
            }
            Edit::MoveItem { id, kind, from, to } => {
                let (from, to) = if reverted { (*to, *from) } else { (*from, *to) };
                if *kind == ItemKind::Section {
                    ChangeEvent::SectionMoved {
                        id: *id,
                        from_bar: from.bar,
                        to_bar: to.bar,
                    }
                } else {
                    ChangeEvent::ItemMoved { id: *id, from, to }
                }
            }
            Edit::ChangeSection { id, old, new } => {
                let (old, new) = if reverted { (new, old) } else { (old, new) };
                ChangeEvent::SectionChanged {
                    id: *id,
                    old: old.clone(),
                    new: new.clone(),
                }
            }
            Edit::SetSize { old_size, new_size } => {
                let (old_size, new_size) = if reverted {
                    (*new_size, *old_size)
                } else {
                    (*old_size, *new_size)
                };
                ChangeEvent::SizeResized { old_size, new_size }
            }
        }
    }

    fn expect_section(&self, id: ItemId) -> Result<&Section, EditError> {
        let item = self
            .store
            .get(id)
            .ok_or(PreconditionError::UnknownItem(id))?;
        item.data()
            .as_section()
            .ok_or_else(|| PreconditionError::NotASection(id).into())
    }

    fn section_name_taken(&self, name: &str, ignoring: Option<ItemId>) -> bool {
        self.store.sections().any(|item| {
            Some(item.id()) != ignoring
                && item.data().as_section().map(|s| s.name.as_str()) == Some(name)
        })
    }

    fn check_position(&self, position: Position) -> Result<(), EditError> {
        let size = self.size_in_bars();
        if position.bar >= size {
            return Err(PreconditionError::BarOutOfRange {
                bar: position.bar,
                size,
            }
            .into());
        }
        let ts = self
            .time_signature_at(position.bar)
            .unwrap_or_else(|| unreachable!("bar {} has no governing section", position.bar));
        if !ts.accepts_beat(position.beat) {
            return Err(PreconditionError::BeatNotInTimeSignature {
                position,
                beat: position.beat,
                time_signature: ts,
            }
            .into());
        }
        Ok(())
    }

    /// Items in `bars` whose beat is invalid under their governing
    /// time signature.
    fn invalid_items_in(&self, bars: Range<usize>) -> Vec<ItemId> {
        self.store
            .items_in_range(bars, None)
            .into_iter()
            .filter(|item| item.kind() != ItemKind::Section)
            .filter(|item| {
                self.time_signature_at(item.position().bar)
                    .map_or(true, |ts| !ts.accepts_beat(item.position().beat))
            })
            .map(|item| item.id())
            .collect()
    }
}
