//! The song structure arrangement model
//!
//! A `SongStructure` is the sibling of the lead sheet: an ordered run
//! of parts, each binding a contiguous bar range to a rhythm and a
//! parent section. Parts tile `[0, size_in_bars)` with no gaps or
//! overlaps, mirroring the section-region invariant, and share the
//! lead sheet's edit vocabulary: reversible sub-edits inside named
//! compound edits, bracketed action events, rollback on failure.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{EditError, PreconditionError, UnsupportedEdit};
use crate::events::{ActionEvent, EventBus, PartChangeEvent, SongStructureEvent, Subscription};
use crate::models::{Section, TimeSignature};
use crate::structure::plan_bar_shift;
use crate::undo::{Reversible, UndoError, UndoManager};

/// Stable part identity, allocated monotonically.
pub type PartId = u64;

/// A rhythm binding for a part. Stands in for the external rhythm
/// collaborator; the model only needs its name and time signature.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Rhythm {
    pub name: String,
    pub time_signature: TimeSignature,
}

impl Rhythm {
    pub fn new(name: impl Into<String>, time_signature: TimeSignature) -> Self {
        Self {
            name: name.into(),
            time_signature,
        }
    }
}

/// One arrangement part: a bar range bound to a rhythm and a parent
/// section. The rhythm's time signature always matches the parent
/// section's.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SongPart {
    id: PartId,
    start_bar: usize,
    nb_bars: usize,
    rhythm: Rhythm,
    parent_section: Section,
}

impl SongPart {
    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn start_bar(&self) -> usize {
        self.start_bar
    }

    pub fn nb_bars(&self) -> usize {
        self.nb_bars
    }

    /// The half-open bar range this part occupies.
    pub fn bars(&self) -> Range<usize> {
        self.start_bar..self.start_bar + self.nb_bars
    }

    pub fn rhythm(&self) -> &Rhythm {
        &self.rhythm
    }

    pub fn parent_section(&self) -> &Section {
        &self.parent_section
    }

    /// Parts are named after their parent section.
    pub fn name(&self) -> &str {
        &self.parent_section.name
    }
}

/// Description of a part to add or substitute.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPart {
    pub start_bar: usize,
    pub nb_bars: usize,
    pub rhythm: Rhythm,
    pub parent_section: Section,
}

/// The part collection the reversible edits replay against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartList {
    /// Sorted by `(start_bar, id)`
    parts: Vec<SongPart>,
    next_id: PartId,
}

impl PartList {
    pub fn parts(&self) -> &[SongPart] {
        &self.parts
    }

    pub fn get(&self, id: PartId) -> Option<&SongPart> {
        self.parts.iter().find(|part| part.id() == id)
    }

    /// Total arranged length; parts are contiguous from bar 0.
    pub fn size_in_bars(&self) -> usize {
        self.parts.last().map(|part| part.bars().end).unwrap_or(0)
    }

    pub fn part_at(&self, bar: usize) -> Option<&SongPart> {
        self.parts.iter().find(|part| part.bars().contains(&bar))
    }

    /// True if the parts tile `[0, size_in_bars)` without gaps or
    /// overlaps.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 0;
        for part in &self.parts {
            if part.start_bar != expected || part.nb_bars == 0 {
                return false;
            }
            expected = part.bars().end;
        }
        true
    }

    fn alloc_id(&mut self) -> PartId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_exact(&mut self, part: SongPart) {
        debug_assert!(self.get(part.id()).is_none(), "duplicate part id {}", part.id());
        if part.id() >= self.next_id {
            self.next_id = part.id() + 1;
        }
        self.parts.push(part);
        self.resort();
    }

    fn remove_unchecked(&mut self, id: PartId) -> Option<SongPart> {
        let index = self.parts.iter().position(|part| part.id() == id)?;
        Some(self.parts.remove(index))
    }

    fn set_start_bar_unchecked(&mut self, id: PartId, start_bar: usize) {
        if let Some(part) = self.parts.iter_mut().find(|part| part.id() == id) {
            part.start_bar = start_bar;
        }
        self.resort();
    }

    fn set_nb_bars_unchecked(&mut self, id: PartId, nb_bars: usize) {
        if let Some(part) = self.parts.iter_mut().find(|part| part.id() == id) {
            part.nb_bars = nb_bars;
        }
    }

    fn resort(&mut self) {
        self.parts
            .sort_by(|a, b| a.start_bar.cmp(&b.start_bar).then(a.id.cmp(&b.id)));
    }
}

/// Reversible sub-edit of the part list.
#[derive(Clone, Debug, PartialEq)]
pub enum PartEdit {
    InsertPart {
        part: SongPart,
    },
    RemovePart {
        part: SongPart,
    },
    MovePart {
        id: PartId,
        from_bar: usize,
        to_bar: usize,
    },
    ResizePart {
        id: PartId,
        old_nb_bars: usize,
        new_nb_bars: usize,
    },
}

impl Reversible for PartEdit {
    type Target = PartList;

    fn apply(&self, list: &mut PartList) {
        match self {
            PartEdit::InsertPart { part } => list.insert_exact(part.clone()),
            PartEdit::RemovePart { part } => {
                list.remove_unchecked(part.id());
            }
            PartEdit::MovePart { id, to_bar, .. } => list.set_start_bar_unchecked(*id, *to_bar),
            PartEdit::ResizePart { id, new_nb_bars, .. } => {
                list.set_nb_bars_unchecked(*id, *new_nb_bars)
            }
        }
    }

    fn revert(&self, list: &mut PartList) {
        match self {
            PartEdit::InsertPart { part } => {
                list.remove_unchecked(part.id());
            }
            PartEdit::RemovePart { part } => list.insert_exact(part.clone()),
            PartEdit::MovePart { id, from_bar, .. } => list.set_start_bar_unchecked(*id, *from_bar),
            PartEdit::ResizePart { id, old_nb_bars, .. } => {
                list.set_nb_bars_unchecked(*id, *old_nb_bars)
            }
        }
    }
}

/// One part of the canonical persistence form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PartSnapshot {
    pub start_bar: usize,
    pub nb_bars: usize,
    pub rhythm: Rhythm,
    pub parent_section: Section,
}

/// Canonical persistence form of a song structure.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SongStructureSnapshot {
    pub parts: Vec<PartSnapshot>,
}

struct ActionCtx {
    name: &'static str,
    id: u64,
    owns_cedit: bool,
    mark: usize,
}

/// The editable arrangement.
#[derive(Debug)]
pub struct SongStructure {
    list: PartList,
    bus: EventBus<SongStructureEvent>,
    undo: UndoManager<PartEdit>,
    next_action_id: u64,
}

impl SongStructure {
    /// Create an empty arrangement.
    pub fn new() -> Self {
        Self {
            list: PartList::default(),
            bus: EventBus::new(),
            undo: UndoManager::new(),
            next_action_id: 0,
        }
    }

    // ---- queries --------------------------------------------------

    /// Parts in bar order.
    pub fn parts(&self) -> &[SongPart] {
        self.list.parts()
    }

    pub fn part(&self, id: PartId) -> Option<&SongPart> {
        self.list.get(id)
    }

    pub fn part_at(&self, bar: usize) -> Option<&SongPart> {
        self.list.part_at(bar)
    }

    pub fn size_in_bars(&self) -> usize {
        self.list.size_in_bars()
    }

    // ---- events ---------------------------------------------------

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&SongStructureEvent) + 'static,
    ) -> Subscription {
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

    /// Undo the newest action, replaying inverse notifications.
    pub fn undo(&mut self) -> Result<String, UndoError> {
        let ce = self.undo.undo(&mut self.list)?;
        let id = self.next_action();
        self.publish_action(ActionEvent::Started {
            action: ce.name().to_string(),
            id,
        });
        for edit in ce.edits().iter().rev() {
            let event = Self::change_event(edit, true);
            self.bus.publish(&SongStructureEvent::Change(event));
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
        let ce = self.undo.redo(&mut self.list)?;
        let id = self.next_action();
        self.publish_action(ActionEvent::Started {
            action: ce.name().to_string(),
            id,
        });
        for edit in ce.edits() {
            let event = Self::change_event(edit, false);
            self.bus.publish(&SongStructureEvent::Change(event));
        }
        self.publish_action(ActionEvent::Completed {
            action: ce.name().to_string(),
            id,
            rolled_back: false,
        });
        Ok(ce.name().to_string())
    }

    /// Open a caller-level compound edit; see `LeadSheet::start_edit`.
    pub fn start_edit(&mut self, name: impl Into<String>) {
        self.assert_mutable();
        self.undo.start_cedit(name);
    }

    pub fn end_edit(&mut self, name: &str) -> bool {
        self.undo.end_cedit(name)
    }

    pub fn abort_edit(&mut self) {
        self.undo.abort_cedit(&mut self.list);
    }

    pub fn set_undo_enabled(&mut self, enabled: bool) {
        self.undo.set_enabled(enabled);
    }

    // ---- structural operations ------------------------------------

    /// Add parts, each at a part boundary; later parts shift to make
    /// room. Returns the new ids in argument order.
    pub fn add_parts(&mut self, new_parts: Vec<NewPart>) -> Result<Vec<PartId>, EditError> {
        let ctx = self.begin_action("addParts");
        let result = (|| {
            let mut ids = Vec::with_capacity(new_parts.len());
            for new_part in new_parts {
                ids.push(self.do_add_part(new_part)?);
            }
            Ok(ids)
        })();
        self.finish_action(ctx, result)
    }

    /// Remove parts; later parts close the gap.
    pub fn remove_parts(&mut self, ids: &[PartId]) -> Result<(), EditError> {
        for &id in ids {
            if self.list.get(id).is_none() {
                return Err(PreconditionError::UnknownPart(id).into());
            }
        }

        let ctx = self.begin_action("removeParts");
        let result = (|| {
            // Highest start bar first, so earlier removals do not
            // disturb the positions of the rest
            let mut ordered: Vec<PartId> = ids.to_vec();
            ordered.sort_by_key(|&id| {
                std::cmp::Reverse(self.list.get(id).map(|p| p.start_bar()).unwrap_or(0))
            });
            for id in ordered {
                self.do_remove_part(id)?;
            }
            Ok(())
        })();
        self.finish_action(ctx, result)
    }

    /// Resize parts; everything after each resized part shifts by the
    /// size delta, exactly as bar insertion/deletion does on the lead
    /// sheet.
    pub fn resize_parts(&mut self, changes: &[(PartId, usize)]) -> Result<(), EditError> {
        for &(id, _) in changes {
            if self.list.get(id).is_none() {
                return Err(PreconditionError::UnknownPart(id).into());
            }
        }

        let ctx = self.begin_action("resizeParts");
        let result = (|| {
            for &(id, new_nb_bars) in changes {
                self.do_resize_part(id, new_nb_bars)?;
            }
            Ok(())
        })();
        self.finish_action(ctx, result)
    }

    /// Substitute parts in place — the composite primitive behind
    /// "change the rhythm of this range". Remove-then-add inside one
    /// compound edit, so a single undo restores both the old rhythm
    /// bindings and the old bar geometry.
    pub fn replace_parts(
        &mut self,
        replacements: Vec<(PartId, NewPart)>,
    ) -> Result<Vec<PartId>, EditError> {
        for (id, _) in &replacements {
            if self.list.get(*id).is_none() {
                return Err(PreconditionError::UnknownPart(*id).into());
            }
        }

        let ctx = self.begin_action("replaceParts");
        let result = (|| {
            let mut ids = Vec::with_capacity(replacements.len());
            for (old_id, new_part) in replacements {
                let old = self
                    .list
                    .get(old_id)
                    .ok_or(PreconditionError::UnknownPart(old_id))?
                    .clone();
                if new_part.start_bar != old.start_bar() {
                    return Err(UnsupportedEdit::NonContiguousPart {
                        start_bar: new_part.start_bar,
                    }
                    .into());
                }
                self.do_remove_part(old_id)?;
                ids.push(self.do_add_part(new_part)?);
            }
            Ok(ids)
        })();
        self.finish_action(ctx, result)
    }

    fn do_add_part(&mut self, new_part: NewPart) -> Result<PartId, EditError> {
        if new_part.nb_bars == 0 {
            return Err(UnsupportedEdit::ZeroLengthPart.into());
        }
        if new_part.rhythm.time_signature != new_part.parent_section.time_signature {
            return Err(UnsupportedEdit::RhythmSectionMismatch {
                rhythm: new_part.rhythm.name.clone(),
                rhythm_ts: new_part.rhythm.time_signature,
                section: new_part.parent_section.name.clone(),
                section_ts: new_part.parent_section.time_signature,
            }
            .into());
        }
        let boundary = new_part.start_bar == self.list.size_in_bars()
            || self
                .list
                .parts()
                .iter()
                .any(|part| part.start_bar() == new_part.start_bar);
        if !boundary {
            return Err(UnsupportedEdit::NonContiguousPart {
                start_bar: new_part.start_bar,
            }
            .into());
        }

        let units: Vec<_> = self
            .list
            .parts()
            .iter()
            .map(|part| (part.id(), part.start_bar()))
            .collect();
        for (id, to_bar) in
            plan_bar_shift(units, new_part.start_bar, new_part.nb_bars as isize).moves
        {
            let from_bar = self
                .list
                .get(id)
                .map(|p| p.start_bar())
                .unwrap_or(to_bar);
            self.push_edit(PartEdit::MovePart { id, from_bar, to_bar });
        }

        let id = self.list.alloc_id();
        self.push_edit(PartEdit::InsertPart {
            part: SongPart {
                id,
                start_bar: new_part.start_bar,
                nb_bars: new_part.nb_bars,
                rhythm: new_part.rhythm,
                parent_section: new_part.parent_section,
            },
        });
        debug_assert!(self.list.is_contiguous());
        Ok(id)
    }

    fn do_remove_part(&mut self, id: PartId) -> Result<(), EditError> {
        let part = self
            .list
            .get(id)
            .ok_or(PreconditionError::UnknownPart(id))?
            .clone();
        self.push_edit(PartEdit::RemovePart { part: part.clone() });

        let units: Vec<_> = self
            .list
            .parts()
            .iter()
            .map(|p| (p.id(), p.start_bar()))
            .collect();
        for (other, to_bar) in
            plan_bar_shift(units, part.bars().end, -(part.nb_bars() as isize)).moves
        {
            let from_bar = self
                .list
                .get(other)
                .map(|p| p.start_bar())
                .unwrap_or(to_bar);
            self.push_edit(PartEdit::MovePart {
                id: other,
                from_bar,
                to_bar,
            });
        }
        debug_assert!(self.list.is_contiguous());
        Ok(())
    }

    fn do_resize_part(&mut self, id: PartId, new_nb_bars: usize) -> Result<(), EditError> {
        if new_nb_bars == 0 {
            return Err(UnsupportedEdit::ZeroLengthPart.into());
        }
        let part = self
            .list
            .get(id)
            .ok_or(PreconditionError::UnknownPart(id))?;
        let (start_bar, old_nb_bars) = (part.start_bar(), part.nb_bars());
        if new_nb_bars == old_nb_bars {
            return Ok(());
        }

        self.push_edit(PartEdit::ResizePart {
            id,
            old_nb_bars,
            new_nb_bars,
        });

        let delta = new_nb_bars as isize - old_nb_bars as isize;
        let units: Vec<_> = self
            .list
            .parts()
            .iter()
            .filter(|p| p.id() != id)
            .map(|p| (p.id(), p.start_bar()))
            .collect();
        for (other, to_bar) in plan_bar_shift(units, start_bar + 1, delta).moves {
            let from_bar = self
                .list
                .get(other)
                .map(|p| p.start_bar())
                .unwrap_or(to_bar);
            self.push_edit(PartEdit::MovePart {
                id: other,
                from_bar,
                to_bar,
            });
        }
        debug_assert!(self.list.is_contiguous());
        Ok(())
    }

    // ---- persistence ----------------------------------------------

    /// The canonical part-list form of this arrangement.
    pub fn snapshot(&self) -> SongStructureSnapshot {
        SongStructureSnapshot {
            parts: self
                .list
                .parts()
                .iter()
                .map(|part| PartSnapshot {
                    start_bar: part.start_bar(),
                    nb_bars: part.nb_bars(),
                    rhythm: part.rhythm().clone(),
                    parent_section: part.parent_section().clone(),
                })
                .collect(),
        }
    }

    /// Rebuild an arrangement from its canonical form, re-validating
    /// contiguity and time-signature consistency.
    pub fn from_snapshot(snapshot: &SongStructureSnapshot) -> Result<Self, EditError> {
        let mut structure = Self::new();
        structure.set_undo_enabled(false);
        let parts = snapshot
            .parts
            .iter()
            .map(|part| NewPart {
                start_bar: part.start_bar,
                nb_bars: part.nb_bars,
                rhythm: part.rhythm.clone(),
                parent_section: part.parent_section.clone(),
            })
            .collect();
        structure.add_parts(parts)?;
        structure.set_undo_enabled(true);
        Ok(structure)
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
            self.undo.rollback_open(ctx.mark, &mut self.list);
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
        self.bus.publish(&SongStructureEvent::Action(event));
    }

    fn push_edit(&mut self, edit: PartEdit) {
        edit.apply(&mut self.list);
        let event = Self::change_event(&edit, false);
        self.undo.record(edit);
        self.bus.publish(&SongStructureEvent::Change(event));
    }

    fn change_event(edit: &PartEdit, reverted: bool) -> PartChangeEvent {
        match edit {
            PartEdit::InsertPart { part } | PartEdit::RemovePart { part } => {
                let added = matches!(edit, PartEdit::InsertPart { .. }) != reverted;
                if added {
                    PartChangeEvent::PartAdded {
                        id: part.id(),
                        start_bar: part.start_bar(),
                        nb_bars: part.nb_bars(),
                    }
                } else {
                    PartChangeEvent::PartRemoved {
                        id: part.id(),
                        start_bar: part.start_bar(),
                        nb_bars: part.nb_bars(),
                    }
                }
            }
            PartEdit::MovePart { id, from_bar, to_bar } => {
                let (from_bar, to_bar) = if reverted {
                    (*to_bar, *from_bar)
                } else {
                    (*from_bar, *to_bar)
                };
                PartChangeEvent::PartMoved {
                    id: *id,
                    from_bar,
                    to_bar,
                }
            }
            PartEdit::ResizePart {
                id,
                old_nb_bars,
                new_nb_bars,
            } => {
                let (old_nb_bars, new_nb_bars) = if reverted {
                    (*new_nb_bars, *old_nb_bars)
                } else {
                    (*old_nb_bars, *new_nb_bars)
                };
                PartChangeEvent::PartResized {
                    id: *id,
                    old_nb_bars,
                    new_nb_bars,
                }
            }
        }
    }
}

impl Default for SongStructure {
    fn default() -> Self {
        Self::new()
    }
}
