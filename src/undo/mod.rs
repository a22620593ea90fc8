//! Compound-edit undo/redo
//!
//! The undo manager records low-level reversible edits grouped into
//! named compound edits, so a whole structural operation undoes and
//! redoes as one unit. Models instantiate it with their own edit type.

use std::fmt;

use thiserror::Error;

/// A reversible low-level edit.
///
/// `apply` and `revert` are mechanical: they replay a mutation that
/// was validated when first recorded, so they are infallible. Any
/// validation belongs to the operation that records the edit.
pub trait Reversible: Clone {
    type Target;

    /// Re-apply this edit to the target (redo direction).
    fn apply(&self, target: &mut Self::Target);

    /// Reverse this edit on the target (undo direction).
    fn revert(&self, target: &mut Self::Target);
}

/// A named, ordered group of edits undone/redone atomically.
#[derive(Clone, Debug, PartialEq)]
pub struct CompoundEdit<E> {
    name: String,
    edits: Vec<E>,
}

impl<E> CompoundEdit<E> {
    fn new(name: String) -> Self {
        Self {
            name,
            edits: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edits(&self) -> &[E] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }
}

/// Errors from undo/redo requests. These are recoverable caller
/// conditions, unlike the contract violations below, which panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndoError {
    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("compound edit {0:?} is still open")]
    OpenCompoundEdit(String),
}

/// Default bound on the number of remembered compound edits.
const DEFAULT_DEPTH: usize = 100;

/// Manages compound-edit history for one model.
///
/// State machine per edit: idle → open (via `start_cedit`) → idle
/// (via `end_cedit`). The pairing is the caller's contract; breaking
/// it is a programming error, not a runtime condition:
///
/// - `start_cedit` with an edit already open panics (no nesting),
/// - `end_cedit` with a mismatched name panics,
/// - disabling while an undo/redo replay is in progress panics,
/// - disabling with an open compound edit panics.
///
/// While disabled, `start_cedit`/`record`/`end_cedit` become no-ops
/// and nothing reaches the history.
pub struct UndoManager<E: Reversible> {
    /// Committed compound edits; `done[..cursor]` is undoable,
    /// `done[cursor..]` redoable.
    done: Vec<CompoundEdit<E>>,
    cursor: usize,
    open: Option<CompoundEdit<E>>,
    in_progress: bool,
    enabled: bool,
    max_depth: usize,
}

impl<E: Reversible> UndoManager<E> {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_DEPTH)
    }

    /// Create a manager remembering at most `max_depth` compound
    /// edits; the oldest are trimmed first.
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            done: Vec::new(),
            cursor: 0,
            open: None,
            in_progress: false,
            enabled: true,
            max_depth,
        }
    }

    /// Open a new compound edit. Panics if one is already open.
    pub fn start_cedit(&mut self, name: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let name = name.into();
        if let Some(open) = &self.open {
            panic!(
                "start_cedit({:?}) while compound edit {:?} is still open",
                name,
                open.name()
            );
        }
        self.open = Some(CompoundEdit::new(name));
    }

    /// True if a compound edit is currently open.
    pub fn is_cedit_open(&self) -> bool {
        self.open.is_some()
    }

    /// Number of edits recorded in the open compound edit; used as a
    /// rollback mark by operations joining a caller-opened edit.
    pub fn open_len(&self) -> usize {
        self.open.as_ref().map_or(0, |ce| ce.len())
    }

    /// Record an edit into the open compound edit.
    ///
    /// The edit must already be applied to the target. Panics if no
    /// compound edit is open (and the manager is enabled).
    pub fn record(&mut self, edit: E) {
        if !self.enabled {
            return;
        }
        match &mut self.open {
            Some(ce) => ce.edits.push(edit),
            None => panic!("record() without an open compound edit"),
        }
    }

    /// Close the open compound edit.
    ///
    /// Returns false if the edit was empty — it is then discarded so
    /// the history never accumulates no-op entries, and callers can
    /// skip enabling undo UI. Panics if `name` does not match the
    /// open edit.
    pub fn end_cedit(&mut self, name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let ce = match self.open.take() {
            Some(ce) => ce,
            None => panic!("end_cedit({name:?}) without an open compound edit"),
        };
        if ce.name() != name {
            panic!(
                "end_cedit({:?}) does not match open compound edit {:?}",
                name,
                ce.name()
            );
        }
        if ce.is_empty() {
            return false;
        }

        // A new edit invalidates the redo branch
        self.done.truncate(self.cursor);
        self.done.push(ce);
        self.cursor = self.done.len();

        if self.done.len() > self.max_depth {
            self.done.remove(0);
            self.cursor = self.cursor.saturating_sub(1);
        }
        true
    }

    /// Revert and drop the edits recorded past `mark` in the open
    /// compound edit — the failure-recovery path for an operation
    /// that went bad partway through. The document ends up exactly as
    /// it was at `mark`, and the dropped edits can never be redone.
    pub fn rollback_open(&mut self, mark: usize, target: &mut E::Target) {
        let Some(ce) = &mut self.open else { return };
        while ce.edits.len() > mark {
            let edit = ce
                .edits
                .pop()
                .unwrap_or_else(|| unreachable!("len checked above"));
            edit.revert(target);
        }
    }

    /// Revert every edit of the open compound edit and discard it.
    pub fn abort_cedit(&mut self, target: &mut E::Target) {
        self.rollback_open(0, target);
        self.open = None;
    }

    /// Undo the newest committed compound edit, reverting its edits
    /// in reverse order. Returns a clone of the replayed edit so the
    /// caller can publish inverse notifications.
    pub fn undo(&mut self, target: &mut E::Target) -> Result<CompoundEdit<E>, UndoError> {
        if let Some(open) = &self.open {
            return Err(UndoError::OpenCompoundEdit(open.name().to_string()));
        }
        if self.cursor == 0 {
            return Err(UndoError::NothingToUndo);
        }

        self.in_progress = true;
        self.cursor -= 1;
        let ce = self.done[self.cursor].clone();
        for edit in ce.edits().iter().rev() {
            edit.revert(target);
        }
        self.in_progress = false;
        Ok(ce)
    }

    /// Redo the next undone compound edit, re-applying its edits in
    /// order.
    pub fn redo(&mut self, target: &mut E::Target) -> Result<CompoundEdit<E>, UndoError> {
        if let Some(open) = &self.open {
            return Err(UndoError::OpenCompoundEdit(open.name().to_string()));
        }
        if self.cursor >= self.done.len() {
            return Err(UndoError::NothingToRedo);
        }

        self.in_progress = true;
        let ce = self.done[self.cursor].clone();
        for edit in ce.edits() {
            edit.apply(target);
        }
        self.cursor += 1;
        self.in_progress = false;
        Ok(ce)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.done.len()
    }

    /// True while an undo/redo replay is running. Advisory reentrancy
    /// guard: models refuse structural mutation while it is set.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Enable or disable recording. Disabling mid-replay or with an
    /// open compound edit panics.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            if self.in_progress {
                panic!("cannot disable the undo manager during undo/redo");
            }
            if let Some(open) = &self.open {
                panic!(
                    "cannot disable the undo manager while compound edit {:?} is open",
                    open.name()
                );
            }
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.done.clear();
        self.cursor = 0;
        self.open = None;
    }

    /// Number of available undo steps.
    pub fn undo_count(&self) -> usize {
        self.cursor
    }

    /// Number of available redo steps.
    pub fn redo_count(&self) -> usize {
        self.done.len() - self.cursor
    }
}

impl<E: Reversible> Default for UndoManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Reversible + fmt::Debug> fmt::Debug for UndoManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoManager")
            .field("done", &self.done.len())
            .field("cursor", &self.cursor)
            .field("open", &self.open.as_ref().map(|ce| ce.name()))
            .field("in_progress", &self.in_progress)
            .field("enabled", &self.enabled)
            .finish()
    }
}
