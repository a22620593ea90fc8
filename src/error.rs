//! Error types for structural edits
//!
//! Defines the error hierarchy for edit failures, split between
//! precondition violations (bad arguments, rejected before any
//! mutation) and unsupported edits (the operation itself would break a
//! structural invariant; the model rolls back before returning).

use num_rational::Rational32;
use thiserror::Error;

use crate::models::{ItemId, Position, TimeSignature};
use crate::song_structure::PartId;

/// Caller-side argument errors, rejected before any mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("bar {bar} is out of range for a document of {size} bars")]
    BarOutOfRange { bar: usize, size: usize },

    #[error("beat {beat} of position {position} does not fit a {time_signature} bar")]
    BeatNotInTimeSignature {
        position: Position,
        beat: Rational32,
        time_signature: TimeSignature,
    },

    #[error("no item with id {0}")]
    UnknownItem(ItemId),

    #[error("no song part with id {0}")]
    UnknownPart(PartId),

    #[error("item {0} is not a section")]
    NotASection(ItemId),

    #[error("sections must sit on a bar start, got {0}")]
    SectionOffBarStart(Position),

    #[error("sections are managed through the section operations, not the item operations")]
    SectionViaItemApi,

    #[error("bar count must be at least 1")]
    ZeroBarCount,

    #[error("a replacement section only applies when the deletion uncovers bar 0")]
    ReplacementNotNeeded,
}

/// Structural-invariant violations: the requested edit is well-formed
/// but cannot be honored. Any partial mutation is rolled back before
/// the error is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnsupportedEdit {
    #[error("the edit would leave bar 0 without a governing section")]
    WouldOrphanOpening,

    #[error("a document must keep at least one bar")]
    WouldBeEmpty,

    #[error("a section named {0:?} already exists")]
    DuplicateSectionName(String),

    #[error("a section already starts at bar {0}")]
    SectionAlreadyAtBar(usize),

    #[error("shrinking to {new_size} bars would discard {item_count} item(s)")]
    WouldDiscardItems { new_size: usize, item_count: usize },

    #[error("song parts must be contiguous; bar {start_bar} is not a part boundary")]
    NonContiguousPart { start_bar: usize },

    #[error(
        "rhythm {rhythm:?} is in {rhythm_ts} but its parent section {section:?} is in {section_ts}"
    )]
    RhythmSectionMismatch {
        rhythm: String,
        rhythm_ts: TimeSignature,
        section: String,
        section_ts: TimeSignature,
    },

    #[error("song parts must span at least 1 bar")]
    ZeroLengthPart,
}

/// Top-level edit error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedEdit),
}

impl EditError {
    /// True for caller-side argument errors (nothing was mutated).
    pub fn is_precondition(&self) -> bool {
        matches!(self, EditError::Precondition(_))
    }

    /// True for structural-invariant failures (rolled back).
    pub fn is_unsupported(&self) -> bool {
        matches!(self, EditError::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let precondition: EditError = PreconditionError::ZeroBarCount.into();
        assert!(precondition.is_precondition());
        assert!(!precondition.is_unsupported());

        let unsupported: EditError = UnsupportedEdit::WouldOrphanOpening.into();
        assert!(unsupported.is_unsupported());
    }

    #[test]
    fn test_messages_name_the_inputs() {
        let err = EditError::from(PreconditionError::BarOutOfRange { bar: 12, size: 8 });
        assert_eq!(
            err.to_string(),
            "bar 12 is out of range for a document of 8 bars"
        );

        let err = EditError::from(UnsupportedEdit::DuplicateSectionName("Chorus".into()));
        assert!(err.to_string().contains("Chorus"));
    }
}
