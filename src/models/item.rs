//! Positioned items
//!
//! Everything a lead sheet contains is an `Item`: a stable identity, a
//! `Position`, and one of a closed set of payload variants. Range
//! queries match exhaustively on the variant, so adding a new item
//! flavor is a compile-visible change.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::chord::ChordSymbol;
use super::position::Position;
use super::time_signature::TimeSignature;

/// Stable item identity, allocated monotonically by the owning store.
///
/// Ids survive moves, so "insertion order" tie-breaking in range
/// queries is simply id order.
pub type ItemId = u64;

/// A named region of bars with its own time signature.
///
/// Section items are the sole source of truth for which time signature
/// governs which bars. They always sit on a bar start, and exactly one
/// of them sits at bar 0.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Section {
    /// Section name, unique within a document
    pub name: String,

    /// Time signature governing the section's bars
    pub time_signature: TimeSignature,
}

impl Section {
    pub fn new(name: impl Into<String>, time_signature: TimeSignature) -> Self {
        Self {
            name: name.into(),
            time_signature,
        }
    }
}

/// Free-text annotation payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub text: String,
}

impl Annotation {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Closed sum of item payloads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ItemData {
    ChordSymbol(ChordSymbol),
    Section(Section),
    Annotation(Annotation),
}

/// Field-less discriminant of `ItemData`, used for type-filtered
/// queries.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    ChordSymbol,
    Section,
    Annotation,
}

impl ItemData {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemData::ChordSymbol(_) => ItemKind::ChordSymbol,
            ItemData::Section(_) => ItemKind::Section,
            ItemData::Annotation(_) => ItemKind::Annotation,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, ItemData::Section(_))
    }

    pub fn as_section(&self) -> Option<&Section> {
        match self {
            ItemData::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_chord_symbol(&self) -> Option<&ChordSymbol> {
        match self {
            ItemData::ChordSymbol(chord) => Some(chord),
            _ => None,
        }
    }
}

/// A positioned item owned by an `ItemStore`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    id: ItemId,
    position: Position,
    data: ItemData,
}

impl Item {
    pub(crate) fn new(id: ItemId, position: Position, data: ItemData) -> Self {
        Self { id, position, data }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn data(&self) -> &ItemData {
        &self.data
    }

    pub fn kind(&self) -> ItemKind {
        self.data.kind()
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn set_data(&mut self, data: ItemData) {
        self.data = data;
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            ItemData::ChordSymbol(chord) => write!(f, "{} {}", self.position, chord),
            ItemData::Section(section) => {
                write!(f, "{} [{} {}]", self.position, section.name, section.time_signature)
            }
            ItemData::Annotation(note) => write!(f, "{} ({})", self.position, note.text),
        }
    }
}
