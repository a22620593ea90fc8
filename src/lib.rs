//! Chord Lead Sheet Document Model
//!
//! This crate implements the editable musical document core: a
//! position-indexed item store partitioned into sections, the sibling
//! song-structure arrangement model, a compound-edit undo manager,
//! the change-event protocol that keeps dependent views consistent,
//! and the grid quantizer for snapping user input.

pub mod error;
pub mod events;
pub mod leadsheet;
pub mod models;
pub mod quantize;
pub mod song_structure;
pub mod store;
pub mod structure;
pub mod undo;

// Re-export commonly used types
pub use error::{EditError, PreconditionError, UnsupportedEdit};
pub use events::{
    ActionEvent, ChangeEvent, EventBus, LeadSheetEvent, PartChangeEvent, SongStructureEvent,
    Subscription,
};
pub use leadsheet::{ItemSnapshot, LeadSheet, LeadSheetSnapshot};
pub use models::*;
pub use quantize::{quantize, Quantization};
pub use song_structure::{
    NewPart, PartId, PartSnapshot, Rhythm, SongPart, SongStructure, SongStructureSnapshot,
};
pub use store::{ItemStore, SectionIndex, SectionRegion};
pub use undo::{CompoundEdit, Reversible, UndoError, UndoManager};
