//! Bar/beat positions
//!
//! This module defines the fundamental `Position` value used to anchor
//! every item in a lead sheet: a 0-based bar index plus an exact
//! rational beat offset within that bar.

use num_rational::Rational32;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in musical time: `(bar, beat)`.
///
/// `beat` is an exact rational so that grid positions like a third of a
/// beat survive round-trips without drift. Ordering is lexicographic:
/// bar first, then beat. Whether a beat value is *valid* depends on the
/// time signature governing that bar, which only the owning document
/// knows; `Position` itself accepts any non-negative beat.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Bar index (0-based)
    pub bar: usize,

    /// Beat offset within the bar (0-based, `0 <= beat`)
    pub beat: Rational32,
}

impl Position {
    /// Create a new position.
    pub fn new(bar: usize, beat: Rational32) -> Self {
        Self { bar, beat }
    }

    /// Position at the start of a bar.
    pub fn bar_start(bar: usize) -> Self {
        Self {
            bar,
            beat: Rational32::from_integer(0),
        }
    }

    /// Position at the very start of the document.
    pub fn origin() -> Self {
        Self::bar_start(0)
    }

    /// Same beat, different bar.
    pub fn with_bar(&self, bar: usize) -> Self {
        Self { bar, beat: self.beat }
    }

    /// Same bar, different beat.
    pub fn with_beat(&self, beat: Rational32) -> Self {
        Self { bar: self.bar, beat }
    }

    /// Shift the bar index by a signed delta, saturating at bar 0.
    pub fn shifted_bars(&self, delta: isize) -> Self {
        Self {
            bar: self.bar.saturating_add_signed(delta),
            beat: self.beat,
        }
    }

    /// True if this position sits exactly on a bar start.
    pub fn is_bar_start(&self) -> bool {
        self.beat == Rational32::from_integer(0)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bar, self.beat)
    }
}
