//! Time signatures
//!
//! A time signature bounds the valid beat values of every bar it
//! governs. Sections carry one; nothing else in the model does.

use num_rational::Rational32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum supported upper numeral.
const MAX_UPPER: u8 = 32;

/// A `upper/lower` time signature, e.g. 4/4 or 6/8.
///
/// The upper numeral is the number of natural beats per bar; a valid
/// beat offset `b` within a governed bar satisfies `0 <= b < upper`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    upper: u8,
    lower: u8,
}

/// Error parsing or constructing a time signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSignatureError {
    #[error("upper numeral must be between 1 and {MAX_UPPER}, got {0}")]
    InvalidUpper(u8),

    #[error("lower numeral must be 1, 2, 4, 8 or 16, got {0}")]
    InvalidLower(u8),

    #[error("expected \"upper/lower\", got {0:?}")]
    Malformed(String),
}

impl TimeSignature {
    /// Create a time signature, validating both numerals.
    pub fn new(upper: u8, lower: u8) -> Result<Self, TimeSignatureError> {
        if upper == 0 || upper > MAX_UPPER {
            return Err(TimeSignatureError::InvalidUpper(upper));
        }
        if !matches!(lower, 1 | 2 | 4 | 8 | 16) {
            return Err(TimeSignatureError::InvalidLower(lower));
        }
        Ok(Self { upper, lower })
    }

    /// Common 4/4.
    pub fn four_four() -> Self {
        Self { upper: 4, lower: 4 }
    }

    /// Common 3/4.
    pub fn three_four() -> Self {
        Self { upper: 3, lower: 4 }
    }

    pub fn upper(&self) -> u8 {
        self.upper
    }

    pub fn lower(&self) -> u8 {
        self.lower
    }

    /// Number of natural beats per bar, as an exact rational.
    pub fn beats_per_bar(&self) -> Rational32 {
        Rational32::from_integer(self.upper as i32)
    }

    /// Beat offset of the half-bar point (e.g. 2 in 4/4, 3/2 in 3/4).
    pub fn half_bar_beat(&self) -> Rational32 {
        Rational32::new(self.upper as i32, 2)
    }

    /// True if `beat` is a valid offset inside a bar governed by this
    /// time signature.
    pub fn accepts_beat(&self, beat: Rational32) -> bool {
        beat >= Rational32::from_integer(0) && beat < self.beats_per_bar()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.upper, self.lower)
    }
}

impl FromStr for TimeSignature {
    type Err = TimeSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TimeSignatureError::Malformed(s.to_string());
        let (upper, lower) = s.split_once('/').ok_or_else(malformed)?;
        let upper: u8 = upper.trim().parse().map_err(|_| malformed())?;
        let lower: u8 = lower.trim().parse().map_err(|_| malformed())?;
        Self::new(upper, lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        assert!(TimeSignature::new(4, 4).is_ok());
        assert!(TimeSignature::new(7, 8).is_ok());
        assert_eq!(
            TimeSignature::new(0, 4),
            Err(TimeSignatureError::InvalidUpper(0))
        );
        assert_eq!(
            TimeSignature::new(4, 5),
            Err(TimeSignatureError::InvalidLower(5))
        );
    }

    #[test]
    fn test_accepts_beat() {
        let ts = TimeSignature::four_four();
        assert!(ts.accepts_beat(Rational32::from_integer(0)));
        assert!(ts.accepts_beat(Rational32::new(7, 2)));
        assert!(!ts.accepts_beat(Rational32::from_integer(4)));
        assert!(!ts.accepts_beat(Rational32::from_integer(-1)));
    }

    #[test]
    fn test_half_bar_beat() {
        assert_eq!(
            TimeSignature::four_four().half_bar_beat(),
            Rational32::from_integer(2)
        );
        assert_eq!(
            TimeSignature::three_four().half_bar_beat(),
            Rational32::new(3, 2)
        );
    }

    #[test]
    fn test_parse_and_display() {
        let ts: TimeSignature = "6/8".parse().unwrap();
        assert_eq!(ts.upper(), 6);
        assert_eq!(ts.lower(), 8);
        assert_eq!(ts.to_string(), "6/8");

        assert!("44".parse::<TimeSignature>().is_err());
        assert!("4/x".parse::<TimeSignature>().is_err());
    }
}
