//! Chord symbols
//!
//! Parses and prints textual chord symbols ("C", "F#m7", "Bb7/D"):
//! a root pitch class, a quality, and an optional bass note for slash
//! chords. The spelling of the root ("F#" vs "Gb") is preserved so a
//! symbol prints back the way it was written.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a chord symbol from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChordParseError {
    #[error("empty chord symbol")]
    Empty,

    #[error("{0:?} does not start with a note letter A-G")]
    InvalidRoot(String),

    #[error("unknown chord quality {0:?}")]
    UnknownQuality(String),

    #[error("invalid bass note {0:?}")]
    InvalidBass(String),
}

/// Spelling preference for a pitch class.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

/// A pitch class 0-11 (0 = C) with its written accidental.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PitchClass {
    semitone: u8,
    accidental: Accidental,
}

/// Semitone of each natural letter, C through B.
const NATURAL_SEMITONES: [(char, u8); 7] = [
    ('C', 0),
    ('D', 2),
    ('E', 4),
    ('F', 5),
    ('G', 7),
    ('A', 9),
    ('B', 11),
];

impl PitchClass {
    /// Semitone value, 0-11.
    pub fn semitone(&self) -> u8 {
        self.semitone
    }

    /// Parse a note name with optional accidental ("C", "F#", "Bb").
    fn parse(s: &str) -> Option<(Self, &str)> {
        let mut chars = s.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let base = NATURAL_SEMITONES
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, st)| *st)?;

        let rest = chars.as_str();
        let (accidental, rest) = match rest.chars().next() {
            Some('#') => (Accidental::Sharp, &rest[1..]),
            Some('b') => (Accidental::Flat, &rest[1..]),
            _ => (Accidental::Natural, rest),
        };
        let semitone = match accidental {
            Accidental::Natural => base,
            Accidental::Sharp => (base + 1) % 12,
            Accidental::Flat => (base + 11) % 12,
        };
        Some((Self { semitone, accidental }, rest))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Spell from the written accidental: sharps name the letter
        // below, flats the letter above.
        let (letter, suffix) = match self.accidental {
            Accidental::Natural => (self.semitone, ""),
            Accidental::Sharp => ((self.semitone + 11) % 12, "#"),
            Accidental::Flat => ((self.semitone + 1) % 12, "b"),
        };
        let name = NATURAL_SEMITONES
            .iter()
            .find(|(_, st)| *st == letter)
            .map(|(l, _)| *l)
            .unwrap_or('C');
        write!(f, "{}{}", name, suffix)
    }
}

/// Closed set of recognized chord qualities.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Dominant7,
    Major7,
    Minor7,
    Major6,
    Minor6,
    Diminished,
    Diminished7,
    HalfDiminished7,
    Augmented,
    Sus4,
}

/// Recognized quality suffixes. The whole text after the root (and
/// before any slash bass) must match one entry exactly.
static QUALITY_SUFFIXES: Lazy<Vec<(&'static str, ChordQuality)>> = Lazy::new(|| {
    vec![
        ("", ChordQuality::Major),
        ("m", ChordQuality::Minor),
        ("7", ChordQuality::Dominant7),
        ("maj7", ChordQuality::Major7),
        ("m7", ChordQuality::Minor7),
        ("6", ChordQuality::Major6),
        ("m6", ChordQuality::Minor6),
        ("dim", ChordQuality::Diminished),
        ("dim7", ChordQuality::Diminished7),
        ("m7b5", ChordQuality::HalfDiminished7),
        ("aug", ChordQuality::Augmented),
        ("sus4", ChordQuality::Sus4),
    ]
});

impl ChordQuality {
    /// Canonical printed suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Major6 => "6",
            ChordQuality::Minor6 => "m6",
            ChordQuality::Diminished => "dim",
            ChordQuality::Diminished7 => "dim7",
            ChordQuality::HalfDiminished7 => "m7b5",
            ChordQuality::Augmented => "aug",
            ChordQuality::Sus4 => "sus4",
        }
    }
}

/// A chord symbol item payload: root, quality, optional slash bass.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChordSymbol {
    root: PitchClass,
    quality: ChordQuality,
    bass: Option<PitchClass>,
}

impl ChordSymbol {
    pub fn root(&self) -> PitchClass {
        self.root
    }

    pub fn quality(&self) -> ChordQuality {
        self.quality
    }

    /// The written bass note of a slash chord, if any.
    pub fn bass(&self) -> Option<PitchClass> {
        self.bass
    }
}

impl FromStr for ChordSymbol {
    type Err = ChordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChordParseError::Empty);
        }

        let (body, bass) = match s.split_once('/') {
            Some((body, bass)) => {
                let (pc, rest) =
                    PitchClass::parse(bass).ok_or_else(|| ChordParseError::InvalidBass(bass.to_string()))?;
                if !rest.is_empty() {
                    return Err(ChordParseError::InvalidBass(bass.to_string()));
                }
                (body, Some(pc))
            }
            None => (s, None),
        };

        let (root, suffix) =
            PitchClass::parse(body).ok_or_else(|| ChordParseError::InvalidRoot(s.to_string()))?;
        let quality = QUALITY_SUFFIXES
            .iter()
            .find(|(text, _)| *text == suffix)
            .map(|(_, q)| *q)
            .ok_or_else(|| ChordParseError::UnknownQuality(suffix.to_string()))?;

        Ok(Self { root, quality, bass })
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.quality.suffix())?;
        if let Some(bass) = self.bass {
            write!(f, "/{}", bass)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> ChordSymbol {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_major() {
        let c = parse("C");
        assert_eq!(c.root().semitone(), 0);
        assert_eq!(c.quality(), ChordQuality::Major);
        assert_eq!(c.bass(), None);
    }

    #[test]
    fn test_parse_accidentals() {
        assert_eq!(parse("F#m7").root().semitone(), 6);
        assert_eq!(parse("Gbm7").root().semitone(), 6);
        assert_eq!(parse("Bb7").root().semitone(), 10);
        // Spelling preserved through display
        assert_eq!(parse("F#m7").to_string(), "F#m7");
        assert_eq!(parse("Gbm7").to_string(), "Gbm7");
    }

    #[test]
    fn test_parse_qualities() {
        assert_eq!(parse("Cmaj7").quality(), ChordQuality::Major7);
        assert_eq!(parse("Cm7b5").quality(), ChordQuality::HalfDiminished7);
        assert_eq!(parse("Cdim7").quality(), ChordQuality::Diminished7);
        assert_eq!(parse("Caug").quality(), ChordQuality::Augmented);
        assert_eq!(parse("Csus4").quality(), ChordQuality::Sus4);
        assert_eq!(parse("C6").quality(), ChordQuality::Major6);
        assert_eq!(parse("Cm6").quality(), ChordQuality::Minor6);
    }

    #[test]
    fn test_parse_slash_bass() {
        let c = parse("Bb7/D");
        assert_eq!(c.bass().map(|b| b.semitone()), Some(2));
        assert_eq!(c.to_string(), "Bb7/D");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ChordSymbol>(), Err(ChordParseError::Empty));
        assert!(matches!(
            "H7".parse::<ChordSymbol>(),
            Err(ChordParseError::InvalidRoot(_))
        ));
        assert!(matches!(
            "Cfoo".parse::<ChordSymbol>(),
            Err(ChordParseError::UnknownQuality(_))
        ));
        assert!(matches!(
            "C7/xy".parse::<ChordSymbol>(),
            Err(ChordParseError::InvalidBass(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["C", "Am", "F#m7", "Bbmaj7", "Ebm7b5", "G7/B", "Dsus4"] {
            assert_eq!(parse(text).to_string(), text);
        }
    }
}
