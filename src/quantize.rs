//! Position quantization
//!
//! Snaps an arbitrary position to the nearest point of a resolution
//! grid. Stateless: everything needed is in the arguments.

use num_rational::Rational32;
use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;
use crate::models::{Position, TimeSignature};

/// Grid resolution for snapping user input.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quantization {
    /// No snapping; positions pass through unchanged
    Off,
    /// Two points per bar: the bar start and the half-bar point
    HalfBar,
    Beat,
    HalfBeat,
    ThirdBeat,
    QuarterBeat,
}

impl Quantization {
    /// Grid step in beats under `ts`, or None for `Off`.
    fn step(self, ts: TimeSignature) -> Option<Rational32> {
        match self {
            Quantization::Off => None,
            Quantization::HalfBar => Some(ts.half_bar_beat()),
            Quantization::Beat => Some(Rational32::from_integer(1)),
            Quantization::HalfBeat => Some(Rational32::new(1, 2)),
            Quantization::ThirdBeat => Some(Rational32::new(1, 3)),
            Quantization::QuarterBeat => Some(Rational32::new(1, 4)),
        }
    }
}

/// Snap `position` to the nearest grid point of `quantization`.
///
/// Rounding rule, uniform across resolutions: the nearest grid point
/// wins, and an exact halfway tie rounds toward the *later* point.
/// A snap landing on the bar line advances to `(bar + 1, 0)`, except
/// at `max_bar_index`, where it clamps to the bar's last grid point —
/// the result never exceeds `max_bar_index`.
///
/// Preconditions, rejected before any computation: `position.bar`
/// must not exceed `max_bar_index` and `position.beat` must be valid
/// under `ts`.
pub fn quantize(
    quantization: Quantization,
    position: Position,
    ts: TimeSignature,
    max_bar_index: usize,
) -> Result<Position, PreconditionError> {
    if position.bar > max_bar_index {
        return Err(PreconditionError::BarOutOfRange {
            bar: position.bar,
            size: max_bar_index + 1,
        });
    }
    if !ts.accepts_beat(position.beat) {
        return Err(PreconditionError::BeatNotInTimeSignature {
            position,
            beat: position.beat,
            time_signature: ts,
        });
    }

    let step = match quantization.step(ts) {
        Some(step) => step,
        None => return Ok(position),
    };

    let lower = (position.beat / step).floor() * step;
    let upper = lower + step;
    // Ties round toward the later grid point
    let snapped = if upper - position.beat <= position.beat - lower {
        upper
    } else {
        lower
    };

    if snapped >= ts.beats_per_bar() {
        if position.bar == max_bar_index {
            Ok(Position::new(position.bar, ts.beats_per_bar() - step))
        } else {
            Ok(Position::bar_start(position.bar + 1))
        }
    } else {
        Ok(Position::new(position.bar, snapped))
    }
}
