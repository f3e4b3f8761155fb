// Grid quantization - snaps continuous note timings onto a discrete step grid
// Round-half-up per endpoint; collapsed notes are widened, never dropped

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Note, NoteSequence, QuantizationInfo, SequenceError, MAX_PITCH};

/// Errors raised while mapping a sequence onto the step grid
#[derive(Debug, Error)]
pub enum QuantizeError {
    #[error("steps_per_quarter must be positive, got {0}")]
    InvalidStepsPerQuarter(u32),
}

/// A note expressed in integer step coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedNote {
    /// MIDI pitch [0, 127]
    pub pitch: u8,

    /// First step the note occupies (inclusive)
    pub step_start: u32,

    /// Step the note releases on (exclusive; always > step_start)
    pub step_end: u32,
}

/// A note sequence on a fixed step grid.
///
/// Produced only by [`quantize`]; consumed by the continuation engine and,
/// after continuation, by the MIDI encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizedNoteSequence {
    /// Notes in step coordinates, same order as the source sequence
    pub notes: Vec<QuantizedNote>,

    /// Grid resolution the steps are expressed in
    pub steps_per_quarter: u32,

    /// Total grid length in steps; at least the latest step_end
    pub total_steps: u32,
}

/// Duration of one grid step in seconds for a given resolution.
pub fn step_seconds(steps_per_quarter: u32) -> f64 {
    1.0 / steps_per_quarter as f64
}

/// Round a time in seconds to the nearest step, ties rounding up.
fn round_to_step(seconds: f64, step_secs: f64) -> u32 {
    (seconds / step_secs + 0.5).floor() as u32
}

/// Map a continuous-time sequence onto a discrete step grid.
///
/// Each endpoint rounds half-up to the nearest step. A note whose endpoints
/// round to the same step keeps a one-step span instead of being dropped,
/// so the seed's musical intent survives coarse grids.
pub fn quantize(
    seq: &NoteSequence,
    steps_per_quarter: u32,
) -> Result<QuantizedNoteSequence, QuantizeError> {
    if steps_per_quarter == 0 {
        return Err(QuantizeError::InvalidStepsPerQuarter(steps_per_quarter));
    }

    let step_secs = step_seconds(steps_per_quarter);
    let mut notes = Vec::with_capacity(seq.notes.len());
    let mut max_step_end = 0u32;

    for note in &seq.notes {
        let mut step_start = round_to_step(note.start_time, step_secs);
        let mut step_end = round_to_step(note.end_time, step_secs);

        // Widen notes the grid collapsed to zero length. Times far enough
        // out saturate the cast at u32::MAX, so widen backward there
        // instead of overflowing the end step.
        if step_end <= step_start {
            if step_start == u32::MAX {
                step_start = u32::MAX - 1;
            }
            step_end = step_start + 1;
        }

        max_step_end = max_step_end.max(step_end);
        notes.push(QuantizedNote {
            pitch: note.pitch,
            step_start,
            step_end,
        });
    }

    let total_steps = max_step_end.max(round_to_step(seq.total_time, step_secs));

    Ok(QuantizedNoteSequence {
        notes,
        steps_per_quarter,
        total_steps,
    })
}

impl QuantizedNoteSequence {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Validate step spans and pitches.
    ///
    /// The quantizer and the engines both uphold these, but the encoder's
    /// callers re-check rather than trust the producer.
    pub fn validate(&self) -> Result<(), SequenceError> {
        for (index, note) in self.notes.iter().enumerate() {
            if note.step_end <= note.step_start {
                return Err(SequenceError::InvalidStepSpan {
                    index,
                    step_start: note.step_start,
                    step_end: note.step_end,
                });
            }
            if note.pitch > MAX_PITCH {
                return Err(SequenceError::PitchOutOfRange {
                    index,
                    pitch: note.pitch,
                });
            }
        }
        Ok(())
    }

    /// Expand step coordinates back into continuous time.
    pub fn to_note_sequence(&self) -> NoteSequence {
        let step_secs = step_seconds(self.steps_per_quarter);
        let notes = self
            .notes
            .iter()
            .map(|n| Note {
                pitch: n.pitch,
                start_time: n.step_start as f64 * step_secs,
                end_time: n.step_end as f64 * step_secs,
            })
            .collect();

        NoteSequence {
            notes,
            total_time: self.total_steps as f64 * step_secs,
            quantization_info: Some(QuantizationInfo {
                steps_per_quarter: self.steps_per_quarter,
            }),
        }
    }
}
