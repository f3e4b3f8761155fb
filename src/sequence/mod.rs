// NoteSequence model - timed notes plus sequence metadata
// Validated at every pipeline boundary; downstream stages trust nothing

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod quantize;

/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

/// Errors raised by boundary validation of note data
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("note {index}: end time {end} is not after start time {start}")]
    NonPositiveDuration { index: usize, start: f64, end: f64 },

    #[error("note {index}: negative start time {start}")]
    NegativeStartTime { index: usize, start: f64 },

    #[error("note {index}: non-finite time (start {start}, end {end})")]
    NonFiniteTime { index: usize, start: f64, end: f64 },

    #[error("total time {0} is not finite")]
    NonFiniteTotalTime(f64),

    #[error("note {index}: pitch {pitch} outside MIDI range 0..=127")]
    PitchOutOfRange { index: usize, pitch: u8 },

    #[error("total time {total_time} is shorter than the last note end {max_end}")]
    TotalTimeTooShort { total_time: f64, max_end: f64 },

    #[error("note {index}: step span {step_start}..{step_end} is empty or inverted")]
    InvalidStepSpan {
        index: usize,
        step_start: u32,
        step_end: u32,
    },
}

/// A single timed note.
///
/// Times are in seconds. `end_time` must be strictly greater than
/// `start_time`; sequences are conventionally ordered by `start_time` but
/// ordering is not required for validity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch [0, 127]
    pub pitch: u8,

    /// Onset in seconds (non-negative)
    pub start_time: f64,

    /// Release in seconds (must exceed start_time)
    pub end_time: f64,
}

impl Note {
    pub fn new(pitch: u8, start_time: f64, end_time: f64) -> Self {
        Note {
            pitch,
            start_time,
            end_time,
        }
    }
}

/// Grid parameters recorded on a sequence that has been quantized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationInfo {
    /// Grid resolution: steps per quarter note
    pub steps_per_quarter: u32,
}

/// An ordered collection of timed notes plus total duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteSequence {
    /// Notes, conventionally ordered by start time
    pub notes: Vec<Note>,

    /// Total duration in seconds; at least the latest note end
    pub total_time: f64,

    /// Present only on sequences produced by the quantizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization_info: Option<QuantizationInfo>,
}

impl NoteSequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        NoteSequence::default()
    }

    /// Build a sequence from notes, deriving total_time from the notes
    pub fn from_notes(notes: Vec<Note>) -> Self {
        let total_time = notes.iter().fold(0.0_f64, |acc, n| acc.max(n.end_time));
        NoteSequence {
            notes,
            total_time,
            quantization_info: None,
        }
    }

    /// Append a note, extending total_time if the note ends later
    pub fn push_note(&mut self, note: Note) {
        if note.end_time > self.total_time {
            self.total_time = note.end_time;
        }
        self.notes.push(note);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Max of all note end times, or 0.0 for an empty sequence
    pub fn total_duration(&self) -> f64 {
        self.notes
            .iter()
            .fold(0.0_f64, |acc, n| acc.max(n.end_time))
    }

    /// Validate every note and the total-time invariant.
    ///
    /// Called at seed ingestion and again after continuation; upstream
    /// producers are never trusted silently.
    pub fn validate(&self) -> Result<(), SequenceError> {
        for (index, note) in self.notes.iter().enumerate() {
            // NaN compares false against every bound below, so finiteness
            // has to be checked explicitly
            if !note.start_time.is_finite() || !note.end_time.is_finite() {
                return Err(SequenceError::NonFiniteTime {
                    index,
                    start: note.start_time,
                    end: note.end_time,
                });
            }
            if note.start_time < 0.0 {
                return Err(SequenceError::NegativeStartTime {
                    index,
                    start: note.start_time,
                });
            }
            if note.end_time <= note.start_time {
                return Err(SequenceError::NonPositiveDuration {
                    index,
                    start: note.start_time,
                    end: note.end_time,
                });
            }
            if note.pitch > MAX_PITCH {
                return Err(SequenceError::PitchOutOfRange {
                    index,
                    pitch: note.pitch,
                });
            }
        }

        if !self.total_time.is_finite() {
            return Err(SequenceError::NonFiniteTotalTime(self.total_time));
        }

        let max_end = self.total_duration();
        if self.total_time + f64::EPSILON < max_end {
            return Err(SequenceError::TotalTimeTooShort {
                total_time: self.total_time,
                max_end,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_note_seed() -> NoteSequence {
        NoteSequence::from_notes(vec![Note::new(60, 0.0, 0.5), Note::new(62, 0.5, 1.0)])
    }

    #[test]
    fn test_from_notes_derives_total_time() {
        let seq = two_note_seed();
        assert_eq!(seq.len(), 2);
        assert!((seq.total_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_duration_empty() {
        let seq = NoteSequence::new();
        assert_eq!(seq.total_duration(), 0.0);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_push_note_extends_total_time() {
        let mut seq = two_note_seed();
        seq.push_note(Note::new(64, 1.0, 1.5));
        assert!((seq.total_time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(two_note_seed().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_note() {
        let seq = NoteSequence::from_notes(vec![Note::new(60, 0.5, 0.5)]);
        let err = seq.validate().unwrap_err();
        assert!(matches!(err, SequenceError::NonPositiveDuration { .. }));
    }

    #[test]
    fn test_validate_rejects_negative_start() {
        let seq = NoteSequence::from_notes(vec![Note::new(60, -0.1, 0.5)]);
        let err = seq.validate().unwrap_err();
        assert!(matches!(err, SequenceError::NegativeStartTime { .. }));
    }

    #[test]
    fn test_validate_rejects_nan_end_time() {
        let seq = NoteSequence::from_notes(vec![Note::new(60, 0.0, f64::NAN)]);
        let err = seq.validate().unwrap_err();
        assert!(matches!(err, SequenceError::NonFiniteTime { .. }));
    }

    #[test]
    fn test_validate_rejects_infinite_start_time() {
        let seq = NoteSequence::from_notes(vec![Note::new(60, f64::INFINITY, 1.0)]);
        let err = seq.validate().unwrap_err();
        assert!(matches!(err, SequenceError::NonFiniteTime { .. }));
    }

    #[test]
    fn test_validate_rejects_non_finite_total_time() {
        let mut seq = two_note_seed();
        seq.total_time = f64::NAN;
        let err = seq.validate().unwrap_err();
        assert!(matches!(err, SequenceError::NonFiniteTotalTime(_)));
    }

    #[test]
    fn test_validate_rejects_short_total_time() {
        let mut seq = two_note_seed();
        seq.total_time = 0.25;
        let err = seq.validate().unwrap_err();
        assert!(matches!(err, SequenceError::TotalTimeTooShort { .. }));
    }

    #[test]
    fn test_notes_need_not_be_sorted() {
        let seq = NoteSequence::from_notes(vec![Note::new(62, 0.5, 1.0), Note::new(60, 0.0, 0.5)]);
        assert!(seq.validate().is_ok());
        assert!((seq.total_time - 1.0).abs() < 1e-9);
    }
}
