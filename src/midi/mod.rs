// MIDI encoding - quantized sequences to single-track SMF bytes using midly
// Deterministic: identical input yields byte-identical output

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use thiserror::Error;

use crate::sequence::quantize::QuantizedNoteSequence;

/// Pulses per quarter note written into the SMF header.
const PPQ: u16 = 480;

/// Fixed playback tempo: 120 BPM as microseconds per quarter note.
const MICROS_PER_QUARTER: u32 = 500_000;

/// Velocity for every generated note-on.
const DEFAULT_VELOCITY: u8 = 100;

/// Errors raised while encoding; structurally invalid input only.
///
/// Upstream validation makes these unreachable in the normal pipeline,
/// but the encoder defends against its callers regardless.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("note {index}: step span {step_start}..{step_end} is empty or inverted")]
    InvalidStepSpan {
        index: usize,
        step_start: u32,
        step_end: u32,
    },

    #[error("steps_per_quarter must be positive, got {0}")]
    InvalidGrid(u32),

    #[error("MIDI write failed: {0}")]
    Write(String),
}

/// Ticks each grid step occupies at the fixed tempo.
fn ticks_per_step(steps_per_quarter: u32) -> u32 {
    ((2 * PPQ as u32) / steps_per_quarter).max(1)
}

/// Encode a quantized sequence as a single-track MIDI file.
///
/// One note-on/note-off pair per note on channel 0, notes in ascending
/// step_start order with the original order preserved on ties.
pub fn encode(seq: &QuantizedNoteSequence) -> Result<Vec<u8>, EncodeError> {
    if seq.steps_per_quarter == 0 {
        return Err(EncodeError::InvalidGrid(seq.steps_per_quarter));
    }
    for (index, note) in seq.notes.iter().enumerate() {
        if note.step_end <= note.step_start {
            return Err(EncodeError::InvalidStepSpan {
                index,
                step_start: note.step_start,
                step_end: note.step_end,
            });
        }
    }

    let tps = ticks_per_step(seq.steps_per_quarter);

    // Sort stably so equal step_starts keep their sequence order
    let mut ordered: Vec<_> = seq.notes.iter().collect();
    ordered.sort_by_key(|n| n.step_start);

    let mut events: Vec<(u32, TrackEventKind)> = Vec::with_capacity(ordered.len() * 2 + 2);
    events.push((0, TrackEventKind::Meta(MetaMessage::Tempo(MICROS_PER_QUARTER.into()))));

    for note in &ordered {
        events.push((
            note.step_start * tps,
            TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: note.pitch.into(),
                    vel: DEFAULT_VELOCITY.into(),
                },
            },
        ));
        events.push((
            note.step_end * tps,
            TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOff {
                    key: note.pitch.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    events.sort_by_key(|(tick, _)| *tick);

    // Convert absolute ticks to delta times
    let mut track = Track::new();
    let mut last_tick = 0u32;
    for (tick, kind) in events {
        let delta = tick.saturating_sub(last_tick);
        track.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(PPQ.into()),
        },
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| EncodeError::Write(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::quantize::{quantize, QuantizedNote};
    use crate::sequence::{Note, NoteSequence};

    fn quantized_seed() -> QuantizedNoteSequence {
        let seq =
            NoteSequence::from_notes(vec![Note::new(60, 0.0, 0.5), Note::new(62, 0.5, 1.0)]);
        quantize(&seq, 4).unwrap()
    }

    fn count_note_ons(bytes: &[u8]) -> usize {
        let smf = Smf::parse(bytes).unwrap();
        smf.tracks[0]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count()
    }

    #[test]
    fn test_output_starts_with_midi_header() {
        let bytes = encode(&quantized_seed()).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let seq = quantized_seed();
        assert_eq!(encode(&seq).unwrap(), encode(&seq).unwrap());
    }

    #[test]
    fn test_note_on_count_matches_input() {
        let seq = quantized_seed();
        let bytes = encode(&seq).unwrap();
        assert_eq!(count_note_ons(&bytes), seq.notes.len());
    }

    #[test]
    fn test_single_track_format() {
        let bytes = encode(&quantized_seed()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
    }

    #[test]
    fn test_note_timing_scales_with_grid() {
        // One step at 4 steps per quarter spans 240 ticks at PPQ 480
        let seq = QuantizedNoteSequence {
            notes: vec![QuantizedNote {
                pitch: 60,
                step_start: 0,
                step_end: 1,
            }],
            steps_per_quarter: 4,
            total_steps: 1,
        };
        let bytes = encode(&seq).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let deltas: Vec<u32> = smf.tracks[0].iter().map(|e| e.delta.as_int()).collect();
        // tempo, note-on, note-off, end-of-track
        assert_eq!(deltas, vec![0, 0, 240, 0]);
    }

    #[test]
    fn test_ties_keep_sequence_order() {
        let seq = QuantizedNoteSequence {
            notes: vec![
                QuantizedNote {
                    pitch: 64,
                    step_start: 0,
                    step_end: 2,
                },
                QuantizedNote {
                    pitch: 60,
                    step_start: 0,
                    step_end: 2,
                },
            ],
            steps_per_quarter: 4,
            total_steps: 2,
        };
        let bytes = encode(&seq).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let note_ons: Vec<u8> = smf.tracks[0]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => Some(key.as_int()),
                _ => None,
            })
            .collect();
        assert_eq!(note_ons, vec![64, 60]);
    }

    #[test]
    fn test_inverted_span_rejected() {
        let seq = QuantizedNoteSequence {
            notes: vec![QuantizedNote {
                pitch: 60,
                step_start: 4,
                step_end: 3,
            }],
            steps_per_quarter: 4,
            total_steps: 4,
        };
        let err = encode(&seq).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidStepSpan { .. }));
    }

    #[test]
    fn test_empty_sequence_still_valid_smf() {
        let seq = QuantizedNoteSequence {
            notes: Vec::new(),
            steps_per_quarter: 4,
            total_steps: 0,
        };
        let bytes = encode(&seq).unwrap();
        assert!(Smf::parse(&bytes).is_ok());
        assert_eq!(count_note_ons(&bytes), 0);
    }

    #[test]
    fn test_ticks_per_step_proportional() {
        assert_eq!(ticks_per_step(4), 240);
        assert_eq!(ticks_per_step(8), 120);
        assert_eq!(ticks_per_step(2), 480);
    }
}
