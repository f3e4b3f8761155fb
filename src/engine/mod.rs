// Continuation engine - pluggable generative backends
// Supports a checkpoint-backed probabilistic model and a deterministic stub

use std::path::PathBuf;

use thiserror::Error;

use crate::sequence::quantize::{QuantizedNote, QuantizedNoteSequence};

pub mod checkpoint;
pub mod pool;
pub mod stub;

pub use checkpoint::CheckpointModel;
pub use pool::{EngineLease, EnginePool, PoolConfig};
pub use stub::StubModel;

/// Errors raised by the continuation engines and their pool
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model initialization failed: {0}")]
    ModelInitialization(String),

    #[error("temperature must be a positive finite number, got {0}")]
    InvalidTemperature(f64),

    #[error("engine used before initialize")]
    NotInitialized,

    #[error("engine pool saturated; retry later")]
    ServiceBusy,

    #[error("engine pool is shut down")]
    PoolClosed,
}

/// Which backend variant a pool should construct
#[derive(Debug, Clone)]
pub enum EngineSpec {
    /// Pretrained pitch-transition model loaded from a JSON checkpoint
    Checkpoint { path: PathBuf },

    /// Seeded deterministic continuation; no asset dependency
    Stub { seed: u64 },
}

impl EngineSpec {
    /// Construct an un-initialized engine. Cheap; asset loading happens
    /// in [`Engine::initialize`].
    pub fn build(&self) -> Engine {
        match self {
            EngineSpec::Checkpoint { path } => {
                Engine::Checkpoint(CheckpointModel::new(path.clone()))
            }
            EngineSpec::Stub { seed } => Engine::Stub(StubModel::new(*seed)),
        }
    }
}

/// A generative continuation backend.
///
/// Lifecycle: `initialize` once (idempotent, potentially expensive),
/// `continue_sequence` any number of times, `release` exactly once when the
/// owning pool retires the instance.
#[derive(Debug)]
pub enum Engine {
    Checkpoint(CheckpointModel),
    Stub(StubModel),
}

impl Engine {
    /// One-time setup. Idempotent; engines are pooled so this cost is paid
    /// once per instance, not once per request.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        match self {
            Engine::Checkpoint(model) => model.initialize().await,
            Engine::Stub(model) => model.initialize(),
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            Engine::Checkpoint(model) => model.is_ready(),
            Engine::Stub(model) => model.is_ready(),
        }
    }

    /// Extend `seed` by exactly `steps` sampled one-step note events.
    pub async fn continue_sequence(
        &mut self,
        seed: &QuantizedNoteSequence,
        steps: u32,
        temperature: f64,
    ) -> Result<QuantizedNoteSequence, EngineError> {
        match self {
            Engine::Checkpoint(model) => model.continue_sequence(seed, steps, temperature),
            Engine::Stub(model) => model.continue_sequence(seed, steps, temperature),
        }
    }

    /// Free backend resources. Safe to call on an engine that never ran a
    /// continuation; the pool calls it once per instance at shutdown.
    pub fn release(&mut self) {
        match self {
            Engine::Checkpoint(model) => model.release(),
            Engine::Stub(model) => model.release(),
        }
    }
}

/// Reject non-positive or non-finite sampling temperatures.
pub fn validate_temperature(temperature: f64) -> Result<(), EngineError> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(EngineError::InvalidTemperature(temperature));
    }
    Ok(())
}

/// Assemble a continuation result: seed notes followed by generated events.
///
/// Guarantees the result holds exactly `seed.len() + steps` note events. A
/// backend that emitted fewer events than requested has the last pitch
/// sustained across the remaining steps instead of returning short.
pub(crate) fn assemble_continuation(
    seed: &QuantizedNoteSequence,
    mut generated: Vec<QuantizedNote>,
    steps: u32,
) -> QuantizedNoteSequence {
    let target = seed.notes.len() + steps as usize;

    let mut notes = seed.notes.clone();
    notes.append(&mut generated);

    let mut cursor = notes
        .iter()
        .map(|n| n.step_end)
        .max()
        .unwrap_or(seed.total_steps)
        .max(seed.total_steps);

    while notes.len() < target {
        let pitch = notes.last().map(|n| n.pitch).unwrap_or(60);
        notes.push(QuantizedNote {
            pitch,
            step_start: cursor,
            step_end: cursor + 1,
        });
        cursor += 1;
    }

    let total_steps = notes
        .iter()
        .map(|n| n.step_end)
        .max()
        .unwrap_or(seed.total_steps);

    QuantizedNoteSequence {
        notes,
        steps_per_quarter: seed.steps_per_quarter,
        total_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::quantize::quantize;
    use crate::sequence::{Note, NoteSequence};

    fn quantized_seed() -> QuantizedNoteSequence {
        let seq =
            NoteSequence::from_notes(vec![Note::new(60, 0.0, 0.5), Note::new(62, 0.5, 1.0)]);
        quantize(&seq, 4).unwrap()
    }

    #[test]
    fn test_validate_temperature_rejects_zero() {
        assert!(matches!(
            validate_temperature(0.0),
            Err(EngineError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_validate_temperature_rejects_negative() {
        assert!(matches!(
            validate_temperature(-1.0),
            Err(EngineError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_validate_temperature_rejects_nan() {
        assert!(validate_temperature(f64::NAN).is_err());
        assert!(validate_temperature(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_temperature_accepts_positive() {
        assert!(validate_temperature(1.0).is_ok());
        assert!(validate_temperature(0.1).is_ok());
        assert!(validate_temperature(2.0).is_ok());
    }

    #[test]
    fn test_assemble_pads_short_generation() {
        let seed = quantized_seed();
        // Backend produced only one of four requested events
        let generated = vec![QuantizedNote {
            pitch: 64,
            step_start: 4,
            step_end: 5,
        }];

        let result = assemble_continuation(&seed, generated, 4);

        assert_eq!(result.notes.len(), 2 + 4);
        // Sustained pitch fills the missing steps
        assert!(result.notes[3..].iter().all(|n| n.pitch == 64));
        assert_eq!(result.total_steps, 8);
    }

    #[test]
    fn test_assemble_exact_generation_untouched() {
        let seed = quantized_seed();
        let generated = vec![
            QuantizedNote {
                pitch: 64,
                step_start: 4,
                step_end: 5,
            },
            QuantizedNote {
                pitch: 65,
                step_start: 5,
                step_end: 6,
            },
        ];

        let result = assemble_continuation(&seed, generated, 2);

        assert_eq!(result.notes.len(), 4);
        assert_eq!(result.notes[2].pitch, 64);
        assert_eq!(result.notes[3].pitch, 65);
        assert_eq!(result.steps_per_quarter, 4);
    }

    #[test]
    fn test_engine_spec_builds_both_variants() {
        let stub = EngineSpec::Stub { seed: 7 }.build();
        assert!(matches!(stub, Engine::Stub(_)));

        let checkpoint = EngineSpec::Checkpoint {
            path: PathBuf::from("checkpoint.json"),
        }
        .build();
        assert!(matches!(checkpoint, Engine::Checkpoint(_)));
        assert!(!checkpoint.is_ready());
    }
}
