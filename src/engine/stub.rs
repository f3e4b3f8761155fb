// Deterministic stub continuation model
// Seeded pseudo-random scale walk; tests never need a live checkpoint

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sequence::quantize::{QuantizedNote, QuantizedNoteSequence};

use super::{assemble_continuation, validate_temperature, EngineError};

/// Melodic intervals the stub walks over, in semitones.
const INTERVALS: [i16; 8] = [-5, -3, -2, -1, 1, 2, 3, 5];

/// Continuation backend for tests and offline development.
///
/// Reseeds its RNG from the configured seed on every call, so identical
/// inputs always produce identical continuations.
#[derive(Debug)]
pub struct StubModel {
    seed: u64,
    ready: bool,
}

impl StubModel {
    pub fn new(seed: u64) -> Self {
        StubModel { seed, ready: false }
    }

    pub fn initialize(&mut self) -> Result<(), EngineError> {
        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn continue_sequence(
        &mut self,
        seed: &QuantizedNoteSequence,
        steps: u32,
        temperature: f64,
    ) -> Result<QuantizedNoteSequence, EngineError> {
        validate_temperature(temperature)?;
        if !self.ready {
            return Err(EngineError::NotInitialized);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut prev = seed.notes.last().map(|n| n.pitch).unwrap_or(60) as i16;

        let mut cursor = seed
            .notes
            .iter()
            .map(|n| n.step_end)
            .max()
            .unwrap_or(0)
            .max(seed.total_steps);

        let mut generated = Vec::with_capacity(steps as usize);
        for _ in 0..steps {
            let interval = INTERVALS[rng.gen_range(0..INTERVALS.len())];
            prev = (prev + interval).clamp(0, 127);

            generated.push(QuantizedNote {
                pitch: prev as u8,
                step_start: cursor,
                step_end: cursor + 1,
            });
            cursor += 1;
        }

        Ok(assemble_continuation(seed, generated, steps))
    }

    pub fn release(&mut self) {
        self.ready = false;
    }
}
