// Checkpoint-backed continuation model
// Pitch-transition logits loaded from a JSON asset, sampled autoregressively

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::sequence::quantize::{QuantizedNote, QuantizedNoteSequence};

use super::{assemble_continuation, validate_temperature, EngineError};

/// Pretrained transition weights over a contiguous pitch window.
///
/// `logits[i][j]` scores a move from pitch `pitch_low + i` to
/// `pitch_low + j`. Stored as a JSON document alongside the deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Lowest pitch the model covers (inclusive)
    pub pitch_low: u8,

    /// Highest pitch the model covers (inclusive)
    pub pitch_high: u8,

    /// Square transition-logit matrix over the pitch window
    pub logits: Vec<Vec<f64>>,
}

impl Checkpoint {
    /// Number of pitches in the model's window.
    pub fn window(&self) -> usize {
        (self.pitch_high - self.pitch_low) as usize + 1
    }

    fn check(&self) -> Result<(), String> {
        if self.pitch_high < self.pitch_low {
            return Err(format!(
                "pitch window inverted: {}..{}",
                self.pitch_low, self.pitch_high
            ));
        }
        let window = self.window();
        if self.logits.len() != window {
            return Err(format!(
                "expected {} logit rows, found {}",
                window,
                self.logits.len()
            ));
        }
        for (i, row) in self.logits.iter().enumerate() {
            if row.len() != window {
                return Err(format!("logit row {} has {} entries, expected {}", i, row.len(), window));
            }
            if row.iter().any(|l| l.is_nan()) {
                return Err(format!("logit row {} contains NaN", i));
            }
        }
        Ok(())
    }
}

/// Continuation model backed by a checkpoint asset.
///
/// The checkpoint is read once in `initialize` and reused across requests;
/// the pool keeps instances alive so the load cost is not paid per call.
#[derive(Debug)]
pub struct CheckpointModel {
    path: PathBuf,
    checkpoint: Option<Checkpoint>,
    rng: StdRng,
}

impl CheckpointModel {
    pub fn new(path: PathBuf) -> Self {
        CheckpointModel {
            path,
            checkpoint: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Load and validate the checkpoint asset. Idempotent.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        if self.checkpoint.is_some() {
            return Ok(());
        }

        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            EngineError::ModelInitialization(format!(
                "reading checkpoint {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let checkpoint: Checkpoint = serde_json::from_slice(&raw).map_err(|e| {
            EngineError::ModelInitialization(format!(
                "parsing checkpoint {}: {}",
                self.path.display(),
                e
            ))
        })?;

        checkpoint.check().map_err(EngineError::ModelInitialization)?;

        log::info!(
            "loaded checkpoint {} (pitch window {}..={})",
            self.path.display(),
            checkpoint.pitch_low,
            checkpoint.pitch_high
        );

        self.checkpoint = Some(checkpoint);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Sample `steps` next-pitch events, each occupying one grid step.
    pub fn continue_sequence(
        &mut self,
        seed: &QuantizedNoteSequence,
        steps: u32,
        temperature: f64,
    ) -> Result<QuantizedNoteSequence, EngineError> {
        validate_temperature(temperature)?;
        let checkpoint = self.checkpoint.as_ref().ok_or(EngineError::NotInitialized)?;

        let mut prev = seed
            .notes
            .last()
            .map(|n| n.pitch)
            .unwrap_or(60)
            .clamp(checkpoint.pitch_low, checkpoint.pitch_high);

        let mut cursor = seed
            .notes
            .iter()
            .map(|n| n.step_end)
            .max()
            .unwrap_or(0)
            .max(seed.total_steps);

        let mut generated = Vec::with_capacity(steps as usize);
        for _ in 0..steps {
            let row = &checkpoint.logits[(prev - checkpoint.pitch_low) as usize];
            let choice = sample_scaled(row, temperature, &mut self.rng);
            let pitch = checkpoint.pitch_low + choice as u8;

            generated.push(QuantizedNote {
                pitch,
                step_start: cursor,
                step_end: cursor + 1,
            });
            prev = pitch;
            cursor += 1;
        }

        Ok(assemble_continuation(seed, generated, steps))
    }

    pub fn release(&mut self) {
        if self.checkpoint.take().is_some() {
            log::debug!("released checkpoint {}", self.path.display());
        }
    }
}

/// Sample an index from logits rescaled by 1/temperature.
///
/// Higher temperature flattens the distribution; temperatures near zero
/// approach argmax. Numerically stabilized by subtracting the row max.
fn sample_scaled(logits: &[f64], temperature: f64, rng: &mut StdRng) -> usize {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = logits
        .iter()
        .map(|l| ((l - max) / temperature).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        // All mass vanished (e.g. -inf row); fall back to the max logit
        return logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
    }

    let mut target = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        if target < *w {
            return i;
        }
        target -= w;
    }
    weights.len() - 1
}
