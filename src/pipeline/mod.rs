// Generation pipeline - seed sequence to stored MIDI artifact
// validate -> quantize -> pooled continuation -> validate -> encode -> store

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{self, EngineError, EnginePool};
use crate::midi::{self, EncodeError};
use crate::sequence::quantize::{quantize, QuantizeError};
use crate::sequence::{NoteSequence, SequenceError};
use crate::store::{ArtifactStore, StoreError, StoredArtifact};

/// Free-form style parameters accepted from callers.
///
/// Reserved: accepted and logged for forward compatibility but not yet
/// applied to sampling. They travel with the request so a future backend
/// can condition on them without an interface change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StyleHints {
    pub genre: Option<String>,
    pub mood: Option<String>,
}

/// One generation request. Built per call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Seed melody to extend
    pub seed: NoteSequence,

    /// Grid resolution for quantization
    pub steps_per_quarter: u32,

    /// How many steps of continuation to sample
    pub continuation_length: u32,

    /// Sampling randomness; must be positive, typically (0, 2]
    pub temperature: f64,

    #[serde(default)]
    pub style: StyleHints,
}

impl GenerationRequest {
    pub fn new(
        seed: NoteSequence,
        steps_per_quarter: u32,
        continuation_length: u32,
        temperature: f64,
    ) -> Self {
        GenerationRequest {
            seed,
            steps_per_quarter,
            continuation_length,
            temperature,
            style: StyleHints::default(),
        }
    }
}

/// Successful pipeline result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// The stored, retrievable artifact
    pub artifact: StoredArtifact,

    /// Note events in the generated sequence (seed + continuation)
    pub note_count: usize,
}

/// Everything a generation request can fail with.
///
/// Input errors (`Sequence`, `Quantize`, `InvalidContinuationLength`, an
/// invalid temperature inside `Engine`) mean "fix your input"; resource
/// errors are distinguished by [`GenerateError::is_retryable`].
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("continuation_length must be positive")]
    InvalidContinuationLength,

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Quantize(#[from] QuantizeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GenerateError {
    /// Whether a caller may retry the identical request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerateError::Engine(
                EngineError::ServiceBusy | EngineError::ModelInitialization(_)
            ) | GenerateError::Store(StoreError::Io(_) | StoreError::IdSpaceExhausted)
        )
    }
}

/// End-to-end melody continuation pipeline.
///
/// Each request runs as an independent unit of work; the engine pool is
/// the only shared stateful resource besides the store's id namespace.
/// Nothing is ever stored on a failed request.
pub struct Pipeline {
    pool: EnginePool,
    store: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    pub fn new(pool: EnginePool, store: Arc<dyn ArtifactStore>) -> Self {
        Pipeline { pool, store }
    }

    pub fn engine_pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Run one generation request to a stored artifact.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, GenerateError> {
        // Cheap input validation before any engine work
        engine::validate_temperature(request.temperature)?;
        if request.continuation_length == 0 {
            return Err(GenerateError::InvalidContinuationLength);
        }
        request.seed.validate()?;

        let quantized = quantize(&request.seed, request.steps_per_quarter)?;

        if request.style.genre.is_some() || request.style.mood.is_some() {
            log::debug!(
                "style hints received (genre={:?}, mood={:?}); not applied yet",
                request.style.genre,
                request.style.mood
            );
        }

        let generated = {
            let mut lease = self.pool.checkout().await?;
            lease
                .continue_sequence(&quantized, request.continuation_length, request.temperature)
                .await?
            // Lease drops here; the engine returns to the pool on the
            // error path above as well
        };

        generated.validate()?;
        let bytes = midi::encode(&generated)?;
        let artifact = self.store.put(&bytes)?;

        log::info!(
            "generated {} notes ({} continuation steps) -> artifact {} ({} bytes)",
            generated.notes.len(),
            request.continuation_length,
            artifact.id,
            artifact.bytes_len
        );

        Ok(GenerationOutcome {
            artifact,
            note_count: generated.notes.len(),
        })
    }

    /// Fetch a previously stored artifact's bytes.
    pub fn fetch_artifact(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.store.get(id)
    }

    /// Drop a stored artifact; retention policy lives with the caller.
    pub fn evict_artifact(&self, id: &str) -> Result<(), StoreError> {
        self.store.evict(id)
    }

    /// Retire the engine pool. Call once requests have drained.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
