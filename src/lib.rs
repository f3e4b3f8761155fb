// Cadenza - Seed-to-MIDI melody continuation pipeline
// Module declarations and public surface

pub mod engine;
pub mod midi;
pub mod pipeline;
pub mod sequence;
pub mod store;

pub use engine::{
    CheckpointModel, Engine, EngineError, EngineLease, EnginePool, EngineSpec, PoolConfig,
    StubModel,
};
pub use midi::{encode, EncodeError};
pub use pipeline::{GenerateError, GenerationOutcome, GenerationRequest, Pipeline, StyleHints};
pub use sequence::quantize::{quantize, QuantizeError, QuantizedNote, QuantizedNoteSequence};
pub use sequence::{Note, NoteSequence, QuantizationInfo, SequenceError};
pub use store::{ArtifactStore, DiskStore, MemoryStore, StoreError, StoredArtifact};
