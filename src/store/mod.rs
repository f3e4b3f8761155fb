// Artifact store - keyed immutable binary payloads with collision-safe ids
// In-memory backend for tests, disk backend for deployments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// How many fresh ids to try before giving up on a put.
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no artifact with id {0}")]
    NotFound(String),

    #[error("could not allocate a free artifact id after {MAX_ID_ATTEMPTS} attempts")]
    IdSpaceExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for one stored artifact. The payload itself is immutable
/// from creation until eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub id: String,
    pub sha256: String,
    pub bytes_len: u64,
    pub created_at: DateTime<Utc>,
}

/// Keyed binary storage for generated artifacts.
///
/// `put` must never overwrite: a generated id that already exists is
/// retried, not reused. `evict` is the hook deployment-side retention
/// policies call; the pipeline itself never evicts.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<StoredArtifact, StoreError>;

    fn get(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    fn evict(&self, id: &str) -> Result<(), StoreError>;
}

/// Generate a candidate artifact id.
pub(crate) fn new_artifact_id() -> String {
    Uuid::new_v4().to_string()
}

/// SHA256 digest of artifact bytes, hex encoded.
pub(crate) fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reject ids that could escape a backend's key namespace.
pub(crate) fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            digest(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_artifact_ids_are_unique() {
        let a = new_artifact_id();
        let b = new_artifact_id();
        assert_ne!(a, b);
        assert!(valid_id(&a));
    }

    #[test]
    fn test_valid_id_rejects_traversal() {
        assert!(!valid_id("../etc/passwd"));
        assert!(!valid_id(""));
        assert!(!valid_id("a/b"));
        assert!(valid_id("9f2c1e34-aaaa-bbbb-cccc-000011112222"));
    }
}
