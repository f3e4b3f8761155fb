// Disk artifact store
// One file per artifact under an explicit root; ids never overwrite

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{
    digest, new_artifact_id, valid_id, ArtifactStore, StoreError, StoredArtifact, MAX_ID_ATTEMPTS,
};

/// File extension for stored artifacts.
const ARTIFACT_EXT: &str = "mid";

/// Artifact store backed by a directory.
///
/// The root is injected explicitly; there is no implicit global output
/// directory. `create_new` makes id collisions observable at the
/// filesystem level even across processes sharing the root.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(DiskStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, ARTIFACT_EXT))
    }
}

impl ArtifactStore for DiskStore {
    fn put(&self, bytes: &[u8]) -> Result<StoredArtifact, StoreError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = new_artifact_id();
            let path = self.artifact_path(&id);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                // Another writer claimed this id; retry with a fresh one
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::Io(e)),
            };

            file.write_all(bytes)?;
            file.flush()?;

            log::debug!("stored artifact {} ({} bytes)", id, bytes.len());

            return Ok(StoredArtifact {
                id,
                sha256: digest(bytes),
                bytes_len: bytes.len() as u64,
                created_at: Utc::now(),
            });
        }

        Err(StoreError::IdSpaceExhausted)
    }

    fn get(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        if !valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        match fs::read(self.artifact_path(id)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn evict(&self, id: &str) -> Result<(), StoreError> {
        if !valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }

        match fs::remove_file(self.artifact_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
