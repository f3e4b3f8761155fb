// In-memory artifact store
// Default backend for tests and single-process deployments

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{
    digest, new_artifact_id, ArtifactStore, StoreError, StoredArtifact, MAX_ID_ATTEMPTS,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    bytes: Vec<u8>,
    artifact: StoredArtifact,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, bytes: &[u8]) -> Result<StoredArtifact, StoreError> {
        let mut entries = self.lock();

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = new_artifact_id();
            if entries.contains_key(&id) {
                // Collisions are vanishingly rare; retry rather than overwrite
                continue;
            }

            let artifact = StoredArtifact {
                id: id.clone(),
                sha256: digest(bytes),
                bytes_len: bytes.len() as u64,
                created_at: Utc::now(),
            };
            entries.insert(
                id,
                Entry {
                    bytes: bytes.to_vec(),
                    artifact: artifact.clone(),
                },
            );
            return Ok(artifact);
        }

        Err(StoreError::IdSpaceExhausted)
    }

    fn get(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()
            .get(id)
            .map(|entry| entry.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn evict(&self, id: &str) -> Result<(), StoreError> {
        self.lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get_round_trip() {
        let store = MemoryStore::new();
        let artifact = store.put(b"MThd-bytes").unwrap();

        assert_eq!(artifact.bytes_len, 10);
        assert_eq!(store.get(&artifact.id).unwrap(), b"MThd-bytes");
    }

    #[test]
    fn test_get_unknown_id_not_found() {
        let store = MemoryStore::new();
        let err = store.get("missing").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_evict_removes_artifact() {
        let store = MemoryStore::new();
        let artifact = store.put(b"payload").unwrap();

        store.evict(&artifact.id).unwrap();
        assert!(matches!(
            store.get(&artifact.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.evict(&artifact.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_distinct_puts_get_distinct_ids() {
        let store = MemoryStore::new();
        let a = store.put(b"same bytes").unwrap();
        let b = store.put(b"same bytes").unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.sha256, b.sha256);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_puts_all_stored() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.put(format!("artifact {}", i).as_bytes()).unwrap().id
            }));
        }

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 16);
        for id in &ids {
            assert!(store.get(id).is_ok());
        }
    }
}
