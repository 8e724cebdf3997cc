use super::{StateStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

struct VersionedEntry {
    version: u64,
    bytes: Vec<u8>,
}

/// In-process `StateStore` used by the service binary and the tests.
///
/// Stands in for the external key-value store; per-key versions follow the
/// same contract a networked implementation would honor.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, VersionedEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries.get(key).map(|e| e.bytes.clone()))
    }

    async fn get_versioned(&self, key: &str) -> Result<Option<(u64, Vec<u8>)>, StoreError> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries.get(key).map(|e| (e.version, e.bytes.clone())))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let version = entries.get(key).map(|e| e.version).unwrap_or(0) + 1;
        entries.insert(key.to_string(), VersionedEntry { version, bytes: value });
        Ok(())
    }

    async fn put_if_version(
        &self,
        key: &str,
        expected: u64,
        value: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let current = entries.get(key).map(|e| e.version).unwrap_or(0);
        if current != expected {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            VersionedEntry { version: expected + 1, bytes: value },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip_bumps_version() {
        let store = MemoryStore::new();
        store.put("k", b"one".to_vec()).await.unwrap();
        store.put("k", b"two".to_vec()).await.unwrap();

        let (version, bytes) = store.get_versioned("k").await.unwrap().unwrap();
        assert_eq!(version, 2);
        assert_eq!(bytes, b"two");
    }

    #[tokio::test]
    async fn cas_succeeds_only_on_matching_version() {
        let store = MemoryStore::new();
        assert!(store.put_if_version("k", 0, b"seed".to_vec()).await.unwrap());

        // Stale writer loses; stored value is untouched.
        assert!(!store.put_if_version("k", 0, b"stale".to_vec()).await.unwrap());
        let (version, bytes) = store.get_versioned("k").await.unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(bytes, b"seed");

        assert!(store.put_if_version("k", 1, b"next".to_vec()).await.unwrap());
        let (version, _) = store.get_versioned("k").await.unwrap().unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn delete_resets_key_to_absent() {
        let store = MemoryStore::new();
        store.put("k", b"v".to_vec()).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.put_if_version("k", 0, b"again".to_vec()).await.unwrap());
    }
}
