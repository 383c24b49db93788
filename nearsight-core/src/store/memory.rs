//! In-memory record store.
//!
//! Holds encoded record bytes in a concurrent map, so it behaves like an
//! external key-value backend: records are decoded on every read and a
//! corrupt entry surfaces as a read error rather than a panic.

use dashmap::DashMap;

use super::{RecordStore, StoreResult, StoredRecord};

/// DashMap-backed [`RecordStore`].
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert raw bytes under `key` without encoding.
    ///
    /// Used to import records written by other indexers (e.g. legacy JSON).
    pub fn put_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.records.insert(key.into(), bytes);
    }

    /// Raw bytes stored under `key`.
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn list_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        match self.records.get(key) {
            Some(entry) => StoredRecord::decode(entry.value()).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, record: &StoredRecord) -> StoreResult<()> {
        let bytes = record.to_cbor()?;
        self.records.insert(key.to_string(), bytes);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.records.remove(key);
        Ok(())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ImageDescriptor;
    use crate::store::StoreError;
    use chrono::Utc;

    fn record(id: &str) -> StoredRecord {
        let mut descriptor = ImageDescriptor::default();
        descriptor.global_hash = Some("0".repeat(64));
        StoredRecord::new(id, "img.png", "root", Utc::now(), descriptor)
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("k1", &record("k1")).unwrap();
        store.put("k2", &record("k2")).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.list_keys().unwrap(), vec!["k1", "k2"]);
        assert_eq!(store.get("k1").unwrap().unwrap().id, "k1");

        store.delete("k1").unwrap();
        assert!(store.get("k1").unwrap().is_none());
        store.delete("missing").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_replaces_record() {
        let store = MemoryStore::new();
        store.put("k", &record("first")).unwrap();
        store.put("k", &record("second")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("k").unwrap().unwrap().id, "second");
    }

    #[test]
    fn test_corrupt_entry_is_a_read_error() {
        let store = MemoryStore::new();
        store.put_raw("bad", vec![0xff, 0xff]);
        assert!(matches!(store.get("bad"), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_put_stores_cbor() {
        let store = MemoryStore::new();
        let rec = record("c");
        store.put("c", &rec).unwrap();
        let raw = store.get_raw("c").unwrap();
        assert_eq!(StoredRecord::from_cbor(&raw).unwrap(), rec);
    }
}
