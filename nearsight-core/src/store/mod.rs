//! Record persistence abstraction.
//!
//! The core never owns durability. Hosts plug in any key-value backend through
//! [`RecordStore`]; [`MemoryStore`] is the in-process reference backend and
//! [`PrefixedStore`] namespaces keys inside a shared backend.
//!
//! Records are stored as encoded bytes so a backend can hold whatever earlier
//! indexers wrote. [`StoredRecord::decode`] accepts CBOR, current JSON and the
//! legacy single-hash JSON shape.

mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::ImageDescriptor;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A persisted descriptor plus provenance.
///
/// Written once when an image is indexed; re-indexing the same id overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub name: String,
    /// Hierarchical location label, e.g. `root/holidays/2019`
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub descriptor: ImageDescriptor,
}

/// Record shape written by the first-generation indexer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    node_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    path: String,
    /// 32x32 dHash, 256 hex characters
    hash: String,
    /// Unix milliseconds
    timestamp: i64,
}

impl TryFrom<LegacyRecord> for StoredRecord {
    type Error = StoreError;

    fn try_from(legacy: LegacyRecord) -> StoreResult<Self> {
        let created_at = DateTime::from_timestamp_millis(legacy.timestamp).ok_or_else(|| {
            StoreError::Serialization(format!("timestamp out of range: {}", legacy.timestamp))
        })?;

        Ok(Self {
            id: legacy.node_id,
            name: legacy.name,
            path: legacy.path,
            created_at,
            descriptor: ImageDescriptor {
                legacy_hash: Some(legacy.hash.to_ascii_lowercase()),
                ..Default::default()
            },
        })
    }
}

impl StoredRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        created_at: DateTime<Utc>,
        descriptor: ImageDescriptor,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            created_at,
            descriptor,
        }
    }

    /// Serialize the record to CBOR bytes.
    pub fn to_cbor(&self) -> StoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize a record from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> StoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize a record from JSON.
    ///
    /// Accepts the current shape and the legacy
    /// `{ nodeId, name, path, hash, timestamp }` shape, whose single hash
    /// becomes the descriptor's `legacy_hash`.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        match serde_json::from_str::<Self>(json) {
            Ok(record) => Ok(record),
            Err(current_err) => match serde_json::from_str::<LegacyRecord>(json) {
                Ok(legacy) => legacy.try_into(),
                Err(_) => Err(StoreError::Serialization(current_err.to_string())),
            },
        }
    }

    /// Decode stored bytes: JSON when they start with `{`, CBOR otherwise.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let is_json = bytes
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{');

        if is_json {
            let json = std::str::from_utf8(bytes)
                .map_err(|e| StoreError::Serialization(format!("invalid UTF-8: {e}")))?;
            Self::from_json(json)
        } else {
            Self::from_cbor(bytes)
        }
    }
}

/// Key-value persistence collaborator.
///
/// Keys are opaque; namespacing is the backend's concern (see [`PrefixedStore`]).
pub trait RecordStore: Send + Sync {
    /// All record keys.
    fn list_keys(&self) -> StoreResult<Vec<String>>;

    /// Fetch one record. `Ok(None)` when absent, `Err` when present but unreadable.
    fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>>;

    /// Insert or overwrite a record.
    fn put(&self, key: &str, record: &StoredRecord) -> StoreResult<()>;

    /// Remove a record. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Number of records.
    fn count(&self) -> StoreResult<usize> {
        Ok(self.list_keys()?.len())
    }

    /// Explicit corpus clear. Returns the number of records removed.
    fn clear(&self) -> StoreResult<usize> {
        let keys = self.list_keys()?;
        for key in &keys {
            self.delete(key)?;
        }
        tracing::info!(removed = keys.len(), "Cleared record store");
        Ok(keys.len())
    }
}

/// Namespaces keys with a fixed prefix inside a shared backend.
///
/// Only keys under the prefix are listed, and they are returned with the
/// prefix stripped.
pub struct PrefixedStore<S> {
    inner: S,
    prefix: String,
}

impl<S: RecordStore> PrefixedStore<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl<S: RecordStore> RecordStore for PrefixedStore<S> {
    fn list_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .list_keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    fn get(&self, key: &str) -> StoreResult<Option<StoredRecord>> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&self, key: &str, record: &StoredRecord) -> StoreResult<()> {
        self.inner.put(&self.full_key(key), record)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(&self.full_key(key))
    }
}

/// Identity of one record, without its descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// Corpus overview: how many records and which were indexed last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total: usize,
    /// Records that could not be decoded
    pub unreadable: usize,
    /// Most recently created records, newest first
    pub recent: Vec<RecordSummary>,
}

impl CorpusStats {
    /// Walk the store and collect the `recent` newest records.
    pub fn collect<S: RecordStore + ?Sized>(store: &S, recent: usize) -> StoreResult<Self> {
        let keys = store.list_keys()?;
        let mut summaries = Vec::with_capacity(keys.len());
        let mut unreadable = 0;

        for key in &keys {
            match store.get(key) {
                Ok(Some(record)) => summaries.push(RecordSummary {
                    id: record.id,
                    name: record.name,
                    path: record.path,
                    created_at: record.created_at,
                }),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Unreadable record");
                    unreadable += 1;
                }
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries.truncate(recent);

        Ok(Self {
            total: keys.len(),
            unreadable,
            recent: summaries,
        })
    }
}
