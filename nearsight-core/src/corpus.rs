//! Caller-owned corpus cache and streaming search.
//!
//! The cache holds an immutable snapshot of every valid record. Scans clone
//! the snapshot `Arc` up front, so `reload()` and `invalidate()` never race
//! with a scan in flight: the scan keeps reading the snapshot it started with.
//!
//! When a corpus is too large to hold in memory, [`search_store`] scans the
//! store directly chunk by chunk instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::SearchConfig;
use crate::descriptor::ImageDescriptor;
use crate::error::{NearsightError, Result};
use crate::search::{search, Scan, ScanControl, ScanStatus, SearchReport};
use crate::store::{RecordStore, StoredRecord};

/// One searchable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub name: String,
    pub path: String,
    pub descriptor: ImageDescriptor,
}

impl From<StoredRecord> for CorpusEntry {
    fn from(record: StoredRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            path: record.path,
            descriptor: record.descriptor,
        }
    }
}

/// Counters from one corpus load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Keys listed by the store
    pub keys: usize,
    /// Records now in the snapshot
    pub loaded: usize,
    /// Records that were unreadable or failed validation
    pub skipped: usize,
    /// Keys that vanished between listing and fetching
    pub missing: usize,
    /// Store round-trips
    pub chunks: usize,
}

/// In-memory corpus snapshot with an explicit reload/invalidate contract.
#[derive(Debug, Default)]
pub struct CorpusCache {
    snapshot: RwLock<Option<Arc<[CorpusEntry]>>>,
    generation: AtomicU64,
}

impl CorpusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    ///
    /// # Errors
    ///
    /// [`NearsightError::CorpusUnavailable`] if nothing has been loaded yet or
    /// the cache was invalidated.
    pub fn snapshot(&self) -> Result<Arc<[CorpusEntry]>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                NearsightError::CorpusUnavailable("corpus cache is not loaded".into())
            })
    }

    /// Replace the snapshot with the given entries.
    pub fn replace(&self, entries: Vec<CorpusEntry>) {
        let entries: Arc<[CorpusEntry]> = entries.into();
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(entries);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Load every valid record from `store` and swap it in.
    ///
    /// Records are fetched `load_chunk_size` keys at a time. Unreadable and
    /// invalid records are skipped and counted. A failure to list keys leaves
    /// the previous snapshot in place.
    #[instrument(level = "info", skip_all)]
    pub fn reload<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        config: &SearchConfig,
    ) -> Result<LoadStats> {
        let keys = store.list_keys()?;
        let mut stats = LoadStats {
            keys: keys.len(),
            ..Default::default()
        };
        let mut entries = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(config.search.load_chunk_size.max(1)) {
            stats.chunks += 1;
            for key in chunk {
                match store.get(key) {
                    Ok(Some(record)) => match record.descriptor.validate(&config.hash) {
                        Ok(()) => entries.push(CorpusEntry::from(record)),
                        Err(e) => {
                            tracing::debug!(key = %key, error = %e, "Skipping invalid record");
                            stats.skipped += 1;
                        }
                    },
                    Ok(None) => stats.missing += 1,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Skipping unreadable record");
                        stats.skipped += 1;
                    }
                }
            }
            tracing::debug!(chunk = stats.chunks, loaded = entries.len(), "Loaded corpus chunk");
        }

        stats.loaded = entries.len();
        self.replace(entries);

        tracing::info!(
            loaded = stats.loaded,
            skipped = stats.skipped,
            generation = self.generation(),
            "Corpus reloaded"
        );
        Ok(stats)
    }

    /// Drop the snapshot. Scans already holding it are unaffected.
    pub fn invalidate(&self) {
        let previous = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Corpus cache invalidated");
        }
    }

    /// Incremented on every snapshot swap or invalidation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Entries in the current snapshot, zero when unloaded.
    pub fn len(&self) -> usize {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Search the current snapshot.
    pub fn search(
        &self,
        query: &ImageDescriptor,
        config: &SearchConfig,
        control: &mut ScanControl,
    ) -> Result<SearchReport> {
        let snapshot = self.snapshot()?;
        search(query, &snapshot, config, control)
    }
}

/// Scan a store directly without materialising the corpus.
///
/// Degraded mode for corpora that do not fit in memory: records are fetched
/// `load_chunk_size` keys at a time and scored as they arrive. Unreadable
/// records are skipped and counted like malformed ones.
///
/// # Errors
///
/// When the store cannot list its keys, or the query or configuration is
/// invalid.
#[instrument(level = "info", skip_all)]
pub fn search_store<S: RecordStore + ?Sized>(
    query: &ImageDescriptor,
    store: &S,
    config: &SearchConfig,
    control: &mut ScanControl,
) -> Result<SearchReport> {
    let keys = store.list_keys().map_err(|e| {
        NearsightError::CorpusUnavailable(format!("cannot list records: {e}"))
    })?;
    let mut scan = Scan::new(query, config, keys.len())?;

    for chunk in keys.chunks(config.search.load_chunk_size.max(1)) {
        for key in chunk {
            if control.is_cancelled() {
                return Ok(scan.finish(control, ScanStatus::Cancelled));
            }
            match store.get(key) {
                Ok(Some(record)) => {
                    scan.visit(&record.id, &record.name, &record.path, &record.descriptor)
                }
                Ok(None) => scan.skip(key, &"record vanished"),
                Err(e) => scan.skip(key, &e),
            }
            scan.tick(control);
        }
    }

    Ok(scan.finish(control, ScanStatus::Completed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn record(id: &str) -> StoredRecord {
        let mut multi_scale = BTreeMap::new();
        multi_scale.insert(32, "0".repeat(256));
        StoredRecord::new(
            id,
            format!("{id}.png"),
            "root",
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ImageDescriptor {
                multi_scale,
                ..Default::default()
            },
        )
    }

    fn populated(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..n {
            let id = format!("r{i:02}");
            store.put(&id, &record(&id)).unwrap();
        }
        store
    }

    #[test]
    fn test_unloaded_cache_is_unavailable() {
        let cache = CorpusCache::new();
        assert!(matches!(
            cache.snapshot(),
            Err(NearsightError::CorpusUnavailable(_))
        ));
        assert!(!cache.is_loaded());
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 0);

        let query = record("q").descriptor;
        let result = cache.search(&query, &SearchConfig::default(), &mut ScanControl::new());
        assert!(matches!(result, Err(NearsightError::CorpusUnavailable(_))));
    }

    #[test]
    fn test_reload_in_chunks_and_skip_bad_records() {
        let store = populated(7);
        store.put_raw("corrupt", vec![0xff]);
        let mut invalid = record("invalid");
        invalid.descriptor.multi_scale.insert(32, "abc".into());
        store.put("invalid", &invalid).unwrap();

        let mut config = SearchConfig::default();
        config.search.load_chunk_size = 3;

        let cache = CorpusCache::new();
        let stats = cache.reload(&store, &config).unwrap();
        assert_eq!(stats.keys, 9);
        assert_eq!(stats.loaded, 7);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.chunks, 3);
        assert_eq!(cache.len(), 7);
        assert_eq!(cache.generation(), 1);
    }

    #[test]
    fn test_snapshot_survives_invalidate_and_reload() {
        let store = populated(3);
        let config = SearchConfig::default();
        let cache = CorpusCache::new();
        cache.reload(&store, &config).unwrap();

        let held = cache.snapshot().unwrap();
        store.put("r99", &record("r99")).unwrap();
        cache.reload(&store, &config).unwrap();
        assert_eq!(held.len(), 3);
        assert_eq!(cache.len(), 4);

        cache.invalidate();
        assert_eq!(held.len(), 3);
        assert!(cache.snapshot().is_err());
        assert_eq!(cache.generation(), 3);

        // Invalidating an empty cache is a no-op
        cache.invalidate();
        assert_eq!(cache.generation(), 3);
    }

    #[test]
    fn test_cache_search() {
        let store = populated(4);
        let config = SearchConfig::default();
        let cache = CorpusCache::new();
        cache.reload(&store, &config).unwrap();

        let report = cache
            .search(&record("q").descriptor, &config, &mut ScanControl::new())
            .unwrap();
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.total, 4);
    }

    #[test]
    fn test_search_store_streams_records() {
        let store = populated(5);
        store.put_raw("corrupt", b"{\"broken\": true}".to_vec());

        let mut config = SearchConfig::default();
        config.search.load_chunk_size = 2;
        config.search.max_results = 3;

        let report = search_store(
            &record("q").descriptor,
            &store,
            &config,
            &mut ScanControl::new(),
        )
        .unwrap();
        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.total, 6);
        assert_eq!(report.scanned, 6);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.results.len(), 3);
    }

    #[test]
    fn test_search_store_honours_cancellation() {
        let store = populated(5);
        let control_flag = crate::search::CancelFlag::new();
        control_flag.cancel();
        let mut control = ScanControl::new().with_cancel(control_flag);

        let report = search_store(
            &record("q").descriptor,
            &store,
            &SearchConfig::default(),
            &mut control,
        )
        .unwrap();
        assert!(report.is_cancelled());
        assert_eq!(report.scanned, 0);
        assert!(report.results.is_empty());
    }
}
