//! Search orchestration.
//!
//! [`search`] scans an in-memory corpus snapshot on the calling thread.
//! [`worker::SearchWorker`] (feature `worker`) runs the same scan on a
//! blocking task and streams progress over a channel so the caller never
//! blocks on a large corpus.

mod orchestrator;
#[cfg(feature = "worker")]
pub mod worker;

pub use orchestrator::{rank, search, Scan};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scoring::MatchResult;

/// Cooperative cancellation flag shared between a scan and its controller.
///
/// Checked once per record. Cancelling is not an error: the scan stops and
/// returns what it had collected.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records processed so far out of the corpus total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProgress {
    pub processed_count: usize,
    pub total_count: usize,
}

type ProgressFn = Box<dyn FnMut(SearchProgress)>;

/// Cancellation and progress hooks for one scan.
#[derive(Default)]
pub struct ScanControl {
    cancel: CancelFlag,
    progress: Option<ProgressFn>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive progress every `progress_interval` records and once at the end.
    pub fn on_progress(mut self, callback: impl FnMut(SearchProgress) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn report(&mut self, progress: SearchProgress) {
        if let Some(callback) = self.progress.as_mut() {
            callback(progress);
        }
    }
}

impl fmt::Debug for ScanControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanControl")
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    Cancelled,
}

/// Outcome of one search.
///
/// An empty `results` list is a valid "no matches" answer. A search that
/// could not run is an `Err` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub status: ScanStatus,
    /// Ranked best-first, at most `max_results` long
    pub results: Vec<MatchResult>,
    /// Records visited before the scan ended
    pub scanned: usize,
    /// Records skipped as malformed
    pub skipped: usize,
    /// Records in the corpus
    pub total: usize,
}

impl SearchReport {
    pub fn has_matches(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ScanStatus::Cancelled
    }
}
