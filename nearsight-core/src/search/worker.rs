//! Background search worker.
//!
//! A search request (query, corpus snapshot, config) is handed to a blocking
//! task as one message. Progress and the final report come back over a
//! channel; cancellation goes the other way through a shared flag.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{search, CancelFlag, ScanControl, SearchProgress, SearchReport};
use crate::config::SearchConfig;
use crate::corpus::CorpusEntry;
use crate::descriptor::ImageDescriptor;
use crate::error::{NearsightError, Result};

/// Everything one background search needs.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: ImageDescriptor,
    pub corpus: Arc<[CorpusEntry]>,
    pub config: SearchConfig,
}

/// Messages emitted by a running search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Progress(SearchProgress),
    Finished(SearchReport),
}

/// Controller for one background search.
pub struct SearchHandle {
    events: UnboundedReceiver<SearchEvent>,
    cancel: CancelFlag,
    task: JoinHandle<Result<SearchReport>>,
}

impl SearchHandle {
    /// Ask the scan to stop. It returns what it has collected so far.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Next event, or `None` once the worker is done and every event was read.
    pub async fn next_event(&mut self) -> Option<SearchEvent> {
        self.events.recv().await
    }

    /// Wait for the final report.
    ///
    /// # Errors
    ///
    /// The search could not run (invalid query or config), or the worker
    /// task panicked.
    pub async fn join(self) -> Result<SearchReport> {
        self.task
            .await
            .map_err(|e| NearsightError::WorkerFailed(e.to_string()))?
    }
}

/// Spawns searches off the calling thread.
pub struct SearchWorker;

impl SearchWorker {
    /// Start a search on the Tokio blocking pool.
    ///
    /// # Errors
    ///
    /// [`NearsightError::WorkerFailed`] when called outside a Tokio runtime.
    pub fn spawn(request: SearchRequest) -> Result<SearchHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NearsightError::WorkerFailed(format!("no Tokio runtime: {e}")))?;

        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let flag = cancel.clone();

        let task = runtime.spawn_blocking(move || {
            let SearchRequest {
                query,
                corpus,
                config,
            } = request;
            info!(corpus = corpus.len(), "Search worker started");

            let progress_tx = tx.clone();
            let mut control = ScanControl::new().with_cancel(flag).on_progress(move |p| {
                // Receiver gone means nobody is listening; keep scanning.
                let _ = progress_tx.send(SearchEvent::Progress(p));
            });

            match search(&query, &corpus, &config, &mut control) {
                Ok(report) => {
                    let _ = tx.send(SearchEvent::Finished(report.clone()));
                    info!(status = ?report.status, "Search worker stopped");
                    Ok(report)
                }
                Err(e) => {
                    error!(error = %e, "Search worker failed");
                    Err(e)
                }
            }
        });

        Ok(SearchHandle {
            events,
            cancel,
            task,
        })
    }
}
