use tracing::instrument;

use super::{ScanControl, ScanStatus, SearchProgress, SearchReport};
use crate::config::SearchConfig;
use crate::corpus::CorpusEntry;
use crate::descriptor::ImageDescriptor;
use crate::error::Result;
use crate::scoring::{score, MatchResult};

/// Scan a corpus snapshot against one query descriptor.
///
/// Records are scored in order. Malformed records are skipped and counted,
/// never raised. Cancellation is checked before every record; a cancelled
/// scan still ranks and returns what it collected.
///
/// # Errors
///
/// Only when the search cannot run at all: an invalid configuration or a
/// malformed query descriptor.
#[instrument(level = "info", skip_all, fields(corpus = corpus.len()))]
pub fn search(
    query: &ImageDescriptor,
    corpus: &[CorpusEntry],
    config: &SearchConfig,
    control: &mut ScanControl,
) -> Result<SearchReport> {
    let mut scan = Scan::new(query, config, corpus.len())?;

    for entry in corpus {
        if control.is_cancelled() {
            return Ok(scan.finish(control, ScanStatus::Cancelled));
        }
        scan.visit(&entry.id, &entry.name, &entry.path, &entry.descriptor);
        scan.tick(control);
    }

    Ok(scan.finish(control, ScanStatus::Completed))
}

/// Accumulator for one scan, shared by the in-memory and streaming searches.
pub struct Scan<'a> {
    query: &'a ImageDescriptor,
    config: &'a SearchConfig,
    matches: Vec<MatchResult>,
    scanned: usize,
    skipped: usize,
    total: usize,
}

impl<'a> Scan<'a> {
    /// Start a scan over `total` records.
    pub fn new(query: &'a ImageDescriptor, config: &'a SearchConfig, total: usize) -> Result<Self> {
        config.validate()?;
        query.validate(&config.hash)?;

        Ok(Self {
            query,
            config,
            matches: Vec::new(),
            scanned: 0,
            skipped: 0,
            total,
        })
    }

    /// Score one candidate record.
    pub fn visit(&mut self, id: &str, name: &str, path: &str, descriptor: &ImageDescriptor) {
        self.scanned += 1;

        if let Err(e) = descriptor.validate(&self.config.hash) {
            tracing::debug!(id = %id, error = %e, "Skipping malformed record");
            self.skipped += 1;
            return;
        }

        if let Some(card) = score(self.query, descriptor, self.config) {
            self.matches.push(MatchResult::new(id, name, path, card));
        }
    }

    /// Count a record that could not even be read.
    pub fn skip(&mut self, key: &str, reason: &dyn std::fmt::Display) {
        tracing::debug!(key = %key, error = %reason, "Skipping unreadable record");
        self.scanned += 1;
        self.skipped += 1;
    }

    pub fn progress(&self) -> SearchProgress {
        SearchProgress {
            processed_count: self.scanned,
            total_count: self.total,
        }
    }

    /// Report progress when the scan crosses a progress interval.
    pub fn tick(&self, control: &mut ScanControl) {
        let interval = self.config.search.progress_interval;
        if interval > 0 && self.scanned % interval == 0 && self.scanned < self.total {
            tracing::info!(
                processed = self.scanned,
                total = self.total,
                matches = self.matches.len(),
                "Search progress"
            );
            control.report(self.progress());
        }
    }

    /// Rank the collected matches and build the report.
    pub fn finish(self, control: &mut ScanControl, status: ScanStatus) -> SearchReport {
        control.report(self.progress());

        let candidates = self.matches.len();
        let results = rank(
            self.matches,
            self.config.search.multi_scale_priority_margin,
            self.config.search.max_results,
        );

        tracing::info!(
            ?status,
            scanned = self.scanned,
            skipped = self.skipped,
            candidates,
            returned = results.len(),
            "Search finished"
        );

        SearchReport {
            status,
            results,
            scanned: self.scanned,
            skipped: self.skipped,
            total: self.total,
        }
    }
}

/// Order matches best-first and keep at most `limit`.
///
/// When two candidates' multi-scale similarities differ by more than
/// `margin`, the higher one always ranks first; otherwise the final score
/// decides. Each position takes the highest final score among candidates
/// that no remaining candidate beats on multi-scale by more than `margin`.
/// Candidates without a multi-scale signal (legacy records) are ranked by
/// final score alone. Ties keep scan order.
pub fn rank(mut pool: Vec<MatchResult>, margin: f64, limit: usize) -> Vec<MatchResult> {
    let mut ranked = Vec::with_capacity(limit.min(pool.len()));

    while ranked.len() < limit && !pool.is_empty() {
        let top_multi_scale = pool
            .iter()
            .filter_map(|r| r.signals.multi_scale.map(|m| m.score))
            .fold(f64::NEG_INFINITY, f64::max);

        let mut best: Option<usize> = None;
        for (i, candidate) in pool.iter().enumerate() {
            if candidate
                .signals
                .multi_scale
                .is_some_and(|m| m.score < top_multi_scale - margin)
            {
                continue;
            }
            best = match best {
                Some(b) if !outranks(candidate, &pool[b]) => Some(b),
                _ => Some(i),
            };
        }

        let Some(i) = best else {
            break;
        };
        ranked.push(pool.remove(i));
    }

    ranked
}

fn outranks(a: &MatchResult, b: &MatchResult) -> bool {
    a.final_score > b.final_score
        || (a.final_score == b.final_score && a.multi_scale_score() > b.multi_scale_score())
}
