//! Run statistics.
//!
//! - Archive-level: `ArchiveStats`, one per parsed archive
//! - Run-level: `RunStats` collects concurrently, `RunSummary` is the result

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use ccnews_core::{ArchiveError, fmt_num};

use crate::state::CrawlMonth;
use crate::warc::ReaderStats;

/// Counters for one parsed archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveStats {
    pub name: String,
    pub reader: ReaderStats,
    /// Responses the filter could not use (no header/body separator)
    pub dropped: usize,
    /// Entries in the output container
    pub written: usize,
    pub elapsed: Duration,
}

impl ArchiveStats {
    /// Log archive completion (non-TTY mode only).
    pub fn log(&self) {
        log::info!(
            "{}: {} docs from {} responses ({} skipped, {} malformed) [{:.1}s]",
            self.name,
            fmt_num(self.written),
            fmt_num(self.reader.responses),
            fmt_num(self.reader.skipped),
            self.reader.malformed,
            self.elapsed.as_secs_f64()
        );
    }
}

/// One archive that did not complete
#[derive(Debug, Clone)]
pub struct ArchiveFailure {
    pub archive: String,
    pub kind: &'static str,
    pub message: String,
}

/// Thread-safe accumulator shared by the scheduler and parse workers
#[derive(Debug, Default)]
pub struct RunStats {
    skipped: AtomicUsize,
    downloaded: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
    responses: AtomicUsize,
    written: AtomicUsize,
    malformed: AtomicUsize,
    dropped: AtomicUsize,
    failures: Mutex<Vec<ArchiveFailure>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Already in the ledger
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_download(&self) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records parsed from one archive, whatever its outcome
    pub fn record_archive(&self, stats: &ArchiveStats) {
        self.responses
            .fetch_add(stats.reader.responses, Ordering::Relaxed);
        self.written.fetch_add(stats.written, Ordering::Relaxed);
        self.malformed
            .fetch_add(stats.reader.malformed, Ordering::Relaxed);
        self.dropped.fetch_add(stats.dropped, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed archive; cancellations are counted separately
    pub fn record_failure(&self, archive: &str, err: &ArchiveError) {
        if err.is_cancelled() {
            self.record_cancelled();
            return;
        }
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ArchiveFailure {
                archive: archive.to_string(),
                kind: err.kind(),
                message: err.to_string(),
            });
    }

    pub fn into_summary(self, month: CrawlMonth, listed: usize, elapsed: Duration) -> RunSummary {
        let mut failures = self
            .failures
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        failures.sort_by(|a, b| a.archive.cmp(&b.archive));
        RunSummary {
            month,
            listed,
            skipped: self.skipped.into_inner(),
            downloaded: self.downloaded.into_inner(),
            completed: self.completed.into_inner(),
            cancelled: self.cancelled.into_inner(),
            responses: self.responses.into_inner(),
            written: self.written.into_inner(),
            malformed: self.malformed.into_inner(),
            dropped: self.dropped.into_inner(),
            failures,
            interrupted: false,
            elapsed,
        }
    }
}

/// Summary of one crawl run
#[derive(Debug)]
pub struct RunSummary {
    pub month: CrawlMonth,
    /// Archives considered (after `max_archives`)
    pub listed: usize,
    /// Already complete before this run
    pub skipped: usize,
    pub downloaded: usize,
    pub completed: usize,
    /// Archives left for the next run because of shutdown
    pub cancelled: usize,
    pub responses: usize,
    pub written: usize,
    pub malformed: usize,
    pub dropped: usize,
    pub failures: Vec<ArchiveFailure>,
    /// Shutdown was requested during the run
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn empty(month: CrawlMonth) -> Self {
        RunStats::new().into_summary(month, 0, Duration::ZERO)
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Every listed archive is in the ledger
    pub fn is_complete(&self) -> bool {
        !self.interrupted
            && self.failures.is_empty()
            && self.skipped + self.completed == self.listed
    }

    /// Failure counts per error kind, sorted by kind
    pub fn failures_by_kind(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for f in &self.failures {
            match counts.iter_mut().find(|(k, _)| *k == f.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((f.kind, 1)),
            }
        }
        counts.sort_unstable();
        counts
    }

    pub fn log(&self) {
        log::info!("=== {} Summary ===", self.month);
        log::info!(
            "Archives: {}/{} completed ({} already done, {} failed, {} cancelled)",
            self.completed,
            self.listed,
            self.skipped,
            self.failed(),
            self.cancelled
        );
        log::info!(
            "Documents: {} from {} responses ({} malformed records, {} dropped)",
            fmt_num(self.written),
            fmt_num(self.responses),
            fmt_num(self.malformed),
            fmt_num(self.dropped)
        );
        for f in &self.failures {
            log::warn!("  {} [{}]: {}", f.archive, f.kind, f.message);
        }
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.written > 0 && self.elapsed.as_secs_f64() > 0.0 {
            let per_sec = self.written as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {per_sec:.0} docs/sec");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month() -> CrawlMonth {
        CrawlMonth::new(2025, 3).unwrap()
    }

    #[test]
    fn empty_summary_is_complete() {
        let summary = RunSummary::empty(month());
        assert_eq!(summary.listed, 0);
        assert!(summary.is_complete());
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        let stats = RunStats::new();
        stats.record_failure("a.warc.gz", &ArchiveError::Cancelled);
        stats.record_failure("b.warc.gz", &ArchiveError::Framing { consecutive: 11 });
        let summary = stats.into_summary(month(), 2, Duration::from_secs(1));
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].kind, "framing");
        assert!(!summary.is_complete());
    }

    #[test]
    fn failures_grouped_by_kind() {
        let stats = RunStats::new();
        stats.record_failure("c", &ArchiveError::Format("x".into()));
        stats.record_failure("a", &ArchiveError::Framing { consecutive: 11 });
        stats.record_failure("b", &ArchiveError::Format("y".into()));
        let summary = stats.into_summary(month(), 3, Duration::ZERO);
        assert_eq!(summary.failures_by_kind(), vec![("format", 2), ("framing", 1)]);
        assert_eq!(summary.failures[0].archive, "a");
    }

    #[test]
    fn archive_counters_accumulate() {
        let stats = RunStats::new();
        let a = ArchiveStats {
            name: "a".into(),
            reader: ReaderStats {
                records: 9,
                responses: 3,
                skipped: 6,
                malformed: 0,
            },
            dropped: 1,
            written: 2,
            elapsed: Duration::ZERO,
        };
        stats.record_archive(&a);
        stats.record_archive(&a);
        stats.record_completed();
        stats.record_skip();
        let summary = stats.into_summary(month(), 2, Duration::from_secs(2));
        assert_eq!(summary.responses, 6);
        assert_eq!(summary.written, 4);
        assert_eq!(summary.dropped, 2);
        assert!(summary.is_complete());
        summary.log();
    }
}
