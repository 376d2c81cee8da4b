//! Commit metrics
//!
//! Counters use Relaxed ordering: they are observational and synchronize
//! nothing else.

use std::sync::atomic::{AtomicU64, Ordering};
use stratadex_concurrency::CommitResult;

/// Commit counters of one database
#[derive(Debug, Default)]
pub struct CommitMetrics {
    committed: AtomicU64,
    conflicted: AtomicU64,
}

impl CommitMetrics {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one commit result
    pub fn record(&self, result: &CommitResult) {
        match result {
            CommitResult::Committed { .. } => self.committed.fetch_add(1, Ordering::Relaxed),
            CommitResult::Conflict(_) => self.conflicted.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            committed: self.committed.load(Ordering::Relaxed),
            conflicted: self.conflicted.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful commits
    pub committed: u64,
    /// Commits rejected by a precondition
    pub conflicted: u64,
}

impl MetricsSnapshot {
    /// Commits attempted
    pub fn total(&self) -> u64 {
        self.committed + self.conflicted
    }

    /// Share of attempts rejected (0.0 when none were made)
    pub fn conflict_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.conflicted as f64 / self.total() as f64
        }
    }
}
