//! Run-wide counters, reported once the run ends.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct RunStats {
    pub markets_migrated: AtomicU64,
    pub markets_failed: AtomicU64,
    /// Planned but not written
    pub markets_dry_run: AtomicU64,
    pub markets_resumed: AtomicU64,
    pub answers_written: AtomicU64,
    pub bets_written: AtomicU64,
    /// Skipped in translation or rejected on read
    pub bets_skipped: AtomicU64,
}

/// Point-in-time copy of [`RunStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub markets_migrated: u64,
    pub markets_failed: u64,
    pub markets_dry_run: u64,
    pub markets_resumed: u64,
    pub answers_written: u64,
    pub bets_written: u64,
    pub bets_skipped: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_migrated(&self, answers: usize, bets: usize) {
        self.markets_migrated.fetch_add(1, Ordering::Relaxed);
        self.answers_written.fetch_add(answers as u64, Ordering::Relaxed);
        self.bets_written.fetch_add(bets as u64, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.markets_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dry_run(&self) {
        self.markets_dry_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resumed(&self) {
        self.markets_resumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped_bets(&self, count: usize) {
        self.bets_skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            markets_migrated: self.markets_migrated.load(Ordering::Relaxed),
            markets_failed: self.markets_failed.load(Ordering::Relaxed),
            markets_dry_run: self.markets_dry_run.load(Ordering::Relaxed),
            markets_resumed: self.markets_resumed.load(Ordering::Relaxed),
            answers_written: self.answers_written.load(Ordering::Relaxed),
            bets_written: self.bets_written.load(Ordering::Relaxed),
            bets_skipped: self.bets_skipped.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.summary();
        info!(
            migrated = s.markets_migrated,
            failed = s.markets_failed,
            dry_run = s.markets_dry_run,
            resumed = s.markets_resumed,
            answers = s.answers_written,
            bets = s.bets_written,
            skipped_bets = s.bets_skipped,
            "Run summary"
        );
    }
}
