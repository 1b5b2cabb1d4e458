//! Run counters shared by fetch workers, and the final summary

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::progress::fmt_num;
use crate::shard::ShardOutput;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Done,
    Aborted,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Lock-free counters updated by workers
#[derive(Debug, Default)]
pub struct PipelineStats {
    shards_completed: AtomicU64,
    shards_failed: AtomicU64,
    shards_abandoned: AtomicU64,
    retries: AtomicU64,
    lines_scanned: AtomicU64,
    malformed: AtomicU64,
    skipped: AtomicU64,
    rows_produced: AtomicU64,
}

impl PipelineStats {
    pub fn record_shard(&self, out: &ShardOutput) {
        self.shards_completed.fetch_add(1, Ordering::Relaxed);
        self.lines_scanned
            .fetch_add(out.lines_scanned as u64, Ordering::Relaxed);
        self.malformed
            .fetch_add(out.malformed as u64, Ordering::Relaxed);
        self.skipped.fetch_add(out.skipped as u64, Ordering::Relaxed);
        self.rows_produced
            .fetch_add(out.rows.len() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.shards_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.shards_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rows_produced(&self) -> u64 {
        self.rows_produced.load(Ordering::Relaxed)
    }

    /// Freeze counters into a summary
    pub fn summary(
        &self,
        state: PipelineState,
        shards_total: usize,
        rows_written: u64,
        elapsed: Duration,
    ) -> Summary {
        Summary {
            state,
            shards_total: shards_total as u64,
            shards_completed: self.shards_completed.load(Ordering::Relaxed),
            shards_failed: self.shards_failed.load(Ordering::Relaxed),
            shards_abandoned: self.shards_abandoned.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            lines_scanned: self.lines_scanned.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rows_written,
            elapsed,
        }
    }
}

/// Pipeline execution summary
#[derive(Debug, Clone)]
pub struct Summary {
    pub state: PipelineState,
    pub shards_total: u64,
    pub shards_completed: u64,
    pub shards_failed: u64,
    /// Shards left unfinished because the run was cancelled
    pub shards_abandoned: u64,
    pub retries: u64,
    pub lines_scanned: u64,
    pub malformed: u64,
    pub skipped: u64,
    pub rows_written: u64,
    pub elapsed: Duration,
}

impl Summary {
    /// Every shard completed and the run was not aborted
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
            && self.shards_failed == 0
            && self.shards_abandoned == 0
            && self.shards_completed == self.shards_total
    }

    pub fn log(&self) {
        log::info!(
            "Shards: {}/{} completed ({} failed, {} abandoned, {} retries)",
            self.shards_completed,
            self.shards_total,
            self.shards_failed,
            self.shards_abandoned,
            self.retries
        );
        log::info!(
            "Records: {} scanned, {} without location, {} malformed",
            fmt_num(self.lines_scanned),
            fmt_num(self.skipped),
            fmt_num(self.malformed)
        );
        log::info!(
            "Rows written: {} in {:.1}s",
            fmt_num(self.rows_written),
            self.elapsed.as_secs_f64()
        );
        if self.rows_written > 0 && self.elapsed.as_secs_f64() > 0.0 {
            let rate = self.rows_written as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {rate:.0} rows/sec");
        }
    }
}
