//! Fetch worker: take shard → download → project rows → hand to writer

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::Sender;

use indicatif::ProgressBar;

use crate::codec::{Row, RowCodec};
use crate::error::FetchError;
use crate::progress::fmt_num;
use crate::retry::RetryPolicy;
use crate::shard::{ShardSource, fetch_shard};
use crate::shutdown::CancelToken;
use crate::stats::PipelineStats;
use crate::work_queue::WorkQueue;

/// Queued shard reference plus the attempt it is on (1-based)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardTask {
    pub url: String,
    pub attempt: u32,
}

impl ShardTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempt: 1,
        }
    }

    /// Same shard, next attempt
    pub fn retried(self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self
        }
    }
}

/// Shard URLs are pre-signed; keep the signature out of logs
pub fn display_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Everything one worker thread needs; moved into the thread.
pub struct FetchWorker {
    pub id: usize,
    pub queue: Arc<WorkQueue<ShardTask>>,
    pub rows: Sender<Row>,
    pub source: Arc<dyn ShardSource>,
    pub codec: Arc<dyn RowCodec>,
    pub retry: RetryPolicy,
    pub cancel: CancelToken,
    pub stats: Arc<PipelineStats>,
    pub progress: ProgressBar,
}

/// What the worker loop does after handling one task
enum Next {
    Continue,
    Stop,
}

impl FetchWorker {
    /// Worker loop; exits when the queue is closed and empty, or on cancellation
    pub fn run(self) {
        while let Some(task) = self.queue.take(&self.cancel) {
            let url = display_url(&task.url).to_string();
            log::info!("Processing {url} ({} pending)", self.queue.pending());
            match panic::catch_unwind(AssertUnwindSafe(|| self.handle(task))) {
                Ok(Next::Continue) => {}
                Ok(Next::Stop) => break,
                Err(_) => {
                    // Panic hook has printed the message; the claim is still held
                    log::error!("{url}: dropped: worker panicked");
                    self.stats.record_failure();
                    self.finish_task();
                }
            }
        }
        log::debug!("fetch-{}: exiting", self.id);
    }

    fn handle(&self, task: ShardTask) -> Next {
        let url = display_url(&task.url);
        match fetch_shard(&*self.source, &*self.codec, &task.url, &self.cancel) {
            Ok(out) => {
                log::debug!(
                    "{url}: {} rows from {} records",
                    out.rows.len(),
                    out.lines_scanned
                );
                self.stats.record_shard(&out);
                for row in out.rows {
                    if self.rows.send(row).is_err() {
                        // Writer is gone; it has already reported why
                        self.abandon();
                        return Next::Stop;
                    }
                }
                self.finish_task();
                Next::Continue
            }
            Err(FetchError::Transient(e)) if self.retry.should_retry(task.attempt) => {
                let delay = self.retry.backoff(task.attempt);
                log::warn!(
                    "Connection error ({url}): {e}. Will retry (attempt {}) in {delay:?}",
                    task.attempt.saturating_add(1)
                );
                self.stats.record_retry();
                if !self.cancel.sleep(delay) {
                    self.abandon();
                    return Next::Stop;
                }
                self.queue.requeue(task.retried());
                Next::Continue
            }
            Err(FetchError::Transient(e)) => {
                log::error!("{url}: giving up after {} attempts: {e}", task.attempt);
                self.stats.record_failure();
                self.finish_task();
                Next::Continue
            }
            Err(FetchError::Fatal(e)) => {
                log::error!("{url}: dropped: {e}");
                self.stats.record_failure();
                self.finish_task();
                Next::Continue
            }
            Err(FetchError::Cancelled) => {
                self.abandon();
                Next::Stop
            }
        }
    }

    /// Release the claim on a shard left unfinished by cancellation
    fn abandon(&self) {
        self.stats.record_abandoned();
        self.queue.task_done();
    }

    fn finish_task(&self) {
        self.queue.task_done();
        self.progress.inc(1);
        self.progress
            .set_message(format!("{} rows", fmt_num(self.stats.rows_produced())));
    }
}
