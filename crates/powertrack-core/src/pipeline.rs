//! Pipeline coordinator: N fetch workers → one row writer → one CSV file
//!
//! ```text
//! URL list ─▶ WorkQueue ─▶ fetch-0..N ─▶ mpsc<Row> ─▶ row-writer ─▶ output.csv
//! ```
//!
//! The coordinator blocks on the queue's join (all shards done, retries
//! included), then closes the queue so workers exit, then waits for the
//! writer to drain. On cancellation the writer gets a grace period to flush
//! rows that were already produced before it is force-stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::codec::RowCodec;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::shard::ShardSource;
use crate::shutdown::{CancelToken, POLL_INTERVAL};
use crate::sink::CsvSink;
use crate::stats::{PipelineState, PipelineStats, Summary};
use crate::work_queue::WorkQueue;
use crate::worker::{FetchWorker, ShardTask};
use crate::writer::RowWriter;

/// Runtime configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output CSV file
    pub output: PathBuf,
    /// Number of parallel fetch workers
    pub workers: usize,
    /// Append to an existing file instead of truncating it
    pub append: bool,
    /// Retry policy for transient shard failures
    pub retry: RetryPolicy,
    /// How long the writer may keep draining after cancellation
    pub grace_period: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output.csv"),
            workers: 4,
            append: false,
            retry: RetryPolicy::default(),
            grace_period: Duration::from_secs(5),
        }
    }
}

/// One-shot fetch-and-write run.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn ShardSource>,
    codec: Arc<dyn RowCodec>,
    progress: ProgressBar,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ShardSource>,
        codec: Arc<dyn RowCodec>,
    ) -> Self {
        Self {
            config,
            source,
            codec,
            progress: ProgressBar::hidden(),
            state: PipelineState::Idle,
        }
    }

    /// Report shard progress on `pb` (length is set when the run starts)
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    /// Redirect output to `path`
    pub fn with_output(mut self, path: PathBuf) -> Self {
        self.config.output = path;
        self
    }

    pub fn output(&self) -> &std::path::Path {
        &self.config.output
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline: {} -> {next}", self.state);
        self.state = next;
    }

    /// Download every shard in `urls` into the configured output file.
    ///
    /// Returns once all shards are done and all rows written (`Done`), or
    /// after a cancellation has been handled (`Aborted`). Failed shards are
    /// reported in the summary, not as an error.
    pub fn run(mut self, urls: Vec<String>, cancel: &CancelToken) -> Result<Summary, PipelineError> {
        let start = Instant::now();
        let shards_total = urls.len();
        let workers = self.config.workers.max(1);
        log::info!(
            "Building CSV file {} from {} URLs with {} workers",
            self.config.output.display(),
            shards_total,
            workers
        );

        let sink = CsvSink::open(&self.config.output, &self.codec.header(), self.config.append)
            .map_err(PipelineError::Open)?;

        // `stop` ends the run early: caller cancellation or writer failure
        let stop = cancel.child();
        let abort_writer = CancelToken::new();
        let stats = Arc::new(PipelineStats::default());
        let queue: Arc<WorkQueue<ShardTask>> = Arc::new(WorkQueue::new());
        let (tx, rx) = mpsc::channel();

        let writer = RowWriter::new(rx, sink, abort_writer.clone(), stop.clone());
        let writer_handle = thread::Builder::new()
            .name("row-writer".into())
            .spawn(move || writer.run())
            .map_err(PipelineError::Spawn)?;

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = FetchWorker {
                id,
                queue: queue.clone(),
                rows: tx.clone(),
                source: self.source.clone(),
                codec: self.codec.clone(),
                retry: self.config.retry,
                cancel: stop.clone(),
                stats: stats.clone(),
                progress: self.progress.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("fetch-{id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    stop.cancel();
                    queue.close();
                    return Err(PipelineError::Spawn(e));
                }
            }
        }
        // Writer sees disconnect once the last worker exits
        drop(tx);

        self.transition(PipelineState::Running);
        self.progress.set_length(shards_total as u64);
        for url in urls {
            queue.push(ShardTask::new(url));
        }

        // Cancelled workers release their claims, so join alone can report zero
        let completed = queue.join(&stop) && !stop.is_cancelled();
        queue.close();

        if completed {
            self.transition(PipelineState::Draining);
            for handle in handles {
                if handle.join().is_err() {
                    log::error!("fetch worker panicked");
                }
            }
        } else {
            log::warn!(
                "Run cancelled, draining produced rows for up to {:?}",
                self.config.grace_period
            );
            // Workers stuck in network reads are detached, not joined
            drop(handles);
            let deadline = Instant::now() + self.config.grace_period;
            while !writer_handle.is_finished() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            if !writer_handle.is_finished() {
                log::warn!("Grace period elapsed, closing output");
                abort_writer.cancel();
            }
        }

        let rows_written = match writer_handle.join() {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                self.transition(PipelineState::Aborted);
                return Err(PipelineError::Write(e));
            }
            Err(_) => {
                self.transition(PipelineState::Aborted);
                return Err(PipelineError::WriterPanicked);
            }
        };

        let final_state = if completed {
            PipelineState::Done
        } else {
            PipelineState::Aborted
        };
        self.transition(final_state);
        self.progress.finish_and_clear();

        let summary = stats.summary(final_state, shards_total, rows_written, start.elapsed());
        if final_state == PipelineState::Done {
            log::info!("Done: {}", self.config.output.display());
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 4);
        assert!(!config.append);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.grace_period > Duration::ZERO);
    }

    struct NoSource;

    impl ShardSource for NoSource {
        fn open(&self, _url: &str) -> Result<Box<dyn std::io::Read + Send>, crate::StreamError> {
            Err(crate::StreamError::Http {
                status: Some(404),
                message: "none".into(),
            })
        }
    }

    struct Echo;

    impl RowCodec for Echo {
        fn header(&self) -> Vec<String> {
            vec!["v".into()]
        }

        fn to_row(&self, record: &serde_json::Value) -> Option<crate::Row> {
            Some(vec![record.to_string()])
        }
    }

    #[test]
    fn output_redirected() {
        let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(NoSource), Arc::new(Echo))
            .with_output(PathBuf::from("jobs/t.csv"));
        assert_eq!(pipeline.output(), std::path::Path::new("jobs/t.csv"));
    }
}
