//! Admission-controlled dispatch of chunks across concurrent workers.
//!
//! The scheduler pulls a chunk from the reader only while fewer than
//! `parallel` workers are in flight, so input is consumed no faster than
//! workers drain it (at most `parallel x chunk_size` chunk bytes are ever
//! held in memory). Completion is discovered by awaiting the next finished
//! worker, not by polling on an interval.

use crate::config::Config;
use crate::error::DispatchError;
use crate::io::{ChunkReader, chunk_name};
use crate::pipeline::{Metrics, MetricsReporter, OutcomeStatus, WorkerOutcome, WorkerTask};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

/// Scheduler for dispatching chunks across concurrent workers.
pub struct Scheduler {
    /// Run configuration
    config: Arc<Config>,

    /// Metrics observer shared with workers
    metrics: Arc<Metrics>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        Self { config, metrics }
    }

    /// Dispatch every chunk of the input stream.
    ///
    /// Admission stops at end-of-stream, on a read error, or once any chunk
    /// has exhausted its retries; in-flight workers are always drained to
    /// completion before the run terminates. Returns the first exhausted
    /// chunk's error if any chunk failed terminally.
    pub async fn run<R: AsyncRead + Unpin>(
        &self,
        reader: ChunkReader<R>,
    ) -> Result<SchedulerStats, DispatchError> {
        tracing::info!(
            "Dispatching {}-byte chunks to {:?} ({} concurrent, retry limit {})",
            self.config.chunk_size,
            self.config.command,
            self.config.parallel,
            self.config.retry_limit
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let reporter_handle = if self.config.metrics_interval_secs > 0 {
            let reporter =
                MetricsReporter::new(self.metrics.clone(), self.config.metrics_interval_secs);
            Some(tokio::spawn(reporter.run(shutdown_rx)))
        } else {
            drop(shutdown_rx);
            None
        };

        // Admission fuse: once a worker reports an exhausted chunk (or the
        // reader fails), no further chunk is pulled from the stream.
        let halted = Arc::new(AtomicBool::new(false));

        // Lazy admission source. `buffer_unordered` below polls this stream
        // only while a worker slot is free, which is what enforces both the
        // concurrency cap and the read backpressure.
        let admission_fuse = halted.clone();
        let chunks = stream::unfold((reader, false), move |(mut reader, done)| {
            let halted = admission_fuse.clone();
            async move {
                if done || halted.load(Ordering::Relaxed) {
                    return None;
                }
                match reader.next_chunk().await {
                    Ok(Some(chunk)) => Some((Ok(chunk), (reader, false))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), (reader, true))),
                }
            }
        });

        let command = Arc::new(self.config.command.clone());
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let outcomes = chunks
            .map(move |next| {
                let command = command.clone();
                let config = config.clone();
                let metrics = metrics.clone();
                async move {
                    let chunk = next?;
                    let name = chunk_name(&config.name, chunk.seq);
                    tracing::info!("Launching worker for chunk {} ({} bytes)", name, chunk.data.len());
                    metrics.add_chunk_dispatched();
                    let task = WorkerTask {
                        chunk,
                        chunk_name: name,
                        command,
                        dry_run: config.dry_run,
                        retry_limit: config.retry_limit,
                    };
                    Ok::<WorkerOutcome, DispatchError>(task.run(metrics).await)
                }
            })
            .buffer_unordered(self.config.parallel);
        tokio::pin!(outcomes);

        let mut stats = SchedulerStats::default();
        let mut fatal: Option<DispatchError> = None;

        while let Some(result) = outcomes.next().await {
            match result {
                Ok(outcome) => {
                    stats.record(&outcome);
                    if let OutcomeStatus::Exhausted { exit_code } = outcome.status {
                        halted.store(true, Ordering::Relaxed);
                        tracing::error!(
                            "Chunk {} is irrecoverable (exit code {}); draining in-flight workers",
                            outcome.chunk_name,
                            exit_code
                        );
                        if fatal.is_none() {
                            fatal = Some(DispatchError::ChunkExhausted {
                                chunk_name: outcome.chunk_name,
                                attempts: outcome.attempts,
                                exit_code,
                            });
                        }
                    }
                }
                Err(e) => {
                    halted.store(true, Ordering::Relaxed);
                    tracing::error!("Input stream failed: {}; draining in-flight workers", e);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        let _ = shutdown_tx.send(()).await;
        if let Some(handle) = reporter_handle {
            let _ = handle.await;
        }

        if let Some(path) = &self.config.stats_output {
            let snapshot = self.metrics.snapshot();
            if let Err(e) = snapshot.save_to_file(path) {
                tracing::warn!("Failed to save metrics to {}: {}", path.display(), e);
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => {
                tracing::info!("Dispatch complete: {}", stats);
                Ok(stats)
            }
        }
    }
}

/// Statistics from a scheduler run.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Chunks handed to a worker
    pub chunks_dispatched: usize,

    /// Chunks whose command exited zero
    pub chunks_succeeded: usize,

    /// Chunks that exhausted their retries
    pub chunks_failed: usize,

    /// Command invocations across all chunks
    pub total_attempts: u64,

    /// Bytes read from the input stream
    pub bytes_read: u64,
}

impl SchedulerStats {
    fn record(&mut self, outcome: &WorkerOutcome) {
        self.chunks_dispatched += 1;
        self.total_attempts += u64::from(outcome.attempts);
        self.bytes_read += outcome.bytes as u64;
        match outcome.status {
            OutcomeStatus::Success => self.chunks_succeeded += 1,
            OutcomeStatus::Exhausted { .. } => self.chunks_failed += 1,
        }
    }
}

impl std::fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dispatched: {}, Succeeded: {}, Failed: {}, Attempts: {}, Bytes: {}",
            self.chunks_dispatched,
            self.chunks_succeeded,
            self.chunks_failed,
            self.total_attempts,
            self.bytes_read
        )
    }
}
