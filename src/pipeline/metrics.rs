//! Dispatch progress monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Counters shared by the scheduler and workers.
///
/// Passed around as an explicit `Arc` so tests can observe what a run did
/// instead of parsing log output.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Chunks handed to a worker
    pub chunks_dispatched: AtomicU64,

    /// Chunks whose command exited zero
    pub chunks_succeeded: AtomicU64,

    /// Chunks that exhausted their retries
    pub chunks_failed: AtomicU64,

    /// Command invocations performed
    pub attempts: AtomicU64,

    /// Failed invocations that were retried
    pub retries: AtomicU64,

    /// Bytes read from the input stream
    pub bytes_read: AtomicU64,

    /// Start time
    start_time: Option<Instant>,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Self::default()
        })
    }

    /// Record a chunk handed to a worker.
    pub fn add_chunk_dispatched(&self) {
        self.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully dispatched chunk.
    pub fn add_chunk_succeeded(&self) {
        self.chunks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk that exhausted its retries.
    pub fn add_chunk_failed(&self) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a command invocation.
    pub fn add_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retried invocation.
    pub fn add_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes read from the input stream.
    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let bytes_read = self.bytes_read.load(Ordering::Relaxed);
        let chunks_dispatched = self.chunks_dispatched.load(Ordering::Relaxed);
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();

        MetricsSnapshot {
            chunks_dispatched,
            chunks_succeeded: self.chunks_succeeded.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes_read,
            elapsed,
            chunks_per_second: if secs > 0.0 {
                chunks_dispatched as f64 / secs
            } else {
                0.0
            },
            throughput_mb_s: if secs > 0.0 {
                bytes_read as f64 / (1024.0 * 1024.0) / secs
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub chunks_dispatched: u64,
    pub chunks_succeeded: u64,
    pub chunks_failed: u64,
    pub attempts: u64,
    pub retries: u64,
    pub bytes_read: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub chunks_per_second: f64,
    pub throughput_mb_s: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {} dispatched, {} succeeded, {} failed | \
             Attempts: {} ({} retried) | \
             Read: {:.2} MB @ {:.2} MB/s | Rate: {:.1} chunks/s | Elapsed: {:.1}s",
            self.chunks_dispatched,
            self.chunks_succeeded,
            self.chunks_failed,
            self.attempts,
            self.retries,
            self.bytes_read as f64 / (1024.0 * 1024.0),
            self.throughput_mb_s,
            self.chunks_per_second,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Periodic progress reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Report progress on a fixed interval until a shutdown send.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        // The first tick fires immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("Progress: {}", self.metrics.snapshot());
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}
