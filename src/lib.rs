//! pipechunk
//!
//! Split an unbounded byte stream into fixed-size chunks and dispatch each
//! chunk to an external command, with a bounded number of invocations in
//! flight and per-chunk retry.
//!
//! # Architecture
//!
//! - **I/O**: lazy fixed-size chunking of the input stream
//! - **Pipeline**: admission-controlled scheduler, per-chunk workers with
//!   retry, metrics
//!
//! Control flow: reader → scheduler → workers → scheduler → exit code.
//! The scheduler admits a chunk only when a worker slot is free, so memory
//! stays bounded regardless of input size; any chunk that exhausts its
//! retries aborts the run with that chunk's last exit code.
//!
//! # Usage
//!
//! ```no_run
//! use pipechunk::{Config, parse_command_vector, run_dispatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pipechunk::DispatchError> {
//!     let config = Config {
//!         chunk_size: 1 << 20,
//!         command: parse_command_vector(r#"["zfs", "receive"]"#),
//!         name: "backup".to_string(),
//!         parallel: 4,
//!         dry_run: false,
//!         retry_limit: 5,
//!         metrics_interval_secs: 10,
//!         stats_output: None,
//!     };
//!     run_dispatch(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;

pub use config::{Config, parse_command_vector};
pub use error::DispatchError;
pub use io::{Chunk, ChunkReader, chunk_name};
pub use pipeline::{Metrics, Scheduler, SchedulerStats, WorkerOutcome, WorkerTask};

use std::sync::Arc;

/// Run a full dispatch over standard input with the given configuration.
pub async fn run_dispatch(config: Config) -> Result<SchedulerStats, DispatchError> {
    config.validate()?;

    let config = Arc::new(config);
    let metrics = Metrics::new();
    let reader = ChunkReader::new(tokio::io::stdin(), config.chunk_size)?;

    let scheduler = Scheduler::new(config, metrics);
    scheduler.run(reader).await
}

/// Build a multi-thread Tokio runtime.
pub fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
