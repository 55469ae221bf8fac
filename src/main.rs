//! pipechunk CLI
//!
//! Chunk data on stdin into chunks of a given size, and invoke an action on
//! each chunk.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pipechunk::{Config, build_runtime, parse_command_vector, run_dispatch};

#[derive(Parser)]
#[command(name = "pipechunk")]
#[command(about = "Chunk data on stdin and invoke a command on each chunk", long_about = None)]
struct Cli {
    /// Chunk size, in bytes
    #[arg(long, value_name = "BYTES")]
    chunk_size: usize,

    /// Command to invoke per chunk: a path, or a JSON array of strings.
    /// The chunk name is appended as the final argument and the chunk
    /// bytes are written to the command's stdin.
    #[arg(long, value_name = "CMD")]
    command: String,

    /// Prefix of the chunk name passed to the command
    #[arg(long, value_name = "PREFIX")]
    name: String,

    /// Number of chunks to process in parallel
    #[arg(long, default_value_t = 1)]
    parallel: usize,

    /// Don't execute any programs, just log what would have been run
    #[arg(long)]
    dry_run: bool,

    /// Attempts allowed per chunk before the run is aborted
    #[arg(long, default_value_t = 5)]
    retry_limit: u32,

    /// Seconds between progress reports (0 disables them)
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    metrics_interval: u64,

    /// Write a JSON metrics snapshot to this path after the run
    #[arg(long, value_name = "PATH")]
    stats_output: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            chunk_size: self.chunk_size,
            command: parse_command_vector(&self.command),
            name: self.name,
            parallel: self.parallel,
            dry_run: self.dry_run,
            retry_limit: self.retry_limit,
            metrics_interval_secs: self.metrics_interval,
            stats_output: self.stats_output,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Cli::parse().into_config();

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to build runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run_dispatch(config)) {
        tracing::error!("{}", err);
        std::process::exit(err.exit_code());
    }
}
