//! Configuration for a dispatch run.

use crate::error::DispatchError;
use std::path::PathBuf;

/// Main configuration for a dispatch run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chunk size in bytes.
    pub chunk_size: usize,

    /// Command to invoke for each chunk. The chunk name is appended as the
    /// final argument; chunk bytes are written to the command's stdin.
    pub command: Vec<String>,

    /// Chunk-name prefix. Each chunk is identified to the command and in
    /// logs as `{name}.{sequence_number}`.
    pub name: String,

    /// Number of chunks dispatched concurrently.
    pub parallel: usize,

    /// Don't execute any command, just log what would have been run.
    pub dry_run: bool,

    /// Attempts allowed per chunk before the run is aborted.
    pub retry_limit: u32,

    /// Progress reporting interval in seconds (0 disables).
    pub metrics_interval_secs: u64,

    /// Optional path to save a metrics JSON snapshot after the run completes.
    pub stats_output: Option<PathBuf>,
}

impl Config {
    /// Validate the configuration. Fails before any I/O.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.chunk_size == 0 {
            return Err(DispatchError::Config("chunk size must be > 0".into()));
        }
        if self.parallel == 0 {
            return Err(DispatchError::Config("parallel must be > 0".into()));
        }
        if self.retry_limit == 0 {
            return Err(DispatchError::Config("retry limit must be > 0".into()));
        }
        if self.command.is_empty() {
            return Err(DispatchError::Config("command must not be empty".into()));
        }
        if self.name.is_empty() {
            return Err(DispatchError::Config("name prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// Parse a command-line `--command` value into an argument vector.
///
/// Accepts either a JSON array of strings (`'["zfs", "receive"]'`) or a
/// plain string. Anything that does not parse as an all-string JSON array
/// is treated as a single-element vector containing the raw value.
pub fn parse_command_vector(raw: &str) -> Vec<String> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(raw) {
        let strings: Option<Vec<String>> = items
            .iter()
            .map(|v| v.as_str().map(String::from))
            .collect();
        if let Some(argv) = strings {
            return argv;
        }
    }
    vec![raw.to_string()]
}
