//! Error taxonomy for the dispatch run.

use thiserror::Error;

/// Errors that terminate a dispatch run.
///
/// Per-attempt command failures (non-zero exit, spawn failure, broken pipe
/// while writing chunk bytes) are not represented here: they consume one
/// retry inside the worker and only surface as `ChunkExhausted` once the
/// chunk's retry limit is spent.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid configuration, rejected before any I/O.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A chunk's retries are exhausted. Fatal for the whole run; the exit
    /// code is propagated as the process exit code.
    #[error("chunk {chunk_name} failed after {attempts} attempts (last exit code {exit_code})")]
    ChunkExhausted {
        chunk_name: String,
        attempts: u32,
        exit_code: i32,
    },

    /// The input stream failed mid-read.
    #[error("input stream error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Config(_) => 2,
            DispatchError::ChunkExhausted { exit_code, .. } => *exit_code,
            DispatchError::Io(_) => 1,
        }
    }
}
