//! Per-chunk dispatch: one chunk, one command invocation at a time, with retry.

use crate::io::Chunk;
use crate::pipeline::Metrics;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Exit code recorded when an attempt fails before the command could report
/// one: the command could not be spawned, or the chunk bytes could not be
/// delivered to a command that then exited zero.
const SPAWN_FAILURE_CODE: i32 = 127;

/// Terminal status of a chunk's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The command exited zero for this chunk.
    Success,

    /// All permitted attempts failed. `exit_code` is the last observed code.
    Exhausted { exit_code: i32 },
}

/// Terminal outcome of one chunk's dispatch, reported to the scheduler.
#[derive(Debug)]
pub struct WorkerOutcome {
    /// Sequence number of the chunk.
    pub seq: u64,

    /// Name the chunk was dispatched under.
    pub chunk_name: String,

    /// Chunk size in bytes.
    pub bytes: usize,

    /// Attempts performed (0 for a dry run).
    pub attempts: u32,

    /// Terminal status.
    pub status: OutcomeStatus,
}

impl WorkerOutcome {
    /// Check if the chunk was dispatched successfully.
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }
}

/// Everything a worker needs to dispatch one chunk, bundled into one
/// immutable value at launch.
#[derive(Debug)]
pub struct WorkerTask {
    /// The chunk to deliver. The task owns the buffer until it reports.
    pub chunk: Chunk,

    /// Name identifying the chunk to the command and in logs.
    pub chunk_name: String,

    /// Command argument vector; the chunk name is appended last.
    pub command: Arc<Vec<String>>,

    /// Log the invocation instead of performing it.
    pub dry_run: bool,

    /// Attempts allowed before reporting `Exhausted`.
    pub retry_limit: u32,
}

impl WorkerTask {
    /// Dispatch the chunk, retrying failed attempts up to the retry limit.
    pub async fn run(self, metrics: Arc<Metrics>) -> WorkerOutcome {
        let bytes = self.chunk.data.len();
        metrics.add_bytes_read(bytes as u64);

        if self.dry_run {
            let mut argv = self.command.as_ref().clone();
            argv.push(self.chunk_name.clone());
            tracing::info!("Would have passed {} bytes to {:?}", bytes, argv);
            metrics.add_chunk_succeeded();
            return WorkerOutcome {
                seq: self.chunk.seq,
                chunk_name: self.chunk_name,
                bytes,
                attempts: 0,
                status: OutcomeStatus::Success,
            };
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics.add_attempt();

            let exit_code = match self.attempt().await {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(
                        "Chunk {} attempt {} could not run the command: {}",
                        self.chunk_name,
                        attempt,
                        e
                    );
                    SPAWN_FAILURE_CODE
                }
            };

            if exit_code == 0 {
                tracing::debug!("Chunk {} succeeded on attempt {}", self.chunk_name, attempt);
                metrics.add_chunk_succeeded();
                return WorkerOutcome {
                    seq: self.chunk.seq,
                    chunk_name: self.chunk_name,
                    bytes,
                    attempts: attempt,
                    status: OutcomeStatus::Success,
                };
            }

            if attempt >= self.retry_limit {
                tracing::error!(
                    "Chunk {} failed after {} attempts (last exit code {})",
                    self.chunk_name,
                    attempt,
                    exit_code
                );
                metrics.add_chunk_failed();
                return WorkerOutcome {
                    seq: self.chunk.seq,
                    chunk_name: self.chunk_name,
                    bytes,
                    attempts: attempt,
                    status: OutcomeStatus::Exhausted { exit_code },
                };
            }

            tracing::warn!(
                "Chunk {} attempt {} exited {}, {} attempts remaining",
                self.chunk_name,
                attempt,
                exit_code,
                self.retry_limit - attempt
            );
            metrics.add_retry();
        }
    }

    /// One invocation: spawn the command with the chunk name appended,
    /// write the chunk bytes to its stdin, close stdin, wait for exit.
    ///
    /// The command's stdout and stderr are inherited, never captured.
    async fn attempt(&self) -> std::io::Result<i32> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg(&self.chunk_name)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn()?;

        // Closing stdin before waiting signals end-of-input to the command.
        let write_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&self.chunk.data).await,
            None => Ok(()),
        };

        // The child must be reaped even when the write failed.
        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);

        // A command that exits zero without having accepted the chunk bytes
        // did not process this chunk; the attempt failed.
        if let Err(e) = write_result
            && exit_code == 0
        {
            return Err(e);
        }

        Ok(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(data: &[u8]) -> Chunk {
        Chunk {
            seq: 1,
            data: data.to_vec(),
            is_final: true,
        }
    }

    fn make_task(command: Vec<&str>, retry_limit: u32) -> WorkerTask {
        WorkerTask {
            chunk: make_chunk(b"chunk bytes"),
            chunk_name: "batch.0001".to_string(),
            command: Arc::new(command.into_iter().map(String::from).collect()),
            dry_run: false,
            retry_limit,
        }
    }

    fn shell(script: String) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script]
    }

    #[tokio::test]
    async fn test_success_single_attempt() {
        let task = make_task(vec!["/bin/sh", "-c", "cat > /dev/null"], 5);
        let outcome = task.run(Metrics::new()).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.status, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn test_dry_run_skips_invocation() {
        // A nonexistent command proves nothing is spawned.
        let mut task = make_task(vec!["/nonexistent/binary"], 5);
        task.dry_run = true;
        let outcome = task.run(Metrics::new()).await;
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.status, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn test_always_failing_command_exhausts_exactly() {
        let metrics = Metrics::new();
        let task = WorkerTask {
            chunk: make_chunk(b"data"),
            chunk_name: "batch.0001".to_string(),
            command: Arc::new(shell("cat > /dev/null; exit 3".to_string())),
            dry_run: false,
            retry_limit: 2,
        };
        let outcome = task.run(metrics.clone()).await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.status, OutcomeStatus::Exhausted { exit_code: 3 });
        assert_eq!(metrics.snapshot().attempts, 2);
        assert_eq!(metrics.snapshot().retries, 1);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        // Fails until the marker exists, creating it on the first attempt.
        let script = format!(
            "cat > /dev/null; if [ -e '{m}' ]; then exit 0; else : > '{m}'; exit 1; fi",
            m = marker.display()
        );
        let task = WorkerTask {
            chunk: make_chunk(b"data"),
            chunk_name: "batch.0001".to_string(),
            command: Arc::new(shell(script)),
            dry_run: false,
            retry_limit: 5,
        };
        let outcome = task.run(Metrics::new()).await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.status, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn test_chunk_bytes_arrive_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("received");
        let task = WorkerTask {
            chunk: make_chunk(b"payload bytes"),
            chunk_name: "batch.0001".to_string(),
            command: Arc::new(shell(format!("cat > '{}'", out.display()))),
            dry_run: false,
            retry_limit: 1,
        };
        let outcome = task.run(Metrics::new()).await;
        assert!(outcome.is_success());
        assert_eq!(std::fs::read(&out).unwrap(), b"payload bytes");
    }

    #[tokio::test]
    async fn test_chunk_name_is_final_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("name");
        // With `sh -c script`, the appended chunk name lands in $0.
        let script = format!("cat > /dev/null; printf %s \"$0\" > '{}'", out.display());
        let task = WorkerTask {
            chunk: make_chunk(b"data"),
            chunk_name: "batch.0042".to_string(),
            command: Arc::new(shell(script)),
            dry_run: false,
            retry_limit: 1,
        };
        let outcome = task.run(Metrics::new()).await;
        assert!(outcome.is_success());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "batch.0042");
    }

    #[tokio::test]
    async fn test_spawn_failure_consumes_attempts() {
        let task = make_task(vec!["/nonexistent/binary"], 2);
        let outcome = task.run(Metrics::new()).await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(
            outcome.status,
            OutcomeStatus::Exhausted {
                exit_code: SPAWN_FAILURE_CODE
            }
        );
    }
}
