//! End-to-end dispatch runs against real shell commands.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use pipechunk::{
    ChunkReader, Config, DispatchError, Metrics, Scheduler, SchedulerStats, parse_command_vector,
};

fn shell(script: String) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script]
}

/// Command that writes each chunk's bytes to `dir/<chunk name>`.
fn chunk_capture_command(dir: &Path) -> Vec<String> {
    shell(format!("cat > '{}'/\"$0\"", dir.display()))
}

fn config(chunk_size: usize, parallel: usize, retry_limit: u32, command: Vec<String>) -> Config {
    Config {
        chunk_size,
        command,
        name: "batch".to_string(),
        parallel,
        dry_run: false,
        retry_limit,
        metrics_interval_secs: 0,
        stats_output: None,
    }
}

async fn dispatch(input: &[u8], config: Config) -> Result<SchedulerStats, DispatchError> {
    config.validate()?;
    let config = Arc::new(config);
    let reader = ChunkReader::new(Cursor::new(input.to_vec()), config.chunk_size)?;
    Scheduler::new(config, Metrics::new()).run(reader).await
}

fn captured_chunks(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut chunks: Vec<(String, Vec<u8>)> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().into_string().unwrap(),
                std::fs::read(entry.path()).unwrap(),
            )
        })
        .collect();
    chunks.sort();
    chunks
}

#[tokio::test]
async fn ten_bytes_in_three_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let result = dispatch(
        b"0123456789",
        config(4, 2, 1, chunk_capture_command(dir.path())),
    )
    .await;

    let stats = result.unwrap();
    assert_eq!(stats.chunks_dispatched, 3);
    assert_eq!(stats.chunks_succeeded, 3);

    let chunks = captured_chunks(dir.path());
    assert_eq!(
        chunks,
        vec![
            ("batch.0001".to_string(), b"0123".to_vec()),
            ("batch.0002".to_string(), b"4567".to_vec()),
            ("batch.0003".to_string(), b"89".to_vec()),
        ]
    );
}

#[tokio::test]
async fn chunks_reassemble_into_input() {
    // 100 bytes at chunk size 7: 15 chunks, the last 2 bytes long.
    let input: Vec<u8> = (0u8..100).collect();
    let dir = tempfile::tempdir().unwrap();
    let result = dispatch(
        &input,
        config(7, 4, 1, chunk_capture_command(dir.path())),
    )
    .await;

    let stats = result.unwrap();
    assert_eq!(stats.chunks_dispatched, 15);
    assert_eq!(stats.bytes_read, 100);

    let chunks = captured_chunks(dir.path());
    assert_eq!(chunks.len(), 15);
    assert_eq!(chunks[0].0, "batch.0001");
    assert_eq!(chunks[14].0, "batch.0015");

    let reassembled: Vec<u8> = chunks.into_iter().flat_map(|(_, data)| data).collect();
    assert_eq!(reassembled, input);
}

#[tokio::test]
async fn second_chunk_failure_propagates_exit_code() {
    // 8 bytes, chunk size 4; batch.0002 always exits 1 with two attempts allowed.
    let script = r#"cat > /dev/null; case "$0" in *.0002) exit 1;; esac"#.to_string();
    let result = dispatch(b"01234567", config(4, 2, 2, shell(script))).await;

    match result.unwrap_err() {
        DispatchError::ChunkExhausted {
            chunk_name,
            attempts,
            exit_code,
        } => {
            assert_eq!(chunk_name, "batch.0002");
            assert_eq!(attempts, 2);
            assert_eq!(exit_code, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn retry_limit_zero_rejected_before_reading() {
    let result = dispatch(
        b"0123",
        config(4, 1, 0, shell("cat > /dev/null".to_string())),
    )
    .await;

    match result.unwrap_err() {
        DispatchError::Config(msg) => assert!(msg.contains("retry limit")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn dry_run_previews_without_invoking() {
    let mut cfg = config(4, 1, 5, vec!["/nonexistent/binary".to_string()]);
    cfg.dry_run = true;
    let stats = dispatch(b"0123456789", cfg).await.unwrap();

    assert_eq!(stats.chunks_dispatched, 3);
    assert_eq!(stats.chunks_succeeded, 3);
    assert_eq!(stats.total_attempts, 0);
}

#[tokio::test]
async fn command_vector_forms_are_equivalent() {
    // A JSON array and a plain path produce the same argument vector.
    assert_eq!(parse_command_vector(r#"["echo"]"#), parse_command_vector("echo"));

    // And a parsed vector dispatches like a hand-built one.
    let dir = tempfile::tempdir().unwrap();
    let raw = serde_json::to_string(&chunk_capture_command(dir.path())).unwrap();
    let stats = dispatch(b"0123", config(4, 1, 1, parse_command_vector(&raw)))
        .await
        .unwrap();

    assert_eq!(stats.chunks_succeeded, 1);
    assert_eq!(captured_chunks(dir.path())[0].1, b"0123");
}
