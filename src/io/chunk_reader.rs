//! Fixed-size chunking of an async byte stream.
//!
//! The reader produces a lazy, finite, non-restartable sequence of chunks.
//! A short read is the only in-band end-of-stream signal: a stream whose
//! length is an exact multiple of the chunk size yields a final full-size
//! chunk, and end-of-stream is only detected by the following call's
//! zero-byte read.

use crate::error::DispatchError;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One contiguous slice of the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequence number, assigned in reading order starting at 1.
    pub seq: u64,

    /// Chunk bytes. Never empty; at most `chunk_size` long.
    pub data: Vec<u8>,

    /// Whether this chunk was produced by a short read, i.e. the stream
    /// ended inside it. False for a full-size final chunk.
    pub is_final: bool,
}

/// Derive the name identifying a chunk to the invoked command and in logs.
///
/// Sequence numbers are zero-padded to four digits; larger numbers widen
/// the name instead of wrapping, so names stay unique for any input size.
pub fn chunk_name(prefix: &str, seq: u64) -> String {
    format!("{}.{:04}", prefix, seq)
}

/// Reader that splits a byte stream into fixed-size chunks.
pub struct ChunkReader<R> {
    source: R,
    chunk_size: usize,
    next_seq: u64,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Create a new chunk reader over `source`.
    pub fn new(source: R, chunk_size: usize) -> Result<Self, DispatchError> {
        if chunk_size == 0 {
            return Err(DispatchError::Config("chunk size must be > 0".into()));
        }
        Ok(Self {
            source,
            chunk_size,
            next_seq: 1,
            exhausted: false,
        })
    }

    /// Read the next chunk from the stream.
    ///
    /// Returns `Ok(None)` once the stream is exhausted; every later call
    /// also returns `Ok(None)`. A zero-byte final read produces no chunk.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }

        // A single read may return fewer bytes than requested without
        // being at end-of-stream, so fill until the chunk is full or a
        // read returns zero bytes.
        let mut data = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.source.read(&mut data[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < self.chunk_size {
            self.exhausted = true;
        }
        if filled == 0 {
            return Ok(None);
        }

        data.truncate(filled);
        let seq = self.next_seq;
        self.next_seq += 1;

        Ok(Some(Chunk {
            seq,
            data,
            is_final: self.exhausted,
        }))
    }
}
