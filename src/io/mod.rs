//! Input-stream chunking.

mod chunk_reader;

pub use chunk_reader::{Chunk, ChunkReader, chunk_name};
