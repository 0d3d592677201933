pub mod chunker;

pub use chunker::{Chunker, FileChunker};
