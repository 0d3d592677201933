// Splits a byte stream into DATA-sized chunks
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::common::error::{Error, Result};
use crate::common::types::MAX_PAYLOAD;
use crate::validation::hash::FileDigest;

/// Chunker over any reader, yielding payloads of at most [`MAX_PAYLOAD`] bytes.
///
/// A SHA-256 digest of everything read is kept alongside, so the sender can
/// put it in the EOF packet once the last chunk has gone out.
pub struct Chunker<R> {
    reader: R,
    /// Total length when known up front (files), used for progress
    total_size: Option<u64>,
    bytes_read: u64,
    digest: FileDigest,
    done: bool,
}

pub type FileChunker = Chunker<File>;

impl Chunker<File> {
    /// Open a file for chunking
    ///
    /// # Arguments
    /// * `file_path` - Path to the file to chunk
    pub fn open(file_path: &Path) -> Result<Self> {
        let file = File::open(file_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(file_path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let file_size = file.metadata()?.len();
        Ok(Chunker::new(file, Some(file_size)))
    }
}

impl Chunker<Cursor<Vec<u8>>> {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Chunker::new(Cursor::new(data), Some(len))
    }
}

impl<R: Read> Chunker<R> {
    pub fn new(reader: R, total_size: Option<u64>) -> Self {
        Self {
            reader,
            total_size,
            bytes_read: 0,
            digest: FileDigest::new(),
            done: false,
        }
    }

    /// Number of chunks the input will produce, when its size is known
    pub fn total_chunks(&self) -> Option<u64> {
        self.total_size
            .map(|size| (size + MAX_PAYLOAD as u64 - 1) / MAX_PAYLOAD as u64)
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Fraction of the input consumed (0.0 to 1.0); 0.0 when the size is unknown
    pub fn progress(&self) -> f64 {
        match self.total_size {
            Some(0) => 1.0,
            Some(size) => (self.bytes_read as f64 / size as f64).min(1.0),
            None => 0.0,
        }
    }

    /// Read the next chunk; `None` once the input is exhausted
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let mut buffer = vec![0u8; MAX_PAYLOAD];
        let mut filled = 0;
        // short reads are legal, keep going until the chunk is full or EOF
        while filled < buffer.len() {
            match self.reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if filled == 0 {
            self.done = true;
            return Ok(None);
        }

        buffer.truncate(filled);
        self.digest.update(&buffer);
        self.bytes_read += filled as u64;

        Ok(Some(buffer))
    }

    /// SHA-256 of everything read so far
    pub fn digest(&self) -> Vec<u8> {
        self.digest.current()
    }

    /// Drain the remaining input into memory
    pub fn collect_remaining(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk()? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}
