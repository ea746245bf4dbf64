//! Fixed-size chunk delivery for bounded transport buffers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("announced size {announced} does not match declared stream length {declared}")]
    SizeMismatch { declared: u64, announced: u64 },

    #[error("stream overflow: {observed} bytes observed, {declared} declared")]
    StreamOverflow { declared: u64, observed: u64 },

    #[error("chunk sink error: {0}")]
    Sink(#[from] std::io::Error),
}

/// Write-side adapter turning arbitrarily sized writes into fixed-size
/// chunk deliveries, with a single smaller chunk for the tail.
///
/// The declared stream length is enforced: the tail is flushed the moment
/// the stream is complete, and any byte past the declared length fails with
/// `StreamOverflow`. Writes that already match chunk boundaries are handed
/// to the consumer without copying.
pub struct ChunkedWriter<F: FnMut(&[u8]) -> std::io::Result<()>> {
    chunk_size: usize,
    stream_length: u64,
    consumer: F,
    pending: Vec<u8>,
    delivered: u64,
}

impl<F: FnMut(&[u8]) -> std::io::Result<()>> ChunkedWriter<F> {
    pub fn new(chunk_size: usize, stream_length: u64, consumer: F) -> Self {
        assert!(chunk_size > 0, "chunk_size must be non-zero");
        Self {
            chunk_size,
            stream_length,
            consumer,
            pending: Vec::with_capacity(chunk_size),
            delivered: 0,
        }
    }

    /// Cross-check an externally announced size against the declared length.
    pub fn init(&self, size: u64) -> Result<(), ChunkError> {
        if size != self.stream_length {
            return Err(ChunkError::SizeMismatch {
                declared: self.stream_length,
                announced: size,
            });
        }
        Ok(())
    }

    /// Accept a write of any size.
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), ChunkError> {
        let observed = self.delivered + self.pending.len() as u64 + data.len() as u64;
        if observed > self.stream_length {
            return Err(ChunkError::StreamOverflow {
                declared: self.stream_length,
                observed,
            });
        }

        while !data.is_empty() {
            if self.pending.is_empty() && data.len() >= self.chunk_size {
                // Aligned: forward straight from the caller's buffer.
                let (chunk, rest) = data.split_at(self.chunk_size);
                (self.consumer)(chunk)?;
                self.delivered += self.chunk_size as u64;
                data = rest;
                continue;
            }
            let take = (self.chunk_size - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() == self.chunk_size {
                (self.consumer)(&self.pending)?;
                self.delivered += self.chunk_size as u64;
                self.pending.clear();
            }
        }

        // The stream is complete; hand over the tail without waiting for a
        // fill that will never come.
        if !self.pending.is_empty() && self.delivered + self.pending.len() as u64 == self.stream_length
        {
            (self.consumer)(&self.pending)?;
            self.delivered += self.pending.len() as u64;
            self.pending.clear();
        }

        Ok(())
    }

    /// Flush any buffered tail and return the total number of bytes
    /// delivered to the consumer.
    pub fn finish(mut self) -> Result<u64, ChunkError> {
        if !self.pending.is_empty() {
            (self.consumer)(&self.pending)?;
            self.delivered += self.pending.len() as u64;
            self.pending.clear();
        }
        Ok(self.delivered)
    }
}
