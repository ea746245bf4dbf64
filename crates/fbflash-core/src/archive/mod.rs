//! Factory archive access layer.
//!
//! Defines the `FactoryArchive` trait consumed by the planner and executor,
//! allowing different implementations (zip blob, mock).

pub mod mock;
pub mod reader;
pub mod zip;

use thiserror::Error;

pub use mock::MockArchive;
pub use reader::StreamingEntryReader;
pub use zip::ZipBlobArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("not a zip archive: {0}")]
    BadArchive(String),

    #[error("entry {name} lies outside the archive blob")]
    TruncatedEntry { name: String },

    #[error("failed to decode entry {name}: {message}")]
    DecodeFailed { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compression method of an archive entry.
///
/// Only `Stored` gets the zero-copy read path; everything else goes through
/// a one-shot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// No compression; entry bytes sit verbatim in the blob.
    Stored,
    /// Deflate.
    Deflated,
    /// Any other method the central directory may declare.
    Other,
}

/// Central-directory metadata for a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Full entry path inside the archive.
    pub name: String,
    /// Uncompressed payload size.
    pub uncompressed_size: u64,
    /// Compressed payload size (equals uncompressed for stored entries).
    pub compressed_size: u64,
    /// Compression method.
    pub method: CompressionKind,
    /// Offset of the first payload byte in the outer blob, past the local
    /// file header.
    pub data_start: u64,
}

/// Abstract factory archive interface.
///
/// This trait enables:
/// - Production implementation over a zip blob
/// - Mock implementation for unit testing
pub trait FactoryArchive {
    /// Entry table in central-directory order.
    fn entries(&self) -> &[EntryInfo];

    /// Look up an entry by its full path.
    fn entry(&self, name: &str) -> Option<&EntryInfo> {
        self.entries().iter().find(|e| e.name == name)
    }

    /// The raw outer blob the entries index into.
    fn blob(&self) -> &[u8];

    /// Decode a compressed entry into an in-memory buffer.
    fn decode(&self, entry: &EntryInfo) -> Result<Vec<u8>, ArchiveError>;
}
