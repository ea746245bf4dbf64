//! Zip-backed factory archive.
//!
//! The outer blob is either memory-mapped from disk or owned in memory; the
//! central directory is walked once up front to build the entry table, so
//! later lookups never touch the zip machinery unless an entry actually
//! needs inflating.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, info, instrument};
use zip::{CompressionMethod, ZipArchive};

use super::{ArchiveError, CompressionKind, EntryInfo, FactoryArchive};

enum Blob {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Blob {
    fn as_slice(&self) -> &[u8] {
        match self {
            Blob::Mapped(m) => m,
            Blob::Owned(v) => v,
        }
    }
}

/// Production archive over a zip blob.
pub struct ZipBlobArchive {
    blob: Blob,
    entries: Vec<EntryInfo>,
    index: HashMap<String, usize>,
}

impl ZipBlobArchive {
    /// Memory-map a zip file from disk.
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file) }?;
        info!(bytes = mmap.len(), "Mapped factory archive");
        Self::build(Blob::Mapped(mmap))
    }

    /// Wrap an in-memory zip blob.
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        Self::build(Blob::Owned(bytes))
    }

    fn build(blob: Blob) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(Cursor::new(blob.as_slice()))
            .map_err(|e| ArchiveError::BadArchive(e.to_string()))?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut index = HashMap::with_capacity(zip.len());
        for i in 0..zip.len() {
            let file = zip
                .by_index_raw(i)
                .map_err(|e| ArchiveError::BadArchive(e.to_string()))?;
            if file.is_dir() {
                continue;
            }
            let method = match file.compression() {
                CompressionMethod::Stored => CompressionKind::Stored,
                CompressionMethod::Deflated => CompressionKind::Deflated,
                _ => CompressionKind::Other,
            };
            let info = EntryInfo {
                name: file.name().to_string(),
                uncompressed_size: file.size(),
                compressed_size: file.compressed_size(),
                method,
                data_start: file.data_start(),
            };
            debug!(
                name = %info.name,
                size = info.uncompressed_size,
                method = ?info.method,
                "Archive entry"
            );
            index.insert(info.name.clone(), entries.len());
            entries.push(info);
        }

        Ok(Self {
            blob,
            entries,
            index,
        })
    }
}

impl FactoryArchive for ZipBlobArchive {
    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn entry(&self, name: &str) -> Option<&EntryInfo> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    fn blob(&self) -> &[u8] {
        self.blob.as_slice()
    }

    fn decode(&self, entry: &EntryInfo) -> Result<Vec<u8>, ArchiveError> {
        // A throwaway ZipArchive over the same blob; only re-parses the
        // central directory, which is cheap next to inflating the payload.
        let mut zip = ZipArchive::new(Cursor::new(self.blob.as_slice()))
            .map_err(|e| ArchiveError::BadArchive(e.to_string()))?;
        let mut file = zip
            .by_name(&entry.name)
            .map_err(|e| ArchiveError::DecodeFailed {
                name: entry.name.clone(),
                message: e.to_string(),
            })?;
        let mut buf = Vec::with_capacity(entry.uncompressed_size as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ArchiveError::DecodeFailed {
                name: entry.name.clone(),
                message: e.to_string(),
            })?;
        Ok(buf)
    }
}
