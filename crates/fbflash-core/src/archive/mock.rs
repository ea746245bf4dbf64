//! Mock factory archive for testing.

use super::{ArchiveError, CompressionKind, EntryInfo, FactoryArchive};

/// In-memory archive for unit testing planner and executor logic.
///
/// Entries are laid out back to back in a synthetic blob. "Compressed"
/// entries keep their payload in plaintext and answer through `decode`,
/// which is all the reader contract observes.
#[derive(Default)]
pub struct MockArchive {
    blob: Vec<u8>,
    entries: Vec<EntryInfo>,
    decoded: Vec<Option<Vec<u8>>>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stored entry whose bytes land verbatim in the blob.
    pub fn with_stored(mut self, name: &str, payload: &[u8]) -> Self {
        let data_start = self.blob.len() as u64;
        self.blob.extend_from_slice(payload);
        self.entries.push(EntryInfo {
            name: name.to_string(),
            uncompressed_size: payload.len() as u64,
            compressed_size: payload.len() as u64,
            method: CompressionKind::Stored,
            data_start,
        });
        self.decoded.push(None);
        self
    }

    /// Add a deflated entry; `decode` returns the payload.
    pub fn with_compressed(mut self, name: &str, payload: &[u8]) -> Self {
        // The blob holds a placeholder; the reader must never slice it.
        let data_start = self.blob.len() as u64;
        self.blob.extend_from_slice(&[0xEE; 4]);
        self.entries.push(EntryInfo {
            name: name.to_string(),
            uncompressed_size: payload.len() as u64,
            compressed_size: 4,
            method: CompressionKind::Deflated,
            data_start,
        });
        self.decoded.push(Some(payload.to_vec()));
        self
    }
}

impl FactoryArchive for MockArchive {
    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn blob(&self) -> &[u8] {
        &self.blob
    }

    fn decode(&self, entry: &EntryInfo) -> Result<Vec<u8>, ArchiveError> {
        self.entries
            .iter()
            .position(|e| e.name == entry.name)
            .and_then(|i| self.decoded[i].clone())
            .ok_or_else(|| ArchiveError::DecodeFailed {
                name: entry.name.clone(),
                message: "no decoded payload registered".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_layout() {
        let archive = MockArchive::new()
            .with_stored("a/x", b"hello")
            .with_stored("a/y", b"world!");

        let x = archive.entry("a/x").unwrap();
        let y = archive.entry("a/y").unwrap();
        assert_eq!(x.data_start, 0);
        assert_eq!(y.data_start, 5);
        assert_eq!(&archive.blob()[5..11], b"world!");
        assert_eq!(y.uncompressed_size, 6);
    }

    #[test]
    fn test_mock_decode() {
        let archive = MockArchive::new().with_compressed("a/z", b"payload");
        let z = archive.entry("a/z").unwrap().clone();
        assert_eq!(archive.decode(&z).unwrap(), b"payload");
    }
}
