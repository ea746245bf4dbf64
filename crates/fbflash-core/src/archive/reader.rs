//! Random-access reader over a single archive entry.

use std::io::{self, Read, Seek, SeekFrom};

use super::{ArchiveError, CompressionKind, EntryInfo, FactoryArchive};

enum Source<'a> {
    /// Stored entry: a slice of the outer blob, no copy.
    Stored(&'a [u8]),
    /// Compressed entry: one-shot decode held in memory.
    Decoded(Vec<u8>),
}

impl Source<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Source::Stored(s) => s,
            Source::Decoded(v) => v,
        }
    }
}

/// `Read + Seek` view of one entry's uncompressed payload.
///
/// Partition images inside a factory archive are typically stored without
/// compression (the filesystems are already compressed), so the common case
/// never buffers the payload: reads are served straight from the outer blob
/// at offsets computed from the central directory. Compressed entries fall
/// back to a decoded in-memory copy.
pub struct StreamingEntryReader<'a> {
    source: Source<'a>,
    pos: u64,
}

impl<'a> StreamingEntryReader<'a> {
    /// Build a reader for `entry` backed by `archive`.
    pub fn new<A: FactoryArchive + ?Sized>(
        archive: &'a A,
        entry: &EntryInfo,
    ) -> Result<Self, ArchiveError> {
        let source = match entry.method {
            CompressionKind::Stored => {
                let blob = archive.blob();
                let start = entry.data_start as usize;
                let end = start.checked_add(entry.compressed_size as usize);
                match end {
                    Some(end) if end <= blob.len() => Source::Stored(&blob[start..end]),
                    _ => {
                        return Err(ArchiveError::TruncatedEntry {
                            name: entry.name.clone(),
                        });
                    }
                }
            }
            _ => Source::Decoded(archive.decode(entry)?),
        };
        Ok(Self { source, pos: 0 })
    }

    /// Logical size of the payload.
    pub fn len(&self) -> u64 {
        self.source.as_slice().len() as u64
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.source.as_slice().is_empty()
    }
}

impl Read for StreamingEntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.source.as_slice();
        let pos = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - pos);
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for StreamingEntryReader<'_> {
    /// Out-of-range targets clamp to `[0, len]` instead of erroring.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.len() as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
            SeekFrom::End(d) => len + d as i128,
        };
        self.pos = target.clamp(0, len) as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MockArchive;

    fn payload() -> Vec<u8> {
        (0u8..=255).cycle().take(1000).collect()
    }

    #[test]
    fn test_stored_read_matches_payload() {
        let archive = MockArchive::new().with_stored("a/boot.img", &payload());
        let entry = archive.entry("a/boot.img").unwrap().clone();
        let mut reader = StreamingEntryReader::new(&archive, &entry).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload());
    }

    #[test]
    fn test_partitioned_reads_concatenate() {
        let archive = MockArchive::new().with_stored("a/boot.img", &payload());
        let entry = archive.entry("a/boot.img").unwrap().clone();
        let mut reader = StreamingEntryReader::new(&archive, &entry).unwrap();

        // Uneven split sizes, covering the whole range.
        let mut out = Vec::new();
        for chunk in [1usize, 7, 250, 742] {
            let mut buf = vec![0u8; chunk];
            reader.read_exact(&mut buf).unwrap();
            out.extend_from_slice(&buf);
        }
        assert_eq!(out, payload());
        assert_eq!(reader.read(&mut [0u8; 16]).unwrap(), 0);
    }

    #[test]
    fn test_decoded_read_matches_payload() {
        let archive = MockArchive::new().with_compressed("a/vendor.img", &payload());
        let entry = archive.entry("a/vendor.img").unwrap().clone();
        let mut reader = StreamingEntryReader::new(&archive, &entry).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload());
    }

    #[test]
    fn test_seek_clamps() {
        let archive = MockArchive::new().with_stored("a/boot.img", b"0123456789");
        let entry = archive.entry("a/boot.img").unwrap().clone();
        let mut reader = StreamingEntryReader::new(&archive, &entry).unwrap();

        assert_eq!(reader.seek(SeekFrom::End(-4)).unwrap(), 6);
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "6789");

        // Before start and past end both clamp.
        assert_eq!(reader.seek(SeekFrom::Current(-100)).unwrap(), 0);
        assert_eq!(reader.seek(SeekFrom::Start(500)).unwrap(), 10);
        assert_eq!(reader.read(&mut [0u8; 1]).unwrap(), 0);
    }

    #[test]
    fn test_truncated_entry_rejected() {
        let archive = MockArchive::new().with_stored("a/boot.img", b"abc");
        let mut entry = archive.entry("a/boot.img").unwrap().clone();
        entry.compressed_size += 1000;

        assert!(matches!(
            StreamingEntryReader::new(&archive, &entry),
            Err(ArchiveError::TruncatedEntry { .. })
        ));
    }
}
