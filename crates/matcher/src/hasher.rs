use std::path::Path;
use std::sync::Arc;

use matcher_core::PieceDigest;
use sha1w::{ISha1, Sha1Rust};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// One contiguous byte range of one on-disk file, as consumed by
/// [`PieceHasher::hash_stitched`]. Segments are fed into a single SHA-1
/// context in order, letting a piece that straddles a file boundary be
/// hashed without materializing it as one contiguous buffer first.
#[derive(Debug, Clone)]
pub struct Segment {
    pub path: std::path::PathBuf,
    pub offset: u64,
    pub length: u64,
}

/// Bounds concurrent file I/O for piece hashing and the boundary joiner's
/// raw byte reads. One permit is held for the full duration of a single
/// `hash_range` or `hash_stitched` call, not per-file-open.
pub struct PieceHasher {
    io_permits: Arc<Semaphore>,
}

impl PieceHasher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            io_permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Hashes `length` bytes of `path` starting at `offset`. Errors with
    /// [`Error::IoTruncated`] on a short read rather than hashing a partial
    /// buffer, since a truncated candidate can otherwise produce a digest
    /// that spuriously fails to match (masking the real cause).
    pub async fn hash_range(&self, path: &Path, offset: u64, length: u64) -> Result<PieceDigest> {
        let bytes = self.read_range(path, offset, length).await?;
        Ok(digest_bytes(&bytes))
    }

    /// Reads `length` bytes of `path` at `offset`, bounded by the same
    /// concurrency budget as [`Self::hash_range`]. Used by the boundary
    /// joiner, which needs the raw tail/head bytes rather than a finished
    /// digest so it can feed them into a shared, partially-fed hasher.
    pub async fn read_range(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        let _permit = self
            .io_permits
            .acquire()
            .await
            .expect("semaphore is never closed");

        if length == 0 {
            return Ok(Vec::new());
        }

        let path = path.to_owned();
        let result = tokio::task::spawn_blocking(move || read_range_blocking(&path, offset, length))
            .await
            .expect("blocking read task panicked");
        result
    }

    /// Hashes a sequence of segments, possibly spanning several files, as a
    /// single SHA-1 stream — the shape needed for a slot whose whole span
    /// lives inside one shared piece (no interior pieces at all).
    pub async fn hash_stitched(&self, segments: &[Segment]) -> Result<PieceDigest> {
        let _permit = self
            .io_permits
            .acquire()
            .await
            .expect("semaphore is never closed");

        let segments = segments.to_vec();
        let result =
            tokio::task::spawn_blocking(move || hash_stitched_blocking(&segments)).await;
        result.expect("blocking hash task panicked")
    }
}

fn digest_bytes(bytes: &[u8]) -> PieceDigest {
    let mut h = Sha1Rust::new();
    h.update(bytes);
    PieceDigest::from_slice(&h.finish()).expect("ISha1::finish always returns 20 bytes")
}

fn read_range_blocking(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};

    let mut file = std::fs::File::open(path).map_err(|source| Error::IoRead {
        path: path.to_owned(),
        source,
    })?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|source| Error::IoRead {
            path: path.to_owned(),
            source,
        })?;

    let mut buf = vec![0u8; length as usize];
    let mut got = 0u64;
    loop {
        let n = file.read(&mut buf[got as usize..]).map_err(|source| Error::IoRead {
            path: path.to_owned(),
            source,
        })?;
        if n == 0 {
            break;
        }
        got += n as u64;
        if got == length {
            break;
        }
    }

    if got != length {
        return Err(Error::IoTruncated {
            path: path.to_owned(),
            offset,
            expected: length,
            got,
        });
    }
    Ok(buf)
}

fn hash_stitched_blocking(segments: &[Segment]) -> Result<PieceDigest> {
    let mut h = Sha1Rust::new();
    for seg in segments {
        let bytes = read_range_blocking(&seg.path, seg.offset, seg.length)?;
        h.update(&bytes);
    }
    Ok(PieceDigest::from_slice(&h.finish()).expect("ISha1::finish always returns 20 bytes"))
}

/// Just the async-disabled, non-semaphore-bound synchronous reader, exposed
/// for the boundary joiner to snapshot small amounts of candidate bytes it
/// already holds a permit for via [`PieceHasher::read_range`].
pub fn digest_of(bytes: &[u8]) -> PieceDigest {
    digest_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[tokio::test]
    async fn hash_range_matches_reference_digest() {
        let f = write_temp(b"hello world");
        let hasher = PieceHasher::new(2);
        let got = hasher
            .hash_range(f.path(), 0, 11)
            .await
            .unwrap();
        assert_eq!(got, digest_of(b"hello world"));
    }

    #[tokio::test]
    async fn hash_range_rejects_short_read() {
        let f = write_temp(b"short");
        let hasher = PieceHasher::new(2);
        let err = hasher.hash_range(f.path(), 0, 100).await.unwrap_err();
        assert!(matches!(err, Error::IoTruncated { .. }));
    }

    #[tokio::test]
    async fn hash_range_zero_length_is_empty_digest() {
        let f = write_temp(b"anything");
        let hasher = PieceHasher::new(2);
        let got = hasher.hash_range(f.path(), 0, 0).await.unwrap();
        assert_eq!(got, digest_of(b""));
    }

    #[tokio::test]
    async fn hash_stitched_matches_concatenation_across_files() {
        let a = write_temp(b"abc");
        let b = write_temp(b"defgh");
        let hasher = PieceHasher::new(2);
        let segments = vec![
            Segment {
                path: a.path().to_owned(),
                offset: 0,
                length: 3,
            },
            Segment {
                path: b.path().to_owned(),
                offset: 0,
                length: 5,
            },
        ];
        let got = hasher.hash_stitched(&segments).await.unwrap();
        assert_eq!(got, digest_of(b"abcdefgh"));
    }
}
