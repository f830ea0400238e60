use std::path::PathBuf;

use crate::digest::PieceDigest;
use crate::error::{Error, Result};

/// One file entry as listed in the torrent's file tree, already decoded.
///
/// The core never parses metainfo bytes (that happens at the edge, e.g. in a
/// CLI that decodes a `.torrent` file); it only ever sees this already-decoded
/// shape.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TorrentFile {
    pub relative_path: PathBuf,
    pub length: u64,
}

/// Immutable input to a match: a torrent's piece layout and file list.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TorrentDescriptor {
    pub piece_length: u32,
    /// Contiguous SHA-1 digests, one per piece, in piece order.
    pub piece_digests: Vec<u8>,
    pub files: Vec<TorrentFile>,
}

/// A [`TorrentDescriptor`] that has passed [`TorrentDescriptor::validate`].
///
/// Carries the derived `total_length` and `piece_count` so callers don't
/// recompute them.
#[derive(Debug, Clone)]
pub struct ValidatedTorrentDescriptor {
    inner: TorrentDescriptor,
    total_length: u64,
    piece_count: u32,
}

impl TorrentDescriptor {
    /// Checks the invariants from the data model: non-zero piece length, a
    /// `pieces` buffer whose length is exactly `20 * piece_count`, and at
    /// least one file. Corresponds to `TorrentMalformed` in the error design.
    pub fn validate(self) -> Result<ValidatedTorrentDescriptor> {
        if self.piece_length == 0 {
            return Err(Error::ZeroPieceLength);
        }
        if self.files.is_empty() {
            return Err(Error::NoFiles);
        }
        if self.piece_digests.len() % PieceDigest::LEN != 0 {
            return Err(Error::PieceDigestsLengthMismatch {
                pieces_len: self.piece_digests.len(),
                expected_piece_count: (self.piece_digests.len() / PieceDigest::LEN) as u64,
            });
        }

        let total_length: u64 = self
            .files
            .iter()
            .try_fold(0u64, |acc, f| acc.checked_add(f.length))
            .ok_or(Error::LengthOverflow)?;

        let expected_piece_count = if total_length == 0 {
            0
        } else {
            total_length.div_ceil(self.piece_length as u64)
        };
        let found_piece_count = (self.piece_digests.len() / PieceDigest::LEN) as u64;

        if expected_piece_count != found_piece_count {
            return Err(Error::PieceCountMismatch {
                expected: expected_piece_count,
                found: found_piece_count,
                total_length,
                piece_length: self.piece_length,
            });
        }

        Ok(ValidatedTorrentDescriptor {
            inner: self,
            total_length,
            piece_count: found_piece_count as u32,
        })
    }
}

impl ValidatedTorrentDescriptor {
    pub fn piece_length(&self) -> u32 {
        self.inner.piece_length
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn files(&self) -> &[TorrentFile] {
        &self.inner.files
    }

    /// The byte length of `piece_index` — `piece_length` for every piece
    /// except a possibly-shorter final piece, or `None` if out of range.
    pub fn piece_len_at(&self, piece_index: u32) -> Option<u32> {
        if piece_index >= self.piece_count {
            return None;
        }
        if piece_index + 1 == self.piece_count {
            let start = piece_index as u64 * self.inner.piece_length as u64;
            Some((self.total_length - start) as u32)
        } else {
            Some(self.inner.piece_length)
        }
    }

    /// The 20-byte digest for `piece_index`, or `None` if out of range.
    pub fn digest(&self, piece_index: u32) -> Option<PieceDigest> {
        if piece_index >= self.piece_count {
            return None;
        }
        let start = piece_index as usize * PieceDigest::LEN;
        let end = start + PieceDigest::LEN;
        PieceDigest::from_slice(self.inner.piece_digests.get(start..end)?)
    }

    pub fn into_inner(self) -> TorrentDescriptor {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digests(n: usize) -> Vec<u8> {
        vec![0u8; n * PieceDigest::LEN]
    }

    #[test]
    fn validate_accepts_well_formed_descriptor() {
        let d = TorrentDescriptor {
            piece_length: 16,
            piece_digests: digests(3),
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: 33,
            }],
        };
        let v = d.validate().unwrap();
        assert_eq!(v.piece_count(), 3);
        assert_eq!(v.total_length(), 33);
    }

    #[test]
    fn validate_rejects_zero_piece_length() {
        let d = TorrentDescriptor {
            piece_length: 0,
            piece_digests: digests(1),
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: 1,
            }],
        };
        assert!(matches!(d.validate(), Err(Error::ZeroPieceLength)));
    }

    #[test]
    fn validate_rejects_mismatched_piece_count() {
        let d = TorrentDescriptor {
            piece_length: 16,
            piece_digests: digests(2), // should be 3
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: 33,
            }],
        };
        assert!(matches!(d.validate(), Err(Error::PieceCountMismatch { .. })));
    }

    #[test]
    fn piece_len_at_reports_short_final_piece() {
        let d = TorrentDescriptor {
            piece_length: 16,
            piece_digests: digests(3),
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: 33,
            }],
        };
        let v = d.validate().unwrap();
        assert_eq!(v.piece_len_at(0), Some(16));
        assert_eq!(v.piece_len_at(1), Some(16));
        assert_eq!(v.piece_len_at(2), Some(1));
        assert_eq!(v.piece_len_at(3), None);
    }

    #[test]
    fn validate_rejects_empty_file_list() {
        let d = TorrentDescriptor {
            piece_length: 16,
            piece_digests: vec![],
            files: vec![],
        };
        assert!(matches!(d.validate(), Err(Error::NoFiles)));
    }
}
