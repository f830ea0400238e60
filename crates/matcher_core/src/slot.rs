use std::ops::Range;
use std::path::PathBuf;

use crate::torrent::ValidatedTorrentDescriptor;

/// The byte range in the torrent's virtual stream occupied by one torrent
/// file, together with its piece coverage and boundary geometry.
///
/// Slots tile the virtual stream exactly (`slots[i].offset_end ==
/// slots[i+1].offset_start`), and every piece is either interior to exactly
/// one slot or a boundary piece shared by exactly two consecutive slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub path_in_torrent: PathBuf,
    pub size: u64,
    pub offset_start: u64,
    pub offset_end: u64,

    pub first_piece: u32,
    pub last_piece: u32,

    /// Bytes the first piece borrows from the previous slot. Zero iff the
    /// slot starts piece-aligned.
    pub prefix_len: u32,
    /// Bytes the last piece borrows from the next slot. Zero iff the slot
    /// ends piece-aligned or is the final slot in the stream.
    pub suffix_len: u32,

    /// Pieces wholly contained in this slot (a contiguous, possibly-empty
    /// subrange of `first_piece..=last_piece`).
    pub interior_pieces: Range<u32>,
}

impl Slot {
    pub fn has_leading_boundary(&self) -> bool {
        self.prefix_len > 0
    }

    pub fn has_trailing_boundary(&self) -> bool {
        self.suffix_len > 0
    }

    /// True when the slot has no interior pieces at all — either it's smaller
    /// than one piece, or it sits entirely inside a single piece shared with
    /// neighbors. Verification in this case is deferred entirely to the
    /// boundary joiner.
    pub fn has_no_interior_pieces(&self) -> bool {
        self.interior_pieces.is_empty()
    }

    pub fn is_zero_length(&self) -> bool {
        self.size == 0
    }
}

/// Pure function from a validated [`TorrentDescriptor`] to its ordered slots.
/// Grounded in the same offset-accumulation shape as
/// `TorrentMetaV1Info::iter_file_details`, but makes the piece-index mapping
/// for each file's own pieces explicit rather than recomputing a global
/// offset on every lookup (see design note on the source's indexing bug).
pub fn build_slots(torrent: &ValidatedTorrentDescriptor) -> Vec<Slot> {
    let piece_length = torrent.piece_length() as u64;
    let mut offset = 0u64;
    let mut slots = Vec::with_capacity(torrent.files().len());

    for (index, file) in torrent.files().iter().enumerate() {
        let offset_start = offset;
        let size = file.length;
        let offset_end = offset_start + size;
        offset = offset_end;

        if size == 0 {
            let piece_at_start = (offset_start / piece_length) as u32;
            slots.push(Slot {
                index,
                path_in_torrent: file.relative_path.clone(),
                size,
                offset_start,
                offset_end,
                first_piece: piece_at_start,
                last_piece: piece_at_start,
                prefix_len: 0,
                suffix_len: 0,
                interior_pieces: piece_at_start..piece_at_start,
            });
            continue;
        }

        let first_piece = (offset_start / piece_length) as u32;
        let last_piece = ((offset_end - 1) / piece_length) as u32;

        let prefix_len = (offset_start % piece_length) as u32;

        let last_piece_end = (last_piece as u64 + 1) * piece_length;
        let suffix_len = if last_piece_end > offset_end && offset_end < torrent.total_length() {
            (last_piece_end - offset_end) as u32
        } else {
            0
        };

        // Interior pieces are those wholly contained in [offset_start, offset_end).
        // A piece k is interior iff k*piece_length >= offset_start and
        // (k+1)*piece_length <= offset_end.
        let interior_start = if prefix_len == 0 {
            first_piece
        } else {
            first_piece + 1
        };
        let interior_end_exclusive = if suffix_len == 0 {
            last_piece + 1
        } else {
            last_piece
        };
        let interior_pieces = if interior_start < interior_end_exclusive {
            interior_start..interior_end_exclusive
        } else {
            interior_start..interior_start
        };

        slots.push(Slot {
            index,
            path_in_torrent: file.relative_path.clone(),
            size,
            offset_start,
            offset_end,
            first_piece,
            last_piece,
            prefix_len,
            suffix_len,
            interior_pieces,
        });
    }

    slots
}
