#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("torrent malformed: piece_length is 0")]
    ZeroPieceLength,

    #[error(
        "torrent malformed: pieces length {pieces_len} is not a multiple of 20 (piece_count would be {expected_piece_count})"
    )]
    PieceDigestsLengthMismatch {
        pieces_len: usize,
        expected_piece_count: u64,
    },

    #[error(
        "torrent malformed: expected {expected} piece digests for total length {total_length} at piece_length {piece_length}, found {found}"
    )]
    PieceCountMismatch {
        expected: u64,
        found: u64,
        total_length: u64,
        piece_length: u32,
    },

    #[error("torrent malformed: no files listed")]
    NoFiles,

    #[error("torrent malformed: total length overflowed u64")]
    LengthOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;
