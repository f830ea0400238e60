use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("torrent malformed: {0}")]
    TorrentMalformed(#[from] matcher_core::Error),

    #[error("candidate catalog unavailable: {0}")]
    CatalogUnavailable(#[source] sqlx::Error),

    #[error("candidate path missing from disk: {0}")]
    CandidatePathMissing(PathBuf),

    #[error("short read on {path:?} at offset {offset}: expected {expected} bytes, got {got}")]
    IoTruncated {
        path: PathBuf,
        offset: u64,
        expected: u64,
        got: u64,
    },

    #[error("i/o error reading {path:?}: {source}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("piece-hash cache write failed (non-fatal, continuing without persistence): {0}")]
    CacheWriteFailed(#[source] sqlx::Error),

    #[error("piece-hash cache read returned corrupt data, treating as a miss: {0}")]
    CacheReadCorrupt(String),

    #[error(
        "boundary combinatorial fallback exceeded {limit} candidate pairs at boundary piece {piece_index}"
    )]
    BoundaryFallbackOverflow { piece_index: u32, limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
