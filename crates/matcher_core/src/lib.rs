pub mod digest;
pub mod error;
pub mod slot;
pub mod torrent;

pub use digest::{PieceDigest, WholeFileHash};
pub use error::{Error, Result};
pub use slot::{build_slots, Slot};
pub use torrent::{TorrentDescriptor, TorrentFile, ValidatedTorrentDescriptor};
