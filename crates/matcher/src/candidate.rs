use std::path::PathBuf;

use matcher_core::WholeFileHash;

/// One local file offered by the catalog as a possible occupant of a slot.
///
/// The catalog is the sole source of `whole_file_hash`: the matcher never
/// computes a whole-file hash itself, only piece-range hashes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    pub absolute_path: PathBuf,
    pub size: u64,
    pub whole_file_hash: WholeFileHash,
}
