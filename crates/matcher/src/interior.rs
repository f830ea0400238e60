use std::collections::HashMap;
use std::sync::Arc;

use matcher_core::{PieceDigest, Slot, ValidatedTorrentDescriptor};
use tracing::debug;

use crate::candidate::Candidate;
use crate::hasher::PieceHasher;
use crate::piece_store::PieceHashStore;

/// Verifies every candidate of one slot against that slot's interior
/// pieces, independently and in parallel. Slots with no interior pieces at
/// all pass every candidate through unconditionally — verification for
/// those is deferred entirely to the boundary joiner.
pub async fn verify_interior(
    slot: &Slot,
    torrent: &ValidatedTorrentDescriptor,
    candidates: Vec<Candidate>,
    store: &Arc<PieceHashStore>,
    hasher: &Arc<PieceHasher>,
) -> Vec<Candidate> {
    if slot.has_no_interior_pieces() {
        return candidates;
    }

    let checks = candidates
        .into_iter()
        .map(|candidate| {
            let slot = slot.clone();
            let store = store.clone();
            let hasher = hasher.clone();
            async move {
                match verify_one(&slot, torrent, &candidate, &store, &hasher).await {
                    true => Some(candidate),
                    false => None,
                }
            }
        })
        .collect::<Vec<_>>();

    futures::future::join_all(checks)
        .await
        .into_iter()
        .flatten()
        .collect()
}

async fn verify_one(
    slot: &Slot,
    torrent: &ValidatedTorrentDescriptor,
    candidate: &Candidate,
    store: &Arc<PieceHashStore>,
    hasher: &Arc<PieceHasher>,
) -> bool {
    let cached = store
        .lookup(&candidate.whole_file_hash, torrent.piece_length())
        .await;

    let mut pending = Vec::new();
    for piece_index in slot.interior_pieces.clone() {
        let Some(expected) = torrent.digest(piece_index) else {
            return false;
        };
        if let Some(digest) = cached.get(&piece_index) {
            if *digest != expected {
                debug!(path = %candidate.absolute_path.display(), piece_index, "interior piece mismatch (cached), eliminating candidate");
                return false;
            }
            continue;
        }
        pending.push((piece_index, expected));
    }

    if pending.is_empty() {
        return true;
    }

    let mut handles = Vec::with_capacity(pending.len());
    for (piece_index, expected) in &pending {
        let local_offset = *piece_index as u64 * torrent.piece_length() as u64 - slot.offset_start;
        let Some(len) = torrent.piece_len_at(*piece_index) else {
            return false;
        };
        let path = candidate.absolute_path.clone();
        let hasher = hasher.clone();
        let expected = *expected;
        handles.push(tokio::spawn(async move {
            let digest = hasher.hash_range(&path, local_offset, len as u64).await;
            (digest, expected)
        }));
    }

    let mut newly_computed: HashMap<u32, PieceDigest> = HashMap::with_capacity(pending.len());
    let mut eliminated = false;
    for (i, handle) in handles.into_iter().enumerate() {
        if eliminated {
            handle.abort();
            continue;
        }
        let piece_index = pending[i].0;
        match handle.await {
            Ok((Ok(digest), expected)) if digest == expected => {
                newly_computed.insert(piece_index, digest);
            }
            Ok((Ok(_), _)) => {
                debug!(path = %candidate.absolute_path.display(), piece_index, "interior piece mismatch, eliminating candidate");
                eliminated = true;
            }
            Ok((Err(e), _)) => {
                debug!(path = %candidate.absolute_path.display(), piece_index, error = %e, "interior piece read failed, eliminating candidate");
                eliminated = true;
            }
            Err(_join_err) => {
                eliminated = true;
            }
        }
    }

    if eliminated {
        return false;
    }

    if !newly_computed.is_empty() {
        store
            .store(
                candidate.whole_file_hash.clone(),
                torrent.piece_length(),
                newly_computed,
            )
            .await;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher_core::{build_slots, TorrentDescriptor, TorrentFile};
    use sha1w::{ISha1, Sha1Rust};
    use std::io::Write;

    fn sha1(bytes: &[u8]) -> PieceDigest {
        let mut h = Sha1Rust::new();
        h.update(bytes);
        PieceDigest::from_slice(&h.finish()).unwrap()
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn candidate(path: &std::path::Path, size: u64) -> Candidate {
        Candidate {
            absolute_path: path.to_owned(),
            size,
            whole_file_hash: format!("{}", path.display()).into(),
        }
    }

    #[tokio::test]
    async fn exact_match_survives() {
        let piece_length = 8u32;
        let content = b"01234567890123456789012"; // 24 bytes, 3 pieces, aligned single file
        let piece_digests: Vec<u8> = content
            .chunks(piece_length as usize)
            .flat_map(|c| sha1(c).as_ref().to_vec())
            .collect();

        let torrent = TorrentDescriptor {
            piece_length,
            piece_digests,
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: content.len() as u64,
            }],
        }
        .validate()
        .unwrap();
        let slots = build_slots(&torrent);

        let f = write_temp(content);
        let store = Arc::new(PieceHashStore::in_memory());
        let hasher = Arc::new(PieceHasher::new(4));

        let out = verify_interior(
            &slots[0],
            &torrent,
            vec![candidate(f.path(), content.len() as u64)],
            &store,
            &hasher,
        )
        .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn wrong_content_is_eliminated() {
        let piece_length = 8u32;
        let content = b"01234567890123456789012";
        let piece_digests: Vec<u8> = content
            .chunks(piece_length as usize)
            .flat_map(|c| sha1(c).as_ref().to_vec())
            .collect();

        let torrent = TorrentDescriptor {
            piece_length,
            piece_digests,
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: content.len() as u64,
            }],
        }
        .validate()
        .unwrap();
        let slots = build_slots(&torrent);

        let mut wrong = content.to_vec();
        wrong[piece_length as usize] ^= 0xFF;
        let f = write_temp(&wrong);

        let store = Arc::new(PieceHashStore::in_memory());
        let hasher = Arc::new(PieceHasher::new(4));

        let out = verify_interior(
            &slots[0],
            &torrent,
            vec![candidate(f.path(), content.len() as u64)],
            &store,
            &hasher,
        )
        .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_avoids_hash_range_call() {
        let piece_length = 8u32;
        let content = b"01234567";
        let digest = sha1(content);

        let torrent = TorrentDescriptor {
            piece_length,
            piece_digests: digest.as_ref().to_vec(),
            files: vec![TorrentFile {
                relative_path: "a.bin".into(),
                length: 8,
            }],
        }
        .validate()
        .unwrap();
        let slots = build_slots(&torrent);

        let f = write_temp(b"garbage!"); // content on disk is irrelevant: cache wins
        let c = candidate(f.path(), 8);

        let store = Arc::new(PieceHashStore::in_memory());
        let mut seed = HashMap::new();
        seed.insert(0u32, digest);
        store.store(c.whole_file_hash.clone(), piece_length, seed).await;

        let hasher = Arc::new(PieceHasher::new(4));
        let out = verify_interior(&slots[0], &torrent, vec![c], &store, &hasher).await;
        assert_eq!(out.len(), 1);
    }
}
