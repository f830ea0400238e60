use std::collections::HashSet;

use itertools::Itertools;
use matcher_core::{Slot, ValidatedTorrentDescriptor};
use sha1w::{ISha1, ISha1Clonable, Sha1Rust};
use tracing::warn;

use crate::candidate::Candidate;
use crate::config::MatcherConfig;
use crate::error::Error;
use crate::hasher::{PieceHasher, Segment};

/// A run of slots that all share exactly one piece: `left` contributes a
/// tail, zero or more fully-sandwiched `mids` contribute their whole
/// content, and `right` contributes a head. Degenerates to the ordinary
/// two-slot boundary when `mids` is empty.
#[derive(Debug)]
struct BoundaryGroup {
    left: usize,
    mids: Vec<usize>,
    right: usize,
    piece_index: u32,
    tail_len: u32,
    head_len: u32,
}

/// Scans consecutive slots for boundary groups. A group starts at the first
/// slot with a trailing boundary and extends through any slots that sit
/// entirely inside the same piece, ending at the first slot whose own
/// trailing edge moves past that piece.
///
/// Zero-length slots contribute no bytes to the virtual stream and are
/// invisible to piece geometry (they never have a leading or trailing
/// boundary), but a zero-length file can still land exactly at a piece
/// junction by coincidence, giving it `first_piece == last_piece == p` for
/// whatever piece borders it. Scanning over them directly would let one be
/// mistaken for the group's right anchor — cutting the chain short before it
/// reaches the real slot on the other side of the boundary. So the scan
/// walks only the non-zero-length slots; zero-length slots never appear in a
/// group and are left for the orchestrator to resolve on their own.
fn find_boundary_groups(slots: &[Slot], piece_length: u32) -> Vec<BoundaryGroup> {
    let significant: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_zero_length())
        .map(|(i, _)| i)
        .collect();

    let mut groups = Vec::new();
    let mut ii = 0;
    while ii + 1 < significant.len() {
        let i = significant[ii];
        if !slots[i].has_trailing_boundary() {
            ii += 1;
            continue;
        }
        let p = slots[i].last_piece;
        let mut mids = Vec::new();
        let mut jj = ii + 1;
        // A slot keeps the chain going only while it is itself fully inside
        // piece p *and* still has its own trailing boundary to resolve; the
        // first slot that either moves past p or terminates inside it
        // (no further trailing boundary) is the group's right anchor.
        while jj < significant.len()
            && slots[significant[jj]].first_piece == p
            && slots[significant[jj]].last_piece == p
            && slots[significant[jj]].has_trailing_boundary()
        {
            mids.push(significant[jj]);
            jj += 1;
        }
        debug_assert!(
            jj < significant.len(),
            "boundary piece {p} never reaches a right anchor slot"
        );
        let j = significant[jj];
        groups.push(BoundaryGroup {
            left: i,
            mids,
            right: j,
            piece_index: p,
            tail_len: piece_length - slots[i].suffix_len,
            head_len: piece_length - slots[j].prefix_len,
        });
        ii = jj;
    }
    groups
}

/// Narrows the interior-verified survivor sets across all cross-file piece
/// boundaries to a fixed point. `survivors[k]` holds slot `k`'s current
/// candidate list; zero-length slots and slots with no boundaries at all
/// pass through untouched.
pub async fn join_boundaries(
    slots: &[Slot],
    torrent: &ValidatedTorrentDescriptor,
    mut survivors: Vec<Vec<Candidate>>,
    hasher: &PieceHasher,
    config: &MatcherConfig,
) -> Vec<Vec<Candidate>> {
    let groups = find_boundary_groups(slots, torrent.piece_length());
    if groups.is_empty() {
        return survivors;
    }

    let max_passes = 2 * groups.len().max(1) + 1;
    for _ in 0..max_passes {
        let mut changed = false;
        for group in &groups {
            if process_group(group, torrent, &mut survivors, hasher, config).await {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    survivors
}

/// Verifies one boundary group and narrows its participants' survivor lists
/// in place. Returns whether any list changed.
async fn process_group(
    group: &BoundaryGroup,
    torrent: &ValidatedTorrentDescriptor,
    survivors: &mut [Vec<Candidate>],
    hasher: &PieceHasher,
    config: &MatcherConfig,
) -> bool {
    let Some(expected) = torrent.digest(group.piece_index) else {
        return false;
    };

    let participant_slots: Vec<usize> = std::iter::once(group.left)
        .chain(group.mids.iter().copied())
        .chain(std::iter::once(group.right))
        .collect();

    let product_size: usize = participant_slots
        .iter()
        .map(|&s| survivors[s].len())
        .product();

    if product_size == 0 {
        return false;
    }

    if product_size > config.boundary_fallback_limit {
        let err = Error::BoundaryFallbackOverflow {
            piece_index: group.piece_index,
            limit: config.boundary_fallback_limit,
        };
        warn!(%err, product_size, "keeping all candidates as possible matches (false-positive biased)");
        return false;
    }

    let matched: Vec<HashSet<usize>> = if group.mids.is_empty() {
        match_pair(
            group,
            &expected,
            &survivors[group.left],
            &survivors[group.right],
            hasher,
        )
        .await
    } else {
        match_sandwich(group, &expected, &participant_slots, survivors, hasher).await
    };

    let mut changed = false;
    for (pos, &slot_index) in participant_slots.iter().enumerate() {
        let kept: Vec<Candidate> = survivors[slot_index]
            .iter()
            .enumerate()
            .filter(|(i, _)| matched[pos].contains(i))
            .map(|(_, c)| c.clone())
            .collect();
        if kept.len() != survivors[slot_index].len() {
            changed = true;
        }
        survivors[slot_index] = kept;
    }
    changed
}

/// The ordinary two-slot case, using the snapshot-and-clone optimization:
/// each left candidate's tail is hashed once, then the resulting mid-state
/// is cloned once per right candidate rather than re-hashing the tail.
async fn match_pair(
    group: &BoundaryGroup,
    expected: &matcher_core::PieceDigest,
    left: &[Candidate],
    right: &[Candidate],
    hasher: &PieceHasher,
) -> Vec<HashSet<usize>> {
    let mut left_matched = HashSet::new();
    let mut right_matched = HashSet::new();

    let mut head_bytes = Vec::with_capacity(right.len());
    for r in right {
        let bytes = hasher.read_range(&r.absolute_path, 0, group.head_len as u64).await;
        head_bytes.push(bytes.ok());
    }

    for (li, l) in left.iter().enumerate() {
        let tail_offset = l.size.saturating_sub(group.tail_len as u64);
        let Ok(tail) = hasher.read_range(&l.absolute_path, tail_offset, group.tail_len as u64).await else {
            continue;
        };
        let mut snapshot = Sha1Rust::new();
        snapshot.update(&tail);

        for (ri, head) in head_bytes.iter().enumerate() {
            let Some(head) = head else { continue };
            let h = fork_and_feed(&snapshot, head);
            let digest = matcher_core::PieceDigest::from_slice(&h.finish())
                .expect("ISha1::finish always returns 20 bytes");
            if digest == *expected {
                left_matched.insert(li);
                right_matched.insert(ri);
            }
        }
    }

    vec![left_matched, right_matched]
}

/// Forks a snapshotted hasher without disturbing it, so the same tail
/// snapshot can be tried against every right-candidate's head bytes.
fn fork_and_feed<H: ISha1Clonable>(snapshot: &H, bytes: &[u8]) -> H {
    let mut h = snapshot.clone();
    h.update(bytes);
    h
}

/// The sandwiched-file case: one or more slots sit entirely inside the
/// boundary piece between `left` and `right`. Every combination of
/// candidates across all participants is tried and compared against the
/// single shared piece digest; cheaper snapshotting doesn't apply because
/// every participant, not just the ends, varies across the product.
async fn match_sandwich(
    group: &BoundaryGroup,
    expected: &matcher_core::PieceDigest,
    participant_slots: &[usize],
    survivors: &[Vec<Candidate>],
    hasher: &PieceHasher,
) -> Vec<HashSet<usize>> {
    let lists: Vec<&Vec<Candidate>> = participant_slots.iter().map(|&s| &survivors[s]).collect();
    let mut matched: Vec<HashSet<usize>> = vec![HashSet::new(); lists.len()];

    let index_lists: Vec<Vec<usize>> = lists.iter().map(|l| (0..l.len()).collect()).collect();

    for combo in index_lists.into_iter().multi_cartesian_product() {
        let mut segments = Vec::with_capacity(lists.len());
        for (pos, &idx) in combo.iter().enumerate() {
            let candidate = &lists[pos][idx];
            let (offset, length) = if pos == 0 {
                (
                    candidate.size.saturating_sub(group.tail_len as u64),
                    group.tail_len as u64,
                )
            } else if pos + 1 == lists.len() {
                (0, group.head_len as u64)
            } else {
                (0, candidate.size)
            };
            segments.push(Segment {
                path: candidate.absolute_path.clone(),
                offset,
                length,
            });
        }

        let Ok(digest) = hasher.hash_stitched(&segments).await else {
            continue;
        };
        if digest == *expected {
            for (pos, &idx) in combo.iter().enumerate() {
                matched[pos].insert(idx);
            }
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher_core::{build_slots, TorrentDescriptor, TorrentFile};
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn sha1(bytes: &[u8]) -> matcher_core::PieceDigest {
        let mut h = Sha1Rust::new();
        h.update(bytes);
        matcher_core::PieceDigest::from_slice(&h.finish()).unwrap()
    }

    fn candidate(path: &std::path::Path, size: u64) -> Candidate {
        Candidate {
            absolute_path: path.to_owned(),
            size,
            whole_file_hash: format!("{}", path.display()).into(),
        }
    }

    #[tokio::test]
    async fn straddling_piece_accepts_only_correct_pair() {
        // piece_length = 20, f1 = 15 bytes, f2 = 25 bytes; piece 0 straddles
        // at offset 15, taking 5 bytes from f2.
        let piece_length = 20u32;
        let f1_content = b"012345678901234"; // 15 bytes
        let f2_content = b"abcdefghijklmnopqrstuvwxy"; // 25 bytes
        assert_eq!(f1_content.len(), 15);
        assert_eq!(f2_content.len(), 25);

        let mut whole = f1_content.to_vec();
        whole.extend_from_slice(f2_content);
        let piece_digests: Vec<u8> = whole
            .chunks(piece_length as usize)
            .flat_map(|c| sha1(c).as_ref().to_vec())
            .collect();

        let torrent = TorrentDescriptor {
            piece_length,
            piece_digests,
            files: vec![
                TorrentFile {
                    relative_path: "f1".into(),
                    length: 15,
                },
                TorrentFile {
                    relative_path: "f2".into(),
                    length: 25,
                },
            ],
        }
        .validate()
        .unwrap();
        let slots = build_slots(&torrent);
        assert!(slots[0].has_trailing_boundary());
        assert!(slots[1].has_leading_boundary());

        let f1_right = write_temp(f1_content);
        let f1_wrong = write_temp(b"000000000000000");
        let f2_right = write_temp(f2_content);

        let survivors = vec![
            vec![candidate(f1_right.path(), 15), candidate(f1_wrong.path(), 15)],
            vec![candidate(f2_right.path(), 25)],
        ];

        let hasher = PieceHasher::new(4);
        let config = MatcherConfig::default();
        let out = join_boundaries(&slots, &torrent, survivors, &hasher, &config).await;

        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].absolute_path, f1_right.path());
        assert_eq!(out[1].len(), 1);
    }

    #[tokio::test]
    async fn ambiguous_boundary_keeps_both_left_candidates() {
        let piece_length = 10u32;
        let f1_content = b"01234567"; // 8 bytes, tail_len = 2
        let f2_content = b"abcdefgh"; // 8 bytes, head_len = 8

        let mut whole = f1_content.to_vec();
        whole.extend_from_slice(f2_content);
        let piece_digests: Vec<u8> = sha1(&whole).as_ref().to_vec();

        let torrent = TorrentDescriptor {
            piece_length,
            piece_digests,
            files: vec![
                TorrentFile {
                    relative_path: "f1".into(),
                    length: 8,
                },
                TorrentFile {
                    relative_path: "f2".into(),
                    length: 8,
                },
            ],
        }
        .validate()
        .unwrap();
        let slots = build_slots(&torrent);

        // two left candidates share the same last 2 bytes ("67") so both
        // pair correctly with the single right candidate.
        let left_a = write_temp(b"AAAAAA67");
        let left_b = write_temp(b"BBBBBB67");
        let right = write_temp(f2_content);

        let survivors = vec![
            vec![candidate(left_a.path(), 8), candidate(left_b.path(), 8)],
            vec![candidate(right.path(), 8)],
        ];

        let hasher = PieceHasher::new(4);
        let config = MatcherConfig::default();
        let out = join_boundaries(&slots, &torrent, survivors, &hasher, &config).await;

        assert_eq!(out[0].len(), 2);
        assert_eq!(out[1].len(), 1);
    }

    #[tokio::test]
    async fn sandwiched_tiny_file_uses_triple_stitch() {
        // piece_length = 20: f1 = 12 (prefix 0, suffix 8), f2 = 3 (fully
        // inside the piece), f3 = 5 then continues (first_piece == last
        // piece == 0 for f2; f3 absorbs the remaining 5 bytes of piece 0
        // then starts piece 1 only if it's longer — keep f3 short so piece
        // 0 is exactly filled and f3 has no further pieces).
        let piece_length = 20u32;
        let f1 = b"012345678901"; // 12
        let f2 = b"abc"; // 3
        let f3 = b"XYZZY"; // 5, 12+3+5=20 exactly fills piece 0

        let mut whole = f1.to_vec();
        whole.extend_from_slice(f2);
        whole.extend_from_slice(f3);
        assert_eq!(whole.len(), 20);
        let piece_digests = sha1(&whole).as_ref().to_vec();

        let torrent = TorrentDescriptor {
            piece_length,
            piece_digests,
            files: vec![
                TorrentFile {
                    relative_path: "f1".into(),
                    length: 12,
                },
                TorrentFile {
                    relative_path: "f2".into(),
                    length: 3,
                },
                TorrentFile {
                    relative_path: "f3".into(),
                    length: 5,
                },
            ],
        }
        .validate()
        .unwrap();
        let slots = build_slots(&torrent);
        assert!(slots[1].has_no_interior_pieces());
        assert_eq!(slots[1].first_piece, slots[1].last_piece);

        let f1_file = write_temp(f1);
        let f2_file = write_temp(f2);
        let f3_file = write_temp(f3);

        let survivors = vec![
            vec![candidate(f1_file.path(), 12)],
            vec![candidate(f2_file.path(), 3)],
            vec![candidate(f3_file.path(), 5)],
        ];

        let hasher = PieceHasher::new(4);
        let config = MatcherConfig::default();
        let out = join_boundaries(&slots, &torrent, survivors, &hasher, &config).await;

        assert_eq!(out[0].len(), 1);
        assert_eq!(out[1].len(), 1);
        assert_eq!(out[2].len(), 1);
    }
}
