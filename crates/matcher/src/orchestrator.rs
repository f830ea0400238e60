use std::sync::Arc;

use matcher_core::{build_slots, TorrentDescriptor};
use tracing::info;

use crate::candidate::Candidate;
use crate::catalog::{filter_existing, CandidateSource};
use crate::config::MatcherConfig;
use crate::error::Result;
use crate::hasher::PieceHasher;
use crate::interior::verify_interior;
use crate::piece_store::PieceHashStore;
use crate::boundary::join_boundaries;

/// One torrent file's final match outcome: every accepted local path, in
/// the order the catalog returned its candidates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SlotResult {
    pub path: std::path::PathBuf,
    pub size: u64,
    pub locations: Vec<std::path::PathBuf>,
}

/// Wires the piece-hash cache, hasher, and file catalog together and drives
/// a full match for one torrent: build slots, fetch and verify candidates
/// per slot, then reconcile candidates across cross-file piece boundaries.
pub struct Matcher {
    catalog: Arc<dyn CandidateSource>,
    store: Arc<PieceHashStore>,
    hasher: Arc<PieceHasher>,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(
        catalog: Arc<dyn CandidateSource>,
        store: Arc<PieceHashStore>,
        config: MatcherConfig,
    ) -> Self {
        let hasher = Arc::new(PieceHasher::new(config.io_concurrency));
        Self {
            catalog,
            store,
            hasher,
            config,
        }
    }

    pub async fn run(&self, torrent: TorrentDescriptor) -> Result<Vec<SlotResult>> {
        let torrent = torrent.validate()?;
        let torrent = &torrent;
        let slots = build_slots(torrent);
        info!(slots = slots.len(), total_length = torrent.total_length(), "starting match");

        // Zero-length files are special-cased per the design's chosen
        // reading of "any local zero-length file" vs. "all of them": every
        // zero-length file in the catalog is reported as a location for
        // every zero-length slot, since content equality is vacuous.
        let zero_length_candidates = if slots.iter().any(|s| s.is_zero_length()) {
            let all = self.catalog.candidates_for_size(0).await?;
            filter_existing(all).await
        } else {
            Vec::new()
        };

        let mut interior_survivors = Vec::with_capacity(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            if slot.is_zero_length() {
                interior_survivors.push(zero_length_candidates.clone());
                continue;
            }

            let raw = self.catalog.candidates_for_size(slot.size).await?;
            let raw = apply_candidate_cap(raw, self.config.max_candidates_per_slot);
            let existing = filter_existing(raw).await;
            let survivors =
                verify_interior(slot, torrent, existing, &self.store, &self.hasher).await;
            info!(
                slot = i,
                candidates = survivors.len(),
                "interior verification complete"
            );
            interior_survivors.push(survivors);
        }

        let final_survivors = join_boundaries(
            &slots,
            torrent,
            interior_survivors,
            &self.hasher,
            &self.config,
        )
        .await;

        Ok(slots
            .iter()
            .zip(final_survivors)
            .map(|(slot, candidates)| SlotResult {
                path: slot.path_in_torrent.clone(),
                size: slot.size,
                locations: candidates.into_iter().map(|c| c.absolute_path).collect(),
            })
            .collect())
    }
}

fn apply_candidate_cap(mut candidates: Vec<Candidate>, cap: Option<usize>) -> Vec<Candidate> {
    if let Some(cap) = cap {
        if candidates.len() > cap {
            tracing::warn!(
                available = candidates.len(),
                cap,
                "truncating candidate list for slot to configured cap"
            );
            candidates.truncate(cap);
        }
    }
    candidates
}
