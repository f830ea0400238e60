/// Tunables for one matcher run. Grounded in the same flat, serializable
/// config-struct-with-`Default` shape used throughout the session layer
/// (e.g. the rate limiter config), rather than scattering magic numbers
/// through the engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Upper bound on concurrent file range reads, shared by the piece
    /// hasher and the boundary joiner's raw byte reads. One unit of this
    /// budget is held for the full duration of a stitched multi-segment hash.
    pub io_concurrency: usize,

    /// Upper bound on candidate pairs considered per boundary piece before
    /// the joiner gives up on narrowing it down and falls back to the
    /// conservative cross-product.
    pub boundary_fallback_limit: usize,

    /// Optional cap on the number of size-matched candidates considered per
    /// slot, applied after the catalog's stable ordering. `None` means
    /// unbounded.
    pub max_candidates_per_slot: Option<usize>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            io_concurrency: 8,
            boundary_fallback_limit: 10_000,
            max_candidates_per_slot: None,
        }
    }
}
