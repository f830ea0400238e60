use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use matcher_core::{PieceDigest, WholeFileHash};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tracing::warn;

/// Key a cached piece-digest map by the file's whole-file hash and the
/// piece length it was hashed under — the same bytes hashed at a different
/// piece_length produce an unrelated set of digests.
type CacheKey = (WholeFileHash, u32);

/// Persistent store for piece digests already computed for a given file.
///
/// Holds an in-memory layer (always consulted first, always updated on a
/// successful `store`) backed by an on-disk sqlite table. Persistence
/// failures are logged and swallowed: the cache is an optimization, never a
/// correctness dependency, so a store or lookup against a broken database
/// degrades to "recompute this run" rather than aborting the match.
pub struct PieceHashStore {
    mem: DashMap<CacheKey, HashMap<u32, PieceDigest>>,
    pool: Option<Pool<Sqlite>>,
}

#[derive(sqlx::FromRow)]
struct PieceRow {
    piece_index: i64,
    piece_hash: String,
}

impl PieceHashStore {
    /// In-memory-only store, for tests and for runs with no cache file configured.
    pub fn in_memory() -> Self {
        Self {
            mem: DashMap::new(),
            pool: None,
        }
    }

    /// Opens (creating if absent) a sqlite-backed store at `path`.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite://{path}?mode=rwc"))
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS file_pieces (
                file_hash TEXT NOT NULL,
                piece_length INTEGER NOT NULL,
                piece_index INTEGER NOT NULL,
                piece_hash TEXT NOT NULL,
                PRIMARY KEY (file_hash, piece_length, piece_index)
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            mem: DashMap::new(),
            pool: Some(pool),
        })
    }

    /// All cached digests known for `(whole_file_hash, piece_length)`. Misses
    /// for individual pieces are simply absent from the returned map; callers
    /// fall back to hashing them.
    pub async fn lookup(
        &self,
        whole_file_hash: &WholeFileHash,
        piece_length: u32,
    ) -> HashMap<u32, PieceDigest> {
        let key = (whole_file_hash.clone(), piece_length);
        if let Some(hit) = self.mem.get(&key) {
            return hit.clone();
        }

        let Some(pool) = &self.pool else {
            return HashMap::new();
        };

        let rows = sqlx::query_as::<_, PieceRow>(
            "SELECT piece_index, piece_hash FROM file_pieces WHERE file_hash = ? AND piece_length = ?",
        )
        .bind(whole_file_hash.0.as_str())
        .bind(piece_length)
        .fetch_all(pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                let err = crate::error::Error::CacheReadCorrupt(e.to_string());
                warn!(%err, %whole_file_hash, piece_length, "treating piece-hash cache as empty");
                return HashMap::new();
            }
        };

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let Ok(index) = u32::try_from(row.piece_index) else {
                continue;
            };
            let Some(digest) = row.piece_hash.parse::<PieceDigest>().ok() else {
                let err = crate::error::Error::CacheReadCorrupt(format!(
                    "invalid digest hex {:?} at piece {index}",
                    row.piece_hash
                ));
                warn!(%err, %whole_file_hash, "skipping cache row");
                continue;
            };
            out.insert(index, digest);
        }

        self.mem.insert(key, out.clone());
        out
    }

    /// Records newly computed digests for `whole_file_hash`. Writes to the
    /// in-memory layer synchronously; the on-disk write-back is
    /// best-effort and never propagates failure to the caller.
    pub async fn store(
        &self,
        whole_file_hash: WholeFileHash,
        piece_length: u32,
        digests: HashMap<u32, PieceDigest>,
    ) {
        if digests.is_empty() {
            return;
        }

        let key = (whole_file_hash.clone(), piece_length);
        self.mem
            .entry(key)
            .or_default()
            .extend(digests.iter().map(|(&i, &d)| (i, d)));

        let Some(pool) = &self.pool else {
            return;
        };

        for (&piece_index, &digest) in &digests {
            let result = sqlx::query(
                "INSERT INTO file_pieces (file_hash, piece_length, piece_index, piece_hash)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(file_hash, piece_length, piece_index) DO NOTHING",
            )
            .bind(whole_file_hash.0.as_str())
            .bind(piece_length)
            .bind(piece_index as i64)
            .bind(digest.as_hex())
            .execute(pool)
            .await;

            if let Err(e) = result {
                let err = crate::error::Error::CacheWriteFailed(e);
                warn!(%err, %whole_file_hash, piece_index, "continuing without persistence");
            }
        }
    }
}

impl std::fmt::Debug for PieceHashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PieceHashStore")
            .field("cached_files", &self.mem.len())
            .field("persisted", &self.pool.is_some())
            .finish()
    }
}

pub type SharedPieceHashStore = Arc<PieceHashStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(b: u8) -> PieceDigest {
        PieceDigest::from_slice(&[b; 20]).unwrap()
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = PieceHashStore::in_memory();
        let hash: WholeFileHash = "abc".into();

        assert!(store.lookup(&hash, 100).await.is_empty());

        let mut digests = HashMap::new();
        digests.insert(0u32, digest(1));
        digests.insert(1u32, digest(2));
        store.store(hash.clone(), 100, digests).await;

        let found = store.lookup(&hash, 100).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[&0], digest(1));

        // a different piece_length is a disjoint cache key
        assert!(store.lookup(&hash, 200).await.is_empty());
    }

    #[tokio::test]
    async fn sqlite_backed_round_trip_survives_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let path = path.to_str().unwrap();

        let hash: WholeFileHash = "def".into();
        {
            let store = PieceHashStore::open(path).await.unwrap();
            let mut digests = HashMap::new();
            digests.insert(3u32, digest(9));
            store.store(hash.clone(), 50, digests).await;
        }

        let store = PieceHashStore::open(path).await.unwrap();
        let found = store.lookup(&hash, 50).await;
        assert_eq!(found.get(&3), Some(&digest(9)));
    }
}
