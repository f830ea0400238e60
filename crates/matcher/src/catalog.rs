use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::candidate::Candidate;
use crate::error::{Error, Result};

/// Source of same-size candidate files for a slot. The sqlite-backed catalog
/// is the production implementation; an in-memory implementation exists for
/// tests and for embedding the matcher in a process that maintains its own
/// file index.
#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates_for_size(&self, size: u64) -> Result<Vec<Candidate>>;
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    path: String,
    hash: String,
    file_size: i64,
}

/// Read-only view over a local file catalog: `path`, `size`, and a
/// caller-computed `whole_file_hash` per entry, keyed for lookup by size.
///
/// The matcher never writes to this table — building and maintaining the
/// catalog is the embedding application's job.
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite://{path}?mode=ro"))
            .await
            .map_err(Error::CatalogUnavailable)?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl CandidateSource for SqliteCatalog {
    async fn candidates_for_size(&self, size: u64) -> Result<Vec<Candidate>> {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, CatalogRow>(
            "SELECT path, hash, file_size FROM files WHERE file_size = ?",
        )
        .bind(size)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::CatalogUnavailable)?;

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .map(|r| Candidate {
                absolute_path: r.path.into(),
                size: r.file_size as u64,
                whole_file_hash: r.hash.into(),
            })
            .collect();

        order_candidates(&mut candidates, None);
        Ok(candidates)
    }
}

/// Stable, deterministic candidate ordering: an exact basename match against
/// `preferred_basename` sorts first, then remaining candidates sort
/// lexicographically by path. Keeps repeated runs over the same catalog
/// deterministic and puts the "obvious" match first without changing
/// correctness — every candidate is still tried.
pub fn order_candidates(candidates: &mut [Candidate], preferred_basename: Option<&str>) {
    candidates.sort_by(|a, b| {
        let key = |c: &Candidate| {
            let is_preferred = preferred_basename.is_some_and(|want| {
                c.absolute_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n == want)
            });
            (!is_preferred, c.absolute_path.clone())
        };
        key(a).cmp(&key(b))
    });
}

/// Skips candidates whose file is no longer present on disk. Per the design,
/// a vanished candidate is silently dropped rather than treated as an error:
/// the catalog can lag behind the filesystem.
pub async fn filter_existing(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(candidates.len());
    for c in candidates {
        if tokio::fs::metadata(&c.absolute_path).await.is_ok() {
            out.push(c);
        } else {
            let err = Error::CandidatePathMissing(c.absolute_path.clone());
            tracing::debug!(%err, "skipping candidate");
        }
    }
    out
}

/// Test/embedding-friendly catalog backed by an in-memory list.
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: Vec<Candidate>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<Candidate>) -> Self {
        Self { entries }
    }
}

#[async_trait::async_trait]
impl CandidateSource for InMemoryCatalog {
    async fn candidates_for_size(&self, size: u64) -> Result<Vec<Candidate>> {
        let mut out: Vec<Candidate> = self
            .entries
            .iter()
            .filter(|c| c.size == size)
            .cloned()
            .collect();
        order_candidates(&mut out, None);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher_core::WholeFileHash;
    use std::path::Path;

    fn candidate(path: &str, size: u64) -> Candidate {
        Candidate {
            absolute_path: path.into(),
            size,
            whole_file_hash: WholeFileHash::from(path),
        }
    }

    #[tokio::test]
    async fn in_memory_catalog_filters_by_size() {
        let catalog = InMemoryCatalog::new(vec![
            candidate("/a/one.bin", 10),
            candidate("/a/two.bin", 20),
            candidate("/a/three.bin", 10),
        ]);
        let found = catalog.candidates_for_size(10).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.size == 10));
    }

    #[test]
    fn order_candidates_prefers_exact_basename_match() {
        let mut candidates = vec![candidate("/a/zzz.bin", 10), candidate("/a/target.bin", 10)];
        order_candidates(&mut candidates, Some("target.bin"));
        assert_eq!(candidates[0].absolute_path, Path::new("/a/target.bin"));
    }
}
