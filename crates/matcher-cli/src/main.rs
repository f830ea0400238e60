mod torrent_file;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use matcher::{Matcher, MatcherConfig, PieceHashStore, SqliteCatalog};
use matcher_core::TorrentDescriptor;
use tracing::info;

/// Matches a torrent's files against a local file catalog, piece by piece.
#[derive(Parser)]
#[command(version, author, about)]
struct Opts {
    /// Path to the .torrent file to match. Mutually exclusive with --descriptor-json.
    #[arg(long, env = "MATCHER_TORRENT")]
    torrent: Option<PathBuf>,

    /// Path to a JSON-encoded TorrentDescriptor, for callers that have
    /// already decoded metainfo themselves.
    #[arg(long, env = "MATCHER_DESCRIPTOR_JSON")]
    descriptor_json: Option<PathBuf>,

    /// Path to the sqlite file catalog (read-only).
    #[arg(long, env = "MATCHER_CATALOG")]
    catalog: PathBuf,

    /// Path to the sqlite piece-hash cache (created if absent).
    #[arg(long, env = "MATCHER_CACHE")]
    cache: Option<PathBuf>,

    /// Maximum concurrent file range reads.
    #[arg(long, default_value_t = 8, env = "MATCHER_IO_CONCURRENCY")]
    io_concurrency: usize,

    /// Maximum candidate pairs considered per boundary before falling back
    /// to the conservative "all possibly match" result.
    #[arg(long, default_value_t = 10_000, env = "MATCHER_BOUNDARY_FALLBACK_LIMIT")]
    boundary_fallback_limit: usize,

    /// Maximum candidates considered per slot. Unbounded if unset.
    #[arg(long, env = "MATCHER_MAX_CANDIDATES_PER_SLOT")]
    max_candidates_per_slot: Option<usize>,

    /// The console log level.
    #[arg(short = 'v', long = "log-level", default_value = "info", env = "MATCHER_LOG_LEVEL")]
    log_level: String,
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_target(false).init();
}

async fn load_descriptor(opts: &Opts) -> anyhow::Result<TorrentDescriptor> {
    if let Some(path) = &opts.descriptor_json {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading descriptor json at {path:?}"))?;
        return serde_json::from_slice(&bytes).context("parsing descriptor json");
    }
    if let Some(path) = &opts.torrent {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading torrent file at {path:?}"))?;
        return torrent_file::decode_torrent_file(&bytes);
    }
    anyhow::bail!("one of --torrent or --descriptor-json is required")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(&opts.log_level);

    let descriptor = load_descriptor(&opts).await?;

    let catalog_path = opts
        .catalog
        .to_str()
        .context("catalog path must be utf-8")?;
    let catalog = Arc::new(
        SqliteCatalog::open(catalog_path)
            .await
            .context("opening file catalog")?,
    );

    let store = Arc::new(match &opts.cache {
        Some(path) => {
            let path = path.to_str().context("cache path must be utf-8")?;
            PieceHashStore::open(path)
                .await
                .context("opening piece-hash cache")?
        }
        None => {
            info!("no --cache configured, piece hashes won't persist across runs");
            PieceHashStore::in_memory()
        }
    });

    let config = MatcherConfig {
        io_concurrency: opts.io_concurrency,
        boundary_fallback_limit: opts.boundary_fallback_limit,
        max_candidates_per_slot: opts.max_candidates_per_slot,
    };

    let matcher = Matcher::new(catalog, store, config);
    let results = matcher.run(descriptor).await?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
