//! CLI flags.

use clap::Parser;

/// Concurrent crawler that harvests artist metadata from a rate-limited,
/// OAuth-gated music catalog API.
#[derive(Parser, Debug, Clone)]
#[command(name = "catalog-crawler", version, about)]
pub struct Cli {
    /// Maximum number of unique artists to write before terminating.
    #[arg(short = 'n', long = "max-num-artists", default_value_t = 12_000_000)]
    pub max_num_artists: u64,

    /// Number of concurrent worker tasks.
    #[arg(short = 'w', long = "num-workers", default_value_t = 20)]
    pub num_workers: usize,

    /// Start with a fresh cache and CSV output (clears both at init).
    #[arg(short = 'f', long = "fresh", default_value_t = false)]
    pub fresh: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    pub debug: bool,

    /// Path to the client-credentials JSON document.
    #[arg(long = "credentials", default_value = "key.json")]
    pub credentials_path: String,

    /// Path to the output CSV file.
    #[arg(long = "output", default_value = "artists.csv")]
    pub output_path: String,

    /// Redis connection URL for the dedup cache.
    #[arg(long = "cache-url", default_value = "redis://127.0.0.1:6379/0")]
    pub cache_url: String,
}
