use catalog_crawler::cache::{DedupCache, RedisCache};
use catalog_crawler::config::Cli;
use catalog_crawler::errors::InitError;
use catalog_crawler::http_client::Credentials;
use catalog_crawler::writer::ArtistWriter;
use catalog_crawler::Orchestrator;
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(total) => {
            tracing::info!(total, "crawl complete");
        }
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            eprintln!("catalog-crawler: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

async fn run(cli: Cli) -> Result<u64, InitError> {
    let credentials = Credentials::load(&cli.credentials_path)?;

    let store = RedisCache::connect(&cli.cache_url)
        .await
        .map_err(|err| InitError::CacheUnreachable(err.to_string()))?;
    let cache = DedupCache::new(Arc::new(store));
    if cli.fresh {
        cache
            .flushall()
            .await
            .map_err(|err| InitError::CacheUnreachable(err.to_string()))?;
    }

    let writer = ArtistWriter::new(&cli.output_path, cli.fresh)?;

    let orchestrator = Orchestrator::new(
        credentials,
        cache,
        writer,
        cli.max_num_artists,
        cli.num_workers,
    )
    .await?;

    orchestrator.run().await
}
