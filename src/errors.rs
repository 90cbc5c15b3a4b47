//! Error taxonomy for the crawler.
//!
//! Per-fetch failures (timeouts, rate limits, bad auth) are never surfaced as
//! `Result::Err` to the orchestrator — they are outcomes handled inline by the
//! fetch cycle (see [`crate::http_client::FetchOutcome`]). The types here cover
//! only the failures that should abort the process at startup.

use thiserror::Error;

/// Fatal startup failures. Returned from `main` and printed before exiting
/// with a non-zero status.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to read credentials file {path}: {source}")]
    CredentialsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse credentials file {path}: {source}")]
    CredentialsParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to obtain access token: {0}")]
    TokenExchange(String),

    #[error("cache store unreachable: {0}")]
    CacheUnreachable(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClientBuild(#[source] reqwest::Error),

    #[error("failed to open artist output {path}: {source}")]
    WriterIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the dedup cache client's primitive operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}
