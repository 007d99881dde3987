//! Douyin listing scraper.
//!
//! `http_client` wraps reqwest for the source, `request_variant` holds the
//! ordered request shapes used for the listing endpoint, and `douyin`
//! drives user id resolution, pagination and item parsing.

pub mod douyin;
pub mod http_client;
pub mod request_variant;

pub use douyin::{extract_user_id, parse_item, DouyinScraper};
pub use http_client::{resolve_user_agent, HttpClient, HttpResponse};
pub use request_variant::{Page, PageRequest, RequestShape, RequestVariant};

use thiserror::Error;

/// Errors raised while talking to the listing source.
///
/// Everything except [`SourceError::UnrecognizedProfileUrl`] is treated as
/// transient by the page fetcher.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    Malformed(String),

    #[error("API returned status {code}: {message}")]
    Application { code: i64, message: String },

    #[error("could not extract a user id from {0}")]
    UnrecognizedProfileUrl(String),
}
