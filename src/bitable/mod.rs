//! Feishu/Lark Bitable sink.
//!
//! `client` makes single API calls, `writer` layers retries, schema
//! negotiation, duplicate detection and pacing on top of it.

pub mod client;
pub mod types;
pub mod writer;

pub use client::BitableClient;
pub use types::{FieldInfo, RecordInfo, TableInfo};
pub use writer::{BitableWriter, WritableFields};

use thiserror::Error;

/// Errors raised by the Bitable API.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Bitable error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("response has no data")]
    MissingData,

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}
