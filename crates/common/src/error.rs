//! Unified error type for skywash.
//!
//! Upstream fetch problems are not errors here: they travel as
//! [`FetchOutcome`](crate::FetchOutcome) variants and are absorbed by the
//! freshness cache.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown city: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
