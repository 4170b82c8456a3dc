//! Error types for wamark.

use thiserror::Error;

/// Top-level error type shared across all wamark crates.
#[derive(Error, Debug)]
pub enum WamarkError {
    /// The messaging gateway session is not connected/paired yet.
    /// Fatal to the requested operation; no state is mutated.
    #[error("WhatsApp not ready")]
    NotReady,

    /// A gateway call failed (send, fetch, metadata lookup).
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Invalid input to a bulk campaign start.
    #[error("Campaign error: {0}")]
    Campaign(String),

    /// Configuration load/parse/save failure.
    #[error("Config error: {0}")]
    Config(String),

    /// Persistent store failure.
    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result alias used throughout wamark.
pub type Result<T> = std::result::Result<T, WamarkError>;
