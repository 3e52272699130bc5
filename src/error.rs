//! Error types for the BioTrack application

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BioTrackError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Auth(String),

    #[error("GUI error: {0}")]
    Gui(String),

    #[error("Acquisition loop was already started")]
    LoopAlreadyStarted,
}

/// Failure of a single fetch from a sample source.
///
/// The reason is only ever logged; callers treat every variant the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("device unreachable: {0}")]
    Unreachable(String),
}
