use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the bundle pipeline.
/// Every module returns `Result<T, LoaderError>`.
#[derive(Debug, Error)]
pub enum LoaderError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    // ── Manifest ────────────────────────────────────────
    #[error("Manifest parse error: {0}")]
    ManifestParse(String),

    // ── Resolution ──────────────────────────────────────
    #[error("Bundle source not found: {0}")]
    NotFound(String),

    // ── Bundle / extraction ─────────────────────────────
    #[error("Error getting bundle {bundle} for asset {asset}")]
    Extraction { bundle: String, asset: String },

    #[error("CRC mismatch for bundle {bundle}: expected {expected}, got {actual}")]
    CrcMismatch {
        bundle: String,
        expected: u32,
        actual: u32,
    },

    #[error("Could not decode asset {asset}: {message}")]
    Decode { asset: String, message: String },

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Cancellation ────────────────────────────────────
    #[error("Request for bundle {0} was cancelled")]
    Cancelled(String),

    // ── Generic ─────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the crate.
pub type LoaderResult<T> = Result<T, LoaderError>;

impl LoaderError {
    pub(crate) fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        LoaderError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// True when the request gave up rather than broke.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Cancelled(_))
    }
}
