//! Error types for the deployment steps

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing or launching a model
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("required tools not found on PATH: {}", .0.join(", "))]
    MissingTools(Vec<String>),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request to {url} failed with HTTP {status}{hint}")]
    HttpStatus {
        url: String,
        status: u16,
        hint: &'static str,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("no GGUF files found in {0}")]
    NoModelFiles(String),

    #[error("release {tag} has no asset named {asset}")]
    AssetNotFound { tag: String, asset: String },

    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("runtime installation failed: {0}")]
    Install(String),

    #[error("failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("no more input while waiting for an answer")]
    InputClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    /// Build an HTTP status error, attaching a hint for auth failures
    pub fn http_status(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        let hint = match status.as_u16() {
            401 | 403 => " (set HF_TOKEN or GITHUB_TOKEN for gated resources)",
            404 => " (check the repository and file name)",
            _ => "",
        };
        RunnerError::HttpStatus {
            url: url.into(),
            status: status.as_u16(),
            hint,
        }
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
