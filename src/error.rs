//! Error types for the consultant

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring or running an analysis pass
#[derive(Debug, Error)]
pub enum ConsultantError {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external service (LLM, market data, Telegram) failed
    #[error("{service} error: {message}")]
    Collaborator { service: String, message: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An external call exceeded its deadline
    #[error("{service} timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// The history document exists but cannot be used
    #[error("Corrupt state in {}: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    /// A run with this id is already recorded
    #[error("Run {0} already exists in history")]
    DuplicateRun(String),

    /// A report artifact for this run is already on disk
    #[error("Report for run {run_id} already exists at {}", path.display())]
    ReportConflict { run_id: String, path: PathBuf },

    /// Filesystem failure while writing a report artifact
    #[error("Failed to write report {}: {source}", path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The screener produced nothing to consult on
    #[error("No candidates: {0}")]
    NoCandidates(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConsultantError {
    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Errors coming from outside the process. A run that hits one of these
    /// is abandoned without touching persisted state.
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. } | Self::Http(_) | Self::Timeout { .. } | Self::NoCandidates(_)
        )
    }

    /// Errors that are worth another attempt: transport failures,
    /// timeouts, 429 and 5xx. Other HTTP statuses will not change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.status().map_or(true, |status| {
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for ConsultantError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsultantError>;
