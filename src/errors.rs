use crate::types::ReplayStats;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("No mappings stored for domain: {0}")]
    MappingsNotFound(String),

    #[error("Profile could not be loaded: {0}")]
    ProfileLoad(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Replay session failed: {reason}")]
    SessionFailed {
        reason: String,
        stats: Box<ReplayStats>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

/// Problems with a recording as a whole. Nothing is persisted when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("recording could not be parsed: {0}")]
    Malformed(String),

    #[error("recording has no steps")]
    EmptyRecording,

    #[error("recording contains no form interactions")]
    NoFormInteractions,

    #[error("recording has no navigation URL to key the domain on")]
    MissingUrl,
}

pub type Result<T> = std::result::Result<T, ReplayError>;

// Convert anyhow::Error to ReplayError
impl From<anyhow::Error> for ReplayError {
    fn from(err: anyhow::Error) -> Self {
        ReplayError::AnyhowError(err.to_string())
    }
}

impl ReplayError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        ReplayError::Storage(err.to_string())
    }

    /// Stats finalized before a hard failure, if the failure happened after
    /// the session started.
    pub fn stats(&self) -> Option<&ReplayStats> {
        match self {
            ReplayError::SessionFailed { stats, .. } => Some(stats),
            _ => None,
        }
    }
}
