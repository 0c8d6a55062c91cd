//! Error types for mousemeter operations.

use std::path::PathBuf;

/// Failures surfaced by the library: log persistence and the event source.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    #[error("log file not found: {path}")]
    LogNotFound { path: PathBuf },

    #[error("malformed log header: {reason}")]
    LogHeader { reason: String },

    #[error("capture source error: {message}")]
    Source { message: String },

    #[error("chart export error: {message}")]
    Export { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MeterError {
    pub fn header(reason: impl Into<String>) -> Self {
        Self::LogHeader { reason: reason.into() }
    }

    pub fn source(message: impl Into<String>) -> Self {
        Self::Source { message: message.into() }
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::Export { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, MeterError>;
