//! Centralized error types for mailsnap.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsnap library.
///
/// The first group (`MissingSender` .. `EmptyWindow`) are precondition errors:
/// they are raised before any mailbox or store call and abort the whole run.
/// Everything else is reported by collaborators and, inside the pipeline, is
/// contained to the part, artifact, or message that caused it.
#[derive(Error, Debug)]
pub enum SnapError {
    /// No sender address was given.
    #[error("A sender address is required")]
    MissingSender,

    /// A date argument does not match `YYYY-MM-DD` or is not a calendar date.
    #[error("Invalid {field} '{value}': expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },

    /// A year argument is outside the supported range.
    #[error("Invalid year {0}: expected a four-digit year")]
    InvalidYear(i64),

    /// The end date is not after the start date.
    #[error("Empty date window: {start} is not before {end}")]
    EmptyWindow { start: String, end: String },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified mailbox file or directory does not exist.
    #[error("Mailbox not found: {0}")]
    MailboxNotFound(PathBuf),

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    Mime(String),

    /// A part could not be fetched by its handle.
    #[error("Failed to fetch part '{handle}' of message '{message_id}': {reason}")]
    Fetch {
        message_id: String,
        handle: String,
        reason: String,
    },

    /// The destination container does not exist.
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// The destination store rejected an operation.
    #[error("Store error: {0}")]
    Store(String),

    /// HTML to PDF conversion failed.
    #[error("PDF conversion failed: {0}")]
    Pdf(String),
}

/// Convenience alias for `Result<T, SnapError>`.
pub type Result<T> = std::result::Result<T, SnapError>;

impl SnapError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` for errors that reject the caller's input before any remote call.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingSender
                | Self::InvalidDate { .. }
                | Self::InvalidYear(_)
                | Self::EmptyWindow { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (prefer `SnapError::io`).
impl From<std::io::Error> for SnapError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
