//! StreamLens Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::JobId;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Core pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Input Errors (never retried)
    // =========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // =========================================================================
    // Transient Collaborator Errors (retried by the retry policy)
    // =========================================================================
    #[error("Transient service error: {0}")]
    Transient(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Operation '{operation}' timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    #[error("Frame extraction failed: {0}")]
    Extraction(String),

    #[error("Frame encoding failed: {0}")]
    Encoding(String),

    #[error("Detection job {job_id} failed")]
    JobFailed { job_id: JobId },

    #[error("Detection job {job_id} timed out after {elapsed_secs:.0}s ({attempts} polls)")]
    JobTimeout {
        job_id: JobId,
        attempts: u32,
        elapsed_secs: f64,
    },

    #[error("Result store error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Default transience classification used by the retry policy.
    /// Timeouts, throttling, and transient service failures are worth
    /// retrying; everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::Throttled(_) | Error::Timeout { .. }
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
