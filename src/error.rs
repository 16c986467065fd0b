use std::path::PathBuf;

/// Error types for the ipsweep library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Extraction failed in the harvesting pipeline.
    #[error(transparent)]
    Harvest(#[from] ip_harvest::Error),

    /// The store could not be reached within the retry budget.
    #[error("storage unavailable after {attempts} attempt(s)")]
    StorageUnavailable {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A store file exists but does not hold a valid database.
    #[error("corrupt store {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Database names become file names, so separators are refused.
    #[error("invalid database name: {name:?}")]
    InvalidDatabaseName { name: String },

    /// A shutdown was requested while waiting.
    #[error("shutdown requested")]
    Cancelled,

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::Corrupt { .. } | Error::InvalidDatabaseName { .. }
        )
    }
}

/// Convenience type alias for Results using the library error.
pub type Result<T> = std::result::Result<T, Error>;
