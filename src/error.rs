//! Error types for papertable.
//!
//! Every fallible library function returns `Result<T, PaperTableError>`.
//! Whether an error is fatal depends on where it surfaces: an unreadable
//! input file aborts the run, while a failed fetch or a broken citation
//! document only costs the record it belongs to.

use thiserror::Error;

/// Main error type for papertable operations.
#[derive(Debug, Error)]
pub enum PaperTableError {
    /// Network/HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The citation service answered with a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from API
        message: String,
    },

    /// Malformed citation XML
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Document or field content that could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TSV sink error
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl PaperTableError {
    /// True for errors that only affect a single record during enrichment.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            PaperTableError::Network(_)
                | PaperTableError::Api { .. }
                | PaperTableError::Xml(_)
                | PaperTableError::Parse(_)
        )
    }
}

/// Result type alias using `PaperTableError`
pub type Result<T> = std::result::Result<T, PaperTableError>;
