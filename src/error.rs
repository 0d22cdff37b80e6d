// Error types for loading external resources
// Every loader in the crate reports through LoadError; callers decide
// whether to fail open (log + default) or propagate.

use thiserror::Error;

/// Errors that can occur while fetching or parsing a data source.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Local file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON payload did not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tabular source could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Source string is neither a path nor a supported URL.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Geometry collection is structurally unusable.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// A required column is missing from a tabular source.
    #[error("Missing column: {0}")]
    MissingColumn(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;
