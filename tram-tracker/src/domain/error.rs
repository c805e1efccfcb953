//! Domain error types.
//!
//! These errors represent failures to load reference data. They are distinct
//! from upstream API errors and from scoring faults.

use std::path::PathBuf;

/// Errors raised while loading the line catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be read
    #[error("failed to read line catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog contents are not a valid list of lines
    #[error("invalid line catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// A position string is not of the form `lat,lon`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid position {input:?}: expected \"lat,lon\" in degrees")]
pub struct ParsePointError {
    pub input: String,
}
