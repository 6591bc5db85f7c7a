//! Error types for `hookR` core library.

use thiserror::Error;

/// Result type alias using `hookR` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `hookR` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame could not be decoded into an envelope
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    /// A required envelope field is missing or empty
    #[error("Missing required field '{field}' in {category} envelope")]
    MissingField {
        category: &'static str,
        field: &'static str,
    },
}
