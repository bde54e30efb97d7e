//! Error types for value parsing in bluewing-types.

use thiserror::Error;

/// Errors that can occur when parsing identifiers.
///
/// This error type is platform-agnostic and does not include
/// BLE-stack errors (those belong in bluewing-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A peripheral identifier was empty or whitespace only.
    #[error("Peripheral identifier must not be empty")]
    EmptyIdentifier,
}

/// Result type alias using bluewing-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
