//! Error types for the codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding document values.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A non-finite number (NaN or ±∞) cannot be represented in JSON.
    #[error("non-finite number cannot be encoded")]
    NonFiniteNumber,

    /// The reserved `__type` key appeared where no known tag is expected.
    #[error("reserved key {key:?} in document")]
    ReservedKey {
        /// The offending key.
        key: String,
    },

    /// A `__type` tag named a type the codec does not know.
    #[error("unknown type tag: {tag:?}")]
    UnknownTypeTag {
        /// The unrecognised tag value.
        tag: String,
    },

    /// A tagged date could not be parsed.
    #[error("invalid date value: {value:?}")]
    InvalidDate {
        /// The raw value that failed to parse.
        value: String,
    },

    /// Underlying JSON (de)serialisation failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Creates a reserved-key error.
    pub fn reserved_key(key: impl Into<String>) -> Self {
        Self::ReservedKey { key: key.into() }
    }

    /// Creates an unknown-type-tag error.
    pub fn unknown_type_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTypeTag { tag: tag.into() }
    }

    /// Creates an invalid-date error.
    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
        }
    }
}
