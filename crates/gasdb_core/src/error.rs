//! Error types for the GASDB engine.

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in GASDB operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// A public method received a null or wrong-shaped input.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument issue.
        message: String,
    },

    /// A filter expression is malformed.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the filter issue.
        message: String,
    },

    /// An update expression is malformed or inapplicable.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the update issue.
        message: String,
    },

    /// A document violates the storage rules (operator-shaped keys,
    /// non-finite numbers, bad `_id`).
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the document issue.
        message: String,
    },

    /// An insert collided with an existing `_id`.
    #[error("duplicate key: a document with _id {id:?} already exists")]
    DuplicateKey {
        /// The colliding document id.
        id: String,
    },

    /// A targeted entity does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// An update attempted to change or remove an immutable field.
    #[error("field {field:?} is immutable")]
    ImmutableField {
        /// The protected field path.
        field: String,
    },

    /// Lock acquisition exceeded its timeout.
    #[error("lock acquisition timed out after {waited_ms} ms")]
    LockTimeout {
        /// How long the caller waited, in milliseconds.
        waited_ms: u64,
    },

    /// A publish raced a concurrent writer: the stored modification
    /// token no longer matches the caller's expectation.
    #[error(
        "modification conflict on collection {collection:?}: expected token {expected}, found {actual}"
    )]
    Conflict {
        /// The collection whose token mismatched.
        collection: String,
        /// The token the caller expected.
        expected: String,
        /// The token actually stored.
        actual: String,
    },

    /// The storage backend failed or the circuit breaker is open.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// An internal contract was broken. Should never surface.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the broken contract.
        message: String,
    },
}

impl DbError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid-query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid-update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    /// Creates an invalid-document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a duplicate-key error.
    pub fn duplicate_key(id: impl Into<String>) -> Self {
        Self::DuplicateKey { id: id.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an immutable-field error.
    pub fn immutable_field(field: impl Into<String>) -> Self {
        Self::ImmutableField {
            field: field.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(
        collection: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            collection: collection.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a backend-unavailable error.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<gasdb_storage::StorageError> for DbError {
    fn from(err: gasdb_storage::StorageError) -> Self {
        match err {
            // A driver lock timeout keeps its meaning; every other driver
            // failure looks the same to callers.
            gasdb_storage::StorageError::LockTimeout { waited_ms } => {
                Self::LockTimeout { waited_ms }
            }
            other => Self::BackendUnavailable {
                message: other.to_string(),
            },
        }
    }
}
