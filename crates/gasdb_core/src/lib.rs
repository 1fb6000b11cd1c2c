//! # GASDB Core
//!
//! A document-oriented database engine with a MongoDB-compatible API
//! over a pluggable blob-store backend.
//!
//! This crate provides:
//! - Filter evaluation (comparison, logical, implicit-equality, dotted
//!   paths) and operator-based updates applied immutably
//! - A collection runtime with lazy loading, dirty tracking, and
//!   atomic blob persistence
//! - A coordination layer - master index plus two-tier locking - that
//!   prevents lost updates across instances sharing one backend
//!
//! ## Example
//!
//! ```rust
//! use gasdb_core::Database;
//! use gasdb_codec::from_json;
//! use serde_json::json;
//!
//! let db = Database::open_in_memory();
//! let users = db.collection("users").unwrap();
//!
//! users
//!     .insert_one(from_json(&json!({"_id": "anna", "age": 29})).unwrap())
//!     .unwrap();
//!
//! let adults = users
//!     .find(&from_json(&json!({"age": {"$gte": 18}})).unwrap())
//!     .unwrap();
//! assert_eq!(adults.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod document;
mod error;
mod file_service;
mod lock_service;
mod master_index;
mod query;
mod update;

pub use collection::{
    Collection, CollectionMetadata, DeleteResult, DocumentStore, InsertOneResult, UpdateOutcome,
    UpdateResult,
};
pub use config::DbConfig;
pub use database::Database;
pub use document::{validate_document, FieldPath, PathError};
pub use error::{DbError, DbResult};
pub use file_service::{FileService, FileServiceConfig};
pub use lock_service::{
    LockService, ProcessLockGuard, DEFAULT_LOCK_TIMEOUT, MIN_LOCK_TIMEOUT,
};
pub use master_index::{
    ConflictStrategy, LockEntry, MasterIndex, DEFAULT_MASTER_INDEX_KEY,
};
pub use query::{Filter, QueryEngine, MAX_FILTER_CONDITIONS, MAX_FILTER_DEPTH};
pub use update::{UpdateEngine, UpdateExpr};
