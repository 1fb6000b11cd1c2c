//! # GASDB Storage
//!
//! Injected storage-driver traits and reference drivers for GASDB.
//!
//! GASDB persists collections as opaque JSON blobs and coordinates
//! instances through a small key/value property store that also exposes
//! the platform's exclusive lock. Both backends are injected behind the
//! traits in this crate; the engine never touches a concrete driver.
//!
//! ## Design Principles
//!
//! - Drivers are simple stores (read, write, create, delete); GASDB
//!   owns all interpretation of content
//! - The exclusive lock is guard-based: release happens on drop, on
//!   every exit path
//! - Drivers must be `Send + Sync` for shared access
//!
//! ## Available Drivers
//!
//! - [`MemoryBlobStore`] / [`MemoryPropertyStore`] - For testing and
//!   ephemeral databases
//! - [`FileBlobStore`] / [`FilePropertyStore`] - For persistent local
//!   storage
//!
//! ## Example
//!
//! ```rust
//! use gasdb_storage::{BlobStore, MemoryBlobStore};
//! use serde_json::json;
//!
//! let store = MemoryBlobStore::new();
//! let handle = store.create_file("users", &json!({"documents": {}})).unwrap();
//! assert!(store.read_file(&handle).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod error;
mod file;
mod memory;
mod property;

pub use blob::BlobStore;
pub use error::{StorageError, StorageResult};
pub use file::{FileBlobStore, FilePropertyStore};
pub use memory::{MemoryBlobStore, MemoryPropertyStore};
pub use property::{with_exclusive, ExclusiveGuard, PropertyStore};
