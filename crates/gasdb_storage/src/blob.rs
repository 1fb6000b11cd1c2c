//! Blob-store driver trait.

use crate::error::StorageResult;

/// A blob-store driver for GASDB.
///
/// Blob stores hold **opaque JSON documents** addressed by handle. The
/// reference backend is a cloud drive service; the drivers in this
/// crate provide in-memory and local-filesystem equivalents. GASDB owns
/// all interpretation of blob content - drivers do not understand
/// collections, documents, or metadata.
///
/// # Invariants
///
/// - `create_file` returns a handle that `read_file` resolves until
///   `delete_file` is called with it
/// - `read_file` returns exactly the JSON last written for the handle
/// - Handles are opaque: callers never construct or parse them
/// - Drivers must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::MemoryBlobStore`] - For testing and ephemeral databases
/// - [`super::FileBlobStore`] - For persistent local storage
pub trait BlobStore: Send + Sync {
    /// Reads the blob for a handle as parsed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if no blob exists for the handle, the content
    /// is not valid JSON, or an I/O error occurs.
    fn read_file(&self, handle: &str) -> StorageResult<serde_json::Value>;

    /// Overwrites the blob for a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if no blob exists for the handle or an I/O
    /// error occurs.
    fn write_file(&self, handle: &str, content: &serde_json::Value) -> StorageResult<()>;

    /// Creates a new blob and returns its handle.
    ///
    /// `name` is advisory (it may inform the handle for debuggability)
    /// and need not be unique.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be created.
    fn create_file(&self, name: &str, content: &serde_json::Value) -> StorageResult<String>;

    /// Deletes the blob for a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if no blob exists for the handle or the
    /// deletion fails.
    fn delete_file(&self, handle: &str) -> StorageResult<()>;
}
