//! File-backed drivers for persistent local storage.
//!
//! Directory layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                  # advisory exclusive-lock file
//! ├─ properties.json       # property-store key/value map
//! └─ <name>-<uuid>.json    # one file per blob; the file name is the handle
//! ```
//!
//! All writes use the write-then-rename pattern so a crash never leaves
//! a half-written blob behind.

use crate::blob::BlobStore;
use crate::error::{StorageError, StorageResult};
use crate::memory::sanitize;
use crate::property::{ExclusiveGuard, PropertyStore};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

const LOCK_FILE: &str = "LOCK";
const PROPS_FILE: &str = "properties.json";
/// How often lock acquisition re-polls a contended advisory lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A file-backed blob-store driver.
///
/// Each blob is one JSON file under the root directory; the generated
/// file name is the handle.
///
/// # Example
///
/// ```no_run
/// use gasdb_storage::{BlobStore, FileBlobStore};
/// use serde_json::json;
/// use std::path::Path;
///
/// let store = FileBlobStore::open(Path::new("gasdb_data")).unwrap();
/// let handle = store.create_file("users", &json!({"documents": {}})).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Opens a blob store rooted at `root`, creating the directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, handle: &str) -> StorageResult<PathBuf> {
        // Handles are generated file names; anything path-like is not ours.
        if handle.is_empty() || handle.contains(['/', '\\']) || handle.contains("..") {
            return Err(StorageError::not_found(handle));
        }
        Ok(self.root.join(handle))
    }
}

impl BlobStore for FileBlobStore {
    fn read_file(&self, handle: &str) -> StorageResult<serde_json::Value> {
        let path = self.blob_path(handle)?;
        if !path.exists() {
            return Err(StorageError::not_found(handle));
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| StorageError::corrupted(format!("{}: {e}", path.display())))
    }

    fn write_file(&self, handle: &str, content: &serde_json::Value) -> StorageResult<()> {
        let path = self.blob_path(handle)?;
        if !path.exists() {
            return Err(StorageError::not_found(handle));
        }
        atomic_write(&path, &serde_json::to_vec(content)?)
    }

    fn create_file(&self, name: &str, content: &serde_json::Value) -> StorageResult<String> {
        let handle = format!("{}-{}.json", sanitize(name), Uuid::new_v4());
        let path = self.root.join(&handle);
        atomic_write(&path, &serde_json::to_vec(content)?)?;
        Ok(handle)
    }

    fn delete_file(&self, handle: &str) -> StorageResult<()> {
        let path = self.blob_path(handle)?;
        if !path.exists() {
            return Err(StorageError::not_found(handle));
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}

/// A file-backed property-store driver.
///
/// Keys live in a single `properties.json` map; the exclusive lock is
/// an advisory `fs2` lock on a `LOCK` file, polled until the caller's
/// deadline. The lock excludes other processes sharing the same root
/// as well as other handles within this process.
#[derive(Debug)]
pub struct FilePropertyStore {
    root: PathBuf,
}

impl FilePropertyStore {
    /// Opens a property store rooted at `root`, creating the directory
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn props_path(&self) -> PathBuf {
        self.root.join(PROPS_FILE)
    }

    fn load_map(&self) -> StorageResult<BTreeMap<String, String>> {
        let path = self.props_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&path)?;
        if text.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text)
            .map_err(|e| StorageError::corrupted(format!("{}: {e}", path.display())))
    }

    fn store_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        atomic_write(&self.props_path(), &serde_json::to_vec(map)?)
    }
}

impl PropertyStore for FilePropertyStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        self.store_map(&map)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let mut map = self.load_map()?;
        if map.remove(key).is_some() {
            self.store_map(&map)?;
        }
        Ok(())
    }

    fn acquire_exclusive(&self, timeout: Duration) -> StorageResult<ExclusiveGuard> {
        let lock_path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let started = Instant::now();
        loop {
            if file.try_lock_exclusive().is_ok() {
                return Ok(ExclusiveGuard::new(move || {
                    let _ = FileExt::unlock(&file);
                }));
            }
            if started.elapsed() >= timeout {
                return Err(StorageError::LockTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
    }
}

/// Writes `data` to `path` atomically via a temp file and rename.
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp = path.with_extension("tmp");
    {
        let mut file = File::create(&temp)?;
        std::io::Write::write_all(&mut file, data)?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    Ok(())
}
