//! Hierarchical storage adapter.
//!
//! The container is a tree of storages (directories carrying a class id)
//! and streams (byte blobs). Paths are `/`-separated and absolute; the root
//! is `/`. Node names never contain `/`.

mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use crate::model::Auid;

/// Access to the compound container holding objects and the metadictionary.
///
/// Streams are read and written as whole buffers.
pub trait Storage {
    /// Returns the names of a storage's direct children, sorted.
    fn list_children(&self, path: &str) -> Result<Vec<String>, StorageError>;

    /// Returns the class id of a storage node.
    fn class_id(&self, path: &str) -> Result<Auid, StorageError>;

    /// Reads a stream.
    fn read_stream(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Creates or replaces a stream. The parent storage must exist.
    fn write_stream(&mut self, path: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Creates a storage, or updates the class id of an existing one. The
    /// parent storage must exist.
    fn create_storage(&mut self, path: &str, class_id: Auid) -> Result<(), StorageError>;

    /// Removes a node and everything below it.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Returns true if a node exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Returns true if `path` is a storage (as opposed to a stream).
    fn is_storage(&self, path: &str) -> bool;
}

/// Joins a child name onto a storage path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Returns the parent of a path (`/` for top-level nodes and the root).
pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

/// Returns the last component of a path.
pub fn name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}
