use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::model::{Auid, NIL_AUID};
use crate::storage::{Storage, parent_of};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Storage { class_id: Auid },
    Stream(Vec<u8>),
}

/// In-memory storage tree.
///
/// Intended for tests and for building files from scratch. The root storage
/// always exists and starts with the nil class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStorage {
    nodes: BTreeMap<String, Node>,
}

impl MemoryStorage {
    /// Creates a storage tree holding only the root.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Storage { class_id: NIL_AUID });
        Self { nodes }
    }

    /// Returns every path in the tree, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Number of nodes, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    fn require_storage(&self, path: &str) -> Result<(), StorageError> {
        match self.nodes.get(path) {
            Some(Node::Storage { .. }) => Ok(()),
            Some(Node::Stream(_)) => Err(StorageError::NotAStorage {
                path: path.to_string(),
            }),
            None => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn subtree_prefix(path: &str) -> String {
        if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn list_children(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.require_storage(path)?;
        let prefix = Self::subtree_prefix(path);
        Ok(self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    fn class_id(&self, path: &str) -> Result<Auid, StorageError> {
        match self.nodes.get(path) {
            Some(Node::Storage { class_id }) => Ok(*class_id),
            Some(Node::Stream(_)) => Err(StorageError::NotAStorage {
                path: path.to_string(),
            }),
            None => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn read_stream(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        match self.nodes.get(path) {
            Some(Node::Stream(data)) => Ok(data.clone()),
            Some(Node::Storage { .. }) => Err(StorageError::NotAStream {
                path: path.to_string(),
            }),
            None => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn write_stream(&mut self, path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.require_storage(parent_of(path))?;
        if let Some(Node::Storage { .. }) = self.nodes.get(path) {
            return Err(StorageError::NotAStream {
                path: path.to_string(),
            });
        }
        self.nodes.insert(path.to_string(), Node::Stream(data));
        Ok(())
    }

    fn create_storage(&mut self, path: &str, class_id: Auid) -> Result<(), StorageError> {
        self.require_storage(parent_of(path))?;
        match self.nodes.get_mut(path) {
            Some(Node::Storage { class_id: existing }) => {
                *existing = class_id;
                Ok(())
            }
            Some(Node::Stream(_)) => Err(StorageError::AlreadyExists {
                path: path.to_string(),
            }),
            None => {
                self.nodes.insert(path.to_string(), Node::Storage { class_id });
                Ok(())
            }
        }
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        if path == "/" {
            return Err(StorageError::Backend("the root cannot be removed".to_string()));
        }
        if self.nodes.remove(path).is_none() {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        let prefix = Self::subtree_prefix(path);
        self.nodes.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    fn is_storage(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node::Storage { .. }))
    }
}
