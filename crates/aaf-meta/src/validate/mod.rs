//! Structural checks that need schema context.
//!
//! Decoding only checks that bytes are well formed. The checks here need
//! the registries: which properties a class requires, which pids it
//! declares, and which unique keys are already taken.

use rustc_hash::FxHashMap;

use crate::error::{ObjectError, ValidationError};
use crate::model::Auid;
use crate::object::DynamicObject;
use crate::schema::Registries;

/// Path reported for objects that are not stored anywhere yet.
pub const DETACHED_PATH: &str = "<detached>";

/// Live unique keys of one open file.
///
/// A key space is one unique-identifier property definition; within it a
/// key (the raw property payload) belongs to at most one object path.
#[derive(Debug, Clone, Default)]
pub struct UniqueKeyIndex {
    keys: FxHashMap<(Auid, Vec<u8>), String>,
}

impl UniqueKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the path of the object holding `key`.
    pub fn holder(&self, property: &Auid, key: &[u8]) -> Option<&str> {
        self.keys.get(&(*property, key.to_vec())).map(String::as_str)
    }

    /// Returns the holder of `key` if it is some object other than `path`.
    pub fn check(&self, property: &Auid, key: &[u8], path: Option<&str>) -> Option<&str> {
        self.holder(property, key).filter(|holder| Some(*holder) != path)
    }

    /// Records `path` as the holder of `key`.
    pub fn record(&mut self, property: Auid, key: Vec<u8>, path: &str) {
        self.keys.insert((property, key), path.to_string());
    }

    /// Releases `key` if `path` holds it.
    pub fn forget(&mut self, property: &Auid, key: &[u8], path: &str) {
        let entry = (*property, key.to_vec());
        if self.keys.get(&entry).is_some_and(|holder| holder == path) {
            self.keys.remove(&entry);
        }
    }

    /// Releases every key held by `path` or by an object below it.
    pub fn forget_subtree(&mut self, path: &str) {
        let prefix = format!("{}/", path);
        self.keys
            .retain(|_, holder| holder != path && !holder.starts_with(&prefix));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Checks an object against its class.
///
/// - Every required effective property is present.
/// - Every stored pid is declared by the class or one of its ancestors.
pub fn validate_object(registries: &Registries, obj: &DynamicObject) -> Result<(), ValidationError> {
    let path = obj.path().unwrap_or(DETACHED_PATH);
    let class = registries
        .lookup_class_by_id(&obj.class_id())
        .ok_or_else(|| ObjectError::UnknownClass {
            class_id: obj.class_id(),
            path: path.to_string(),
        })?;
    let effective = registries
        .classes()
        .effective_properties(&class.id)
        .ok_or_else(|| ObjectError::UnknownClass {
            class_id: class.id,
            path: path.to_string(),
        })?;

    for prop in effective.iter().filter(|p| !p.is_optional) {
        if !obj.properties().contains(prop.pid) {
            return Err(ValidationError::MissingRequired {
                class: class.name.clone(),
                property: prop.name.clone(),
                path: path.to_string(),
            });
        }
    }

    for entry in obj.properties().entries() {
        if effective.by_pid(entry.pid).is_none() {
            return Err(ValidationError::UndeclaredProperty {
                class: class.name.clone(),
                pid: entry.pid,
                path: path.to_string(),
            });
        }
    }

    Ok(())
}
