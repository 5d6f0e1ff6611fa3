//! Class and property definitions.

use crate::codec::index::SetIndex;
use crate::model::Auid;

/// A property declared by a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub id: Auid,
    pub name: String,
    pub description: Option<String>,
    /// Property id used in property streams.
    pub pid: u16,
    pub type_id: Auid,
    pub is_optional: bool,
    pub is_unique: bool,
    pub(crate) local_key: Option<u32>,
}

impl PropertyDefinition {
    /// Creates a definition that has not been persisted yet.
    pub fn new(
        id: Auid,
        name: impl Into<String>,
        pid: u16,
        type_id: Auid,
        is_optional: bool,
        is_unique: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            pid,
            type_id,
            is_optional,
            is_unique,
            local_key: None,
        }
    }

    /// Returns the local key this definition occupies in its class's
    /// property set, if persisted.
    pub fn local_key(&self) -> Option<u32> {
        self.local_key
    }
}

/// A persisted strong reference set: its mangled name and decoded index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredSet {
    pub name: String,
    pub index: SetIndex,
}

/// A class from the metadictionary.
///
/// `parent` is `None` for top-level classes (whose parent is the root
/// sentinel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefinition {
    pub id: Auid,
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<Auid>,
    pub is_concrete: bool,
    pub(crate) properties: Vec<PropertyDefinition>,
    pub(crate) local_key: Option<u32>,
    pub(crate) property_set: Option<StoredSet>,
}

impl ClassDefinition {
    /// Creates a class that has not been persisted yet.
    pub fn new(id: Auid, name: impl Into<String>, parent: Option<Auid>, is_concrete: bool) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            parent,
            is_concrete,
            properties: Vec::new(),
            local_key: None,
            property_set: None,
        }
    }

    /// Returns the class's own properties in declaration order.
    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    /// Looks up an own property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the local key this class occupies in the class set, if persisted.
    pub fn local_key(&self) -> Option<u32> {
        self.local_key
    }

    /// Returns true if any own property has not been written to the file.
    pub(crate) fn has_unsaved_properties(&self) -> bool {
        self.properties.iter().any(|p| p.local_key.is_none())
    }
}
