//! Type definitions.
//!
//! A type definition is data: a tagged [`TypeKind`] whose references to
//! other definitions are identifiers resolved through the registry.

use crate::model::Auid;
use crate::model::well_known::type_classes;

/// The fifteen type definition kinds, without their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Int,
    StrongRef,
    WeakRef,
    Enum,
    FixedArray,
    VarArray,
    Set,
    String,
    Stream,
    Record,
    Rename,
    ExtEnum,
    Indirect,
    Opaque,
    Character,
}

impl TypeClass {
    /// Returns the storage class id of definition nodes of this kind.
    pub fn storage_class(self) -> Auid {
        match self {
            TypeClass::Int => type_classes::INT,
            TypeClass::StrongRef => type_classes::STRONG_REF,
            TypeClass::WeakRef => type_classes::WEAK_REF,
            TypeClass::Enum => type_classes::ENUM,
            TypeClass::FixedArray => type_classes::FIXED_ARRAY,
            TypeClass::VarArray => type_classes::VAR_ARRAY,
            TypeClass::Set => type_classes::SET,
            TypeClass::String => type_classes::STRING,
            TypeClass::Stream => type_classes::STREAM,
            TypeClass::Record => type_classes::RECORD,
            TypeClass::Rename => type_classes::RENAME,
            TypeClass::ExtEnum => type_classes::EXT_ENUM,
            TypeClass::Indirect => type_classes::INDIRECT,
            TypeClass::Opaque => type_classes::OPAQUE,
            TypeClass::Character => type_classes::CHARACTER,
        }
    }
}

/// Variant-specific content of a type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Int {
        size: u8,
        signed: bool,
    },
    /// Owning reference to an object of class `referenced_type`.
    StrongRef {
        referenced_type: Auid,
    },
    /// Non-owning reference to an object of class `referenced_type`.
    WeakRef {
        referenced_type: Auid,
        target_set: Vec<Auid>,
    },
    /// Values are stored as `element_type` (an integer type); elements keep
    /// file order.
    Enum {
        element_type: Auid,
        elements: Vec<(i64, String)>,
    },
    FixedArray {
        element_type: Auid,
        count: u32,
    },
    VarArray {
        element_type: Auid,
    },
    Set {
        element_type: Auid,
    },
    String {
        element_type: Auid,
    },
    Stream,
    Record {
        members: Vec<(String, Auid)>,
    },
    Rename {
        renamed_type: Auid,
    },
    ExtEnum {
        elements: Vec<(Auid, String)>,
    },
    Indirect,
    Opaque,
    Character,
}

impl TypeKind {
    /// Returns the payload-free tag of this kind.
    pub fn class(&self) -> TypeClass {
        match self {
            TypeKind::Int { .. } => TypeClass::Int,
            TypeKind::StrongRef { .. } => TypeClass::StrongRef,
            TypeKind::WeakRef { .. } => TypeClass::WeakRef,
            TypeKind::Enum { .. } => TypeClass::Enum,
            TypeKind::FixedArray { .. } => TypeClass::FixedArray,
            TypeKind::VarArray { .. } => TypeClass::VarArray,
            TypeKind::Set { .. } => TypeClass::Set,
            TypeKind::String { .. } => TypeClass::String,
            TypeKind::Stream => TypeClass::Stream,
            TypeKind::Record { .. } => TypeClass::Record,
            TypeKind::Rename { .. } => TypeClass::Rename,
            TypeKind::ExtEnum { .. } => TypeClass::ExtEnum,
            TypeKind::Indirect => TypeClass::Indirect,
            TypeKind::Opaque => TypeClass::Opaque,
            TypeKind::Character => TypeClass::Character,
        }
    }

    /// Returns every type definition this kind refers to.
    pub fn referenced_types(&self) -> Vec<Auid> {
        match self {
            TypeKind::Enum { element_type, .. }
            | TypeKind::FixedArray { element_type, .. }
            | TypeKind::VarArray { element_type }
            | TypeKind::Set { element_type }
            | TypeKind::String { element_type } => vec![*element_type],
            TypeKind::Rename { renamed_type } => vec![*renamed_type],
            TypeKind::Record { members } => members.iter().map(|(_, t)| *t).collect(),
            _ => Vec::new(),
        }
    }
}

/// A type definition from the metadictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub id: Auid,
    pub name: String,
    pub description: Option<String>,
    pub kind: TypeKind,
    /// Local key in the metadictionary's type set; `None` until persisted.
    pub(crate) local_key: Option<u32>,
}

impl TypeDefinition {
    /// Creates a definition that has not been persisted yet.
    pub fn new(id: Auid, name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            kind,
            local_key: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the local key this definition occupies in the file, if any.
    pub fn local_key(&self) -> Option<u32> {
        self.local_key
    }

    /// Looks up an enumeration element name by value.
    pub fn enum_name(&self, value: i64) -> Option<&str> {
        match &self.kind {
            TypeKind::Enum { elements, .. } => elements
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, n)| n.as_str()),
            _ => None,
        }
    }

    /// Looks up an enumeration value by element name.
    pub fn enum_value(&self, name: &str) -> Option<i64> {
        match &self.kind {
            TypeKind::Enum { elements, .. } => {
                elements.iter().find(|(_, n)| n == name).map(|(v, _)| *v)
            }
            _ => None,
        }
    }

    /// Looks up an extendible enumeration element name by value.
    pub fn ext_enum_name(&self, value: &Auid) -> Option<&str> {
        match &self.kind {
            TypeKind::ExtEnum { elements } => elements
                .iter()
                .find(|(v, _)| v == value)
                .map(|(_, n)| n.as_str()),
            _ => None,
        }
    }

    /// Looks up an extendible enumeration value by element name.
    pub fn ext_enum_value(&self, name: &str) -> Option<Auid> {
        match &self.kind {
            TypeKind::ExtEnum { elements } => {
                elements.iter().find(|(_, n)| n == name).map(|(v, _)| *v)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::well_known::types;

    #[test]
    fn test_enum_lookup() {
        let boolean = TypeDefinition::new(
            types::BOOLEAN,
            "aafBoolean",
            TypeKind::Enum {
                element_type: types::UINT8,
                elements: vec![(0, "False".to_string()), (1, "True".to_string())],
            },
        );
        assert_eq!(boolean.enum_name(1), Some("True"));
        assert_eq!(boolean.enum_value("False"), Some(0));
        assert_eq!(boolean.enum_name(2), None);
        assert_eq!(boolean.kind.referenced_types(), vec![types::UINT8]);
        assert_eq!(boolean.kind.class(), TypeClass::Enum);
    }

    #[test]
    fn test_record_references_members() {
        let kind = TypeKind::Record {
            members: vec![
                ("Numerator".to_string(), types::INT32),
                ("Denominator".to_string(), types::INT32),
            ],
        };
        assert_eq!(kind.referenced_types(), vec![types::INT32, types::INT32]);
        assert!(TypeKind::Opaque.referenced_types().is_empty());
    }
}
