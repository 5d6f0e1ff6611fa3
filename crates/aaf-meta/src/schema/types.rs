//! Type definition registry.
//!
//! Each node of the metadictionary's type set is dispatched on its storage
//! class id into one of the fifteen [`TypeKind`] variants.

use rustc_hash::FxHashMap;

use crate::codec::index::WeakRefArrayIndex;
use crate::codec::primitives::{Writer, encode_auid_array, encode_utf16_array};
use crate::codec::properties::{PropertyFormat, PropertyStream};
use crate::codec::value::TypeResolver;
use crate::error::{DecodeError, EncodeError, SchemaError};
use crate::limits::{INDEX_SUFFIX, MANGLED_NAME_SIZE, PROPERTIES_STREAM};
use crate::model::well_known::{TYPE_CLASSES, pids, types};
use crate::model::{Auid, Identifier, TypeClass, TypeDefinition, TypeKind};
use crate::schema::{DefinitionReader, DefinitionWriter, StagedWrites, mangle_name};
use crate::storage::{Storage, join};

lazy_static::lazy_static! {
    /// Baseline types consulted when a file does not store them itself.
    static ref BASELINE_TYPES: FxHashMap<Auid, TypeDefinition> = {
        let ints = [
            (types::UINT8, "aafUInt8", 1, false),
            (types::UINT16, "aafUInt16", 2, false),
            (types::UINT32, "aafUInt32", 4, false),
            (types::UINT64, "aafUInt64", 8, false),
            (types::INT8, "aafInt8", 1, true),
            (types::INT16, "aafInt16", 2, true),
            (types::INT32, "aafInt32", 4, true),
            (types::INT64, "aafInt64", 8, true),
        ];
        let mut defs: Vec<TypeDefinition> = ints
            .iter()
            .map(|(id, name, size, signed)| {
                TypeDefinition::new(*id, *name, TypeKind::Int { size: *size, signed: *signed })
            })
            .collect();
        defs.push(TypeDefinition::new(
            types::UINT8_ARRAY8,
            "aafUInt8Array8",
            TypeKind::FixedArray { element_type: types::UINT8, count: 8 },
        ));
        defs.push(TypeDefinition::new(
            types::AUID,
            "AUID",
            TypeKind::Record {
                members: vec![
                    ("Data1".to_string(), types::UINT32),
                    ("Data2".to_string(), types::UINT16),
                    ("Data3".to_string(), types::UINT16),
                    ("Data4".to_string(), types::UINT8_ARRAY8),
                ],
            },
        ));
        defs.push(TypeDefinition::new(
            types::BOOLEAN,
            "Boolean",
            TypeKind::Enum {
                element_type: types::UINT8,
                elements: vec![(0, "False".to_string()), (1, "True".to_string())],
            },
        ));
        defs.push(TypeDefinition::new(types::CHARACTER, "Character", TypeKind::Character));
        defs.push(TypeDefinition::new(
            types::STRING,
            "String",
            TypeKind::String { element_type: types::CHARACTER },
        ));
        defs.into_iter().map(|d| (d.id, d)).collect()
    };
}

/// Type definitions keyed by identification, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    defs: FxHashMap<Auid, TypeDefinition>,
    order: Vec<Auid>,
    by_name: FxHashMap<String, Auid>,
    baseline: bool,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that falls back to the baseline integer,
    /// boolean, character, string, and AUID types.
    pub fn with_baseline() -> Self {
        Self {
            baseline: true,
            ..Self::default()
        }
    }

    /// Adds a definition. Fails if a definition with the same
    /// identification is already registered.
    pub fn insert(&mut self, def: TypeDefinition) -> Result<(), SchemaError> {
        if self.defs.contains_key(&def.id) {
            return Err(SchemaError::DuplicateTypeId {
                id: def.id,
                name: def.name,
            });
        }
        self.by_name.entry(def.name.clone()).or_insert(def.id);
        self.order.push(def.id);
        self.defs.insert(def.id, def);
        Ok(())
    }

    /// Looks up a definition by identification.
    pub fn get(&self, id: &Auid) -> Option<&TypeDefinition> {
        self.defs
            .get(id)
            .or_else(|| if self.baseline { BASELINE_TYPES.get(id) } else { None })
    }

    /// Looks up a definition by name.
    pub fn by_name(&self, name: &str) -> Option<&TypeDefinition> {
        match self.by_name.get(name) {
            Some(id) => self.defs.get(id),
            None if self.baseline => BASELINE_TYPES.values().find(|d| d.name == name),
            None => None,
        }
    }

    /// Returns true if `id` resolves, baseline included.
    pub fn contains(&self, id: &Auid) -> bool {
        self.get(id).is_some()
    }

    /// Iterates the registered definitions (baseline excluded) in order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.order.iter().filter_map(|id| self.defs.get(id))
    }

    /// Number of registered definitions, baseline excluded.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub(crate) fn get_mut(&mut self, id: &Auid) -> Option<&mut TypeDefinition> {
        self.defs.get_mut(id)
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve_type(&self, id: &Auid) -> Option<&TypeDefinition> {
        self.get(id)
    }
}

// =============================================================================
// READING
// =============================================================================

fn malformed(path: &str, type_name: &str, reason: &'static str) -> SchemaError {
    SchemaError::Definition {
        path: path.to_string(),
        source: DecodeError::MalformedType {
            type_name: type_name.to_string(),
            reason,
        },
    }
}

/// Parses the type definition node stored at `path`.
pub fn parse_type_def<S: Storage + ?Sized>(storage: &S, path: &str) -> Result<TypeDefinition, SchemaError> {
    let class_id = storage.class_id(path)?;
    let class = TYPE_CLASSES
        .get(&class_id)
        .copied()
        .ok_or_else(|| SchemaError::UnknownTypeKind {
            class_id,
            path: path.to_string(),
        })?;

    let def = DefinitionReader::open(storage, path)?;
    let id = def.auid(pids::IDENTIFICATION, "identification")?;
    let name = def.string(pids::NAME, "name")?;
    let description = def.optional_string(pids::DESCRIPTION)?;

    let kind = match class {
        TypeClass::Int => {
            let size = def.u8(pids::INT_SIZE, "int.size")?;
            if !matches!(size, 1 | 2 | 4 | 8) {
                return Err(SchemaError::Definition {
                    path: path.to_string(),
                    source: DecodeError::InvalidIntSize { size },
                });
            }
            TypeKind::Int {
                size,
                signed: def.flag(pids::INT_IS_SIGNED, "int.is_signed")?,
            }
        }
        TypeClass::StrongRef => TypeKind::StrongRef {
            referenced_type: def.reference(pids::STRONG_REF_TYPE, "strong_ref.type")?,
        },
        TypeClass::WeakRef => TypeKind::WeakRef {
            referenced_type: def.reference(pids::WEAK_REF_TYPE, "weak_ref.type")?,
            target_set: def.auid_array(pids::WEAK_REF_TARGET_SET, "weak_ref.target_set")?,
        },
        TypeClass::Enum => {
            let element_type = def.reference(pids::ENUM_ELEMENT_TYPE, "enum.element_type")?;
            let names = def.string_array(pids::ENUM_ELEMENT_NAMES, "enum.names")?;
            let values = def.int64_array(pids::ENUM_ELEMENT_VALUES, "enum.values")?;
            if names.len() != values.len() {
                return Err(malformed(path, &name, "element names and values differ in count"));
            }
            TypeKind::Enum {
                element_type,
                elements: values.into_iter().zip(names).collect(),
            }
        }
        TypeClass::FixedArray => TypeKind::FixedArray {
            element_type: def.reference(pids::FIXED_ARRAY_ELEMENT_TYPE, "fixed_array.element_type")?,
            count: def.u32(pids::FIXED_ARRAY_COUNT, "fixed_array.count")?,
        },
        TypeClass::VarArray => TypeKind::VarArray {
            element_type: def.reference(pids::VAR_ARRAY_ELEMENT_TYPE, "var_array.element_type")?,
        },
        TypeClass::Set => TypeKind::Set {
            element_type: def.reference(pids::SET_ELEMENT_TYPE, "set.element_type")?,
        },
        TypeClass::String => TypeKind::String {
            element_type: def.reference(pids::STRING_ELEMENT_TYPE, "string.element_type")?,
        },
        TypeClass::Stream => TypeKind::Stream,
        TypeClass::Record => {
            let names = def.string_array(pids::RECORD_MEMBER_NAMES, "record.member_names")?;
            let index_name = def.string(pids::RECORD_MEMBER_TYPES, "record.member_types")?;
            let data = storage.read_stream(&join(path, &format!("{}{}", index_name, INDEX_SUFFIX)))?;
            let index = WeakRefArrayIndex::decode(&data).map_err(|source| SchemaError::Definition {
                path: path.to_string(),
                source,
            })?;
            if names.len() != index.keys.len() {
                return Err(malformed(path, &name, "member names and types differ in count"));
            }
            let mut members = Vec::with_capacity(names.len());
            for (member_name, key) in names.into_iter().zip(index.keys) {
                let member_type = key.as_auid().ok_or_else(|| SchemaError::Definition {
                    path: path.to_string(),
                    source: DecodeError::InvalidKeySize { size: key.key_size() },
                })?;
                members.push((member_name, member_type));
            }
            TypeKind::Record { members }
        }
        TypeClass::Rename => TypeKind::Rename {
            renamed_type: def.reference(pids::RENAME_TYPE, "rename.type")?,
        },
        TypeClass::ExtEnum => {
            let names = def.string_array(pids::EXT_ENUM_ELEMENT_NAMES, "ext_enum.names")?;
            let values = def.auid_array(pids::EXT_ENUM_ELEMENT_VALUES, "ext_enum.values")?;
            if names.len() != values.len() {
                return Err(malformed(path, &name, "element names and values differ in count"));
            }
            TypeKind::ExtEnum {
                elements: values.into_iter().zip(names).collect(),
            }
        }
        TypeClass::Indirect => TypeKind::Indirect,
        TypeClass::Opaque => TypeKind::Opaque,
        TypeClass::Character => TypeKind::Character,
    };

    let mut parsed = TypeDefinition::new(id, name, kind);
    parsed.description = description;
    Ok(parsed)
}

// =============================================================================
// WRITING
// =============================================================================

/// A definition ready to be written: its property stream and any auxiliary
/// streams, named relative to the definition node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDefinition {
    pub properties: PropertyStream,
    pub streams: Vec<(String, Vec<u8>)>,
}

/// Encodes a type definition into the layout [`parse_type_def`] reads.
pub fn encode_type_def(def: &TypeDefinition) -> Result<EncodedDefinition, EncodeError> {
    let mut out = DefinitionWriter::new();
    let mut streams = Vec::new();
    out.header(&def.id, &def.name, def.description.as_deref());

    match &def.kind {
        TypeKind::Int { size, signed } => {
            out.bytes(pids::INT_SIZE, vec![*size]);
            out.flag(pids::INT_IS_SIGNED, *signed);
        }
        TypeKind::StrongRef { referenced_type } => out.reference(pids::STRONG_REF_TYPE, referenced_type),
        TypeKind::WeakRef {
            referenced_type,
            target_set,
        } => {
            out.reference(pids::WEAK_REF_TYPE, referenced_type);
            out.bytes(pids::WEAK_REF_TARGET_SET, encode_auid_array(target_set));
        }
        TypeKind::Enum {
            element_type,
            elements,
        } => {
            out.reference(pids::ENUM_ELEMENT_TYPE, element_type);
            let names: Vec<&str> = elements.iter().map(|(_, n)| n.as_str()).collect();
            out.bytes(pids::ENUM_ELEMENT_NAMES, encode_utf16_array(&names));
            let mut values = Writer::with_capacity(elements.len() * 8);
            for (value, _) in elements {
                values.write_u64(*value as u64);
            }
            out.bytes(pids::ENUM_ELEMENT_VALUES, values.into_bytes());
        }
        TypeKind::FixedArray {
            element_type,
            count,
        } => {
            out.reference(pids::FIXED_ARRAY_ELEMENT_TYPE, element_type);
            out.bytes(pids::FIXED_ARRAY_COUNT, count.to_le_bytes().to_vec());
        }
        TypeKind::VarArray { element_type } => out.reference(pids::VAR_ARRAY_ELEMENT_TYPE, element_type),
        TypeKind::Set { element_type } => out.reference(pids::SET_ELEMENT_TYPE, element_type),
        TypeKind::String { element_type } => out.reference(pids::STRING_ELEMENT_TYPE, element_type),
        TypeKind::Record { members } => {
            let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
            out.bytes(pids::RECORD_MEMBER_NAMES, encode_utf16_array(&names));
            let index_name = mangle_name("MemberTypes", pids::RECORD_MEMBER_TYPES, MANGLED_NAME_SIZE);
            out.collection(pids::RECORD_MEMBER_TYPES, PropertyFormat::WeakRefVector, &index_name);
            let keys = members.iter().map(|(_, t)| Identifier::Auid(*t)).collect();
            let index = WeakRefArrayIndex::new(pids::IDENTIFICATION, keys);
            streams.push((format!("{}{}", index_name, INDEX_SUFFIX), index.encode()?));
        }
        TypeKind::Rename { renamed_type } => out.reference(pids::RENAME_TYPE, renamed_type),
        TypeKind::ExtEnum { elements } => {
            let names: Vec<&str> = elements.iter().map(|(_, n)| n.as_str()).collect();
            let values: Vec<Auid> = elements.iter().map(|(v, _)| *v).collect();
            out.bytes(pids::EXT_ENUM_ELEMENT_NAMES, encode_utf16_array(&names));
            out.bytes(pids::EXT_ENUM_ELEMENT_VALUES, encode_auid_array(&values));
        }
        TypeKind::Stream | TypeKind::Indirect | TypeKind::Opaque | TypeKind::Character => {}
    }

    Ok(EncodedDefinition {
        properties: out.finish(),
        streams,
    })
}

/// Stages a type definition node at `path`.
pub(crate) fn stage_type_def(writes: &mut StagedWrites, path: &str, def: &TypeDefinition) -> Result<(), SchemaError> {
    let encode_err = |source| SchemaError::Encode {
        name: def.name.clone(),
        source,
    };
    let encoded = encode_type_def(def).map_err(encode_err)?;
    let properties = encoded.properties.encode().map_err(encode_err)?;

    writes.storage(path.to_string(), def.kind.class().storage_class());
    writes.stream(join(path, PROPERTIES_STREAM), properties);
    for (name, data) in encoded.streams {
        writes.stream(join(path, &name), data);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::well_known::type_classes;
    use crate::storage::MemoryStorage;

    fn roundtrip(def: &TypeDefinition) -> TypeDefinition {
        let mut storage = MemoryStorage::new();
        let mut writes = StagedWrites::new();
        stage_type_def(&mut writes, "/T", def).unwrap();
        writes.apply(&mut storage).unwrap();
        parse_type_def(&storage, "/T").unwrap()
    }

    #[test]
    fn test_int_and_enum_definitions() {
        let int = TypeDefinition::new(types::INT16, "aafInt16", TypeKind::Int { size: 2, signed: true })
            .with_description("16-bit signed");
        assert_eq!(roundtrip(&int), int);

        let enum_def = TypeDefinition::new(
            Auid::from_u128(0x0201_0101),
            "FadeType",
            TypeKind::Enum {
                element_type: types::INT32,
                elements: vec![(0, "None".to_string()), (-1, "LinearAmp".to_string())],
            },
        );
        assert_eq!(roundtrip(&enum_def), enum_def);
    }

    #[test]
    fn test_record_members_come_from_index() {
        let record = TypeDefinition::new(
            Auid::from_u128(0x0301_0100),
            "Rational",
            TypeKind::Record {
                members: vec![
                    ("Numerator".to_string(), types::INT32),
                    ("Denominator".to_string(), types::INT32),
                ],
            },
        );
        let mut storage = MemoryStorage::new();
        let mut writes = StagedWrites::new();
        stage_type_def(&mut writes, "/T", &record).unwrap();
        writes.apply(&mut storage).unwrap();
        assert!(storage.exists("/T/MemberTypes-1c index"));
        assert_eq!(parse_type_def(&storage, "/T").unwrap(), record);
    }

    #[test]
    fn test_reference_and_collection_kinds() {
        let target = Auid::from_u128(0x0d010101_0101_0100_060e_2b3402060101);
        let defs = [
            TypeKind::StrongRef { referenced_type: target },
            TypeKind::WeakRef {
                referenced_type: target,
                target_set: vec![Auid::from_u128(1), Auid::from_u128(2)],
            },
            TypeKind::FixedArray { element_type: types::UINT8, count: 8 },
            TypeKind::VarArray { element_type: types::STRING },
            TypeKind::Set { element_type: types::AUID },
            TypeKind::String { element_type: types::CHARACTER },
            TypeKind::Rename { renamed_type: types::AUID },
            TypeKind::ExtEnum {
                elements: vec![(Auid::from_u128(9), "Picture".to_string())],
            },
            TypeKind::Stream,
            TypeKind::Indirect,
            TypeKind::Opaque,
            TypeKind::Character,
        ];
        for (n, kind) in defs.into_iter().enumerate() {
            let def = TypeDefinition::new(Auid::from_u128(0x100 + n as u128), format!("T{}", n), kind);
            assert_eq!(roundtrip(&def), def);
        }
    }

    #[test]
    fn test_unknown_type_kind() {
        let mut storage = MemoryStorage::new();
        let bogus = Auid::from_u128(0x0d010101_02ff_0000_060e_2b3402060101);
        storage.create_storage("/T", bogus).unwrap();
        let err = parse_type_def(&storage, "/T").unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownTypeKind {
                class_id: bogus,
                path: "/T".to_string()
            }
        );
    }

    #[test]
    fn test_missing_required_property() {
        let mut storage = MemoryStorage::new();
        storage.create_storage("/T", type_classes::INT).unwrap();
        let mut props = DefinitionWriter::new();
        props.header(&types::UINT8, "aafUInt8", None);
        storage
            .write_stream("/T/properties", props.finish().encode().unwrap())
            .unwrap();
        let err = parse_type_def(&storage, "/T").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Definition {
                source: DecodeError::MissingProperty { pid: 0x000f, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_and_baseline() {
        let mut registry = TypeRegistry::with_baseline();
        assert!(registry.contains(&types::INT64));
        assert!(registry.is_empty());

        let custom = TypeDefinition::new(types::INT64, "Int64", TypeKind::Int { size: 8, signed: true });
        registry.insert(custom.clone()).unwrap();
        assert_eq!(registry.get(&types::INT64).map(|d| d.name.as_str()), Some("Int64"));
        assert_eq!(
            registry.insert(custom),
            Err(SchemaError::DuplicateTypeId {
                id: types::INT64,
                name: "Int64".to_string()
            })
        );
        assert_eq!(registry.by_name("Boolean").map(|d| d.id), Some(types::BOOLEAN));

        let bare = TypeRegistry::new();
        assert!(!bare.contains(&types::INT64));
    }
}
