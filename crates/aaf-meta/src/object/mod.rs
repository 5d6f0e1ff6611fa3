//! Dynamic objects.
//!
//! An object is a storage node with a class id and a property stream. Every
//! access goes property name → property definition → type definition, and
//! the type decides how the payload is read:
//!
//! - inline data and weak references through the value codec,
//! - strong references, sets, and vectors through their index streams,
//! - data streams through a sibling stream node.
//!
//! Inline properties change in memory until [`ObjectRuntime::save_object`].
//! Operations that touch nodes stored out of line (members, children,
//! streams) write through, the owner's property stream included.

use std::sync::Arc;

use tracing::debug;

use crate::codec::index::{SetIndex, VectorIndex, WeakRefArrayIndex, member_name, parse_member_name};
use crate::codec::primitives::{WeakRef, decode_utf16_string, encode_utf16_string};
use crate::codec::properties::{PropertyFormat, PropertyStream};
use crate::codec::value::{decode_value, encode_value, property_format, resolve_renames};
use crate::error::{DecodeError, EncodeError, ObjectError, SchemaError, ValidationError};
use crate::limits::{BYTE_ORDER_LITTLE, INDEX_SUFFIX, MANGLED_NAME_SIZE, NO_FREE_KEY, PROPERTIES_STREAM};
use crate::model::{Auid, ClassDefinition, Identifier, ObjectRef, PropertyDefinition, TypeKind, Value};
use crate::schema::{OpenOptions, Registries, mangle_name, open_metadictionary_with};
use crate::storage::{Storage, join, name_of, parent_of};
use crate::validate::{DETACHED_PATH, UniqueKeyIndex};

/// An object of a class known only at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicObject {
    path: Option<String>,
    class_id: Auid,
    properties: PropertyStream,
}

impl DynamicObject {
    pub(crate) fn new(class_id: Auid) -> Self {
        Self {
            path: None,
            class_id,
            properties: PropertyStream::new(),
        }
    }

    /// Storage path, or `None` for an object not stored yet.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn class_id(&self) -> Auid {
        self.class_id
    }

    /// Raw property entries.
    pub fn properties(&self) -> &PropertyStream {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyStream {
        &mut self.properties
    }

    pub fn is_attached(&self) -> bool {
        self.path.is_some()
    }

    fn display_path(&self) -> &str {
        self.path.as_deref().unwrap_or(DETACHED_PATH)
    }
}

/// Reads the object stored at `path`.
pub fn decode_object<S: Storage + ?Sized>(
    storage: &S,
    registries: &Registries,
    path: &str,
) -> Result<DynamicObject, ObjectError> {
    let class_id = storage.class_id(path)?;
    let class = registries
        .lookup_class_by_id(&class_id)
        .ok_or_else(|| ObjectError::UnknownClass {
            class_id,
            path: path.to_string(),
        })?;
    let data = storage.read_stream(&join(path, PROPERTIES_STREAM))?;
    let properties = PropertyStream::decode(&data).map_err(|source| ObjectError::Decode {
        path: path.to_string(),
        pid: 0,
        class: class.name.clone(),
        source,
    })?;
    Ok(DynamicObject {
        path: Some(path.to_string()),
        class_id,
        properties,
    })
}

// =============================================================================
// PROPERTY RESOLUTION
// =============================================================================

/// A property of a specific object, resolved against the registries.
struct Slot<'r> {
    class: &'r ClassDefinition,
    prop: &'r PropertyDefinition,
    format: PropertyFormat,
}

impl Slot<'_> {
    fn decode_err(&self, obj: &DynamicObject, source: DecodeError) -> ObjectError {
        ObjectError::Decode {
            path: obj.display_path().to_string(),
            pid: self.prop.pid,
            class: self.class.name.clone(),
            source,
        }
    }

    fn encode_err(&self, source: EncodeError) -> ObjectError {
        ObjectError::Encode {
            class: self.class.name.clone(),
            property: self.prop.name.clone(),
            source,
        }
    }

    fn unsupported(&self, registries: &Registries, operation: &'static str) -> ObjectError {
        ObjectError::UnsupportedOperation {
            class: self.class.name.clone(),
            property: self.prop.name.clone(),
            type_name: registries
                .lookup_type(&self.prop.type_id)
                .map_or_else(|| self.prop.type_id.to_string(), |t| t.name.clone()),
            operation,
        }
    }

    fn require(&self, registries: &Registries, format: PropertyFormat, operation: &'static str) -> Result<(), ObjectError> {
        if self.format == format {
            Ok(())
        } else {
            Err(self.unsupported(registries, operation))
        }
    }

    /// Name of the out-of-line node backing this property: the stored name
    /// if the property is set, a fresh mangled name otherwise.
    fn node_name(&self, obj: &DynamicObject) -> Result<String, ObjectError> {
        match obj.properties.get(self.prop.pid) {
            Some(data) if self.format == PropertyFormat::DataStream => {
                stream_name(data).map_err(|e| self.decode_err(obj, e))
            }
            Some(data) => decode_utf16_string(data).map_err(|e| self.decode_err(obj, e)),
            None => Ok(mangle_name(&self.prop.name, self.prop.pid, MANGLED_NAME_SIZE)),
        }
    }
}

fn slot<'r>(registries: &'r Registries, obj: &DynamicObject, name: &str) -> Result<Slot<'r>, ObjectError> {
    let class = registries
        .lookup_class_by_id(&obj.class_id)
        .ok_or_else(|| ObjectError::UnknownClass {
            class_id: obj.class_id,
            path: obj.display_path().to_string(),
        })?;
    let prop = registries
        .classes()
        .effective_properties(&class.id)
        .and_then(|table| table.by_name(name))
        .ok_or_else(|| ObjectError::NoSuchProperty {
            class: class.name.clone(),
            name: name.to_string(),
        })?;
    let format = property_format(registries, prop.type_id).map_err(|source| ObjectError::Decode {
        path: obj.display_path().to_string(),
        pid: prop.pid,
        class: class.name.clone(),
        source,
    })?;
    Ok(Slot { class, prop, format })
}

fn class_name(registries: &Registries, id: &Auid) -> String {
    registries
        .lookup_class_by_id(id)
        .map_or_else(|| id.to_string(), |c| c.name.clone())
}

fn attached(obj: &DynamicObject) -> Result<&str, ObjectError> {
    obj.path.as_deref().ok_or(ObjectError::Detached)
}

fn index_name(name: &str) -> String {
    format!("{}{}", name, INDEX_SUFFIX)
}

/// Stream property payload: byte order marker, then the stream name.
fn stream_name(data: &[u8]) -> Result<String, DecodeError> {
    match data.split_first() {
        Some((&BYTE_ORDER_LITTLE, name)) => decode_utf16_string(name),
        Some((&found, _)) => Err(DecodeError::UnsupportedByteOrder { found }),
        None => Err(DecodeError::TruncatedStream {
            context: "stream property",
            needed: 1,
            available: 0,
        }),
    }
}

fn encode_stream_name(name: &str) -> Vec<u8> {
    let mut data = vec![BYTE_ORDER_LITTLE];
    data.extend_from_slice(&encode_utf16_string(name));
    data
}

/// Class referenced by a strong reference type or by the elements of a
/// strong reference collection type.
fn referenced_class(registries: &Registries, type_id: Auid) -> Result<Option<Auid>, DecodeError> {
    let def = resolve_renames(registries, type_id)?;
    let element = match &def.kind {
        TypeKind::StrongRef { referenced_type } => return Ok(Some(*referenced_type)),
        TypeKind::Set { element_type } | TypeKind::VarArray { element_type } => {
            resolve_renames(registries, *element_type)?
        }
        _ => return Ok(None),
    };
    Ok(match &element.kind {
        TypeKind::StrongRef { referenced_type } => Some(*referenced_type),
        _ => None,
    })
}

/// A unique key an object is about to take.
struct ClaimedKey {
    property: Auid,
    bytes: Vec<u8>,
}

// =============================================================================
// RUNTIME
// =============================================================================

/// An open file: storage, schema, and the live unique keys.
#[derive(Debug)]
pub struct ObjectRuntime<S: Storage> {
    storage: S,
    registries: Arc<Registries>,
    unique_keys: UniqueKeyIndex,
}

impl<S: Storage> ObjectRuntime<S> {
    /// Opens the metadictionary of `storage` with default options.
    pub fn open(storage: S) -> Result<Self, ObjectError> {
        Self::open_with(storage, OpenOptions::default())
    }

    pub fn open_with(storage: S, options: OpenOptions) -> Result<Self, ObjectError> {
        let registries = open_metadictionary_with(&storage, options)?;
        Ok(Self::new(storage, Arc::new(registries)))
    }

    /// Wraps storage with registries built elsewhere.
    pub fn new(storage: S, registries: Arc<Registries>) -> Self {
        Self {
            storage,
            registries,
            unique_keys: UniqueKeyIndex::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    /// Mutable registries. Other holders of the `Arc` keep their snapshot.
    pub fn registries_mut(&mut self) -> &mut Registries {
        Arc::make_mut(&mut self.registries)
    }

    /// Writes definitions registered since open.
    pub fn save_metadictionary(&mut self) -> Result<(), SchemaError> {
        crate::schema::save_metadictionary(Arc::make_mut(&mut self.registries), &mut self.storage)
    }

    pub fn unique_keys(&self) -> &UniqueKeyIndex {
        &self.unique_keys
    }

    /// Reads the object at `path` and records its unique key.
    ///
    /// Fails with `DuplicateUniqueKey` if another live object holds the key.
    pub fn decode_object(&mut self, path: &str) -> Result<DynamicObject, ObjectError> {
        let obj = decode_object(&self.storage, &self.registries, path)?;
        if let Some(claim) = self.claim_key(&obj)? {
            self.unique_keys.record(claim.property, claim.bytes, path);
        }
        Ok(obj)
    }

    /// Opens the object behind a lazy reference.
    pub fn open_ref(&mut self, target: &ObjectRef) -> Result<DynamicObject, ObjectError> {
        self.decode_object(&target.path)
    }

    /// Checks that the unique key of `obj`, if any, is free for it.
    fn claim_key(&self, obj: &DynamicObject) -> Result<Option<ClaimedKey>, ObjectError> {
        let Some(prop) = self.registries.unique_identifier(&obj.class_id) else {
            return Ok(None);
        };
        let Some(bytes) = obj.properties.get(prop.pid) else {
            return Ok(None);
        };
        if let Some(holder) = self.unique_keys.check(&prop.id, bytes, obj.path()) {
            return Err(ObjectError::DuplicateUniqueKey {
                class: class_name(&self.registries, &obj.class_id),
                property: prop.name.clone(),
                holder: holder.to_string(),
            });
        }
        Ok(Some(ClaimedKey {
            property: prop.id,
            bytes: bytes.to_vec(),
        }))
    }

    // ===== READING =====

    /// Returns a property's value, or `None` if the object does not store it.
    ///
    /// References come back as lazy [`ObjectRef`]s; nothing below the
    /// object is decoded.
    pub fn get_property(&self, obj: &DynamicObject, name: &str) -> Result<Option<Value>, ObjectError> {
        let registries = &*self.registries;
        let slot = slot(registries, obj, name)?;
        let Some(data) = obj.properties.get(slot.prop.pid) else {
            return Ok(None);
        };
        let fail = |source: DecodeError| slot.decode_err(obj, source);

        let value = match slot.format {
            PropertyFormat::Data | PropertyFormat::WeakRef => {
                decode_value(data, slot.prop.type_id, registries).map_err(fail)?
            }
            PropertyFormat::DataStream => {
                let path = attached(obj)?;
                Value::Stream(join(path, &stream_name(data).map_err(fail)?))
            }
            PropertyFormat::StrongRef => {
                let path = attached(obj)?;
                let child = decode_utf16_string(data).map_err(fail)?;
                Value::StrongRef(ObjectRef {
                    path: join(path, &child),
                    key: None,
                    local_key: None,
                })
            }
            PropertyFormat::StrongRefSet => {
                let path = attached(obj)?;
                let set_name = decode_utf16_string(data).map_err(fail)?;
                let raw = self.storage.read_stream(&join(path, &index_name(&set_name)))?;
                let index = SetIndex::decode(&raw).map_err(fail)?;
                Value::StrongRefSet(
                    index
                        .entries()
                        .iter()
                        .map(|entry| ObjectRef {
                            path: join(path, &member_name(&set_name, entry.local_key)),
                            key: Some(entry.key),
                            local_key: Some(entry.local_key),
                        })
                        .collect(),
                )
            }
            PropertyFormat::StrongRefVector => {
                let path = attached(obj)?;
                let vector_name = decode_utf16_string(data).map_err(fail)?;
                let raw = self.storage.read_stream(&join(path, &index_name(&vector_name)))?;
                let index = VectorIndex::decode(&raw).map_err(fail)?;
                Value::StrongRefVector(
                    index
                        .local_keys
                        .iter()
                        .map(|&local_key| ObjectRef {
                            path: join(path, &member_name(&vector_name, local_key)),
                            key: None,
                            local_key: Some(local_key),
                        })
                        .collect(),
                )
            }
            PropertyFormat::WeakRefSet | PropertyFormat::WeakRefVector => {
                let path = attached(obj)?;
                let array_name = decode_utf16_string(data).map_err(fail)?;
                let raw = self.storage.read_stream(&join(path, &index_name(&array_name)))?;
                Value::WeakRefs(WeakRefArrayIndex::decode(&raw).map_err(fail)?.keys)
            }
            PropertyFormat::Other(_) => return Err(slot.unsupported(registries, "get_property")),
        };
        Ok(Some(value))
    }

    /// Reads the data stream behind a stream property.
    pub fn read_stream(&self, obj: &DynamicObject, name: &str) -> Result<Option<Vec<u8>>, ObjectError> {
        let slot = slot(&self.registries, obj, name)?;
        slot.require(&self.registries, PropertyFormat::DataStream, "read_stream")?;
        if !obj.properties.contains(slot.prop.pid) {
            return Ok(None);
        }
        let path = attached(obj)?;
        let stream = slot.node_name(obj)?;
        Ok(Some(self.storage.read_stream(&join(path, &stream))?))
    }

    pub fn validate_object(&self, obj: &DynamicObject) -> Result<(), ValidationError> {
        crate::validate::validate_object(&self.registries, obj)
    }

    // ===== WRITING =====

    /// Creates a detached object of a concrete class.
    pub fn create_object(&self, class_name: &str) -> Result<DynamicObject, ObjectError> {
        let class = self
            .registries
            .lookup_class(class_name)
            .ok_or_else(|| SchemaError::UnknownClass {
                name: class_name.to_string(),
            })?;
        if !class.is_concrete {
            return Err(ObjectError::AbstractClass {
                name: class.name.clone(),
            });
        }
        Ok(DynamicObject::new(class.id))
    }

    /// Sets an inline or weak reference property.
    ///
    /// Weak references also accept the target's key as `Value::Auid` or
    /// `Value::MobId`. On an attached object, a unique identifier value
    /// already held by another live object is rejected and `obj` is left
    /// unchanged; detached objects are checked when they are stored. If `obj`
    /// is a member of a set keyed by the changed property, the owner's set
    /// index is rewritten to the new key at once.
    pub fn set_property(
        &mut self,
        obj: &mut DynamicObject,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, obj, name)?;
        let value = match slot.format {
            PropertyFormat::Data => value.into(),
            PropertyFormat::WeakRef => weak_ref_value(&registries, &slot, value.into())?,
            _ => return Err(slot.unsupported(&registries, "set_property")),
        };
        let data = encode_value(&value, slot.prop.type_id, &*registries).map_err(|e| slot.encode_err(e))?;

        if let Some(path) = obj.path.as_deref().filter(|_| slot.prop.is_unique) {
            if let Some(holder) = self.unique_keys.check(&slot.prop.id, &data, Some(path)) {
                return Err(ObjectError::DuplicateUniqueKey {
                    class: slot.class.name.clone(),
                    property: slot.prop.name.clone(),
                    holder: holder.to_string(),
                });
            }
            let old = obj.properties.get(slot.prop.pid);
            if old != Some(data.as_slice()) {
                self.rekey_set_member(&slot, obj, path, &data)?;
            }
            if let Some(old) = old {
                self.unique_keys.forget(&slot.prop.id, old, path);
            }
            self.unique_keys.record(slot.prop.id, data.clone(), path);
        }
        obj.properties.insert(slot.prop.pid, slot.format, data);
        Ok(())
    }

    /// Moves the index entry of the set member stored at `path` to the key
    /// `data`. Objects that are not set members are left alone.
    fn rekey_set_member(
        &mut self,
        slot: &Slot<'_>,
        obj: &DynamicObject,
        path: &str,
        data: &[u8],
    ) -> Result<(), ObjectError> {
        let Some((set_name, local_key)) = parse_member_name(name_of(path)) else {
            return Ok(());
        };
        let owner_path = parent_of(path);
        let owner_stream = join(owner_path, PROPERTIES_STREAM);
        if !self.storage.exists(&owner_stream) {
            return Ok(());
        }
        let owner_class = class_name(&self.registries, &self.storage.class_id(owner_path)?);
        let owner_err = |source| ObjectError::Decode {
            path: owner_path.to_string(),
            pid: 0,
            class: owner_class.clone(),
            source,
        };

        let owner = PropertyStream::decode(&self.storage.read_stream(&owner_stream)?).map_err(owner_err)?;
        let in_set = owner.entries().iter().any(|entry| {
            PropertyFormat::from_u16(entry.format) == PropertyFormat::StrongRefSet
                && decode_utf16_string(&entry.data).is_ok_and(|name| name == set_name)
        });
        if !in_set {
            return Ok(());
        }
        let index_path = join(owner_path, &index_name(set_name));
        let mut index = SetIndex::decode(&self.storage.read_stream(&index_path)?).map_err(owner_err)?;
        if index.key_pid() != slot.prop.pid {
            return Ok(());
        }

        let key = Identifier::from_key_bytes(data)
            .filter(|key| key.key_size() == index.key_size())
            .ok_or_else(|| {
                slot.decode_err(
                    obj,
                    DecodeError::InvalidKeySize {
                        size: u8::try_from(data.len()).unwrap_or(u8::MAX),
                    },
                )
            })?;
        if let Some(existing) = index.local_key(&key).filter(|&k| k != local_key) {
            return Err(ObjectError::DuplicateUniqueKey {
                class: slot.class.name.clone(),
                property: slot.prop.name.clone(),
                holder: join(owner_path, &member_name(set_name, existing)),
            });
        }
        if index.rekey(local_key, key).is_some() {
            self.write_index(slot, &index_path, index.encode())?;
            debug!(owner = %owner_path, property = %slot.prop.name, local_key, "rekeyed set member");
        }
        Ok(())
    }

    /// Removes a property. Nodes it owns out of line are deleted with it.
    pub fn remove_property(&mut self, obj: &mut DynamicObject, name: &str) -> Result<bool, ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, obj, name)?;
        let Some(data) = obj.properties.get(slot.prop.pid).map(<[u8]>::to_vec) else {
            return Ok(false);
        };

        let out_of_line = !matches!(slot.format, PropertyFormat::Data | PropertyFormat::WeakRef);
        if out_of_line {
            let path = attached(obj)?.to_string();
            for node in self.owned_nodes(&path, &slot, obj)? {
                if self.storage.exists(&node) {
                    self.storage.remove(&node)?;
                }
                self.unique_keys.forget_subtree(&node);
            }
        }
        if slot.prop.is_unique {
            if let Some(path) = obj.path.as_deref() {
                self.unique_keys.forget(&slot.prop.id, &data, path);
            }
        }
        obj.properties.remove(slot.prop.pid);
        if out_of_line {
            self.save_object(obj)?;
        }
        Ok(true)
    }

    /// Storage nodes an out-of-line property owns.
    fn owned_nodes(&self, path: &str, slot: &Slot<'_>, obj: &DynamicObject) -> Result<Vec<String>, ObjectError> {
        let name = slot.node_name(obj)?;
        let index_path = join(path, &index_name(&name));
        let nodes = match slot.format {
            PropertyFormat::DataStream | PropertyFormat::StrongRef => vec![join(path, &name)],
            PropertyFormat::StrongRefSet => {
                let raw = self.storage.read_stream(&index_path)?;
                let index = SetIndex::decode(&raw).map_err(|e| slot.decode_err(obj, e))?;
                let mut nodes: Vec<String> = index
                    .entries()
                    .iter()
                    .map(|entry| join(path, &member_name(&name, entry.local_key)))
                    .collect();
                nodes.push(index_path);
                nodes
            }
            PropertyFormat::StrongRefVector => {
                let raw = self.storage.read_stream(&index_path)?;
                let index = VectorIndex::decode(&raw).map_err(|e| slot.decode_err(obj, e))?;
                let mut nodes: Vec<String> = index
                    .local_keys
                    .iter()
                    .map(|&local_key| join(path, &member_name(&name, local_key)))
                    .collect();
                nodes.push(index_path);
                nodes
            }
            PropertyFormat::WeakRefSet | PropertyFormat::WeakRefVector => vec![index_path],
            PropertyFormat::Data | PropertyFormat::WeakRef | PropertyFormat::Other(_) => Vec::new(),
        };
        Ok(nodes)
    }

    /// Writes an attached object's property stream.
    pub fn save_object(&mut self, obj: &DynamicObject) -> Result<(), ObjectError> {
        let path = attached(obj)?;
        self.write_node(obj, path)
    }

    /// Stores a detached object at `path` and attaches it there.
    pub fn store_object(&mut self, obj: &mut DynamicObject, path: &str) -> Result<(), ObjectError> {
        if let Some(existing) = obj.path.as_deref().filter(|p| *p != path) {
            return Err(ObjectError::AlreadyAttached {
                path: existing.to_string(),
            });
        }
        let claim = self.claim_key(obj)?;
        self.write_node(obj, path)?;
        if let Some(claim) = claim {
            self.unique_keys.record(claim.property, claim.bytes, path);
        }
        obj.path = Some(path.to_string());
        Ok(())
    }

    fn write_node(&mut self, obj: &DynamicObject, path: &str) -> Result<(), ObjectError> {
        let data = obj.properties.encode().map_err(|source| ObjectError::Encode {
            class: class_name(&self.registries, &obj.class_id),
            property: PROPERTIES_STREAM.to_string(),
            source,
        })?;
        self.storage.create_storage(path, obj.class_id)?;
        self.storage.write_stream(&join(path, PROPERTIES_STREAM), data)?;
        Ok(())
    }

    /// Replaces whatever node sits at `path` with `obj`.
    fn place(&mut self, obj: &mut DynamicObject, path: String, claim: Option<ClaimedKey>) -> Result<(), ObjectError> {
        if self.storage.exists(&path) {
            self.storage.remove(&path)?;
            self.unique_keys.forget_subtree(&path);
        }
        self.write_node(obj, &path)?;
        if let Some(claim) = claim {
            self.unique_keys.record(claim.property, claim.bytes, &path);
        }
        obj.path = Some(path);
        Ok(())
    }

    fn check_member(
        &self,
        slot: &Slot<'_>,
        owner: &DynamicObject,
        member: &DynamicObject,
    ) -> Result<(), ObjectError> {
        if let Some(path) = member.path.as_deref() {
            return Err(ObjectError::AlreadyAttached { path: path.to_string() });
        }
        let expected = referenced_class(&self.registries, slot.prop.type_id).map_err(|e| slot.decode_err(owner, e))?;
        // Targets missing from the registries are not checked.
        if let Some(expected) = expected.filter(|id| self.registries.lookup_class_by_id(id).is_some()) {
            if !self.registries.classes().is_a(&member.class_id, &expected) {
                return Err(ObjectError::ClassMismatch {
                    property: format!("{}.{}", slot.class.name, slot.prop.name),
                    expected: class_name(&self.registries, &expected),
                    actual: class_name(&self.registries, &member.class_id),
                });
            }
        }
        Ok(())
    }

    fn write_index(&mut self, slot: &Slot<'_>, path: &str, data: Result<Vec<u8>, EncodeError>) -> Result<(), ObjectError> {
        let data = data.map_err(|e| slot.encode_err(e))?;
        self.storage.write_stream(path, data)?;
        Ok(())
    }

    /// Points a strong reference property at `child`, replacing any
    /// previous child.
    pub fn attach_object(
        &mut self,
        owner: &mut DynamicObject,
        name: &str,
        child: &mut DynamicObject,
    ) -> Result<ObjectRef, ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, owner, name)?;
        slot.require(&registries, PropertyFormat::StrongRef, "attach_object")?;
        let owner_path = attached(owner)?.to_string();
        self.check_member(&slot, owner, child)?;
        let claim = self.claim_key(child)?;

        let child_name = slot.node_name(owner)?;
        let child_path = join(&owner_path, &child_name);
        self.place(child, child_path.clone(), claim)?;
        owner
            .properties
            .insert(slot.prop.pid, PropertyFormat::StrongRef, encode_utf16_string(&child_name));
        self.save_object(owner)?;
        Ok(ObjectRef {
            path: child_path,
            key: None,
            local_key: None,
        })
    }

    /// Adds `member` to a strong reference set, keyed by its unique
    /// identifier.
    ///
    /// The member takes the smallest free local key. On failure neither
    /// object changes.
    pub fn insert_set_member(
        &mut self,
        owner: &mut DynamicObject,
        name: &str,
        member: &mut DynamicObject,
    ) -> Result<ObjectRef, ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, owner, name)?;
        slot.require(&registries, PropertyFormat::StrongRefSet, "insert_set_member")?;
        let owner_path = attached(owner)?.to_string();
        self.check_member(&slot, owner, member)?;

        let member_class = class_name(&registries, &member.class_id);
        let key_prop = registries
            .unique_identifier(&member.class_id)
            .ok_or_else(|| ObjectError::MissingUniqueKey {
                class: member_class.clone(),
            })?;
        let claim = self.claim_key(member)?.ok_or_else(|| ObjectError::MissingUniqueKey {
            class: member_class.clone(),
        })?;
        let key = Identifier::from_key_bytes(&claim.bytes).ok_or_else(|| {
            slot.decode_err(
                member,
                DecodeError::InvalidKeySize {
                    size: u8::try_from(claim.bytes.len()).unwrap_or(u8::MAX),
                },
            )
        })?;

        let set_name = slot.node_name(owner)?;
        let index_path = join(&owner_path, &index_name(&set_name));
        let mut index = if self.storage.exists(&index_path) {
            let raw = self.storage.read_stream(&index_path)?;
            SetIndex::decode(&raw).map_err(|e| slot.decode_err(owner, e))?
        } else {
            SetIndex::new(key_prop.pid, key.key_size())
        };
        let Some(local_key) = index.insert(key) else {
            return Err(match index.local_key(&key) {
                Some(existing) => ObjectError::DuplicateUniqueKey {
                    class: member_class,
                    property: key_prop.name.clone(),
                    holder: join(&owner_path, &member_name(&set_name, existing)),
                },
                None => slot.decode_err(owner, DecodeError::InvalidKeySize { size: key.key_size() }),
            });
        };

        let member_path = join(&owner_path, &member_name(&set_name, local_key));
        self.place(member, member_path.clone(), Some(claim))?;
        self.write_index(&slot, &index_path, index.encode())?;
        owner
            .properties
            .insert(slot.prop.pid, PropertyFormat::StrongRefSet, encode_utf16_string(&set_name));
        self.save_object(owner)?;
        debug!(owner = %owner_path, property = %slot.prop.name, local_key, "inserted set member");
        Ok(ObjectRef {
            path: member_path,
            key: Some(key),
            local_key: Some(local_key),
        })
    }

    /// Removes the member with persistent key `key` from a strong reference
    /// set, deleting its subtree. Returns false if no such member exists.
    pub fn remove_set_member(
        &mut self,
        owner: &mut DynamicObject,
        name: &str,
        key: &Identifier,
    ) -> Result<bool, ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, owner, name)?;
        slot.require(&registries, PropertyFormat::StrongRefSet, "remove_set_member")?;
        let owner_path = attached(owner)?.to_string();
        if !owner.properties.contains(slot.prop.pid) {
            return Ok(false);
        }

        let set_name = slot.node_name(owner)?;
        let index_path = join(&owner_path, &index_name(&set_name));
        let raw = self.storage.read_stream(&index_path)?;
        let mut index = SetIndex::decode(&raw).map_err(|e| slot.decode_err(owner, e))?;
        let Some(local_key) = index.remove(key) else {
            return Ok(false);
        };

        let member_path = join(&owner_path, &member_name(&set_name, local_key));
        if self.storage.exists(&member_path) {
            self.storage.remove(&member_path)?;
        }
        self.unique_keys.forget_subtree(&member_path);
        self.write_index(&slot, &index_path, index.encode())?;
        debug!(owner = %owner_path, property = %slot.prop.name, local_key, "removed set member");
        Ok(true)
    }

    /// Appends `member` to a strong reference vector.
    pub fn append_vector_member(
        &mut self,
        owner: &mut DynamicObject,
        name: &str,
        member: &mut DynamicObject,
    ) -> Result<ObjectRef, ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, owner, name)?;
        slot.require(&registries, PropertyFormat::StrongRefVector, "append_vector_member")?;
        let owner_path = attached(owner)?.to_string();
        self.check_member(&slot, owner, member)?;
        let claim = self.claim_key(member)?;

        let vector_name = slot.node_name(owner)?;
        let index_path = join(&owner_path, &index_name(&vector_name));
        let mut index = if self.storage.exists(&index_path) {
            let raw = self.storage.read_stream(&index_path)?;
            VectorIndex::decode(&raw).map_err(|e| slot.decode_err(owner, e))?
        } else {
            VectorIndex {
                next_free_key: 0,
                last_free_key: NO_FREE_KEY,
                local_keys: Vec::new(),
            }
        };
        let local_key = index.next_free_key;
        index.next_free_key = local_key.checked_add(1).ok_or_else(|| {
            slot.encode_err(EncodeError::IndexTooLarge {
                len: index.local_keys.len(),
            })
        })?;
        index.local_keys.push(local_key);

        let member_path = join(&owner_path, &member_name(&vector_name, local_key));
        self.place(member, member_path.clone(), claim)?;
        self.write_index(&slot, &index_path, index.encode())?;
        owner
            .properties
            .insert(slot.prop.pid, PropertyFormat::StrongRefVector, encode_utf16_string(&vector_name));
        self.save_object(owner)?;
        Ok(ObjectRef {
            path: member_path,
            key: None,
            local_key: Some(local_key),
        })
    }

    /// Replaces the data stream behind a stream property.
    pub fn write_stream(&mut self, obj: &mut DynamicObject, name: &str, data: Vec<u8>) -> Result<(), ObjectError> {
        let registries = Arc::clone(&self.registries);
        let slot = slot(&registries, obj, name)?;
        slot.require(&registries, PropertyFormat::DataStream, "write_stream")?;
        let path = attached(obj)?.to_string();
        let stream = slot.node_name(obj)?;
        self.storage.write_stream(&join(&path, &stream), data)?;
        obj.properties
            .insert(slot.prop.pid, PropertyFormat::DataStream, encode_stream_name(&stream));
        self.save_object(obj)
    }
}

/// Turns a bare key into a weak reference to an object of the referenced
/// class. Other values pass through for the codec to check.
fn weak_ref_value(registries: &Registries, slot: &Slot<'_>, value: Value) -> Result<Value, ObjectError> {
    let Some(key) = value.as_identifier() else {
        return Ok(value);
    };
    let def = resolve_renames(registries, slot.prop.type_id).map_err(|e| slot.encode_err(e.into()))?;
    let TypeKind::WeakRef { referenced_type, .. } = &def.kind else {
        return Ok(value);
    };
    let key_prop = registries
        .unique_identifier(referenced_type)
        .ok_or_else(|| ObjectError::MissingUniqueKey {
            class: class_name(registries, referenced_type),
        })?;
    Ok(Value::WeakRef(WeakRef::new(key_prop.pid, key)))
}
