//! The metadictionary: type and class registries and their persistence.
//!
//! Definitions are stored as ordinary objects below the metadictionary
//! storage, each with its own property stream, grouped into strong
//! reference sets.

pub mod classes;
pub mod metadict;
pub mod types;

pub use classes::{ClassRegistry, EffectiveProperties};
pub use metadict::{OpenOptions, Registries, open_metadictionary, open_metadictionary_with, save_metadictionary};
pub use types::{TypeRegistry, encode_type_def, parse_type_def};

use crate::codec::primitives::{
    Reader, WeakRef, decode_auid_array, decode_ref, decode_utf16_array, decode_utf16_string,
    encode_ref, encode_utf16_string,
};
use crate::codec::properties::{PropertyFormat, PropertyStream};
use crate::error::{DecodeError, SchemaError, StorageError};
use crate::limits::{ENUM_VALUE_SIZE, PROPERTIES_STREAM};
use crate::model::Auid;
use crate::model::well_known::pids;
use crate::storage::{Storage, join};

/// Builds the storage name of a set or vector property: the property name
/// truncated to fit `size` together with a `-{pid:x}` suffix.
pub fn mangle_name(name: &str, pid: u16, size: usize) -> String {
    let hex = format!("{:x}", pid);
    let keep = size.saturating_sub(hex.len() + 2);
    let truncated: String = name.chars().take(keep).collect();
    format!("{}-{}", truncated, hex)
}

/// Reads and decodes the property stream of the object stored at `path`.
pub(crate) fn read_properties<S: Storage + ?Sized>(
    storage: &S,
    path: &str,
) -> Result<PropertyStream, SchemaError> {
    let data = storage.read_stream(&join(path, PROPERTIES_STREAM))?;
    PropertyStream::decode(&data).map_err(|source| SchemaError::Definition {
        path: path.to_string(),
        source,
    })
}

/// Typed access to the properties of one definition node.
pub(crate) struct DefinitionReader<'a> {
    path: &'a str,
    props: PropertyStream,
}

impl<'a> DefinitionReader<'a> {
    pub fn open<S: Storage + ?Sized>(storage: &S, path: &'a str) -> Result<Self, SchemaError> {
        Ok(Self {
            path,
            props: read_properties(storage, path)?,
        })
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn properties(&self) -> &PropertyStream {
        &self.props
    }

    pub fn contains(&self, pid: u16) -> bool {
        self.props.contains(pid)
    }

    fn fail(&self, source: DecodeError) -> SchemaError {
        SchemaError::Definition {
            path: self.path.to_string(),
            source,
        }
    }

    pub fn required(&self, pid: u16, context: &'static str) -> Result<&[u8], SchemaError> {
        self.props
            .get(pid)
            .ok_or_else(|| self.fail(DecodeError::MissingProperty { pid, context }))
    }

    pub fn auid(&self, pid: u16, context: &'static str) -> Result<Auid, SchemaError> {
        let data = self.required(pid, context)?;
        let mut reader = Reader::new(data);
        reader.read_auid(context).map_err(|e| self.fail(e))
    }

    pub fn string(&self, pid: u16, context: &'static str) -> Result<String, SchemaError> {
        decode_utf16_string(self.required(pid, context)?).map_err(|e| self.fail(e))
    }

    pub fn optional_string(&self, pid: u16) -> Result<Option<String>, SchemaError> {
        self.props
            .get(pid)
            .map(|data| decode_utf16_string(data).map_err(|e| self.fail(e)))
            .transpose()
    }

    pub fn flag(&self, pid: u16, context: &'static str) -> Result<bool, SchemaError> {
        Ok(self.required(pid, context)? == [1u8])
    }

    pub fn optional_flag(&self, pid: u16) -> bool {
        self.props.get(pid) == Some(&[1u8][..])
    }

    pub fn u8(&self, pid: u16, context: &'static str) -> Result<u8, SchemaError> {
        Reader::new(self.required(pid, context)?)
            .read_u8(context)
            .map_err(|e| self.fail(e))
    }

    pub fn u16(&self, pid: u16, context: &'static str) -> Result<u16, SchemaError> {
        Reader::new(self.required(pid, context)?)
            .read_u16(context)
            .map_err(|e| self.fail(e))
    }

    pub fn u32(&self, pid: u16, context: &'static str) -> Result<u32, SchemaError> {
        Reader::new(self.required(pid, context)?)
            .read_u32(context)
            .map_err(|e| self.fail(e))
    }

    /// Reads a weak reference and returns the AUID it points at.
    pub fn reference(&self, pid: u16, context: &'static str) -> Result<Auid, SchemaError> {
        let weakref = decode_ref(self.required(pid, context)?).map_err(|e| self.fail(e))?;
        weakref.key.as_auid().ok_or_else(|| {
            self.fail(DecodeError::InvalidKeySize {
                size: weakref.key.key_size(),
            })
        })
    }

    pub fn auid_array(&self, pid: u16, context: &'static str) -> Result<Vec<Auid>, SchemaError> {
        decode_auid_array(self.required(pid, context)?).map_err(|e| self.fail(e))
    }

    pub fn string_array(&self, pid: u16, context: &'static str) -> Result<Vec<String>, SchemaError> {
        decode_utf16_array(self.required(pid, context)?).map_err(|e| self.fail(e))
    }

    pub fn int64_array(&self, pid: u16, context: &'static str) -> Result<Vec<i64>, SchemaError> {
        let data = self.required(pid, context)?;
        if data.len() % ENUM_VALUE_SIZE != 0 {
            return Err(self.fail(DecodeError::MisalignedArray {
                len: data.len(),
                element_size: ENUM_VALUE_SIZE,
            }));
        }
        let mut reader = Reader::new(data);
        let mut values = Vec::with_capacity(data.len() / ENUM_VALUE_SIZE);
        while !reader.is_empty() {
            values.push(reader.read_sint(8, context).map_err(|e| self.fail(e))?);
        }
        Ok(values)
    }
}

// =============================================================================
// WRITING
// =============================================================================

/// Builds definition property streams in a fixed, readable order.
#[derive(Debug, Default)]
pub(crate) struct DefinitionWriter {
    props: PropertyStream,
}

impl DefinitionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing stream, keeping its directory order.
    pub fn from_stream(props: PropertyStream) -> Self {
        Self { props }
    }

    pub fn header(&mut self, id: &Auid, name: &str, description: Option<&str>) {
        self.auid(pids::IDENTIFICATION, id);
        self.string(pids::NAME, name);
        if let Some(description) = description {
            self.string(pids::DESCRIPTION, description);
        }
    }

    pub fn auid(&mut self, pid: u16, id: &Auid) {
        self.props
            .insert(pid, PropertyFormat::Data, id.to_bytes_le().to_vec());
    }

    pub fn string(&mut self, pid: u16, s: &str) {
        self.props.insert(pid, PropertyFormat::Data, encode_utf16_string(s));
    }

    pub fn flag(&mut self, pid: u16, value: bool) {
        self.props.insert(pid, PropertyFormat::Data, vec![u8::from(value)]);
    }

    pub fn bytes(&mut self, pid: u16, data: Vec<u8>) {
        self.props.insert(pid, PropertyFormat::Data, data);
    }

    /// Writes a weak reference to a definition keyed by its identification.
    pub fn reference(&mut self, pid: u16, target: &Auid) {
        let weakref = WeakRef::new(pids::IDENTIFICATION, *target);
        self.props.insert(pid, PropertyFormat::WeakRef, encode_ref(&weakref));
    }

    /// Writes the name of an out-of-line collection.
    pub fn collection(&mut self, pid: u16, format: PropertyFormat, name: &str) {
        self.props.insert(pid, format, encode_utf16_string(name));
    }

    pub fn finish(self) -> PropertyStream {
        self.props
    }
}

/// Storage mutations collected before any of them is applied, so a save
/// that fails while encoding leaves the file untouched.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    ops: Vec<StagedWrite>,
}

#[derive(Debug)]
enum StagedWrite {
    Remove(String),
    Storage { path: String, class_id: Auid },
    Stream { path: String, data: Vec<u8> },
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes `path` if it exists.
    pub fn remove(&mut self, path: String) {
        self.ops.push(StagedWrite::Remove(path));
    }

    pub fn storage(&mut self, path: String, class_id: Auid) {
        self.ops.push(StagedWrite::Storage { path, class_id });
    }

    pub fn stream(&mut self, path: String, data: Vec<u8>) {
        self.ops.push(StagedWrite::Stream { path, data });
    }

    /// Moves every write of `other` after the writes already staged.
    pub fn append(&mut self, other: StagedWrites) {
        self.ops.extend(other.ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Applies the writes in staging order.
    pub fn apply<S: Storage + ?Sized>(self, storage: &mut S) -> Result<(), StorageError> {
        for op in self.ops {
            match op {
                StagedWrite::Remove(path) => {
                    if storage.exists(&path) {
                        storage.remove(&path)?;
                    }
                }
                StagedWrite::Storage { path, class_id } => storage.create_storage(&path, class_id)?,
                StagedWrite::Stream { path, data } => storage.write_stream(&path, data)?,
            }
        }
        Ok(())
    }
}
