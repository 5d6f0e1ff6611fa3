//! Error types for property stream decoding, schema loading, and object access.

use thiserror::Error;

use crate::model::Auid;

/// Failure categories shared by every error type in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TruncatedStream,
    UnsupportedByteOrder,
    MisalignedArray,
    InvalidKeySize,
    UnexpectedRefCount,
    UnknownTypeKind,
    DuplicateTypeId,
    UnknownClass,
    NoSuchProperty,
    DuplicateUniqueKey,
    SchemaCycle,
    /// A storage node does not exist.
    NotFound,
    /// Bytes that are structurally wrong in some other way.
    Malformed,
    /// A value that does not fit the declared type.
    InvalidValue,
    /// A definition that is inconsistent with the rest of the schema.
    InvalidDefinition,
}

impl ErrorKind {
    /// Returns true if this kind invalidates the whole schema rather than
    /// one object.
    pub fn is_schema_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownTypeKind | ErrorKind::DuplicateTypeId | ErrorKind::SchemaCycle
        )
    }
}

/// Error while decoding raw bytes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("truncated stream while reading {context}: needed {needed} bytes, {available} available")]
    TruncatedStream {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unsupported byte order marker 0x{found:02x} (only little-endian 0x4c)")]
    UnsupportedByteOrder { found: u8 },

    #[error("array of {len} bytes is not a multiple of the {element_size}-byte element size")]
    MisalignedArray { len: usize, element_size: usize },

    #[error("invalid key size {size} (expected 16 or 32)")]
    InvalidKeySize { size: u8 },

    #[error("set entry with local key {local_key} has ref count {ref_count} (expected 1)")]
    UnexpectedRefCount { local_key: u32, ref_count: u32 },

    #[error("local key {local_key} appears twice in one index")]
    DuplicateLocalKey { local_key: u32 },

    #[error("invalid UTF-16 in {context}")]
    InvalidUtf16 { context: &'static str },

    #[error("invalid integer size {size}")]
    InvalidIntSize { size: u8 },

    #[error("type definition {id} is not in the metadictionary")]
    UnresolvedType { id: Auid },

    #[error("type nesting exceeds {max} levels at {type_name}")]
    TypeNestingTooDeep { type_name: String, max: usize },

    #[error("type {type_name} is stored out of line and needs the storage to decode")]
    NotInlineData { type_name: String },

    #[error("type {type_name} has no fixed size and cannot be an array element here")]
    VariableSizeElement { type_name: String },

    #[error("required property 0x{pid:04x} missing from {context}")]
    MissingProperty { pid: u16, context: &'static str },

    #[error("{len} trailing bytes after {context}")]
    TrailingBytes { context: &'static str, len: usize },

    #[error("type definition {type_name} is malformed: {reason}")]
    MalformedType {
        type_name: String,
        reason: &'static str,
    },
}

impl DecodeError {
    /// Returns the failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::TruncatedStream { .. } => ErrorKind::TruncatedStream,
            DecodeError::UnsupportedByteOrder { .. } => ErrorKind::UnsupportedByteOrder,
            DecodeError::MisalignedArray { .. } => ErrorKind::MisalignedArray,
            DecodeError::InvalidKeySize { .. } => ErrorKind::InvalidKeySize,
            DecodeError::UnexpectedRefCount { .. } => ErrorKind::UnexpectedRefCount,
            DecodeError::UnresolvedType { .. } | DecodeError::MalformedType { .. } => {
                ErrorKind::InvalidDefinition
            }
            _ => ErrorKind::Malformed,
        }
    }
}

/// Error while encoding values or streams.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("value does not match type {type_name}: expected {expected}")]
    TypeMismatch {
        type_name: String,
        expected: &'static str,
    },

    #[error("integer {value} does not fit in {size} bytes (signed: {signed})")]
    IntOutOfRange { value: i128, size: u8, signed: bool },

    #[error("invalid integer size {size}")]
    InvalidIntSize { size: u8 },

    #[error("{name:?} is not an element of {type_name}")]
    UnknownEnumName { type_name: String, name: String },

    #[error("array length {actual} does not match fixed count {expected}")]
    ArrayLengthMismatch { expected: usize, actual: usize },

    #[error("record {type_name} is missing member {member:?}")]
    MissingRecordMember { type_name: String, member: String },

    #[error("type definition {id} is not in the metadictionary")]
    UnresolvedType { id: Auid },

    #[error("type nesting exceeds {max} levels at {type_name}")]
    TypeNestingTooDeep { type_name: String, max: usize },

    #[error("type {type_name} is stored out of line and cannot be encoded inline")]
    NotInlineData { type_name: String },

    #[error("property 0x{pid:04x} payload of {len} bytes exceeds 65535")]
    PayloadTooLarge { pid: u16, len: usize },

    #[error("{count} properties exceed the 65535 entry directory")]
    TooManyProperties { count: usize },

    #[error("{len} index entries exceed u32")]
    IndexTooLarge { len: usize },

    #[error("unusable type definition: {0}")]
    Definition(#[source] DecodeError),
}

impl From<DecodeError> for EncodeError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnresolvedType { id } => EncodeError::UnresolvedType { id },
            DecodeError::TypeNestingTooDeep { type_name, max } => {
                EncodeError::TypeNestingTooDeep { type_name, max }
            }
            other => EncodeError::Definition(other),
        }
    }
}

impl EncodeError {
    /// Returns the failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::UnresolvedType { .. } => ErrorKind::InvalidDefinition,
            EncodeError::Definition(source) => source.kind(),
            EncodeError::PayloadTooLarge { .. }
            | EncodeError::TooManyProperties { .. }
            | EncodeError::IndexTooLarge { .. } => ErrorKind::Malformed,
            _ => ErrorKind::InvalidValue,
        }
    }
}

/// Error from the hierarchical storage backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("node not found: {path}")]
    NotFound { path: String },

    #[error("{path} is not a stream")]
    NotAStream { path: String },

    #[error("{path} is not a storage")]
    NotAStorage { path: String },

    #[error("{path} already exists")]
    AlreadyExists { path: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns the failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Malformed,
        }
    }
}

/// Error while reading, building, or writing the metadictionary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("no metadictionary storage under the root")]
    MissingMetaDictionary,

    #[error("unknown type definition kind {class_id} at {path}")]
    UnknownTypeKind { class_id: Auid, path: String },

    #[error("duplicate type definition {id} ({name})")]
    DuplicateTypeId { id: Auid, name: String },

    #[error("duplicate class definition {name} ({id})")]
    DuplicateClass { id: Auid, name: String },

    #[error("class {class} names unknown parent {parent}")]
    UnknownParent { class: String, parent: String },

    #[error("parent chain of class {class} does not reach the root within {max_depth} levels")]
    SchemaCycle { class: String, max_depth: usize },

    #[error("{name} is reserved for the root class")]
    RootClassReserved { name: String },

    #[error("unknown class {name}")]
    UnknownClass { name: String },

    #[error("unknown type definition {id}")]
    UnknownType { id: Auid },

    #[error("class {class} already has property {name} (pid 0x{pid:04x})")]
    DuplicateProperty { class: String, name: String, pid: u16 },

    #[error("malformed definition at {path}: {source}")]
    Definition {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("cannot encode definition {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: EncodeError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SchemaError {
    /// Returns the failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::UnknownTypeKind { .. } => ErrorKind::UnknownTypeKind,
            SchemaError::DuplicateTypeId { .. } => ErrorKind::DuplicateTypeId,
            SchemaError::SchemaCycle { .. } => ErrorKind::SchemaCycle,
            SchemaError::UnknownClass { .. } => ErrorKind::UnknownClass,
            SchemaError::Definition { source, .. } => source.kind(),
            SchemaError::Encode { source, .. } => source.kind(),
            SchemaError::Storage(e) => e.kind(),
            _ => ErrorKind::InvalidDefinition,
        }
    }
}

/// Error while accessing an object through the dynamic runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    #[error("object at {path} has unknown class {class_id}")]
    UnknownClass { class_id: Auid, path: String },

    #[error("class {class} has no property {name}")]
    NoSuchProperty { class: String, name: String },

    #[error("{class}.{property} value is already held by {holder}")]
    DuplicateUniqueKey {
        class: String,
        property: String,
        holder: String,
    },

    #[error("class {name} is abstract")]
    AbstractClass { name: String },

    #[error("{class} object has no unique identifier")]
    MissingUniqueKey { class: String },

    #[error("{class}.{property} has type {type_name}, which does not support {operation}")]
    UnsupportedOperation {
        class: String,
        property: String,
        type_name: String,
        operation: &'static str,
    },

    #[error("object has no storage location yet")]
    Detached,

    #[error("object is already stored at {path}")]
    AlreadyAttached { path: String },

    #[error("{property} holds {expected} objects, not {actual}")]
    ClassMismatch {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("{path}: property 0x{pid:04x} of class {class}: {source}")]
    Decode {
        path: String,
        pid: u16,
        class: String,
        #[source]
        source: DecodeError,
    },

    #[error("{class}.{property}: {source}")]
    Encode {
        class: String,
        property: String,
        #[source]
        source: EncodeError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ObjectError {
    /// Returns the failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObjectError::UnknownClass { .. } => ErrorKind::UnknownClass,
            ObjectError::NoSuchProperty { .. } => ErrorKind::NoSuchProperty,
            ObjectError::DuplicateUniqueKey { .. } => ErrorKind::DuplicateUniqueKey,
            ObjectError::Decode { source, .. } => source.kind(),
            ObjectError::Encode { source, .. } => source.kind(),
            ObjectError::Schema(e) => e.kind(),
            ObjectError::Storage(e) => e.kind(),
            _ => ErrorKind::InvalidValue,
        }
    }
}

/// Error from structural validation of an object against its class.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{class} object at {path} lacks required property {property}")]
    MissingRequired {
        class: String,
        property: String,
        path: String,
    },

    #[error("{class} object at {path} stores undeclared property 0x{pid:04x}")]
    UndeclaredProperty { class: String, pid: u16, path: String },

    #[error(transparent)]
    Object(#[from] ObjectError),
}
