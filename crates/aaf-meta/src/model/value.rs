//! Decoded property values.

use crate::codec::primitives::WeakRef;
use crate::model::{Auid, Identifier, MobId};

/// A lazy handle to an object reachable through a strong reference.
///
/// Nothing is read until the handle is opened through the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Storage path of the referenced object.
    pub path: String,
    /// Persistent key, for set members.
    pub key: Option<Identifier>,
    /// Local key, for set and vector members.
    pub local_key: Option<u32>,
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer of any declared width.
    Int(i64),
    /// Unsigned integer of any declared width.
    UInt(u64),
    Char(char),
    String(String),
    /// Enumeration element; `name` is `None` for values the type does not list.
    Enum { value: i64, name: Option<String> },
    /// Extendible enumeration element.
    ExtEnum { value: Auid, name: Option<String> },
    Auid(Auid),
    MobId(MobId),
    /// Record members in declaration order.
    Record(Vec<(String, Value)>),
    /// Fixed array, variable array, or set of inline values.
    Array(Vec<Value>),
    /// A value tagged with its own type.
    Indirect { type_id: Auid, value: Box<Value> },
    /// Opaque bytes.
    Bytes(Vec<u8>),
    WeakRef(WeakRef),
    /// Keys of a weak reference vector or set, in stored order.
    WeakRefs(Vec<Identifier>),
    StrongRef(ObjectRef),
    StrongRefSet(Vec<ObjectRef>),
    StrongRefVector(Vec<ObjectRef>),
    /// Storage path of a data stream.
    Stream(String),
}

impl Value {
    /// Returns the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as i128 if it is any kind of integer.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v as i128),
            Value::UInt(v) => Some(*v as i128),
            Value::Enum { value, .. } => Some(*value as i128),
            _ => None,
        }
    }

    /// Returns the identifier, if this value is one.
    pub fn as_identifier(&self) -> Option<Identifier> {
        match self {
            Value::Auid(id) => Some(Identifier::Auid(*id)),
            Value::MobId(id) => Some(Identifier::MobId(*id)),
            _ => None,
        }
    }

    /// Looks up a record member by name.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Auid> for Value {
    fn from(id: Auid) -> Self {
        Value::Auid(id)
    }
}

impl From<MobId> for Value {
    fn from(id: MobId) -> Self {
        Value::MobId(id)
    }
}
