//! aaf-meta: metadictionary codec and dynamic object model for AAF files.
//!
//! AAF files are self-describing: next to the objects, every file carries a
//! metadictionary holding the definition of each class and type it uses.
//! This crate reads that schema at open time and uses it to turn raw
//! property streams into typed values and back.
//!
//! # Overview
//!
//! Three layered encodings are handled:
//! - **Property streams**: one compact stream of `(pid, format, payload)`
//!   entries per object
//! - **The metadictionary**: class and type definitions, themselves stored
//!   as objects
//! - **Indices**: strong reference sets and vectors, keyed by reusable
//!   local keys managed through a free list
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use aaf_meta::model::well_known::types;
//! use aaf_meta::{Auid, MemoryStorage, ObjectRuntime, PropertyDefinition, Registries, Value};
//!
//! let mut registries = Registries::new();
//! registries
//!     .register_class("Note", Auid::from_u128(0x10), None, true)
//!     .unwrap();
//! registries
//!     .register_property(
//!         "Note",
//!         PropertyDefinition::new(Auid::from_u128(0x11), "Text", 0x8001, types::STRING, false, false),
//!     )
//!     .unwrap();
//!
//! let mut runtime = ObjectRuntime::new(MemoryStorage::new(), Arc::new(registries));
//! runtime.save_metadictionary().unwrap();
//!
//! let mut note = runtime.create_object("Note").unwrap();
//! runtime.set_property(&mut note, "Text", "hello").unwrap();
//! runtime.store_object(&mut note, "/Note-1").unwrap();
//!
//! // Reopen from storage alone.
//! let mut reopened = ObjectRuntime::open(runtime.into_storage()).unwrap();
//! let note = reopened.decode_object("/Note-1").unwrap();
//! assert_eq!(
//!     reopened.get_property(&note, "Text").unwrap(),
//!     Some(Value::String("hello".to_string()))
//! );
//! ```
//!
//! # Modules
//!
//! - [`model`]: Identifiers, definitions, and values
//! - [`codec`]: Property streams, primitives, indices, and the value codec
//! - [`schema`]: Type and class registries, metadictionary open and save
//! - [`object`]: Dynamic objects and the runtime
//! - [`validate`]: Structural checks and the unique key index
//! - [`storage`]: The storage trait and an in-memory implementation
//! - [`error`]: Error types
//! - [`limits`]: Format constants and decoding limits
//!
//! # Safety of Decoding
//!
//! Decoding never trusts counts or nesting read from a file:
//! - Reads are bounds checked and fail with the context being read
//! - Type nesting and class parent chains are bounded
//! - Any malformed definition aborts the open, so no partial schema is used

pub mod codec;
pub mod error;
pub mod limits;
pub mod model;
pub mod object;
pub mod schema;
pub mod storage;
pub mod validate;

// Re-export commonly used types at crate root
pub use codec::{PropertyFormat, PropertyStream, decode_value, encode_value};
pub use error::{DecodeError, EncodeError, ErrorKind, ObjectError, SchemaError, StorageError, ValidationError};
pub use model::{
    Auid, ClassDefinition, Identifier, MobId, NIL_AUID, ObjectRef, PropertyDefinition, TypeDefinition, TypeKind,
    Value,
};
pub use object::{DynamicObject, ObjectRuntime, decode_object};
pub use schema::{OpenOptions, Registries, open_metadictionary, open_metadictionary_with, save_metadictionary};
pub use storage::{MemoryStorage, Storage};
pub use validate::{UniqueKeyIndex, validate_object};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
