//! Data model types.
//!
//! This module contains the schema and value types:
//! - Identifiers (AUIDs and MobIDs)
//! - Type definitions (tagged kinds)
//! - Class and property definitions
//! - Decoded values
//! - Well-known identifiers fixed by the format

pub mod classdef;
pub mod id;
pub mod typedef;
pub mod value;
pub mod well_known;

pub use classdef::{ClassDefinition, PropertyDefinition};
pub use id::{Auid, Identifier, MobId, NIL_AUID};
pub use typedef::{TypeClass, TypeDefinition, TypeKind};
pub use value::{ObjectRef, Value};
