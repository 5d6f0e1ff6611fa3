//! Binary encoding/decoding.
//!
//! This module handles the wire formats:
//! - Property streams (one per object)
//! - Primitive fields, weak references, identifier and string arrays
//! - Set, vector, and weak reference array indices
//! - Typed property values, driven by type definitions

pub mod index;
pub mod primitives;
pub mod properties;
pub mod value;

pub use index::{SetIndex, SetIndexEntry, VectorIndex, WeakRefArrayIndex, member_name, parse_member_name};
pub use primitives::{Reader, WeakRef, Writer, decode_ref, encode_ref};
pub use properties::{PropertyEntry, PropertyFormat, PropertyStream};
pub use value::{TypeResolver, decode_value, encode_value, fixed_size};
