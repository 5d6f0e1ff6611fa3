//! Well-known identifiers and property ids of the metadictionary.
//!
//! These are fixed by the file format; everything else about the schema is
//! read from the file.

use rustc_hash::FxHashMap;

use crate::model::Auid;
use crate::model::typedef::TypeClass;

/// The root class sentinel. It is never surfaced by the registry and never
/// written.
pub const ROOT_CLASS_ID: Auid = Auid::from_u128(0xb3b398a5_1c90_11d4_8053_080036210804);

/// Name reserved for the root class sentinel.
pub const ROOT_CLASS_NAME: &str = "Root";

/// Storage class of the metadictionary node.
pub const METADICTIONARY_CLASS: Auid = Auid::from_u128(0x0d010101_0225_0000_060e_2b3402060101);

/// Storage class of class definition nodes.
pub const CLASS_DEF_CLASS: Auid = Auid::from_u128(0x0d010101_0201_0000_060e_2b3402060101);

/// Storage class of property definition nodes.
pub const PROPERTY_DEF_CLASS: Auid = Auid::from_u128(0x0d010101_0202_0000_060e_2b3402060101);

/// Storage classes of the fifteen type definition kinds.
pub mod type_classes {
    use crate::model::Auid;

    pub const INT: Auid = Auid::from_u128(0x0d010101_0204_0000_060e_2b3402060101);
    pub const STRONG_REF: Auid = Auid::from_u128(0x0d010101_0205_0000_060e_2b3402060101);
    pub const WEAK_REF: Auid = Auid::from_u128(0x0d010101_0206_0000_060e_2b3402060101);
    pub const ENUM: Auid = Auid::from_u128(0x0d010101_0207_0000_060e_2b3402060101);
    pub const FIXED_ARRAY: Auid = Auid::from_u128(0x0d010101_0208_0000_060e_2b3402060101);
    pub const VAR_ARRAY: Auid = Auid::from_u128(0x0d010101_0209_0000_060e_2b3402060101);
    pub const SET: Auid = Auid::from_u128(0x0d010101_020a_0000_060e_2b3402060101);
    pub const STRING: Auid = Auid::from_u128(0x0d010101_020b_0000_060e_2b3402060101);
    pub const STREAM: Auid = Auid::from_u128(0x0d010101_020c_0000_060e_2b3402060101);
    pub const RECORD: Auid = Auid::from_u128(0x0d010101_020d_0000_060e_2b3402060101);
    pub const RENAME: Auid = Auid::from_u128(0x0d010101_020e_0000_060e_2b3402060101);
    pub const EXT_ENUM: Auid = Auid::from_u128(0x0d010101_0220_0000_060e_2b3402060101);
    pub const INDIRECT: Auid = Auid::from_u128(0x0d010101_0221_0000_060e_2b3402060101);
    pub const OPAQUE: Auid = Auid::from_u128(0x0d010101_0222_0000_060e_2b3402060101);
    pub const CHARACTER: Auid = Auid::from_u128(0x0d010101_0223_0000_060e_2b3402060101);
}

lazy_static::lazy_static! {
    /// Dispatch table from a definition node's storage class to its kind.
    pub static ref TYPE_CLASSES: FxHashMap<Auid, TypeClass> = {
        let mut m = FxHashMap::default();
        m.insert(type_classes::INT, TypeClass::Int);
        m.insert(type_classes::STRONG_REF, TypeClass::StrongRef);
        m.insert(type_classes::WEAK_REF, TypeClass::WeakRef);
        m.insert(type_classes::ENUM, TypeClass::Enum);
        m.insert(type_classes::FIXED_ARRAY, TypeClass::FixedArray);
        m.insert(type_classes::VAR_ARRAY, TypeClass::VarArray);
        m.insert(type_classes::SET, TypeClass::Set);
        m.insert(type_classes::STRING, TypeClass::String);
        m.insert(type_classes::STREAM, TypeClass::Stream);
        m.insert(type_classes::RECORD, TypeClass::Record);
        m.insert(type_classes::RENAME, TypeClass::Rename);
        m.insert(type_classes::EXT_ENUM, TypeClass::ExtEnum);
        m.insert(type_classes::INDIRECT, TypeClass::Indirect);
        m.insert(type_classes::OPAQUE, TypeClass::Opaque);
        m.insert(type_classes::CHARACTER, TypeClass::Character);
        m
    };
}

/// Property ids used inside the metadictionary.
pub mod pids {
    pub const CLASS_DEFINITIONS: u16 = 0x0003;
    pub const TYPE_DEFINITIONS: u16 = 0x0004;

    pub const IDENTIFICATION: u16 = 0x0005;
    pub const NAME: u16 = 0x0006;
    pub const DESCRIPTION: u16 = 0x0007;

    pub const CLASS_PARENT: u16 = 0x0008;
    pub const CLASS_PROPERTIES: u16 = 0x0009;
    pub const CLASS_IS_CONCRETE: u16 = 0x000a;

    pub const PROPERTY_TYPE: u16 = 0x000b;
    pub const PROPERTY_IS_OPTIONAL: u16 = 0x000c;
    pub const PROPERTY_LOCAL_ID: u16 = 0x000d;
    pub const PROPERTY_IS_UNIQUE: u16 = 0x000e;

    pub const INT_SIZE: u16 = 0x000f;
    pub const INT_IS_SIGNED: u16 = 0x0010;
    pub const STRONG_REF_TYPE: u16 = 0x0011;
    pub const WEAK_REF_TYPE: u16 = 0x0012;
    pub const WEAK_REF_TARGET_SET: u16 = 0x0013;
    pub const ENUM_ELEMENT_TYPE: u16 = 0x0014;
    pub const ENUM_ELEMENT_NAMES: u16 = 0x0015;
    pub const ENUM_ELEMENT_VALUES: u16 = 0x0016;
    pub const FIXED_ARRAY_ELEMENT_TYPE: u16 = 0x0017;
    pub const FIXED_ARRAY_COUNT: u16 = 0x0018;
    pub const VAR_ARRAY_ELEMENT_TYPE: u16 = 0x0019;
    pub const SET_ELEMENT_TYPE: u16 = 0x001a;
    pub const STRING_ELEMENT_TYPE: u16 = 0x001b;
    pub const RECORD_MEMBER_TYPES: u16 = 0x001c;
    pub const RECORD_MEMBER_NAMES: u16 = 0x001d;
    pub const RENAME_TYPE: u16 = 0x001e;
    pub const EXT_ENUM_ELEMENT_NAMES: u16 = 0x001f;
    pub const EXT_ENUM_ELEMENT_VALUES: u16 = 0x0020;
}

/// Baseline type definitions referenced by identifier.
pub mod types {
    use crate::model::Auid;

    pub const UINT8: Auid = Auid::from_u128(0x01010100_0000_0000_060e_2b3401040101);
    pub const UINT16: Auid = Auid::from_u128(0x01010200_0000_0000_060e_2b3401040101);
    pub const UINT32: Auid = Auid::from_u128(0x01010300_0000_0000_060e_2b3401040101);
    pub const UINT64: Auid = Auid::from_u128(0x01010400_0000_0000_060e_2b3401040101);
    pub const INT8: Auid = Auid::from_u128(0x01010500_0000_0000_060e_2b3401040101);
    pub const INT16: Auid = Auid::from_u128(0x01010600_0000_0000_060e_2b3401040101);
    pub const INT32: Auid = Auid::from_u128(0x01010700_0000_0000_060e_2b3401040101);
    pub const INT64: Auid = Auid::from_u128(0x01010800_0000_0000_060e_2b3401040101);

    pub const UINT8_ARRAY8: Auid = Auid::from_u128(0x04010800_0000_0000_060e_2b3401040101);

    /// The AUID record; values of this type decode as identifiers.
    pub const AUID: Auid = Auid::from_u128(0x01030100_0000_0000_060e_2b3401040101);
    /// The MobID record; values of this type decode as 32-byte identifiers.
    pub const MOB_ID: Auid = Auid::from_u128(0x01030200_0000_0000_060e_2b3401040101);

    pub const BOOLEAN: Auid = Auid::from_u128(0x01040100_0000_0000_060e_2b3401040101);
    pub const CHARACTER: Auid = Auid::from_u128(0x01100100_0000_0000_060e_2b3401040101);
    pub const STRING: Auid = Auid::from_u128(0x01100200_0000_0000_060e_2b3401040101);
}

/// Baseline classes referenced by identifier.
pub mod classes {
    use crate::model::Auid;

    pub const INTERCHANGE_OBJECT: Auid = Auid::from_u128(0x0d010101_0101_0100_060e_2b3402060101);
    pub const ESSENCE_DESCRIPTOR: Auid = Auid::from_u128(0x0d010101_0101_2400_060e_2b3402060101);
    pub const FILE_DESCRIPTOR: Auid = Auid::from_u128(0x0d010101_0101_2500_060e_2b3402060101);
}
