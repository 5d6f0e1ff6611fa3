//! Format constants and decoding limits.

/// Byte order marker for little-endian property streams (`'L'`).
pub const BYTE_ORDER_LITTLE: u8 = 0x4c;

/// Version byte written into newly created property streams.
pub const PROPERTY_STREAM_VERSION: u8 = 0x20;

/// Size in bytes of the property stream header.
pub const PROPERTY_HEADER_SIZE: usize = 4;

/// Size in bytes of one property stream directory entry.
pub const PROPERTY_ENTRY_SIZE: usize = 6;

/// Width budget for mangled set names; leaves room for a `{local_key}` suffix
/// inside a 32 character storage name.
pub const MANGLED_NAME_SIZE: usize = 32 - 10;

/// Suffix of the storage node holding a set or vector index.
pub const INDEX_SUFFIX: &str = " index";

/// Name of the stream holding an object's properties.
pub const PROPERTIES_STREAM: &str = "properties";

/// `last_free_key` value meaning the free-list is empty.
pub const NO_FREE_KEY: u32 = u32::MAX;

/// Default bound on parent-chain length before a class is treated as cyclic.
pub const MAX_CLASS_DEPTH: usize = 64;

/// Bound on type definition nesting while decoding a value.
pub const MAX_TYPE_DEPTH: usize = 32;

/// Width of the integer backing enumeration value arrays (`aafInt64Array`).
pub const ENUM_VALUE_SIZE: usize = 8;
