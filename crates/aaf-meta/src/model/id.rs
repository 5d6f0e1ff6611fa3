//! Persistent identifiers.
//!
//! Objects, classes, and type definitions are keyed by either a 16-byte
//! UUID (stored in its little-endian field layout) or a 32-byte MobID.

use std::fmt;

use uuid::Uuid;

/// A 16-byte UUID identifier ("AUID").
///
/// On disk the first three UUID fields are little-endian, which is the
/// layout `Uuid::from_bytes_le` expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Auid(Uuid);

/// The nil AUID.
pub const NIL_AUID: Auid = Auid(Uuid::nil());

impl Auid {
    /// Builds an AUID from its canonical 128-bit value
    /// (`0x0d010101_0204_0000_060e_2b3402060101` reads as
    /// `0d010101-0204-0000-060e-2b3402060101`).
    pub const fn from_u128(v: u128) -> Self {
        Auid(Uuid::from_u128(v))
    }

    /// Builds an AUID from its on-disk byte layout.
    pub fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Auid(Uuid::from_bytes_le(bytes))
    }

    /// Returns the on-disk byte layout.
    pub fn to_bytes_le(&self) -> [u8; 16] {
        self.0.to_bytes_le()
    }

    /// Returns the wrapped UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true for the nil AUID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for Auid {
    fn from(uuid: Uuid) -> Self {
        Auid(uuid)
    }
}

impl fmt::Display for Auid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A 32-byte extended identifier, kept in its on-disk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MobId(pub [u8; 32]);

impl MobId {
    /// Returns the on-disk bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A persistent key of either width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Auid(Auid),
    MobId(MobId),
}

impl Identifier {
    /// Key width in bytes as written in reference and index headers.
    pub fn key_size(&self) -> u8 {
        match self {
            Identifier::Auid(_) => 16,
            Identifier::MobId(_) => 32,
        }
    }

    /// Returns the on-disk bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Identifier::Auid(id) => id.to_bytes_le().to_vec(),
            Identifier::MobId(id) => id.0.to_vec(),
        }
    }

    /// Returns the AUID if this is a 16-byte key.
    pub fn as_auid(&self) -> Option<Auid> {
        match self {
            Identifier::Auid(id) => Some(*id),
            Identifier::MobId(_) => None,
        }
    }

    /// Builds an identifier from raw key bytes; only 16 and 32 byte keys exist.
    pub fn from_key_bytes(bytes: &[u8]) -> Option<Identifier> {
        match bytes.len() {
            16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Some(Identifier::Auid(Auid::from_bytes_le(raw)))
            }
            32 => {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(bytes);
                Some(Identifier::MobId(MobId(raw)))
            }
            _ => None,
        }
    }
}

impl From<Auid> for Identifier {
    fn from(id: Auid) -> Self {
        Identifier::Auid(id)
    }
}

impl From<MobId> for Identifier {
    fn from(id: MobId) -> Self {
        Identifier::MobId(id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Auid(id) => id.fmt(f),
            Identifier::MobId(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auid_bytes_le_layout() {
        let id = Auid::from_u128(0x0d010101_0204_0000_060e_2b3402060101);
        let bytes = id.to_bytes_le();
        // First field is stored little-endian.
        assert_eq!(&bytes[0..4], &[0x01, 0x01, 0x01, 0x0d]);
        assert_eq!(&bytes[4..6], &[0x04, 0x02]);
        assert_eq!(&bytes[8..16], &[0x06, 0x0e, 0x2b, 0x34, 0x02, 0x06, 0x01, 0x01]);
        assert_eq!(Auid::from_bytes_le(bytes), id);
    }

    #[test]
    fn test_auid_display() {
        let id = Auid::from_u128(0x0d010101_0204_0000_060e_2b3402060101);
        assert_eq!(id.to_string(), "0d010101-0204-0000-060e-2b3402060101");
    }

    #[test]
    fn test_identifier_from_key_bytes() {
        let auid = Identifier::from_key_bytes(&[7u8; 16]).unwrap();
        assert_eq!(auid.key_size(), 16);
        assert_eq!(auid.to_bytes(), vec![7u8; 16]);

        let mob = Identifier::from_key_bytes(&[9u8; 32]).unwrap();
        assert_eq!(mob, Identifier::MobId(MobId([9u8; 32])));
        assert_eq!(mob.as_auid(), None);

        assert!(Identifier::from_key_bytes(&[0u8; 20]).is_none());
    }

    #[test]
    fn test_mobid_ordering_is_bytewise() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[31] = 1;
        b[0] = 1;
        assert!(MobId(a) < MobId(b));
    }
}
