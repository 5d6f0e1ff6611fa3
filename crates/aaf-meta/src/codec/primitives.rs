//! Primitive encoding/decoding.
//!
//! Fixed-width little-endian integers, identifiers, weak reference tuples,
//! AUID arrays, and UTF-16LE strings.

use crate::error::{DecodeError, EncodeError};
use crate::model::{Auid, Identifier, MobId};

// =============================================================================
// DECODING
// =============================================================================

/// Reader for decoding binary data.
///
/// Wraps a byte slice and provides methods for reading primitives
/// with bounds checking and error handling.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current position in the data.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns the number of remaining bytes.
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads exactly n bytes.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining_len() {
            return Err(DecodeError::TruncatedStream {
                context,
                needed: n,
                available: self.remaining_len(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Consumes and returns everything left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.pos = self.data.len();
        rest
    }

    /// Reads a fixed-size array.
    #[inline]
    fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N, context)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>(context)?[0])
    }

    /// Reads a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a little-endian u64.
    #[inline]
    pub fn read_u64(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_array(context)?))
    }

    /// Reads an unsigned little-endian integer of 1, 2, 4 or 8 bytes.
    pub fn read_uint(&mut self, size: u8, context: &'static str) -> Result<u64, DecodeError> {
        match size {
            1 => self.read_u8(context).map(u64::from),
            2 => self.read_u16(context).map(u64::from),
            4 => self.read_u32(context).map(u64::from),
            8 => self.read_u64(context),
            _ => Err(DecodeError::InvalidIntSize { size }),
        }
    }

    /// Reads a signed little-endian integer of 1, 2, 4 or 8 bytes.
    pub fn read_sint(&mut self, size: u8, context: &'static str) -> Result<i64, DecodeError> {
        match size {
            1 => Ok(i8::from_le_bytes(self.read_array(context)?) as i64),
            2 => Ok(i16::from_le_bytes(self.read_array(context)?) as i64),
            4 => Ok(i32::from_le_bytes(self.read_array(context)?) as i64),
            8 => Ok(i64::from_le_bytes(self.read_array(context)?)),
            _ => Err(DecodeError::InvalidIntSize { size }),
        }
    }

    /// Reads a 16-byte AUID.
    #[inline]
    pub fn read_auid(&mut self, context: &'static str) -> Result<Auid, DecodeError> {
        Ok(Auid::from_bytes_le(self.read_array(context)?))
    }

    /// Reads a 32-byte MobID.
    #[inline]
    pub fn read_mobid(&mut self, context: &'static str) -> Result<MobId, DecodeError> {
        Ok(MobId(self.read_array(context)?))
    }

    /// Reads a key of the given width (16 or 32 bytes).
    pub fn read_key(&mut self, key_size: u8, context: &'static str) -> Result<Identifier, DecodeError> {
        match key_size {
            16 => self.read_auid(context).map(Identifier::Auid),
            32 => self.read_mobid(context).map(Identifier::MobId),
            _ => Err(DecodeError::InvalidKeySize { size: key_size }),
        }
    }

    /// Reads a key width byte, rejecting anything but 16 or 32.
    pub fn read_key_size(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        let size = self.read_u8(context)?;
        match size {
            16 | 32 => Ok(size),
            _ => Err(DecodeError::InvalidKeySize { size }),
        }
    }

    /// Reads a weak reference tuple.
    pub fn read_weakref(&mut self) -> Result<WeakRef, DecodeError> {
        let index = self.read_u16("weakref.index")?;
        let key_pid = self.read_u16("weakref.key_pid")?;
        let key_size = self.read_key_size("weakref.key_size")?;
        let key = self.read_key(key_size, "weakref.key")?;
        Ok(WeakRef { index, key_pid, key })
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a new writer with capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a little-endian u16.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian u32.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian u64.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes the low `size` bytes of `value`, little-endian.
    ///
    /// Range checks are the caller's job; see [`check_int_range`].
    pub fn write_int(&mut self, value: i128, size: u8) {
        let bytes = value.to_le_bytes();
        self.buf.extend_from_slice(&bytes[..size as usize]);
    }

    /// Writes a 16-byte AUID in its on-disk layout.
    #[inline]
    pub fn write_auid(&mut self, id: &Auid) {
        self.buf.extend_from_slice(&id.to_bytes_le());
    }

    /// Writes a key of either width.
    pub fn write_key(&mut self, key: &Identifier) {
        match key {
            Identifier::Auid(id) => self.write_auid(id),
            Identifier::MobId(id) => self.buf.extend_from_slice(id.as_bytes()),
        }
    }

    /// Writes a weak reference tuple.
    pub fn write_weakref(&mut self, weakref: &WeakRef) {
        self.write_u16(weakref.index);
        self.write_u16(weakref.key_pid);
        self.write_u8(weakref.key.key_size());
        self.write_key(&weakref.key);
    }

    /// Writes a UTF-16LE string followed by a `00 00` terminator.
    pub fn write_utf16z(&mut self, s: &str) {
        for unit in s.encode_utf16() {
            self.write_u16(unit);
        }
        self.write_u16(0);
    }
}

/// Checks that `value` fits an integer of `size` bytes.
pub fn check_int_range(value: i128, size: u8, signed: bool) -> Result<(), EncodeError> {
    let bits = match size {
        1 | 2 | 4 | 8 => u32::from(size) * 8,
        _ => return Err(EncodeError::InvalidIntSize { size }),
    };
    let (min, max) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if value < min || value > max {
        return Err(EncodeError::IntOutOfRange { value, size, signed });
    }
    Ok(())
}

// =============================================================================
// WEAK REFERENCES
// =============================================================================

/// A weak (or strong, in the metadictionary) reference tuple.
///
/// `index` is informational only; readers ignore it. `key_pid` names the
/// property holding the target's unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakRef {
    pub index: u16,
    pub key_pid: u16,
    pub key: Identifier,
}

impl WeakRef {
    /// Creates a reference with index 0.
    pub fn new(key_pid: u16, key: impl Into<Identifier>) -> Self {
        Self {
            index: 0,
            key_pid,
            key: key.into(),
        }
    }
}

/// Decodes a weak reference payload.
pub fn decode_ref(data: &[u8]) -> Result<WeakRef, DecodeError> {
    Reader::new(data).read_weakref()
}

/// Encodes a weak reference payload.
pub fn encode_ref(weakref: &WeakRef) -> Vec<u8> {
    let mut writer = Writer::with_capacity(5 + weakref.key.key_size() as usize);
    writer.write_weakref(weakref);
    writer.into_bytes()
}

// =============================================================================
// ARRAYS AND STRINGS
// =============================================================================

/// Decodes a flat concatenation of 16-byte AUIDs.
pub fn decode_auid_array(data: &[u8]) -> Result<Vec<Auid>, DecodeError> {
    if data.len() % 16 != 0 {
        return Err(DecodeError::MisalignedArray {
            len: data.len(),
            element_size: 16,
        });
    }
    Ok(data
        .chunks_exact(16)
        .map(|chunk| {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(chunk);
            Auid::from_bytes_le(raw)
        })
        .collect())
}

/// Encodes AUIDs as a flat concatenation.
pub fn encode_auid_array(ids: &[Auid]) -> Vec<u8> {
    let mut writer = Writer::with_capacity(ids.len() * 16);
    for id in ids {
        writer.write_auid(id);
    }
    writer.into_bytes()
}

fn utf16_units(data: &[u8], context: &'static str) -> Result<Vec<u16>, DecodeError> {
    if data.len() % 2 != 0 {
        return Err(DecodeError::InvalidUtf16 { context });
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decodes a single UTF-16LE string, stopping at the first terminator.
pub fn decode_utf16_string(data: &[u8]) -> Result<String, DecodeError> {
    let units = utf16_units(data, "utf16 string")?;
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end]).map_err(|_| DecodeError::InvalidUtf16 {
        context: "utf16 string",
    })
}

/// Encodes a single UTF-16LE string with its terminator.
pub fn encode_utf16_string(s: &str) -> Vec<u8> {
    let mut writer = Writer::with_capacity((s.len() + 1) * 2);
    writer.write_utf16z(s);
    writer.into_bytes()
}

/// Decodes a concatenation of terminated UTF-16LE strings.
///
/// An unterminated tail is kept as a final element.
pub fn decode_utf16_array(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    let units = utf16_units(data, "utf16 array")?;
    // Only terminated segments are strings; unterminated tail units are dropped.
    units
        .split_inclusive(|&u| u == 0)
        .filter_map(|segment| segment.strip_suffix(&[0]))
        .map(|segment| {
            String::from_utf16(segment).map_err(|_| DecodeError::InvalidUtf16 {
                context: "utf16 array",
            })
        })
        .collect()
}

/// Encodes strings as a concatenation of terminated UTF-16LE strings.
pub fn encode_utf16_array<S: AsRef<str>>(strings: &[S]) -> Vec<u8> {
    let mut writer = Writer::new();
    for s in strings {
        writer.write_utf16z(s.as_ref());
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_int_widths() {
        let data = [0xffu8, 0x01, 0x80, 0xff, 0xff, 0xff, 0x7f, 0x00, 0x00, 0x00, 0x00];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.read_sint(1, "i8").unwrap(), -1);
        assert_eq!(reader.read_uint(2, "u16").unwrap(), 0x8001);
        assert_eq!(reader.read_sint(8, "i64").unwrap(), 0x7fff_ffff);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_invalid_int_size() {
        let mut reader = Reader::new(&[0u8; 8]);
        assert!(matches!(
            reader.read_uint(3, "test"),
            Err(DecodeError::InvalidIntSize { size: 3 })
        ));
    }

    #[test]
    fn test_truncated_read() {
        let mut reader = Reader::new(&[1u8, 2, 3]);
        let result = reader.read_u32("test");
        assert_eq!(
            result,
            Err(DecodeError::TruncatedStream {
                context: "test",
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_weakref_roundtrip_both_widths() {
        let auid_ref = WeakRef {
            index: 3,
            key_pid: 0x0005,
            key: Identifier::Auid(Auid::from_u128(0x01010800_0000_0000_060e_2b3401040101)),
        };
        let bytes = encode_ref(&auid_ref);
        assert_eq!(bytes.len(), 5 + 16);
        assert_eq!(bytes[4], 16);
        assert_eq!(decode_ref(&bytes).unwrap(), auid_ref);

        let mob_ref = WeakRef::new(0x4401, MobId([0xab; 32]));
        let bytes = encode_ref(&mob_ref);
        assert_eq!(bytes.len(), 5 + 32);
        assert_eq!(decode_ref(&bytes).unwrap(), mob_ref);
    }

    #[test]
    fn test_weakref_invalid_key_size() {
        let data = [0u8, 0, 5, 0, 20];
        assert_eq!(decode_ref(&data), Err(DecodeError::InvalidKeySize { size: 20 }));
    }

    #[test]
    fn test_auid_array_misaligned() {
        let result = decode_auid_array(&[0u8; 33]);
        assert_eq!(
            result,
            Err(DecodeError::MisalignedArray { len: 33, element_size: 16 })
        );
        assert_eq!(decode_auid_array(&[]).unwrap(), Vec::<Auid>::new());
    }

    #[test]
    fn test_auid_array_roundtrip() {
        let ids = vec![Auid::from_u128(1), Auid::from_u128(u128::MAX)];
        let bytes = encode_auid_array(&ids);
        assert_eq!(bytes.len(), 32);
        assert_eq!(decode_auid_array(&bytes).unwrap(), ids);
    }

    #[test]
    fn test_utf16_string() {
        let data = b"T\0e\0s\0t\0\0\0";
        assert_eq!(decode_utf16_string(data).unwrap(), "Test");
        // Unterminated strings decode to the end.
        assert_eq!(decode_utf16_string(b"T\0e\0s\0t\0").unwrap(), "Test");
        assert_eq!(encode_utf16_string("Test"), data.to_vec());
    }

    #[test]
    fn test_utf16_odd_length() {
        assert!(matches!(
            decode_utf16_string(b"T\0e"),
            Err(DecodeError::InvalidUtf16 { .. })
        ));
    }

    #[test]
    fn test_utf16_array_split() {
        let data = encode_utf16_array(&["False", "True", ""]);
        assert_eq!(decode_utf16_array(&data).unwrap(), vec!["False", "True", ""]);
        assert_eq!(decode_utf16_array(&[]).unwrap(), Vec::<String>::new());
        // Trailing segment without terminator is dropped.
        assert_eq!(decode_utf16_array(b"A\0\0\0B\0").unwrap(), vec!["A"]);
    }

    #[test]
    fn test_utf16_non_bmp() {
        let s = "clip \u{1F3AC}";
        let data = encode_utf16_string(s);
        assert_eq!(decode_utf16_string(&data).unwrap(), s);
    }

    #[test]
    fn test_check_int_range() {
        assert!(check_int_range(255, 1, false).is_ok());
        assert!(check_int_range(256, 1, false).is_err());
        assert!(check_int_range(-128, 1, true).is_ok());
        assert!(check_int_range(-129, 1, true).is_err());
        assert!(check_int_range(i64::MIN as i128, 8, true).is_ok());
        assert!(check_int_range(u64::MAX as i128, 8, false).is_ok());
        assert!(check_int_range(-1, 8, false).is_err());
    }
}
