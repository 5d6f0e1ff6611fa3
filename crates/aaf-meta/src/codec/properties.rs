//! Property stream encoding/decoding.
//!
//! Every object stores its properties in one stream:
//!
//! ```text
//! u8  byte_order   (0x4c)
//! u8  version
//! u16 count
//! count x (u16 pid, u16 format, u16 byte_size)
//! payloads, concatenated in directory order
//! ```

use crate::codec::primitives::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{BYTE_ORDER_LITTLE, PROPERTY_ENTRY_SIZE, PROPERTY_HEADER_SIZE, PROPERTY_STREAM_VERSION};

/// Storage format of a property payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyFormat {
    Data,
    DataStream,
    StrongRef,
    StrongRefVector,
    StrongRefSet,
    WeakRef,
    WeakRefVector,
    WeakRefSet,
    /// A format value this crate does not interpret.
    Other(u16),
}

impl PropertyFormat {
    /// Creates a PropertyFormat from its wire representation.
    pub fn from_u16(v: u16) -> PropertyFormat {
        match v {
            0x82 => PropertyFormat::Data,
            0x42 => PropertyFormat::DataStream,
            0x22 => PropertyFormat::StrongRef,
            0x32 => PropertyFormat::StrongRefVector,
            0x3a => PropertyFormat::StrongRefSet,
            0x02 => PropertyFormat::WeakRef,
            0x12 => PropertyFormat::WeakRefVector,
            0x1a => PropertyFormat::WeakRefSet,
            other => PropertyFormat::Other(other),
        }
    }

    /// Returns the wire representation.
    pub fn to_u16(self) -> u16 {
        match self {
            PropertyFormat::Data => 0x82,
            PropertyFormat::DataStream => 0x42,
            PropertyFormat::StrongRef => 0x22,
            PropertyFormat::StrongRefVector => 0x32,
            PropertyFormat::StrongRefSet => 0x3a,
            PropertyFormat::WeakRef => 0x02,
            PropertyFormat::WeakRefVector => 0x12,
            PropertyFormat::WeakRefSet => 0x1a,
            PropertyFormat::Other(v) => v,
        }
    }
}

/// One property as stored in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    pub pid: u16,
    pub format: u16,
    pub data: Vec<u8>,
}

/// A decoded property stream, kept in directory order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyStream {
    version: u8,
    entries: Vec<PropertyEntry>,
}

impl Default for PropertyStream {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStream {
    /// Creates an empty stream with the default version byte.
    pub fn new() -> Self {
        Self {
            version: PROPERTY_STREAM_VERSION,
            entries: Vec::new(),
        }
    }

    /// Decodes a property stream.
    ///
    /// The whole directory is read before any payload.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);

        let byte_order = reader.read_u8("byte_order")?;
        if byte_order != BYTE_ORDER_LITTLE {
            return Err(DecodeError::UnsupportedByteOrder { found: byte_order });
        }
        let version = reader.read_u8("version")?;
        let count = reader.read_u16("entry_count")? as usize;

        let mut directory = Vec::with_capacity(count.min(reader.remaining_len() / PROPERTY_ENTRY_SIZE));
        for _ in 0..count {
            let pid = reader.read_u16("directory.pid")?;
            let format = reader.read_u16("directory.format")?;
            let byte_size = reader.read_u16("directory.byte_size")?;
            directory.push((pid, format, byte_size));
        }

        let mut entries = Vec::with_capacity(directory.len());
        for (pid, format, byte_size) in directory {
            let data = reader.read_bytes(byte_size as usize, "property payload")?;
            entries.push(PropertyEntry {
                pid,
                format,
                data: data.to_vec(),
            });
        }

        Ok(Self { version, entries })
    }

    /// Encodes the stream, keeping directory order.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.entries.len() > u16::MAX as usize {
            return Err(EncodeError::TooManyProperties {
                count: self.entries.len(),
            });
        }
        let payload_len: usize = self.entries.iter().map(|e| e.data.len()).sum();
        let mut writer = Writer::with_capacity(
            PROPERTY_HEADER_SIZE + self.entries.len() * PROPERTY_ENTRY_SIZE + payload_len,
        );

        writer.write_u8(BYTE_ORDER_LITTLE);
        writer.write_u8(self.version);
        writer.write_u16(self.entries.len() as u16);

        for entry in &self.entries {
            let byte_size = u16::try_from(entry.data.len()).map_err(|_| EncodeError::PayloadTooLarge {
                pid: entry.pid,
                len: entry.data.len(),
            })?;
            writer.write_u16(entry.pid);
            writer.write_u16(entry.format);
            writer.write_u16(byte_size);
        }
        for entry in &self.entries {
            writer.write_bytes(&entry.data);
        }

        Ok(writer.into_bytes())
    }

    /// Returns the version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the entries in directory order.
    pub fn entries(&self) -> &[PropertyEntry] {
        &self.entries
    }

    /// Returns the number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the stream holds no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if a property with this pid is present.
    pub fn contains(&self, pid: u16) -> bool {
        self.entries.iter().any(|e| e.pid == pid)
    }

    /// Looks up a property entry by pid.
    pub fn entry(&self, pid: u16) -> Option<&PropertyEntry> {
        self.entries.iter().find(|e| e.pid == pid)
    }

    /// Looks up a property payload by pid.
    pub fn get(&self, pid: u16) -> Option<&[u8]> {
        self.entry(pid).map(|e| e.data.as_slice())
    }

    /// Sets a property. An existing entry keeps its directory slot; a new one
    /// is appended.
    pub fn insert(&mut self, pid: u16, format: PropertyFormat, data: Vec<u8>) {
        let format = format.to_u16();
        match self.entries.iter_mut().find(|e| e.pid == pid) {
            Some(entry) => {
                entry.format = format;
                entry.data = data;
            }
            None => self.entries.push(PropertyEntry { pid, format, data }),
        }
    }

    /// Removes a property, returning its payload.
    pub fn remove(&mut self, pid: u16) -> Option<Vec<u8>> {
        let pos = self.entries.iter().position(|e| e.pid == pid)?;
        Some(self.entries.remove(pos).data)
    }

    /// Iterates `(pid, payload)` pairs in directory order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &[u8])> {
        self.entries.iter().map(|e| (e.pid, e.data.as_slice()))
    }
}
