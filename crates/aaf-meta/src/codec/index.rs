//! Set, vector, and weak reference array indices.
//!
//! A strong reference set stores its members as child storages named
//! `"{name}{local_key:x}"` (in braces) and lists them in a sibling stream
//! `"{name} index"`:
//!
//! ```text
//! u32 count
//! u32 next_free_key
//! u32 last_free_key
//! u16 key_pid
//! u8  key_size          (16 or 32)
//! count x (u32 local_key, u32 ref_count, key_size bytes key)
//! ```
//!
//! Local keys are recycled through a free-list: the next insert always gets
//! the smallest key no live entry holds.

use std::collections::BTreeSet;

use tracing::trace;

use crate::codec::primitives::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::NO_FREE_KEY;
use crate::model::Identifier;

/// Builds the storage name of a set or vector member.
pub fn member_name(index_name: &str, local_key: u32) -> String {
    format!("{}{{{:x}}}", index_name, local_key)
}

/// Splits a member storage name back into its collection name and local key.
pub fn parse_member_name(name: &str) -> Option<(&str, u32)> {
    let (collection, key) = name.strip_suffix('}')?.rsplit_once('{')?;
    let local_key = u32::from_str_radix(key, 16).ok()?;
    Some((collection, local_key))
}

/// One live member of a set index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetIndexEntry {
    pub key: Identifier,
    pub local_key: u32,
}

/// A decoded strong reference set index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetIndex {
    key_pid: u16,
    key_size: u8,
    next_free_key: u32,
    last_free_key: u32,
    /// Exclusive upper bound of every local key ever handed out.
    high_water: u32,
    entries: Vec<SetIndexEntry>,
    live: BTreeSet<u32>,
}

impl SetIndex {
    /// Creates an empty index for keys stored in property `key_pid`.
    pub fn new(key_pid: u16, key_size: u8) -> Self {
        Self {
            key_pid,
            key_size,
            next_free_key: 0,
            last_free_key: NO_FREE_KEY,
            high_water: 0,
            entries: Vec::new(),
            live: BTreeSet::new(),
        }
    }

    /// Decodes a set index stream.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);

        let count = reader.read_u32("set_index.count")? as usize;
        let next_free_key = reader.read_u32("set_index.next_free_key")?;
        let last_free_key = reader.read_u32("set_index.last_free_key")?;
        let key_pid = reader.read_u16("set_index.key_pid")?;
        let key_size = reader.read_key_size("set_index.key_size")?;

        let entry_size = 8 + key_size as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining_len() / entry_size));
        let mut live = BTreeSet::new();
        for _ in 0..count {
            let local_key = reader.read_u32("set_index.local_key")?;
            let ref_count = reader.read_u32("set_index.ref_count")?;
            if ref_count != 1 {
                return Err(DecodeError::UnexpectedRefCount { local_key, ref_count });
            }
            let key = reader.read_key(key_size, "set_index.key")?;
            if !live.insert(local_key) {
                return Err(DecodeError::DuplicateLocalKey { local_key });
            }
            entries.push(SetIndexEntry { key, local_key });
        }

        let max_live = live.last().map_or(0, |k| k.saturating_add(1));
        let high_water = if next_free_key == NO_FREE_KEY {
            max_live
        } else {
            max_live.max(next_free_key)
        };

        trace!(count, next_free_key, last_free_key, key_pid, "decoded set index");

        Ok(Self {
            key_pid,
            key_size,
            next_free_key,
            last_free_key,
            high_water,
            entries,
            live,
        })
    }

    /// Encodes the index.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let count = u32::try_from(self.entries.len()).map_err(|_| EncodeError::IndexTooLarge {
            len: self.entries.len(),
        })?;
        let mut writer = Writer::with_capacity(15 + self.entries.len() * (8 + self.key_size as usize));
        writer.write_u32(count);
        writer.write_u32(self.next_free_key);
        writer.write_u32(self.last_free_key);
        writer.write_u16(self.key_pid);
        writer.write_u8(self.key_size);
        for entry in &self.entries {
            writer.write_u32(entry.local_key);
            writer.write_u32(1);
            writer.write_key(&entry.key);
        }
        Ok(writer.into_bytes())
    }

    /// Returns the pid of the property holding each member's key.
    pub fn key_pid(&self) -> u16 {
        self.key_pid
    }

    /// Returns the key width in bytes.
    pub fn key_size(&self) -> u8 {
        self.key_size
    }

    /// Returns the header's next free key.
    pub fn next_free_key(&self) -> u32 {
        self.next_free_key
    }

    /// Returns the header's last free key.
    pub fn last_free_key(&self) -> u32 {
        self.last_free_key
    }

    /// Returns the live entries in persisted order.
    pub fn entries(&self) -> &[SetIndexEntry] {
        &self.entries
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the local key of a member.
    pub fn local_key(&self, key: &Identifier) -> Option<u32> {
        self.entries.iter().find(|e| &e.key == key).map(|e| e.local_key)
    }

    /// Adds a member and returns its local key, or `None` if the key is
    /// already present or has the wrong width.
    pub fn insert(&mut self, key: Identifier) -> Option<u32> {
        if key.key_size() != self.key_size || self.local_key(&key).is_some() {
            return None;
        }
        let local_key = self.smallest_free();
        self.live.insert(local_key);
        self.high_water = self.high_water.max(local_key.saturating_add(1));
        self.entries.push(SetIndexEntry { key, local_key });
        self.refresh_free_list();
        Some(local_key)
    }

    /// Removes a member and returns the local key it freed.
    pub fn remove(&mut self, key: &Identifier) -> Option<u32> {
        let pos = self.entries.iter().position(|e| &e.key == key)?;
        let entry = self.entries.remove(pos);
        self.live.remove(&entry.local_key);
        self.refresh_free_list();
        Some(entry.local_key)
    }

    /// Gives the member at `local_key` a new persistent key and returns the
    /// old one. Fails if there is no such member, the width is wrong, or
    /// another member holds `key`.
    pub fn rekey(&mut self, local_key: u32, key: Identifier) -> Option<Identifier> {
        if key.key_size() != self.key_size || self.local_key(&key).is_some_and(|k| k != local_key) {
            return None;
        }
        let entry = self.entries.iter_mut().find(|e| e.local_key == local_key)?;
        Some(std::mem::replace(&mut entry.key, key))
    }

    /// Smallest key not held by a live entry.
    fn smallest_free(&self) -> u32 {
        let mut candidate = 0u32;
        for &key in &self.live {
            if key != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    /// Largest key below the high-water mark not held by a live entry.
    fn largest_free(&self) -> Option<u32> {
        let mut candidate = self.high_water.checked_sub(1)?;
        for &key in self.live.iter().rev() {
            if key > candidate {
                continue;
            }
            if key != candidate {
                break;
            }
            candidate = candidate.checked_sub(1)?;
        }
        Some(candidate)
    }

    fn refresh_free_list(&mut self) {
        self.next_free_key = self.smallest_free();
        self.last_free_key = self.largest_free().unwrap_or(NO_FREE_KEY);
    }
}

/// A strong reference vector index: an ordered list of local keys.
///
/// ```text
/// u32 count
/// u32 next_free_key
/// u32 last_free_key
/// count x u32 local_key
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndex {
    pub next_free_key: u32,
    pub last_free_key: u32,
    pub local_keys: Vec<u32>,
}

impl VectorIndex {
    /// Decodes a vector index stream.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);
        let count = reader.read_u32("vector_index.count")? as usize;
        let next_free_key = reader.read_u32("vector_index.next_free_key")?;
        let last_free_key = reader.read_u32("vector_index.last_free_key")?;
        let mut local_keys = Vec::with_capacity(count.min(reader.remaining_len() / 4));
        for _ in 0..count {
            local_keys.push(reader.read_u32("vector_index.local_key")?);
        }
        Ok(Self {
            next_free_key,
            last_free_key,
            local_keys,
        })
    }

    /// Encodes the index.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let count = u32::try_from(self.local_keys.len()).map_err(|_| EncodeError::IndexTooLarge {
            len: self.local_keys.len(),
        })?;
        let mut writer = Writer::with_capacity(12 + self.local_keys.len() * 4);
        writer.write_u32(count);
        writer.write_u32(self.next_free_key);
        writer.write_u32(self.last_free_key);
        for key in &self.local_keys {
            writer.write_u32(*key);
        }
        Ok(writer.into_bytes())
    }
}

/// A weak reference array index: the ordered keys of a weak reference
/// vector or set.
///
/// ```text
/// u32 count
/// u16 weakref_index
/// u16 key_pid
/// u8  key_size
/// count x key
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeakRefArrayIndex {
    pub weakref_index: u16,
    pub key_pid: u16,
    pub key_size: u8,
    pub keys: Vec<Identifier>,
}

impl WeakRefArrayIndex {
    /// Creates an index of 16-byte keys.
    pub fn new(key_pid: u16, keys: Vec<Identifier>) -> Self {
        let key_size = keys.first().map_or(16, Identifier::key_size);
        Self {
            weakref_index: 0,
            key_pid,
            key_size,
            keys,
        }
    }

    /// Decodes a weak reference array index stream.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);
        let count = reader.read_u32("weakref_index.count")? as usize;
        let weakref_index = reader.read_u16("weakref_index.index")?;
        let key_pid = reader.read_u16("weakref_index.key_pid")?;
        let key_size = reader.read_key_size("weakref_index.key_size")?;
        let mut keys = Vec::with_capacity(count.min(reader.remaining_len() / key_size as usize));
        for _ in 0..count {
            keys.push(reader.read_key(key_size, "weakref_index.key")?);
        }
        Ok(Self {
            weakref_index,
            key_pid,
            key_size,
            keys,
        })
    }

    /// Encodes the index.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let count = u32::try_from(self.keys.len()).map_err(|_| EncodeError::IndexTooLarge {
            len: self.keys.len(),
        })?;
        let mut writer = Writer::with_capacity(9 + self.keys.len() * self.key_size as usize);
        writer.write_u32(count);
        writer.write_u16(self.weakref_index);
        writer.write_u16(self.key_pid);
        writer.write_u8(self.key_size);
        for key in &self.keys {
            writer.write_key(key);
        }
        Ok(writer.into_bytes())
    }
}
