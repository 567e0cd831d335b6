//! Insertion-ordered map with primitive keys

use bytes::Bytes;
use num_bigint::BigInt;
use rustc_hash::FxHashMap;

use super::StackItem;
use crate::defaults::MAX_MAP_KEY_SIZE;
use crate::stack_item::integer;
use crate::{VmError, VmResult};

/// Map key: a Boolean, Integer or ByteString compared by type and value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveKey {
    /// Boolean key
    Boolean(bool),
    /// Integer key
    Integer(BigInt),
    /// ByteString key
    ByteString(Bytes),
}

impl PrimitiveKey {
    /// Convert a stack item into a key
    pub fn from_item(item: &StackItem) -> VmResult<Self> {
        let key = match item {
            StackItem::Boolean(value) => PrimitiveKey::Boolean(*value),
            StackItem::Integer(value) => PrimitiveKey::Integer(value.clone()),
            StackItem::ByteString(value) => PrimitiveKey::ByteString(value.clone()),
            other => {
                return Err(VmError::type_error(format!(
                    "{} cannot be used as a map key",
                    other.item_type()
                )))
            }
        };
        let size = key.size();
        if size > MAX_MAP_KEY_SIZE {
            return Err(VmError::invalid_operation(format!("MaxKeySize exceed: {size}")));
        }
        Ok(key)
    }

    /// Encoded size of the key
    pub fn size(&self) -> usize {
        match self {
            PrimitiveKey::Boolean(_) => 1,
            PrimitiveKey::Integer(value) => integer::encoded_len(value),
            PrimitiveKey::ByteString(bytes) => bytes.len(),
        }
    }

    /// Convert back to a stack item
    pub fn to_item(&self) -> StackItem {
        match self {
            PrimitiveKey::Boolean(value) => StackItem::Boolean(*value),
            PrimitiveKey::Integer(value) => StackItem::Integer(value.clone()),
            PrimitiveKey::ByteString(value) => StackItem::ByteString(value.clone()),
        }
    }
}

/// Insertion-ordered dictionary
#[derive(Debug, Clone, Default)]
pub struct OrderedMap {
    entries: Vec<(PrimitiveKey, StackItem)>,
    index: FxHashMap<PrimitiveKey, usize>,
}

impl OrderedMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value
    pub fn get(&self, key: &PrimitiveKey) -> Option<&StackItem> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &PrimitiveKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace; a replaced entry keeps its position.
    ///
    /// Returns the previous value.
    pub fn insert(&mut self, key: PrimitiveKey, value: StackItem) -> Option<StackItem> {
        if let Some(&position) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[position].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Remove an entry, preserving the order of the rest
    pub fn remove(&mut self, key: &PrimitiveKey) -> Option<(PrimitiveKey, StackItem)> {
        let position = self.index.remove(key)?;
        let entry = self.entries.remove(position);
        for (_, slot) in self.index.iter_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(entry)
    }

    /// Remove every entry and return them in order
    pub fn drain(&mut self) -> Vec<(PrimitiveKey, StackItem)> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&PrimitiveKey, &StackItem)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &PrimitiveKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// Values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &StackItem> {
        self.entries.iter().map(|(_, value)| value)
    }
}
