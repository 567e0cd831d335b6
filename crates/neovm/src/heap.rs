//! Arena for compound and mutable stack items
//!
//! Buffers, arrays, structs and maps live in a per-engine arena and are
//! referenced from [`StackItem`]s by [`ObjectId`]. Slots carry a generation
//! so that a stale id never aliases a newer object, and every arena has its
//! own identity so that an id can never be resolved against another engine.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::stack_item::ordered_map::OrderedMap;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to an object stored in a [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    heap: u32,
    index: u32,
    generation: u32,
}

impl ObjectId {
    /// Arena slot of this object
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Payload of a heap object
#[derive(Debug)]
pub enum HeapObject {
    /// Mutable byte sequence
    Buffer(Vec<u8>),
    /// Ordered, reference-equality sequence
    Array {
        /// Elements
        items: Vec<StackItem>,
        /// Whether mutation is rejected
        read_only: bool,
    },
    /// Ordered, value-equality sequence
    Struct {
        /// Elements
        items: Vec<StackItem>,
        /// Whether mutation is rejected
        read_only: bool,
    },
    /// Insertion-ordered dictionary with primitive keys
    Map {
        /// Entries
        entries: OrderedMap,
        /// Whether mutation is rejected
        read_only: bool,
    },
}

impl HeapObject {
    /// Number of child references this object holds.
    ///
    /// Map entries hold two, one for the key and one for the value.
    pub fn reference_count(&self) -> usize {
        match self {
            HeapObject::Buffer(_) => 0,
            HeapObject::Array { items, .. } | HeapObject::Struct { items, .. } => items.len(),
            HeapObject::Map { entries, .. } => entries.len() * 2,
        }
    }

    /// Heap objects directly referenced by this object
    pub fn children(&self) -> Vec<ObjectId> {
        match self {
            HeapObject::Buffer(_) => Vec::new(),
            HeapObject::Array { items, .. } | HeapObject::Struct { items, .. } => {
                items.iter().filter_map(StackItem::object_id).collect()
            }
            HeapObject::Map { entries, .. } => {
                entries.values().filter_map(StackItem::object_id).collect()
            }
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            HeapObject::Buffer(_) => "Buffer",
            HeapObject::Array { .. } => "Array",
            HeapObject::Struct { .. } => "Struct",
            HeapObject::Map { .. } => "Map",
        }
    }
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    object: Option<HeapObject>,
    stack_references: usize,
    compound_references: usize,
}

/// Generational arena of heap objects
#[derive(Debug)]
pub struct Heap {
    id: u32,
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create an empty arena with a fresh identity
    pub fn new() -> Self {
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if no object is live
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store an object and return its handle
    pub fn allocate(&mut self, object: HeapObject) -> ObjectId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.object = Some(object);
            entry.stack_references = 0;
            entry.compound_references = 0;
            return ObjectId { heap: self.id, index, generation: entry.generation };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            object: Some(object),
            stack_references: 0,
            compound_references: 0,
        });
        ObjectId { heap: self.id, index, generation: 0 }
    }

    /// Release an object; its slot is reused with a new generation
    pub fn free(&mut self, id: ObjectId) -> Option<HeapObject> {
        let entry = self.entry_mut(id)?;
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        entry.stack_references = 0;
        entry.compound_references = 0;
        self.free.push(id.index);
        self.live -= 1;
        Some(object)
    }

    /// Check whether `id` refers to a live object of this arena
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entry(id).is_some_and(|entry| entry.object.is_some())
    }

    /// Resolve a handle
    pub fn get(&self, id: ObjectId) -> VmResult<&HeapObject> {
        self.entry(id)
            .and_then(|entry| entry.object.as_ref())
            .ok_or_else(|| dangling(id))
    }

    /// Resolve a handle for mutation
    pub fn get_mut(&mut self, id: ObjectId) -> VmResult<&mut HeapObject> {
        self.entry_mut(id)
            .and_then(|entry| entry.object.as_mut())
            .ok_or_else(|| dangling(id))
    }

    /// Borrow the elements of an array or struct
    pub fn items(&self, id: ObjectId) -> VmResult<&[StackItem]> {
        match self.get(id)? {
            HeapObject::Array { items, .. } | HeapObject::Struct { items, .. } => Ok(items),
            other => Err(unexpected(other, "Array")),
        }
    }

    /// Borrow the entries of a map
    pub fn map(&self, id: ObjectId) -> VmResult<&OrderedMap> {
        match self.get(id)? {
            HeapObject::Map { entries, .. } => Ok(entries),
            other => Err(unexpected(other, "Map")),
        }
    }

    /// Borrow the bytes of a buffer
    pub fn buffer(&self, id: ObjectId) -> VmResult<&[u8]> {
        match self.get(id)? {
            HeapObject::Buffer(bytes) => Ok(bytes),
            other => Err(unexpected(other, "Buffer")),
        }
    }

    /// Mutably borrow the bytes of a buffer
    pub fn buffer_mut(&mut self, id: ObjectId) -> VmResult<&mut Vec<u8>> {
        match self.get_mut(id)? {
            HeapObject::Buffer(bytes) => Ok(bytes),
            other => Err(unexpected(other, "Buffer")),
        }
    }

    /// Stack references currently held on `id`
    pub fn stack_references(&self, id: ObjectId) -> usize {
        self.entry(id).map_or(0, |entry| entry.stack_references)
    }

    pub(crate) fn stack_references_mut(&mut self, id: ObjectId) -> Option<&mut usize> {
        self.entry_mut(id)
            .filter(|entry| entry.object.is_some())
            .map(|entry| &mut entry.stack_references)
    }

    /// Compound elements and map values currently holding `id`
    pub fn compound_references(&self, id: ObjectId) -> usize {
        self.entry(id).map_or(0, |entry| entry.compound_references)
    }

    pub(crate) fn compound_references_mut(&mut self, id: ObjectId) -> Option<&mut usize> {
        self.entry_mut(id)
            .filter(|entry| entry.object.is_some())
            .map(|entry| &mut entry.compound_references)
    }

    /// Handles of every live object
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry.object.as_ref().map(|_| ObjectId {
                heap: self.id,
                index: index as u32,
                generation: entry.generation,
            })
        })
    }

    fn entry(&self, id: ObjectId) -> Option<&Entry> {
        if id.heap != self.id {
            return None;
        }
        self.entries
            .get(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
    }

    fn entry_mut(&mut self, id: ObjectId) -> Option<&mut Entry> {
        if id.heap != self.id {
            return None;
        }
        self.entries
            .get_mut(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
    }
}

fn dangling(id: ObjectId) -> VmError {
    VmError::invalid_operation(format!("Object {id} is not tracked by this reference counter"))
}

fn unexpected(object: &HeapObject, expected: &str) -> VmError {
    VmError::type_error(format!("Expected {expected}, found {}", object.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapObject::Buffer(vec![1, 2, 3]));
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.buffer(id).unwrap(), &[1, 2, 3]);

        assert!(heap.free(id).is_some());
        assert!(heap.is_empty());
        assert!(heap.get(id).is_err());
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut heap = Heap::new();
        let first = heap.allocate(HeapObject::Buffer(Vec::new()));
        heap.free(first);
        let second = heap.allocate(HeapObject::Buffer(Vec::new()));
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(!heap.contains(first));
        assert!(heap.contains(second));
    }

    #[test]
    fn test_foreign_id_rejected() {
        let mut a = Heap::new();
        let b = Heap::new();
        let id = a.allocate(HeapObject::Buffer(Vec::new()));
        assert!(b.get(id).is_err());
    }

    #[test]
    fn test_wrong_variant() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapObject::Buffer(Vec::new()));
        assert!(matches!(heap.items(id), Err(VmError::Type(_))));
    }
}
