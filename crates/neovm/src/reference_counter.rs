//! Reference counter with cycle reclamation
//!
//! Every reference to a stack item is counted: one per evaluation-stack or
//! slot position holding it ("stack references") and one per compound
//! element or map key/value ("child references"). The running total is the
//! figure the engine checks against `max_stack_size` after each instruction.
//!
//! Each heap object also records how many compound edges point at it.
//! An object becomes a candidate when its stack references drop to zero, or
//! when it loses a compound edge while no stack holds it and it is either
//! unreferenced or itself holds children (and so may sit on a cycle). A leaf
//! still held by another compound is never a candidate.
//! [`ReferenceCounter::check_zero_referred`] runs a mark phase from every
//! object still held by a stack or slot and frees whatever was not reached,
//! cycles included.

use rustc_hash::FxHashSet;

use crate::heap::{Heap, HeapObject, ObjectId};
use crate::stack_item::ordered_map::{OrderedMap, PrimitiveKey};
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Reclamation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Number of mark-sweep passes run
    pub collections: usize,
    /// Total objects freed
    pub objects_freed: usize,
    /// Objects marked live in the last pass
    pub last_marked_count: usize,
    /// Objects freed in the last pass
    pub last_freed_count: usize,
}

/// Reference bookkeeping and object storage for one engine
#[derive(Debug, Default)]
pub struct ReferenceCounter {
    heap: Heap,
    references_count: usize,
    zero_referred: FxHashSet<ObjectId>,
    stats: CollectionStats,
}

impl ReferenceCounter {
    /// Create an empty counter with its own heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Object storage
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Current total of stack and child references
    #[inline]
    pub fn count(&self) -> usize {
        self.references_count
    }

    /// Number of live heap objects
    pub fn tracked_objects(&self) -> usize {
        self.heap.len()
    }

    /// Reclamation statistics
    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    // ===== Counting =====

    /// Record `count` new stack or slot positions holding `item`
    pub fn add_stack_reference(&mut self, item: &StackItem, count: usize) {
        self.references_count += count;
        if let Some(id) = item.object_id() {
            if let Some(references) = self.heap.stack_references_mut(id) {
                *references += count;
            }
            self.zero_referred.remove(&id);
        }
    }

    /// Record that one stack or slot position released `item`
    pub fn remove_stack_reference(&mut self, item: &StackItem) {
        self.references_count = self.references_count.saturating_sub(1);
        if let Some(id) = item.object_id() {
            if let Some(references) = self.heap.stack_references_mut(id) {
                *references = references.saturating_sub(1);
                if *references == 0 {
                    self.zero_referred.insert(id);
                }
            }
        }
    }

    /// Record a compound element or map entry holding `item`
    pub fn add_reference(&mut self, item: &StackItem) {
        self.references_count += 1;
        if let Some(id) = item.object_id() {
            if let Some(references) = self.heap.compound_references_mut(id) {
                *references += 1;
            }
            self.zero_referred.remove(&id);
        }
    }

    /// Record that a compound element or map entry released `item`
    pub fn remove_reference(&mut self, item: &StackItem) {
        self.references_count = self.references_count.saturating_sub(1);
        let Some(id) = item.object_id() else {
            return;
        };
        let Some(references) = self.heap.compound_references_mut(id) else {
            return;
        };
        *references = references.saturating_sub(1);
        let unreferenced = *references == 0;
        if self.heap.stack_references(id) > 0 {
            return;
        }
        let holds_children =
            self.heap.get(id).is_ok_and(|object| !object.children().is_empty());
        if unreferenced || holds_children {
            self.zero_referred.insert(id);
        }
    }

    /// Reclaim unreachable objects and return the reference total.
    ///
    /// Nothing is scanned unless some object lost a reference since the
    /// last call.
    pub fn check_zero_referred(&mut self) -> usize {
        if !self.zero_referred.is_empty() {
            self.zero_referred.clear();
            self.collect();
        }
        self.references_count
    }

    fn collect(&mut self) {
        let marked = self.mark();
        let dead: Vec<ObjectId> = self.heap.ids().filter(|id| !marked.contains(id)).collect();

        let mut freed = 0;
        for id in dead {
            if let Some(object) = self.heap.free(id) {
                self.references_count =
                    self.references_count.saturating_sub(object.reference_count());
                for child in object.children() {
                    if let Some(references) = self.heap.compound_references_mut(child) {
                        *references = references.saturating_sub(1);
                    }
                }
                freed += 1;
            }
        }

        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.last_marked_count = marked.len();
        self.stats.last_freed_count = freed;
        if freed > 0 {
            tracing::trace!(freed, live = self.heap.len(), "reclaimed unreachable objects");
        }
    }

    fn mark(&self) -> FxHashSet<ObjectId> {
        let mut marked = FxHashSet::default();
        let mut pending: Vec<ObjectId> = self
            .heap
            .ids()
            .filter(|&id| self.heap.stack_references(id) > 0)
            .collect();

        while let Some(id) = pending.pop() {
            if !marked.insert(id) {
                continue;
            }
            if let Ok(object) = self.heap.get(id) {
                pending.extend(object.children().into_iter().filter(|c| !marked.contains(c)));
            }
        }
        marked
    }

    // ===== Allocation =====

    /// Allocate a buffer
    pub fn new_buffer(&mut self, bytes: Vec<u8>) -> StackItem {
        StackItem::Buffer(self.allocate(HeapObject::Buffer(bytes)))
    }

    /// Allocate an array holding `items`
    pub fn new_array(&mut self, items: Vec<StackItem>) -> StackItem {
        let id = self.allocate(HeapObject::Array { items: Vec::new(), read_only: false });
        self.fill(id, items);
        StackItem::Array(id)
    }

    /// Allocate a struct holding `items`
    pub fn new_struct(&mut self, items: Vec<StackItem>) -> StackItem {
        let id = self.allocate(HeapObject::Struct { items: Vec::new(), read_only: false });
        self.fill(id, items);
        StackItem::Struct(id)
    }

    /// Allocate an empty map
    pub fn new_map(&mut self) -> StackItem {
        StackItem::Map(self.allocate(HeapObject::Map {
            entries: OrderedMap::new(),
            read_only: false,
        }))
    }

    fn allocate(&mut self, object: HeapObject) -> ObjectId {
        let id = self.heap.allocate(object);
        self.zero_referred.insert(id);
        id
    }

    fn fill(&mut self, id: ObjectId, items: Vec<StackItem>) {
        for item in &items {
            self.add_reference(item);
        }
        if let Ok(HeapObject::Array { items: slot, .. } | HeapObject::Struct { items: slot, .. }) =
            self.heap.get_mut(id)
        {
            *slot = items;
        }
    }

    // ===== Mutation =====

    /// Check whether a compound rejects mutation
    pub fn is_read_only(&self, id: ObjectId) -> VmResult<bool> {
        Ok(match self.heap.get(id)? {
            HeapObject::Buffer(_) => false,
            HeapObject::Array { read_only, .. }
            | HeapObject::Struct { read_only, .. }
            | HeapObject::Map { read_only, .. } => *read_only,
        })
    }

    /// Mark a compound read-only
    pub fn set_read_only(&mut self, id: ObjectId) -> VmResult<()> {
        match self.heap.get_mut(id)? {
            HeapObject::Buffer(_) => {}
            HeapObject::Array { read_only, .. }
            | HeapObject::Struct { read_only, .. }
            | HeapObject::Map { read_only, .. } => *read_only = true,
        }
        Ok(())
    }

    fn items_mut(&mut self, id: ObjectId) -> VmResult<&mut Vec<StackItem>> {
        match self.heap.get_mut(id)? {
            HeapObject::Array { items, read_only } | HeapObject::Struct { items, read_only } => {
                if *read_only {
                    return Err(read_only_error());
                }
                Ok(items)
            }
            _ => Err(VmError::type_error("Expected Array or Struct")),
        }
    }

    fn map_mut(&mut self, id: ObjectId) -> VmResult<&mut OrderedMap> {
        match self.heap.get_mut(id)? {
            HeapObject::Map { entries, read_only } => {
                if *read_only {
                    return Err(read_only_error());
                }
                Ok(entries)
            }
            _ => Err(VmError::type_error("Expected Map")),
        }
    }

    /// Mutably borrow the bytes of a buffer
    pub fn buffer_mut(&mut self, id: ObjectId) -> VmResult<&mut Vec<u8>> {
        self.heap.buffer_mut(id)
    }

    /// Append an element to an array or struct
    pub fn append(&mut self, id: ObjectId, item: StackItem) -> VmResult<()> {
        self.items_mut(id)?;
        self.add_reference(&item);
        self.items_mut(id)?.push(item);
        Ok(())
    }

    /// Replace the element at `index`
    pub fn set_item(&mut self, id: ObjectId, index: usize, item: StackItem) -> VmResult<()> {
        let items = self.items_mut(id)?;
        let slot = items.get_mut(index).ok_or_else(|| out_of_range(index))?;
        let old = std::mem::replace(slot, item.clone());
        self.remove_reference(&old);
        self.add_reference(&item);
        Ok(())
    }

    /// Remove and return the element at `index`
    pub fn remove_at(&mut self, id: ObjectId, index: usize) -> VmResult<StackItem> {
        let items = self.items_mut(id)?;
        if index >= items.len() {
            return Err(out_of_range(index));
        }
        let removed = items.remove(index);
        self.remove_reference(&removed);
        Ok(removed)
    }

    /// Remove and return the last element
    pub fn pop_item(&mut self, id: ObjectId) -> VmResult<StackItem> {
        let removed = self
            .items_mut(id)?
            .pop()
            .ok_or_else(|| VmError::invalid_operation("The array is empty"))?;
        self.remove_reference(&removed);
        Ok(removed)
    }

    /// Reverse the elements of an array, struct or buffer in place
    pub fn reverse_items(&mut self, id: ObjectId) -> VmResult<()> {
        match self.heap.get_mut(id)? {
            HeapObject::Buffer(bytes) => bytes.reverse(),
            HeapObject::Map { .. } => return Err(VmError::type_error("Cannot reverse a Map")),
            _ => self.items_mut(id)?.reverse(),
        }
        Ok(())
    }

    /// Remove every element of an array, struct or map
    pub fn clear_items(&mut self, id: ObjectId) -> VmResult<()> {
        match self.heap.get(id)? {
            HeapObject::Map { .. } => {
                let entries = self.map_mut(id)?.drain();
                for (key, value) in entries {
                    self.remove_reference(&key.to_item());
                    self.remove_reference(&value);
                }
            }
            HeapObject::Buffer(_) => return Err(VmError::type_error("Cannot clear a Buffer")),
            _ => {
                let items = std::mem::take(self.items_mut(id)?);
                for item in items {
                    self.remove_reference(&item);
                }
            }
        }
        Ok(())
    }

    /// Insert or replace a map entry
    pub fn map_insert(&mut self, id: ObjectId, key: PrimitiveKey, value: StackItem) -> VmResult<()> {
        let key_item = key.to_item();
        let previous = self.map_mut(id)?.insert(key, value.clone());
        match previous {
            Some(old) => self.remove_reference(&old),
            None => self.add_reference(&key_item),
        }
        self.add_reference(&value);
        Ok(())
    }

    /// Remove a map entry; returns whether the key was present
    pub fn map_remove(&mut self, id: ObjectId, key: &PrimitiveKey) -> VmResult<bool> {
        match self.map_mut(id)?.remove(key) {
            Some((key, value)) => {
                self.remove_reference(&key.to_item());
                self.remove_reference(&value);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn read_only_error() -> VmError {
    VmError::invalid_operation("The object is readonly")
}

fn out_of_range(index: usize) -> VmError {
    VmError::invalid_operation(format!("The value {index} is out of range."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn test_primitive_stack_references() {
        let mut rc = ReferenceCounter::new();
        let item = StackItem::from(5);
        rc.add_stack_reference(&item, 2);
        assert_eq!(rc.check_zero_referred(), 2);
        rc.remove_stack_reference(&item);
        assert_eq!(rc.check_zero_referred(), 1);
    }

    #[test]
    fn test_unreferenced_allocation_is_reclaimed() {
        let mut rc = ReferenceCounter::new();
        let _ = rc.new_array(vec![StackItem::from(1), StackItem::from(2)]);
        assert_eq!(rc.count(), 2);
        assert_eq!(rc.check_zero_referred(), 0);
        assert_eq!(rc.tracked_objects(), 0);
    }

    #[test]
    fn test_self_referencing_cycle_is_reclaimed() {
        let mut rc = ReferenceCounter::new();
        let array = rc.new_array(Vec::new());
        let id = array.object_id().unwrap();
        rc.add_stack_reference(&array, 1);
        rc.append(id, array.clone()).unwrap();
        assert_eq!(rc.check_zero_referred(), 2);

        rc.remove_stack_reference(&array);
        assert_eq!(rc.check_zero_referred(), 0);
        assert_eq!(rc.tracked_objects(), 0);
        assert!(rc.heap().get(id).is_err());
    }

    #[test]
    fn test_mutual_cycle_survives_while_rooted() {
        let mut rc = ReferenceCounter::new();
        let a = rc.new_array(Vec::new());
        let b = rc.new_array(Vec::new());
        rc.add_stack_reference(&a, 1);
        rc.append(a.object_id().unwrap(), b.clone()).unwrap();
        rc.append(b.object_id().unwrap(), a.clone()).unwrap();

        assert_eq!(rc.check_zero_referred(), 3);
        assert_eq!(rc.tracked_objects(), 2);

        rc.remove_stack_reference(&a);
        assert_eq!(rc.check_zero_referred(), 0);
        assert_eq!(rc.stats().last_freed_count, 2);
    }

    #[test]
    fn test_map_counts_keys_and_values() {
        let mut rc = ReferenceCounter::new();
        let map = rc.new_map();
        let id = map.object_id().unwrap();
        rc.add_stack_reference(&map, 1);
        let key = PrimitiveKey::Integer(BigInt::from(1));
        rc.map_insert(id, key.clone(), StackItem::from(10)).unwrap();
        assert_eq!(rc.check_zero_referred(), 3);
        rc.map_insert(id, key.clone(), StackItem::from(11)).unwrap();
        assert_eq!(rc.check_zero_referred(), 3);
        assert!(rc.map_remove(id, &key).unwrap());
        assert_eq!(rc.check_zero_referred(), 1);
    }

    #[test]
    fn test_shared_child_is_not_a_candidate() {
        let mut rc = ReferenceCounter::new();
        let child = rc.new_buffer(vec![1, 2]);
        let first = rc.new_array(vec![child.clone()]);
        let second = rc.new_array(vec![child.clone()]);
        rc.add_stack_reference(&first, 1);
        rc.add_stack_reference(&second, 1);
        assert_eq!(rc.check_zero_referred(), 4);

        let child_id = child.object_id().unwrap();
        assert_eq!(rc.heap().compound_references(child_id), 2);
        rc.pop_item(first.object_id().unwrap()).unwrap();
        assert!(rc.zero_referred.is_empty());
        assert_eq!(rc.heap().compound_references(child_id), 1);

        let collections = rc.stats().collections;
        assert_eq!(rc.check_zero_referred(), 3);
        assert_eq!(rc.stats().collections, collections);
        assert_eq!(rc.tracked_objects(), 3);
    }

    #[test]
    fn test_detached_cycle_is_reclaimed() {
        let mut rc = ReferenceCounter::new();
        let root = rc.new_array(Vec::new());
        let a = rc.new_array(Vec::new());
        let b = rc.new_array(Vec::new());
        let root_id = root.object_id().unwrap();
        rc.add_stack_reference(&root, 1);
        rc.append(a.object_id().unwrap(), b.clone()).unwrap();
        rc.append(b.object_id().unwrap(), a.clone()).unwrap();
        rc.append(root_id, a.clone()).unwrap();
        assert_eq!(rc.check_zero_referred(), 4);
        assert_eq!(rc.tracked_objects(), 3);

        rc.pop_item(root_id).unwrap();
        assert_eq!(rc.check_zero_referred(), 1);
        assert_eq!(rc.tracked_objects(), 1);
    }

    #[test]
    fn test_freeing_a_parent_releases_its_edges() {
        let mut rc = ReferenceCounter::new();
        let child = rc.new_array(Vec::new());
        let child_id = child.object_id().unwrap();
        rc.add_stack_reference(&child, 1);
        let parent = rc.new_array(vec![child.clone()]);
        assert_eq!(rc.heap().compound_references(child_id), 1);

        rc.add_stack_reference(&parent, 1);
        rc.remove_stack_reference(&parent);
        assert_eq!(rc.check_zero_referred(), 1);
        assert_eq!(rc.heap().compound_references(child_id), 0);
        assert_eq!(rc.tracked_objects(), 1);
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let mut rc = ReferenceCounter::new();
        let array = rc.new_array(vec![StackItem::Null]);
        let id = array.object_id().unwrap();
        rc.set_read_only(id).unwrap();
        assert!(rc.append(id, StackItem::Null).is_err());
        assert!(rc.set_item(id, 0, StackItem::TRUE).is_err());
        assert!(rc.clear_items(id).is_err());
    }

    #[test]
    fn test_set_item_out_of_range() {
        let mut rc = ReferenceCounter::new();
        let array = rc.new_array(vec![StackItem::Null]);
        let id = array.object_id().unwrap();
        let error = rc.set_item(id, 3, StackItem::Null).unwrap_err();
        assert_eq!(error.message(), "The value 3 is out of range.");
    }
}
