//! Slots
//!
//! Fixed-length indexed storage for static fields, local variables and
//! arguments. Each occupied position holds one stack reference.

use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Indexed storage of a method frame
#[derive(Debug)]
pub struct Slot {
    items: Vec<StackItem>,
}

impl Slot {
    /// Create `count` positions initialized to Null
    pub fn new(count: usize, rc: &mut ReferenceCounter) -> Self {
        let items = vec![StackItem::Null; count];
        rc.add_stack_reference(&StackItem::Null, count);
        Self { items }
    }

    /// Create a slot holding `items`, first item at index 0
    pub fn from_items(items: Vec<StackItem>, rc: &mut ReferenceCounter) -> Self {
        for item in &items {
            rc.add_stack_reference(item, 1);
        }
        Self { items }
    }

    /// Borrow the item at `index`
    pub fn get(&self, index: usize) -> VmResult<&StackItem> {
        self.items.get(index).ok_or_else(|| out_of_range(index))
    }

    /// Replace the item at `index`
    pub fn set(&mut self, index: usize, item: StackItem, rc: &mut ReferenceCounter) -> VmResult<()> {
        let slot = self.items.get_mut(index).ok_or_else(|| out_of_range(index))?;
        rc.add_stack_reference(&item, 1);
        let old = std::mem::replace(slot, item);
        rc.remove_stack_reference(&old);
        Ok(())
    }

    /// Number of positions
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the slot has no positions
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in index order
    pub fn iter(&self) -> std::slice::Iter<'_, StackItem> {
        self.items.iter()
    }

    /// Release every stack reference held by this slot
    pub fn clear_references(&mut self, rc: &mut ReferenceCounter) {
        for item in self.items.drain(..) {
            rc.remove_stack_reference(&item);
        }
    }
}

fn out_of_range(index: usize) -> VmError {
    VmError::invalid_operation(format!("Slot index out of range: {index}"))
}
