//! Evaluation stack
//!
//! The per-invocation working storage of the VM. Every push and pop goes
//! through the engine's [`ReferenceCounter`] so that each stack position
//! holding an item is counted as one stack reference.
//!
//! Positions passed to [`EvaluationStack::peek`], [`EvaluationStack::insert`]
//! and [`EvaluationStack::remove`] count from the top, with 0 being the top
//! item.

use std::cell::RefCell;
use std::rc::Rc;

use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Evaluation stack shared by a context and the contexts it CALLs
pub type SharedStack = Rc<RefCell<EvaluationStack>>;

/// LIFO stack of stack items
#[derive(Debug)]
pub struct EvaluationStack {
    /// Items, bottom first
    items: Vec<StackItem>,

    /// Maximum number of items
    max_size: usize,
}

impl EvaluationStack {
    /// Create an empty stack holding at most `max_size` items
    pub fn new(max_size: usize) -> Self {
        Self { items: Vec::new(), max_size }
    }

    /// Create a stack wrapped for sharing between contexts
    pub fn shared(max_size: usize) -> SharedStack {
        Rc::new(RefCell::new(Self::new(max_size)))
    }

    // ========================================================================
    // Stack Operations
    // ========================================================================

    /// Push an item
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the stack is full.
    #[inline]
    pub fn push(&mut self, item: StackItem, rc: &mut ReferenceCounter) -> VmResult<()> {
        if self.items.len() >= self.max_size {
            return Err(VmError::invalid_operation(format!(
                "MaxStackSize exceed: {}",
                self.items.len() + 1
            )));
        }
        rc.add_stack_reference(&item, 1);
        self.items.push(item);
        Ok(())
    }

    /// Pop the top item
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the stack is empty.
    #[inline]
    pub fn pop(&mut self, rc: &mut ReferenceCounter) -> VmResult<StackItem> {
        let item = self.items.pop().ok_or_else(underflow)?;
        rc.remove_stack_reference(&item);
        Ok(item)
    }

    /// Borrow the item `index` positions below the top
    #[inline]
    pub fn peek(&self, index: usize) -> VmResult<&StackItem> {
        if index >= self.items.len() {
            return Err(underflow());
        }
        Ok(&self.items[self.items.len() - 1 - index])
    }

    /// Insert an item so that it ends up `index` positions below the top
    pub fn insert(
        &mut self,
        index: usize,
        item: StackItem,
        rc: &mut ReferenceCounter,
    ) -> VmResult<()> {
        if index > self.items.len() {
            return Err(VmError::invalid_operation(format!(
                "Insert out of bounds: {index}/{}",
                self.items.len()
            )));
        }
        if self.items.len() >= self.max_size {
            return Err(VmError::invalid_operation(format!(
                "MaxStackSize exceed: {}",
                self.items.len() + 1
            )));
        }
        rc.add_stack_reference(&item, 1);
        let position = self.items.len() - index;
        self.items.insert(position, item);
        Ok(())
    }

    /// Remove the item `index` positions below the top
    pub fn remove(&mut self, index: usize, rc: &mut ReferenceCounter) -> VmResult<StackItem> {
        if index >= self.items.len() {
            return Err(underflow());
        }
        let position = self.items.len() - 1 - index;
        let item = self.items.remove(position);
        rc.remove_stack_reference(&item);
        Ok(item)
    }

    /// Reverse the order of the top `n` items
    pub fn reverse(&mut self, n: usize) -> VmResult<()> {
        if n > self.items.len() {
            return Err(underflow());
        }
        if n > 1 {
            let start = self.items.len() - n;
            self.items[start..].reverse();
        }
        Ok(())
    }

    /// Remove every item
    pub fn clear(&mut self, rc: &mut ReferenceCounter) {
        for item in self.items.drain(..) {
            rc.remove_stack_reference(&item);
        }
    }

    /// Remove items until `depth` remain
    pub fn truncate(&mut self, depth: usize, rc: &mut ReferenceCounter) {
        while self.items.len() > depth {
            if let Some(item) = self.items.pop() {
                rc.remove_stack_reference(&item);
            }
        }
    }

    /// Move the top `count` items (all of them when `None`) onto `target`,
    /// keeping their order. Stack references move with the items.
    pub fn move_to(&mut self, target: &mut EvaluationStack, count: Option<usize>) -> VmResult<()> {
        let count = count.unwrap_or(self.items.len());
        if count > self.items.len() {
            return Err(underflow());
        }
        let start = self.items.len() - count;
        target.items.extend(self.items.drain(start..));
        Ok(())
    }

    /// Get current stack depth
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get maximum stack size
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Items from bottom to top
    pub fn iter(&self) -> std::slice::Iter<'_, StackItem> {
        self.items.iter()
    }
}

fn underflow() -> VmError {
    VmError::invalid_operation("Stack underflow")
}
