use std::collections::VecDeque;

use bytes::Bytes;
use rustc_hash::FxHashMap;

use super::StackItem;
use crate::heap::ObjectId;
use crate::limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::{VmError, VmResult};

impl StackItem {
    /// Copy this item and everything it contains.
    ///
    /// Shared and cyclic references are preserved: an object reached twice
    /// is copied once. Copied compounds are read-only. With `as_immutable`,
    /// buffers become byte strings. Recursion is bounded by
    /// `max_nesting_depth`.
    pub fn deep_copy(
        &self,
        rc: &mut ReferenceCounter,
        as_immutable: bool,
        limits: &ExecutionEngineLimits,
    ) -> VmResult<StackItem> {
        let mut copies = FxHashMap::default();
        deep_copy_inner(self, rc, &mut copies, as_immutable, 0, limits.max_nesting_depth)
    }
}

fn deep_copy_inner(
    item: &StackItem,
    rc: &mut ReferenceCounter,
    copies: &mut FxHashMap<ObjectId, StackItem>,
    as_immutable: bool,
    depth: usize,
    max_depth: usize,
) -> VmResult<StackItem> {
    let Some(id) = item.object_id() else {
        return Ok(item.clone());
    };
    if let Some(copy) = copies.get(&id) {
        return Ok(copy.clone());
    }
    if depth > max_depth {
        return Err(VmError::invalid_operation(format!("Nesting depth exceed: {max_depth}")));
    }

    match item {
        StackItem::Buffer(_) => {
            let bytes = rc.heap().buffer(id)?.to_vec();
            let copy = if as_immutable {
                StackItem::ByteString(Bytes::from(bytes))
            } else {
                rc.new_buffer(bytes)
            };
            copies.insert(id, copy.clone());
            Ok(copy)
        }
        StackItem::Array(_) | StackItem::Struct(_) => {
            let items = rc.heap().items(id)?.to_vec();
            let copy = match item {
                StackItem::Struct(_) => rc.new_struct(Vec::new()),
                _ => rc.new_array(Vec::new()),
            };
            let copy_id = copy.object_id().ok_or_else(|| {
                VmError::invalid_operation("Copied compound has no heap object")
            })?;
            copies.insert(id, copy.clone());
            for child in &items {
                let child_copy =
                    deep_copy_inner(child, rc, copies, as_immutable, depth + 1, max_depth)?;
                rc.append(copy_id, child_copy)?;
            }
            rc.set_read_only(copy_id)?;
            Ok(copy)
        }
        StackItem::Map(_) => {
            let entries: Vec<_> = rc
                .heap()
                .map(id)?
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            let copy = rc.new_map();
            let copy_id = copy.object_id().ok_or_else(|| {
                VmError::invalid_operation("Copied compound has no heap object")
            })?;
            copies.insert(id, copy.clone());
            for (key, value) in entries {
                let value_copy =
                    deep_copy_inner(&value, rc, copies, as_immutable, depth + 1, max_depth)?;
                rc.map_insert(copy_id, key, value_copy)?;
            }
            rc.set_read_only(copy_id)?;
            Ok(copy)
        }
        _ => Ok(item.clone()),
    }
}

/// Copy a struct before it is stored into a compound.
///
/// Nested structs are copied breadth-first, other elements are shared. The
/// total number of copied elements is bounded by `max_stack_size - 1`.
pub(crate) fn clone_struct(
    rc: &mut ReferenceCounter,
    source: ObjectId,
    limits: &ExecutionEngineLimits,
) -> VmResult<StackItem> {
    let mut remaining = limits.max_stack_size.saturating_sub(1);
    let result = rc.new_struct(Vec::new());
    let result_id = result
        .object_id()
        .ok_or_else(|| VmError::invalid_operation("Struct has no heap object"))?;

    let mut queue = VecDeque::from([(result_id, source)]);
    while let Some((target, from)) = queue.pop_front() {
        let items = rc.heap().items(from)?.to_vec();
        for item in items {
            if remaining == 0 {
                return Err(VmError::invalid_operation("Beyond clone limits!"));
            }
            remaining -= 1;
            match item {
                StackItem::Struct(inner) => {
                    let copy = rc.new_struct(Vec::new());
                    let copy_id = copy
                        .object_id()
                        .ok_or_else(|| VmError::invalid_operation("Struct has no heap object"))?;
                    rc.append(target, copy)?;
                    queue.push_back((copy_id, inner));
                }
                other => rc.append(target, other)?,
            }
        }
    }
    Ok(result)
}
