use super::StackItem;
use crate::heap::{Heap, ObjectId};
use crate::limits::ExecutionEngineLimits;
use crate::{VmError, VmResult};

/// Running allowance for one equality check
struct CompareBudget {
    items: usize,
    bytes: usize,
}

impl CompareBudget {
    fn take_item(&mut self) -> VmResult<()> {
        if self.items == 0 {
            return Err(VmError::invalid_operation("Too many struct items to compare"));
        }
        self.items -= 1;
        Ok(())
    }

    fn take_bytes(&mut self, size: usize) -> VmResult<()> {
        let size = size.max(1);
        if size > self.bytes {
            return Err(VmError::invalid_operation(
                "The operand exceeds the maximum comparable size",
            ));
        }
        self.bytes -= size;
        Ok(())
    }
}

impl StackItem {
    /// Equality as observed by EQUAL and NOTEQUAL.
    ///
    /// Primitives and buffers compare by value, arrays, maps and interop
    /// handles by identity, and structs element-wise. The amount of work is
    /// bounded by `max_stack_size` items and `max_comparable_size` bytes, so
    /// cyclic or oversized operands fail instead of running away.
    pub fn equals(
        &self,
        other: &StackItem,
        heap: &Heap,
        limits: &ExecutionEngineLimits,
    ) -> VmResult<bool> {
        let mut budget = CompareBudget {
            items: limits.max_stack_size,
            bytes: limits.max_comparable_size,
        };
        equals_with(self, other, heap, &mut budget)
    }
}

fn equals_with(
    a: &StackItem,
    b: &StackItem,
    heap: &Heap,
    budget: &mut CompareBudget,
) -> VmResult<bool> {
    match (a, b) {
        (StackItem::Struct(left), StackItem::Struct(right)) => {
            struct_equals(*left, *right, heap, budget)
        }
        _ => shallow_equals(a, b, heap, budget),
    }
}

fn shallow_equals(
    a: &StackItem,
    b: &StackItem,
    heap: &Heap,
    budget: &mut CompareBudget,
) -> VmResult<bool> {
    Ok(match (a, b) {
        (StackItem::Null, StackItem::Null) => true,
        (StackItem::Boolean(x), StackItem::Boolean(y)) => x == y,
        (StackItem::Integer(x), StackItem::Integer(y)) => x == y,
        (StackItem::ByteString(x), StackItem::ByteString(y)) => {
            bytes_equal(x, y, budget)?
        }
        (StackItem::Buffer(x), StackItem::Buffer(y)) => {
            x == y || bytes_equal(heap.buffer(*x)?, heap.buffer(*y)?, budget)?
        }
        (StackItem::Array(x), StackItem::Array(y)) | (StackItem::Map(x), StackItem::Map(y)) => {
            x == y
        }
        (StackItem::Pointer(x), StackItem::Pointer(y)) => x == y,
        (StackItem::InteropInterface(x), StackItem::InteropInterface(y)) => x.ptr_eq(y),
        (StackItem::Struct(_), StackItem::Struct(_)) => {
            return equals_with(a, b, heap, budget);
        }
        _ => false,
    })
}

fn bytes_equal(x: &[u8], y: &[u8], budget: &mut CompareBudget) -> VmResult<bool> {
    if x.len() != y.len() {
        return Ok(false);
    }
    budget.take_bytes(x.len())?;
    Ok(x == y)
}

fn struct_equals(
    left: ObjectId,
    right: ObjectId,
    heap: &Heap,
    budget: &mut CompareBudget,
) -> VmResult<bool> {
    if left == right {
        return Ok(true);
    }
    let mut pending = vec![(left, right)];
    while let Some((x, y)) = pending.pop() {
        budget.take_item()?;
        if x == y {
            continue;
        }
        let xs = heap.items(x)?;
        let ys = heap.items(y)?;
        if xs.len() != ys.len() {
            return Ok(false);
        }
        for (a, b) in xs.iter().zip(ys) {
            budget.take_item()?;
            match (a, b) {
                (StackItem::Struct(inner_a), StackItem::Struct(inner_b)) => {
                    pending.push((*inner_a, *inner_b));
                }
                _ => {
                    if !shallow_equals(a, b, heap, budget)? {
                        return Ok(false);
                    }
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference_counter::ReferenceCounter;

    #[test]
    fn test_primitive_equality_is_typed() {
        let rc = ReferenceCounter::new();
        let limits = ExecutionEngineLimits::default();
        assert!(StackItem::from(1).equals(&StackItem::from(1), rc.heap(), &limits).unwrap());
        assert!(!StackItem::from(1).equals(&StackItem::TRUE, rc.heap(), &limits).unwrap());
        assert!(!StackItem::from(vec![1u8])
            .equals(&StackItem::from(1), rc.heap(), &limits)
            .unwrap());
    }

    #[test]
    fn test_array_identity_and_struct_value() {
        let mut rc = ReferenceCounter::new();
        let limits = ExecutionEngineLimits::default();
        let a = rc.new_array(vec![StackItem::from(1)]);
        let b = rc.new_array(vec![StackItem::from(1)]);
        assert!(!a.equals(&b, rc.heap(), &limits).unwrap());
        assert!(a.equals(&a, rc.heap(), &limits).unwrap());

        let inner_x = rc.new_struct(vec![StackItem::from(2)]);
        let inner_y = rc.new_struct(vec![StackItem::from(2)]);
        let x = rc.new_struct(vec![StackItem::from(1), inner_x]);
        let y = rc.new_struct(vec![StackItem::from(1), inner_y]);
        assert!(x.equals(&y, rc.heap(), &limits).unwrap());
    }

    #[test]
    fn test_buffers_compare_by_value() {
        let mut rc = ReferenceCounter::new();
        let limits = ExecutionEngineLimits::default();
        let a = rc.new_buffer(vec![1, 2]);
        let b = rc.new_buffer(vec![1, 2]);
        let c = rc.new_buffer(vec![1, 3]);
        assert!(a.equals(&b, rc.heap(), &limits).unwrap());
        assert!(!a.equals(&c, rc.heap(), &limits).unwrap());
    }

    #[test]
    fn test_comparable_size_limit() {
        let rc = ReferenceCounter::new();
        let limits = ExecutionEngineLimits { max_comparable_size: 4, ..Default::default() };
        let a = StackItem::from(vec![7u8; 8]);
        let b = StackItem::from(vec![7u8; 8]);
        assert!(matches!(a.equals(&b, rc.heap(), &limits), Err(VmError::InvalidOperation(_))));
    }

    #[test]
    fn test_struct_item_budget() {
        let mut rc = ReferenceCounter::new();
        let limits = ExecutionEngineLimits { max_stack_size: 4, ..Default::default() };
        let items: Vec<StackItem> = (0..8).map(StackItem::from).collect();
        let x = rc.new_struct(items.clone());
        let y = rc.new_struct(items);
        assert!(x.equals(&y, rc.heap(), &limits).is_err());
    }
}
