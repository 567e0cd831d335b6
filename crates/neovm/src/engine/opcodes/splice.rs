//! Byte string and buffer operations
//!
//! Every result is a fresh Buffer.

use bytes::Bytes;

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_splice_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::NewBuffer => {
                let length = self.pop_index()?;
                self.limits.assert_max_item_size(length)?;
                let buffer = self.reference_counter.new_buffer(vec![0; length]);
                self.push(buffer)
            }
            OpCode::MemCpy => {
                let count = self.pop_index()?;
                let source_index = self.pop_index()?;
                let source = self.pop_span()?;
                let source_end = range_end(source_index, count, source.len())?;
                let destination_index = self.pop_index()?;
                let destination = match self.pop()? {
                    StackItem::Buffer(id) => id,
                    other => {
                        return Err(VmError::type_error(format!(
                            "MEMCPY expects a Buffer destination, found {}",
                            other.item_type()
                        )))
                    }
                };
                let target = self.reference_counter.buffer_mut(destination)?;
                let destination_end = range_end(destination_index, count, target.len())?;
                target[destination_index..destination_end]
                    .copy_from_slice(&source[source_index..source_end]);
                Ok(())
            }
            OpCode::Cat => {
                let x2 = self.pop_span()?;
                let x1 = self.pop_span()?;
                let length = x1.len() + x2.len();
                self.limits.assert_max_item_size(length)?;
                let mut joined = Vec::with_capacity(length);
                joined.extend_from_slice(&x1);
                joined.extend_from_slice(&x2);
                self.push_buffer(joined)
            }
            OpCode::Substr => {
                let count = self.pop_index()?;
                let index = self.pop_index()?;
                let x = self.pop_span()?;
                let end = range_end(index, count, x.len())?;
                self.push_buffer(x[index..end].to_vec())
            }
            OpCode::Left => {
                let count = self.pop_index()?;
                let x = self.pop_span()?;
                if count > x.len() {
                    return Err(out_of_range(count));
                }
                self.push_buffer(x[..count].to_vec())
            }
            OpCode::Right => {
                let count = self.pop_index()?;
                let x = self.pop_span()?;
                if count > x.len() {
                    return Err(out_of_range(count));
                }
                self.push_buffer(x[x.len() - count..].to_vec())
            }
            _ => Err(unexpected(instruction)),
        }
    }

    fn pop_span(&mut self) -> VmResult<Bytes> {
        let item = self.pop()?;
        item.get_span(self.reference_counter.heap())
    }

    fn push_buffer(&mut self, bytes: Vec<u8>) -> VmResult<()> {
        let buffer = self.reference_counter.new_buffer(bytes);
        self.push(buffer)
    }
}

/// End of `[index, index + count)` when it fits in `len`
fn range_end(index: usize, count: usize, len: usize) -> VmResult<usize> {
    match index.checked_add(count) {
        Some(end) if end <= len => Ok(end),
        _ => Err(out_of_range(count)),
    }
}

fn out_of_range(value: usize) -> VmError {
    VmError::invalid_operation(format!("The value {value} is out of range."))
}
