//! Evaluation stack manipulation

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::stack_item::StackItem;
use crate::VmResult;

impl ExecutionEngine {
    pub(super) fn exec_stack_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::Depth => {
                let depth = self.with_stack(|stack, _| Ok(stack.len()))?;
                self.push(StackItem::from(depth))
            }
            OpCode::Drop => self.pop().map(drop),
            OpCode::Nip => self.with_stack(|stack, rc| stack.remove(1, rc).map(drop)),
            OpCode::XDrop => {
                let n = self.pop_index()?;
                self.with_stack(|stack, rc| stack.remove(n, rc).map(drop))
            }
            OpCode::Clear => self.with_stack(|stack, rc| {
                stack.clear(rc);
                Ok(())
            }),
            OpCode::Dup => self.copy_to_top(0),
            OpCode::Over => self.copy_to_top(1),
            OpCode::Pick => {
                let n = self.pop_index()?;
                self.copy_to_top(n)
            }
            OpCode::Tuck => self.with_stack(|stack, rc| {
                let top = stack.peek(0)?.clone();
                stack.insert(2, top, rc)
            }),
            OpCode::Swap => self.with_stack(|stack, _| stack.reverse(2)),
            OpCode::Rot => self.move_to_top(2),
            OpCode::Roll => {
                let n = self.pop_index()?;
                if n == 0 {
                    return Ok(());
                }
                self.move_to_top(n)
            }
            OpCode::Reverse3 => self.with_stack(|stack, _| stack.reverse(3)),
            OpCode::Reverse4 => self.with_stack(|stack, _| stack.reverse(4)),
            OpCode::ReverseN => {
                let n = self.pop_index()?;
                self.with_stack(|stack, _| stack.reverse(n))
            }
            _ => Err(unexpected(instruction)),
        }
    }

    fn copy_to_top(&mut self, index: usize) -> VmResult<()> {
        self.with_stack(|stack, rc| {
            let item = stack.peek(index)?.clone();
            stack.push(item, rc)
        })
    }

    fn move_to_top(&mut self, index: usize) -> VmResult<()> {
        self.with_stack(|stack, rc| {
            let item = stack.remove(index, rc)?;
            stack.push(item, rc)
        })
    }
}
