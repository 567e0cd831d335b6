//! Jumps, calls, returns, ABORT and ASSERT

use std::rc::Rc;
use std::sync::Arc;

use super::unexpected;
use crate::engine::{ExecutionEngine, VmState};
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_control_flow_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::Nop => Ok(()),
            OpCode::Jmp | OpCode::JmpL => self.execute_jump_offset(instruction.jump_offset()),
            OpCode::JmpIf | OpCode::JmpIfL => {
                if self.pop_boolean()? {
                    self.execute_jump_offset(instruction.jump_offset())?;
                }
                Ok(())
            }
            OpCode::JmpIfNot | OpCode::JmpIfNotL => {
                if !self.pop_boolean()? {
                    self.execute_jump_offset(instruction.jump_offset())?;
                }
                Ok(())
            }
            OpCode::JmpEq
            | OpCode::JmpEqL
            | OpCode::JmpNe
            | OpCode::JmpNeL
            | OpCode::JmpGt
            | OpCode::JmpGtL
            | OpCode::JmpGe
            | OpCode::JmpGeL
            | OpCode::JmpLt
            | OpCode::JmpLtL
            | OpCode::JmpLe
            | OpCode::JmpLeL => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let taken = match instruction.opcode {
                    OpCode::JmpEq | OpCode::JmpEqL => x1 == x2,
                    OpCode::JmpNe | OpCode::JmpNeL => x1 != x2,
                    OpCode::JmpGt | OpCode::JmpGtL => x1 > x2,
                    OpCode::JmpGe | OpCode::JmpGeL => x1 >= x2,
                    OpCode::JmpLt | OpCode::JmpLtL => x1 < x2,
                    _ => x1 <= x2,
                };
                if taken {
                    self.execute_jump_offset(instruction.jump_offset())?;
                }
                Ok(())
            }
            OpCode::Call | OpCode::CallL => {
                let position = self.offset_position(instruction.jump_offset())?;
                self.execute_call(position)
            }
            OpCode::CallA => {
                let pointer = match self.pop()? {
                    StackItem::Pointer(pointer) => pointer,
                    other => {
                        return Err(VmError::type_error(format!(
                            "CALLA expects a Pointer, found {}",
                            other.item_type()
                        )))
                    }
                };
                if !Arc::ptr_eq(pointer.script(), self.context()?.script()) {
                    return Err(VmError::invalid_operation(
                        "Pointers can't be shared between scripts",
                    ));
                }
                self.execute_call(pointer.position())
            }
            OpCode::Ret => self.execute_ret(),
            OpCode::Abort => Err(VmError::Abort("ABORT is executed.".into())),
            OpCode::AbortMsg => {
                let message = self.pop_message()?;
                Err(VmError::Abort(format!("ABORTMSG is executed. Reason: {message}")))
            }
            OpCode::Assert => {
                if !self.pop_boolean()? {
                    return Err(VmError::Abort("ASSERT is executed with false result.".into()));
                }
                Ok(())
            }
            OpCode::AssertMsg => {
                let message = self.pop_message()?;
                if !self.pop_boolean()? {
                    return Err(VmError::Abort(format!(
                        "ASSERTMSG is executed with false result. Reason: {message}"
                    )));
                }
                Ok(())
            }
            _ => Err(unexpected(instruction)),
        }
    }

    fn pop_message(&mut self) -> VmResult<String> {
        let item = self.pop()?;
        let bytes = item.get_span(self.reference_counter.heap())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn execute_ret(&mut self) -> VmResult<()> {
        let depth = self.invocation_stack.len();
        let context = self.context()?;
        let target = match depth.checked_sub(2).and_then(|i| self.invocation_stack.get(i)) {
            Some(caller) => Rc::clone(&caller.evaluation_stack),
            None => Rc::clone(&self.result_stack),
        };
        if !Rc::ptr_eq(&context.evaluation_stack, &target) {
            let rvcount = context.rvcount();
            let mut stack = context.evaluation_stack.borrow_mut();
            if rvcount >= 0 && stack.len() != rvcount as usize {
                return Err(VmError::invalid_operation(
                    "RVCount doesn't match with EvaluationStack",
                ));
            }
            stack.move_to(&mut target.borrow_mut(), None)?;
        }

        if let Some(context) = self.invocation_stack.pop() {
            if self.invocation_stack.is_empty() {
                self.set_state(VmState::Halt);
            }
            self.unload_context(context);
        }
        self.is_jumping = true;
        Ok(())
    }
}
