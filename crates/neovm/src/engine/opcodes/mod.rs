//! Opcode handlers
//!
//! Each submodule extends [`ExecutionEngine`] with the handlers of one
//! opcode category. `execute_instruction` routes by category; SYSCALL and
//! CALLT are forwarded to the host.

mod bitwise;
mod compound;
mod control_flow;
mod exceptions;
mod numeric;
mod push;
mod slots;
mod splice;
mod stack;
mod types;

use super::{ExecutionEngine, ExecutionHost};
use crate::instruction::Instruction;
use crate::opcode::{OpCode, OpCodeCategory};
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn execute_instruction<H: ExecutionHost + ?Sized>(
        &mut self,
        host: &mut H,
        instruction: &Instruction,
    ) -> VmResult<()> {
        match instruction.opcode {
            OpCode::Syscall => {
                return host
                    .on_syscall(self, instruction.token_u32())
                    .map_err(VmError::into_external);
            }
            OpCode::CallT => {
                return host
                    .on_load_script(self, instruction.token_u16())
                    .map_err(VmError::into_external);
            }
            _ => {}
        }

        match instruction.opcode.category() {
            OpCodeCategory::Constant => self.exec_push_ops(instruction),
            OpCodeCategory::FlowControl => match instruction.opcode {
                OpCode::Throw
                | OpCode::Try
                | OpCode::TryL
                | OpCode::EndTry
                | OpCode::EndTryL
                | OpCode::EndFinally => self.exec_exception_ops(instruction),
                _ => self.exec_control_flow_ops(instruction),
            },
            OpCodeCategory::Stack => self.exec_stack_ops(instruction),
            OpCodeCategory::Slot => self.exec_slot_ops(instruction),
            OpCodeCategory::Splice => self.exec_splice_ops(instruction),
            OpCodeCategory::Bitwise => self.exec_bitwise_ops(instruction),
            OpCodeCategory::Arithmetic => self.exec_numeric_ops(instruction),
            OpCodeCategory::Compound => self.exec_compound_ops(instruction),
            OpCodeCategory::Types => self.exec_type_ops(instruction),
            OpCodeCategory::Extension => self.exec_control_flow_ops(instruction),
        }
    }
}

/// Error for an opcode routed to a handler group that does not own it
fn unexpected(instruction: &Instruction) -> VmError {
    VmError::invalid_operation(format!("Opcode {} is not handled here", instruction.opcode))
}
