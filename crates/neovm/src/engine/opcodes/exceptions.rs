//! THROW, TRY, ENDTRY and ENDFINALLY

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::exception_handling::{ExceptionHandlingContext, ExceptionHandlingState};
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_exception_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::Throw => {
                let exception = self.pop()?;
                self.throw(exception)
            }
            OpCode::Try => {
                self.execute_try(instruction.token_i8() as i32, instruction.token_i8_1() as i32)
            }
            OpCode::TryL => self.execute_try(instruction.token_i32(), instruction.token_i32_1()),
            OpCode::EndTry | OpCode::EndTryL => self.execute_end_try(instruction.jump_offset()),
            OpCode::EndFinally => self.execute_end_finally(),
            _ => Err(unexpected(instruction)),
        }
    }

    fn execute_try(&mut self, catch_offset: i32, finally_offset: i32) -> VmResult<()> {
        if catch_offset == 0 && finally_offset == 0 {
            return Err(VmError::invalid_operation(
                "catchOffset and finallyOffset can't be 0 in a TRY block",
            ));
        }
        let nesting = self.context()?.try_stack.len();
        if nesting >= self.limits.max_try_nesting_depth {
            return Err(VmError::invalid_operation(format!(
                "MaxTryNestingDepth exceed: {}",
                nesting + 1
            )));
        }
        let catch_pointer = self.handler_target(catch_offset)?;
        let finally_pointer = self.handler_target(finally_offset)?;

        let context = self.context_mut()?;
        let stack_depth = context.evaluation_stack.borrow().len();
        context
            .try_stack
            .push(ExceptionHandlingContext::new(catch_pointer, finally_pointer, stack_depth));
        Ok(())
    }

    /// Absolute position of a catch or finally block; 0 means absent
    fn handler_target(&self, offset: i32) -> VmResult<Option<usize>> {
        if offset == 0 {
            return Ok(None);
        }
        let position = self.offset_position(offset)?;
        self.validate_jump_target(position)?;
        Ok(Some(position))
    }

    fn execute_end_try(&mut self, offset: i32) -> VmResult<()> {
        let end = self.offset_position(offset)?;
        self.validate_jump_target(end)?;

        let context = self.context_mut()?;
        let region = context
            .try_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("The corresponding TRY block cannot be found"))?;
        if region.state == ExceptionHandlingState::Finally {
            return Err(VmError::invalid_operation(
                "The opcode ENDTRY can't be executed in a FINALLY block",
            ));
        }
        match region.finally_pointer() {
            Some(finally) => {
                region.state = ExceptionHandlingState::Finally;
                region.end_pointer = Some(end);
                context.set_instruction_pointer(finally);
                self.is_jumping = true;
                Ok(())
            }
            None => {
                context.try_stack.pop();
                self.execute_jump(end)
            }
        }
    }

    fn execute_end_finally(&mut self) -> VmResult<()> {
        let mut region = self
            .context_mut()?
            .try_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("The corresponding TRY block cannot be found"))?;

        if let Some((exception, cause)) = region.take_pending() {
            // The pending item still holds the stack reference taken at THROW.
            if let Some(previous) = self.uncaught_exception.replace(exception) {
                self.reference_counter.remove_stack_reference(&previous);
            }
            self.exception_cause = cause;
            return self.handle_exception();
        }

        let end = region.end_pointer.ok_or_else(|| {
            VmError::invalid_operation("ENDFINALLY reached without a matching ENDTRY")
        })?;
        self.execute_jump(end)
    }
}
