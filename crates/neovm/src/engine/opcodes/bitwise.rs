//! Bitwise logic and equality

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::VmResult;

impl ExecutionEngine {
    pub(super) fn exec_bitwise_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::Invert => {
                let x = self.pop_integer()?;
                self.push_integer(!x)
            }
            OpCode::And | OpCode::Or | OpCode::Xor => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let result = match instruction.opcode {
                    OpCode::And => x1 & x2,
                    OpCode::Or => x1 | x2,
                    _ => x1 ^ x2,
                };
                self.push_integer(result)
            }
            OpCode::Equal | OpCode::NotEqual => {
                let x2 = self.pop()?;
                let x1 = self.pop()?;
                let equal = x1.equals(&x2, self.reference_counter.heap(), &self.limits)?;
                self.push_boolean(equal == (instruction.opcode == OpCode::Equal))
            }
            _ => Err(unexpected(instruction)),
        }
    }
}
