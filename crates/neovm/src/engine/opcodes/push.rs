//! Constants: PUSHINT*, PUSHT, PUSHF, PUSHA, PUSHNULL, PUSHDATA*, PUSHM1,
//! PUSH0..PUSH16

use std::sync::Arc;

use num_bigint::BigInt;

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::stack_item::{Pointer, StackItem};
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_push_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        let opcode = instruction.opcode;
        match opcode {
            OpCode::PushInt8
            | OpCode::PushInt16
            | OpCode::PushInt32
            | OpCode::PushInt64
            | OpCode::PushInt128
            | OpCode::PushInt256 => {
                let value = BigInt::from_signed_bytes_le(instruction.operand());
                self.push(StackItem::Integer(value))
            }
            OpCode::PushT => self.push(StackItem::TRUE),
            OpCode::PushF => self.push(StackItem::FALSE),
            OpCode::PushA => {
                let position = self.offset_position(instruction.jump_offset())?;
                let script = Arc::clone(self.context()?.script());
                if position > script.len() {
                    return Err(VmError::invalid_operation(format!(
                        "Bad pointer address: {position}"
                    )));
                }
                self.push(StackItem::Pointer(Pointer::new(script, position)))
            }
            OpCode::PushNull => self.push(StackItem::Null),
            OpCode::PushData1 | OpCode::PushData2 | OpCode::PushData4 => {
                self.limits.assert_max_item_size(instruction.operand().len())?;
                self.push(StackItem::ByteString(instruction.operand_bytes()))
            }
            OpCode::PushM1 => self.push(StackItem::from(-1)),
            _ if (OpCode::Push0..=OpCode::Push16).contains(&opcode) => {
                let value = opcode.to_u8() - OpCode::Push0.to_u8();
                self.push(StackItem::from(value))
            }
            _ => Err(unexpected(instruction)),
        }
    }
}
