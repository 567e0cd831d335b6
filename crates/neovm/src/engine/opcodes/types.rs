//! ISNULL, ISTYPE and CONVERT

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::stack_item::StackItemType;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_type_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::IsNull => {
                let x = self.pop()?;
                self.push_boolean(x.is_null())
            }
            OpCode::IsType => {
                let target = operand_type(instruction)?;
                if target == StackItemType::Any {
                    return Err(VmError::invalid_operation("Invalid type for ISTYPE: Any"));
                }
                let x = self.pop()?;
                self.push_boolean(x.item_type() == target)
            }
            OpCode::Convert => {
                let target = operand_type(instruction)?;
                let x = self.pop()?;
                let converted = x.convert_to(target, &mut self.reference_counter, &self.limits)?;
                self.push(converted)
            }
            _ => Err(unexpected(instruction)),
        }
    }
}

fn operand_type(instruction: &Instruction) -> VmResult<StackItemType> {
    let tag = instruction.token_u8();
    StackItemType::from_u8(tag).ok_or_else(|| {
        VmError::invalid_operation(format!("Invalid type for {}: {tag:#04x}", instruction.opcode))
    })
}
