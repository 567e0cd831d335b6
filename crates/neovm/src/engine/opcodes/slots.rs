//! Slot initialization and static field, local and argument access

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::slot::Slot;
use crate::{VmError, VmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Static,
    Local,
    Argument,
}

impl SlotKind {
    fn name(self) -> &'static str {
        match self {
            SlotKind::Static => "static fields",
            SlotKind::Local => "local variables",
            SlotKind::Argument => "arguments",
        }
    }
}

impl ExecutionEngine {
    pub(super) fn exec_slot_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        use OpCode::*;

        let opcode = instruction.opcode;
        match opcode {
            InitSSlot => return self.init_static_slot(instruction.token_u8()),
            InitSlot => return self.init_slot(instruction.token_u8(), instruction.token_u8_1()),
            _ => {}
        }

        // Each access group is seven fixed-index forms followed by the
        // operand form.
        let (kind, store, base) = match opcode {
            LdSFld0 | LdSFld1 | LdSFld2 | LdSFld3 | LdSFld4 | LdSFld5 | LdSFld6 | LdSFld => {
                (SlotKind::Static, false, LdSFld0)
            }
            StSFld0 | StSFld1 | StSFld2 | StSFld3 | StSFld4 | StSFld5 | StSFld6 | StSFld => {
                (SlotKind::Static, true, StSFld0)
            }
            LdLoc0 | LdLoc1 | LdLoc2 | LdLoc3 | LdLoc4 | LdLoc5 | LdLoc6 | LdLoc => {
                (SlotKind::Local, false, LdLoc0)
            }
            StLoc0 | StLoc1 | StLoc2 | StLoc3 | StLoc4 | StLoc5 | StLoc6 | StLoc => {
                (SlotKind::Local, true, StLoc0)
            }
            LdArg0 | LdArg1 | LdArg2 | LdArg3 | LdArg4 | LdArg5 | LdArg6 | LdArg => {
                (SlotKind::Argument, false, LdArg0)
            }
            StArg0 | StArg1 | StArg2 | StArg3 | StArg4 | StArg5 | StArg6 | StArg => {
                (SlotKind::Argument, true, StArg0)
            }
            _ => return Err(unexpected(instruction)),
        };
        let index = match opcode.to_u8() - base.to_u8() {
            7 => instruction.token_u8() as usize,
            fixed => fixed as usize,
        };

        if store {
            self.store_slot(kind, index)
        } else {
            self.load_slot(kind, index)
        }
    }

    fn init_static_slot(&mut self, count: u8) -> VmResult<()> {
        if count == 0 {
            return Err(VmError::invalid_operation(
                "The operand 0 is invalid for OpCode INITSSLOT",
            ));
        }
        let context = self
            .invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        let mut statics = context.static_fields.borrow_mut();
        if statics.is_some() {
            return Err(VmError::invalid_operation("INITSSLOT cannot be executed twice"));
        }
        *statics = Some(Slot::new(count as usize, &mut self.reference_counter));
        Ok(())
    }

    fn init_slot(&mut self, locals: u8, arguments: u8) -> VmResult<()> {
        if locals == 0 && arguments == 0 {
            return Err(VmError::invalid_operation(
                "The operands 0, 0 are invalid for OpCode INITSLOT",
            ));
        }
        {
            let context = self.context()?;
            if context.local_variables.is_some() || context.arguments.is_some() {
                return Err(VmError::invalid_operation("INITSLOT cannot be executed twice"));
            }
        }

        // The first argument is the item on top of the stack.
        let mut items = Vec::with_capacity(arguments as usize);
        for _ in 0..arguments {
            items.push(self.pop()?);
        }

        let rc = &mut self.reference_counter;
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        if locals > 0 {
            context.local_variables = Some(Slot::new(locals as usize, rc));
        }
        if arguments > 0 {
            context.arguments = Some(Slot::from_items(items, rc));
        }
        Ok(())
    }

    fn load_slot(&mut self, kind: SlotKind, index: usize) -> VmResult<()> {
        let context = self.context()?;
        let item = match kind {
            SlotKind::Static => context
                .static_fields
                .borrow()
                .as_ref()
                .ok_or_else(|| uninitialized(kind))?
                .get(index)?
                .clone(),
            SlotKind::Local => {
                let slot = context.local_variables.as_ref().ok_or_else(|| uninitialized(kind))?;
                slot.get(index)?.clone()
            }
            SlotKind::Argument => {
                let slot = context.arguments.as_ref().ok_or_else(|| uninitialized(kind))?;
                slot.get(index)?.clone()
            }
        };
        self.push(item)
    }

    fn store_slot(&mut self, kind: SlotKind, index: usize) -> VmResult<()> {
        let item = self.pop()?;
        let rc = &mut self.reference_counter;
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        match kind {
            SlotKind::Static => context
                .static_fields
                .borrow_mut()
                .as_mut()
                .ok_or_else(|| uninitialized(kind))?
                .set(index, item, rc),
            SlotKind::Local => context
                .local_variables
                .as_mut()
                .ok_or_else(|| uninitialized(kind))?
                .set(index, item, rc),
            SlotKind::Argument => context
                .arguments
                .as_mut()
                .ok_or_else(|| uninitialized(kind))?
                .set(index, item, rc),
        }?;
        Ok(())
    }
}

fn uninitialized(kind: SlotKind) -> VmError {
    VmError::invalid_operation(format!("The {} slot is not initialized", kind.name()))
}
