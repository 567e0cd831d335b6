//! Execution contexts
//!
//! One context per active method invocation. A context created by CALL
//! shares its evaluation stack and static fields with the caller; locals,
//! arguments and the try stack are always private.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use crate::call_flags::CallFlags;
use crate::evaluation_stack::{EvaluationStack, SharedStack};
use crate::exception_handling::ExceptionHandlingContext;
use crate::instruction::Instruction;
use crate::script::Script;
use crate::slot::Slot;
use crate::VmResult;

/// Static fields shared by every context cloned from the same load
pub type SharedSlot = Rc<RefCell<Option<Slot>>>;

/// An active method invocation
#[derive(Debug)]
pub struct ExecutionContext {
    script: Arc<Script>,
    instruction_pointer: usize,
    rvcount: i32,
    call_flags: CallFlags,
    pub(crate) evaluation_stack: SharedStack,
    pub(crate) static_fields: SharedSlot,
    pub(crate) local_variables: Option<Slot>,
    pub(crate) arguments: Option<Slot>,
    pub(crate) try_stack: Vec<ExceptionHandlingContext>,
}

impl ExecutionContext {
    /// Create a context for a freshly loaded script
    pub fn new(script: Arc<Script>, rvcount: i32, call_flags: CallFlags, max_stack_size: usize) -> Self {
        Self {
            script,
            instruction_pointer: 0,
            rvcount,
            call_flags,
            evaluation_stack: EvaluationStack::shared(max_stack_size),
            static_fields: Rc::new(RefCell::new(None)),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
        }
    }

    /// Create the callee context of a CALL: same script, stack, static
    /// fields and flags, starting at `position`
    pub fn clone_at(&self, position: usize) -> Self {
        Self {
            script: Arc::clone(&self.script),
            instruction_pointer: position,
            rvcount: 0,
            call_flags: self.call_flags,
            evaluation_stack: Rc::clone(&self.evaluation_stack),
            static_fields: Rc::clone(&self.static_fields),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
        }
    }

    /// Script being executed
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    /// Offset of the next instruction
    #[inline]
    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Move the instruction pointer
    #[inline]
    pub fn set_instruction_pointer(&mut self, position: usize) {
        self.instruction_pointer = position;
    }

    pub(crate) fn move_next(&mut self, size: usize) {
        self.instruction_pointer = self.instruction_pointer.saturating_add(size);
    }

    /// Instruction at the instruction pointer, or `None` past the end
    pub fn current_instruction(&self) -> VmResult<Option<Instruction>> {
        if self.instruction_pointer >= self.script.len() {
            return Ok(None);
        }
        self.script.get_instruction(self.instruction_pointer).map(Some)
    }

    /// Instruction after the current one, or `None` past the end
    pub fn next_instruction(&self) -> VmResult<Option<Instruction>> {
        let Some(current) = self.current_instruction()? else {
            return Ok(None);
        };
        let position = self.instruction_pointer + current.size();
        if position >= self.script.len() {
            return Ok(None);
        }
        self.script.get_instruction(position).map(Some)
    }

    /// Number of items returned to the caller; -1 returns everything
    pub fn rvcount(&self) -> i32 {
        self.rvcount
    }

    /// Permissions of this context
    pub fn call_flags(&self) -> CallFlags {
        self.call_flags
    }

    /// Borrow the evaluation stack
    pub fn evaluation_stack(&self) -> Ref<'_, EvaluationStack> {
        self.evaluation_stack.borrow()
    }

    /// Mutably borrow the evaluation stack
    pub fn evaluation_stack_mut(&self) -> RefMut<'_, EvaluationStack> {
        self.evaluation_stack.borrow_mut()
    }

    /// Borrow the static fields
    pub fn static_fields(&self) -> Ref<'_, Option<Slot>> {
        self.static_fields.borrow()
    }

    /// Local variables, once INITSLOT ran
    pub fn local_variables(&self) -> Option<&Slot> {
        self.local_variables.as_ref()
    }

    /// Arguments, once INITSLOT ran
    pub fn arguments(&self) -> Option<&Slot> {
        self.arguments.as_ref()
    }

    /// Active try regions, innermost last
    pub fn try_stack(&self) -> &[ExceptionHandlingContext] {
        &self.try_stack
    }

    /// Check whether `other` works on the same evaluation stack
    pub fn shares_evaluation_stack(&self, other: &ExecutionContext) -> bool {
        Rc::ptr_eq(&self.evaluation_stack, &other.evaluation_stack)
    }

    /// Check whether `other` works on the same static fields
    pub fn shares_static_fields(&self, other: &ExecutionContext) -> bool {
        Rc::ptr_eq(&self.static_fields, &other.static_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference_counter::ReferenceCounter;
    use crate::stack_item::StackItem;

    fn script(bytes: &[u8]) -> Arc<Script> {
        Arc::new(Script::new(bytes.to_vec(), true).unwrap())
    }

    #[test]
    fn test_clone_shares_stack_and_statics() {
        let context = ExecutionContext::new(script(&[0x11, 0x40]), -1, CallFlags::ALL, 16);
        let callee = context.clone_at(1);
        assert!(callee.shares_evaluation_stack(&context));
        assert!(callee.shares_static_fields(&context));
        assert_eq!(callee.instruction_pointer(), 1);
        assert_eq!(callee.rvcount(), 0);
        assert_eq!(callee.call_flags(), CallFlags::ALL);

        let mut rc = ReferenceCounter::new();
        context.evaluation_stack_mut().push(StackItem::from(1), &mut rc).unwrap();
        assert_eq!(callee.evaluation_stack().len(), 1);
    }

    #[test]
    fn test_current_instruction_past_end() {
        let mut context = ExecutionContext::new(script(&[0x11]), -1, CallFlags::ALL, 16);
        assert!(context.current_instruction().unwrap().is_some());
        assert!(context.next_instruction().unwrap().is_none());
        context.move_next(1);
        assert!(context.current_instruction().unwrap().is_none());
    }
}
