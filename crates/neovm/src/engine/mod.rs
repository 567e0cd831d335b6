//! Execution engine
//!
//! Owns the invocation stack, the reference counter and the VM state, and
//! runs the fetch-decode-execute loop. Opcode semantics live in the
//! [`opcodes`] handler groups.
//!
//! # Error flow
//!
//! A handler returns `Err` for any failure. Catchable kinds (see
//! [`VmError::is_catchable`]) are converted into a ByteString exception
//! carrying the error message and unwound through the try regions, exactly
//! like a THROW. An exception that no region catches, or a non-catchable
//! error, moves the engine to [`VmState::Fault`].

mod host;
mod opcodes;

use std::cell::Ref;
use std::rc::Rc;
use std::sync::Arc;

use num_bigint::BigInt;

pub use host::ExecutionHost;

use crate::call_flags::CallFlags;
use crate::evaluation_stack::{EvaluationStack, SharedStack};
use crate::exception_handling::ExceptionHandlingState;
use crate::execution_context::ExecutionContext;
use crate::instruction::Instruction;
use crate::limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::{integer, StackItem};
use crate::{VmError, VmResult};

/// Top-level state of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmState {
    /// Ready to run or running
    None,
    /// Completed normally
    Halt,
    /// Ended by an error or an uncaught exception
    Fault,
    /// Paused, e.g. at a debugger breakpoint
    Break,
}

/// Parameters for [`ExecutionEngine::load_script`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Items returned to the caller at RET; -1 returns the whole stack
    pub rvcount: i32,
    /// Offset of the first instruction
    pub initial_position: usize,
    /// Permissions of the new context
    pub call_flags: CallFlags,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { rvcount: -1, initial_position: 0, call_flags: CallFlags::ALL }
    }
}

/// The virtual machine
pub struct ExecutionEngine {
    state: VmState,
    limits: ExecutionEngineLimits,
    reference_counter: ReferenceCounter,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: SharedStack,
    uncaught_exception: Option<StackItem>,
    exception_cause: Option<VmError>,
    fault_error: Option<VmError>,
    is_jumping: bool,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    /// Create an engine with the default limits
    pub fn new() -> Self {
        Self::with_limits(ExecutionEngineLimits::default())
    }

    /// Create an engine with custom limits
    pub fn with_limits(limits: ExecutionEngineLimits) -> Self {
        Self {
            state: VmState::None,
            result_stack: EvaluationStack::shared(limits.max_stack_size),
            limits,
            reference_counter: ReferenceCounter::new(),
            invocation_stack: Vec::new(),
            uncaught_exception: None,
            exception_cause: None,
            fault_error: None,
            is_jumping: false,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current state
    #[inline]
    pub fn state(&self) -> VmState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: VmState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "engine state changed");
            self.state = state;
        }
    }

    /// Configured limits
    #[inline]
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// Reference counter shared by every context of this engine
    #[inline]
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// Mutable reference counter, for hosts that build compound items
    #[inline]
    pub fn reference_counter_mut(&mut self) -> &mut ReferenceCounter {
        &mut self.reference_counter
    }

    /// Active contexts, outermost first and innermost (current) last
    pub fn invocation_stack(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// Innermost context
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    /// Innermost context, mutably
    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.invocation_stack.last_mut()
    }

    /// Outermost context
    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    /// Items returned by the outermost context
    pub fn result_stack(&self) -> Ref<'_, EvaluationStack> {
        self.result_stack.borrow()
    }

    /// Exception item being unwound, or the one that caused a fault
    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.uncaught_exception.as_ref()
    }

    /// Error that moved the engine to `Fault`
    pub fn fault_error(&self) -> Option<&VmError> {
        self.fault_error.as_ref()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load `script` as a new innermost context
    pub fn load_script(&mut self, script: Arc<Script>, options: LoadOptions) -> VmResult<()> {
        if options.initial_position > script.len() {
            return Err(VmError::invalid_operation(format!(
                "Initial position {} is outside the script",
                options.initial_position
            )));
        }
        let mut context = ExecutionContext::new(
            script,
            options.rvcount,
            options.call_flags,
            self.limits.max_stack_size,
        );
        context.set_instruction_pointer(options.initial_position);
        self.load_context(context)
    }

    /// Push a context onto the invocation stack
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::invalid_operation(format!(
                "MaxInvocationStackSize exceed: {}",
                self.invocation_stack.len() + 1
            )));
        }
        tracing::debug!(
            depth = self.invocation_stack.len() + 1,
            position = context.instruction_pointer(),
            "context loaded"
        );
        self.invocation_stack.push(context);
        Ok(())
    }

    fn unload_context(&mut self, mut context: ExecutionContext) {
        let rc = &mut self.reference_counter;
        let current = self.invocation_stack.last();

        let shares_statics = current.is_some_and(|c| c.shares_static_fields(&context));
        if !shares_statics {
            if let Some(slot) = context.static_fields.borrow_mut().as_mut() {
                slot.clear_references(rc);
            }
        }
        let shares_stack = match current {
            Some(c) => c.shares_evaluation_stack(&context),
            None => Rc::ptr_eq(&context.evaluation_stack, &self.result_stack),
        };
        if !shares_stack {
            context.evaluation_stack.borrow_mut().clear(rc);
        }
        if let Some(mut slot) = context.local_variables.take() {
            slot.clear_references(rc);
        }
        if let Some(mut slot) = context.arguments.take() {
            slot.clear_references(rc);
        }
        for mut region in context.try_stack.drain(..) {
            if let Some((item, _)) = region.take_pending() {
                rc.remove_stack_reference(&item);
            }
        }
        tracing::debug!(depth = self.invocation_stack.len(), "context unloaded");
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run until the engine halts, faults or breaks, without a host
    pub fn execute(&mut self) -> VmState {
        self.execute_with(&mut ())
    }

    /// Run until the engine halts, faults or breaks
    pub fn execute_with<H: ExecutionHost + ?Sized>(&mut self, host: &mut H) -> VmState {
        if self.state == VmState::Break {
            self.set_state(VmState::None);
        }
        while self.state == VmState::None {
            self.execute_next(host);
        }
        self.state
    }

    /// Execute exactly one instruction
    pub fn execute_next<H: ExecutionHost + ?Sized>(&mut self, host: &mut H) {
        if self.invocation_stack.is_empty() {
            self.set_state(VmState::Halt);
            return;
        }
        if let Err(error) = self.step(host) {
            self.on_fault(host, error);
        }
    }

    fn step<H: ExecutionHost + ?Sized>(&mut self, host: &mut H) -> VmResult<()> {
        let index = self.invocation_stack.len() - 1;
        let context = &self.invocation_stack[index];
        let position = context.instruction_pointer();
        let instruction = context.current_instruction()?.unwrap_or(Instruction::RET);

        host.pre_execute_instruction(self, &instruction).map_err(VmError::into_external)?;
        tracing::trace!(position, opcode = instruction.opcode.name(), "execute");

        if let Err(error) = self.execute_instruction(host, &instruction) {
            if !(self.limits.catch_engine_exceptions && error.is_catchable()) {
                return Err(error);
            }
            self.throw_error(error)?;
        }

        let count = self.reference_counter.check_zero_referred();
        if count > self.limits.max_stack_size {
            return Err(VmError::invalid_operation(format!(
                "MaxStackSize exceed: {count}/{}",
                self.limits.max_stack_size
            )));
        }
        host.post_execute_instruction(self, &instruction).map_err(VmError::into_external)?;

        if !self.is_jumping {
            if let Some(context) = self.invocation_stack.get_mut(index) {
                context.move_next(instruction.size());
            }
        }
        self.is_jumping = false;
        Ok(())
    }

    fn on_fault<H: ExecutionHost + ?Sized>(&mut self, host: &mut H, error: VmError) {
        tracing::debug!(error = %error, "engine faulted");
        self.is_jumping = false;
        self.fault_error = Some(error.clone());
        self.set_state(VmState::Fault);
        host.on_fault(self, &error);
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Throw `exception` into the script.
    ///
    /// The innermost enclosing try region takes over; contexts without one
    /// are unloaded. Returns `Err(VmError::Unhandled)` when nothing catches
    /// it, in which case the item stays available through
    /// [`uncaught_exception`](Self::uncaught_exception).
    pub fn throw(&mut self, exception: StackItem) -> VmResult<()> {
        self.set_uncaught_exception(Some(exception));
        self.exception_cause = None;
        self.handle_exception()
    }

    fn throw_error(&mut self, error: VmError) -> VmResult<()> {
        tracing::debug!(error = %error, "raising engine exception");
        self.set_uncaught_exception(Some(StackItem::from(error.message())));
        self.exception_cause = Some(error);
        self.handle_exception()
    }

    fn set_uncaught_exception(&mut self, exception: Option<StackItem>) {
        if let Some(old) = self.uncaught_exception.take() {
            self.reference_counter.remove_stack_reference(&old);
        }
        if let Some(item) = &exception {
            self.reference_counter.add_stack_reference(item, 1);
        }
        self.uncaught_exception = exception;
    }

    fn handle_exception(&mut self) -> VmResult<()> {
        let mut handler = None;
        'search: for depth in (0..self.invocation_stack.len()).rev() {
            let context = &mut self.invocation_stack[depth];
            loop {
                let discard = match context.try_stack.last() {
                    None => break,
                    Some(region) => {
                        region.state == ExceptionHandlingState::Finally
                            || (region.state == ExceptionHandlingState::Catch
                                && !region.has_finally())
                    }
                };
                if !discard {
                    handler = Some(depth);
                    break 'search;
                }
                if let Some(mut region) = context.try_stack.pop() {
                    if let Some((item, _)) = region.take_pending() {
                        self.reference_counter.remove_stack_reference(&item);
                    }
                }
            }
        }

        let Some(depth) = handler else {
            let message = match &self.uncaught_exception {
                Some(StackItem::ByteString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
                Some(item) => item.item_type().to_string(),
                None => String::from("unknown exception"),
            };
            return Err(self.exception_cause.take().unwrap_or(VmError::Unhandled(message)));
        };

        while self.invocation_stack.len() > depth + 1 {
            if let Some(context) = self.invocation_stack.pop() {
                self.unload_context(context);
            }
        }

        let exception = self
            .uncaught_exception
            .take()
            .ok_or_else(|| VmError::invalid_operation("No exception is being thrown"))?;
        let cause = self.exception_cause.take();
        let rc = &mut self.reference_counter;
        let context = self
            .invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        let region = context
            .try_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("The corresponding TRY block cannot be found"))?;
        let stack_depth = region.stack_depth();

        let target = match (region.state, region.catch_pointer(), region.finally_pointer()) {
            (ExceptionHandlingState::Try, Some(catch), _) => {
                region.state = ExceptionHandlingState::Catch;
                let mut stack = context.evaluation_stack.borrow_mut();
                stack.truncate(stack_depth, rc);
                let pushed = stack.push(exception.clone(), rc);
                rc.remove_stack_reference(&exception);
                pushed?;
                catch
            }
            (_, _, Some(finally)) => {
                region.state = ExceptionHandlingState::Finally;
                region.set_pending(exception, cause);
                context.evaluation_stack.borrow_mut().truncate(stack_depth, rc);
                finally
            }
            _ => {
                rc.remove_stack_reference(&exception);
                return Err(VmError::invalid_operation("The try region has no handler"));
            }
        };
        context.set_instruction_pointer(target);
        self.is_jumping = true;
        Ok(())
    }

    // ========================================================================
    // Stack helpers
    // ========================================================================

    fn context(&self) -> VmResult<&ExecutionContext> {
        self.invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))
    }

    fn context_mut(&mut self) -> VmResult<&mut ExecutionContext> {
        self.invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))
    }

    /// Push onto the current evaluation stack
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        let context = self
            .invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        context.evaluation_stack.borrow_mut().push(item, &mut self.reference_counter)
    }

    /// Pop from the current evaluation stack
    pub fn pop(&mut self) -> VmResult<StackItem> {
        let context = self
            .invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        context.evaluation_stack.borrow_mut().pop(&mut self.reference_counter)
    }

    /// Copy of the item `index` positions below the top of the current stack
    pub fn peek(&self, index: usize) -> VmResult<StackItem> {
        self.context()?.evaluation_stack.borrow().peek(index).cloned()
    }

    /// Run `f` on the current evaluation stack
    fn with_stack<R>(
        &mut self,
        f: impl FnOnce(&mut EvaluationStack, &mut ReferenceCounter) -> VmResult<R>,
    ) -> VmResult<R> {
        let context = self
            .invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("No execution context is loaded"))?;
        let mut stack = context.evaluation_stack.borrow_mut();
        f(&mut stack, &mut self.reference_counter)
    }

    fn pop_integer(&mut self) -> VmResult<BigInt> {
        let item = self.pop()?;
        item.get_integer(self.reference_counter.heap(), &self.limits)
    }

    fn pop_boolean(&mut self) -> VmResult<bool> {
        let item = self.pop()?;
        item.get_boolean(&self.limits)
    }

    /// Pop an integer that must fit in `i32`
    fn pop_i32(&mut self) -> VmResult<i32> {
        let value = self.pop_integer()?;
        i32::try_from(&value)
            .map_err(|_| VmError::invalid_operation(format!("The value {value} is out of range.")))
    }

    /// Pop a non-negative count or index
    fn pop_index(&mut self) -> VmResult<usize> {
        let value = self.pop_i32()?;
        usize::try_from(value)
            .map_err(|_| VmError::invalid_operation(format!("The value {value} is out of range.")))
    }

    fn push_integer(&mut self, value: BigInt) -> VmResult<()> {
        integer::check_size(&value, self.limits.max_integer_size)?;
        self.push(StackItem::Integer(value))
    }

    fn push_boolean(&mut self, value: bool) -> VmResult<()> {
        self.push(StackItem::Boolean(value))
    }

    // ========================================================================
    // Jumps and calls
    // ========================================================================

    /// Absolute position of `offset` relative to the current instruction
    fn offset_position(&self, offset: i32) -> VmResult<usize> {
        let position = self.context()?.instruction_pointer() as i64 + offset as i64;
        usize::try_from(position)
            .map_err(|_| VmError::invalid_operation(format!("Jump out of range for offset: {offset}")))
    }

    /// Check that `position` starts an instruction of the current script
    fn validate_jump_target(&self, position: usize) -> VmResult<()> {
        let script = self.context()?.script();
        if position >= script.len() || !script.is_instruction_boundary(position) {
            return Err(VmError::invalid_operation(format!(
                "Jump out of range for position: {position}"
            )));
        }
        Ok(())
    }

    fn execute_jump(&mut self, position: usize) -> VmResult<()> {
        self.validate_jump_target(position)?;
        self.context_mut()?.set_instruction_pointer(position);
        self.is_jumping = true;
        Ok(())
    }

    fn execute_jump_offset(&mut self, offset: i32) -> VmResult<()> {
        let position = self.offset_position(offset)?;
        self.execute_jump(position)
    }

    fn execute_call(&mut self, position: usize) -> VmResult<()> {
        self.validate_jump_target(position)?;
        let callee = self.context()?.clone_at(position);
        self.load_context(callee)
    }
}
