//! Embedding-layer hooks

use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::{VmError, VmResult};

/// Callbacks the engine invokes synchronously while executing.
///
/// Errors returned from a hook are never catchable by the script: the
/// engine faults immediately. A host that wants to raise a script-level
/// exception instead calls [`ExecutionEngine::throw`] and returns its
/// result.
///
/// `()` is the host that accepts everything and provides no services.
pub trait ExecutionHost {
    /// Called before each instruction executes, e.g. to charge gas
    fn pre_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        Ok(())
    }

    /// Called after each instruction executed
    fn post_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        Ok(())
    }

    /// Called once when the engine enters `Fault`
    fn on_fault(&mut self, _engine: &ExecutionEngine, _error: &VmError) {}

    /// Service a SYSCALL; arguments and results travel on the evaluation stack
    fn on_syscall(&mut self, _engine: &mut ExecutionEngine, method: u32) -> VmResult<()> {
        Err(VmError::External(format!("Syscall {method:#010x} is not supported")))
    }

    /// Resolve a CALLT token.
    ///
    /// The host loads the target with [`ExecutionEngine::load_script`] and
    /// moves its arguments onto the new context's stack.
    fn on_load_script(&mut self, _engine: &mut ExecutionEngine, token: u16) -> VmResult<()> {
        Err(VmError::External(format!("Token {token} cannot be resolved")))
    }
}

impl ExecutionHost for () {}
