//! NeoVM execution engine
//!
//! This crate provides a deterministic, stack-based bytecode virtual machine
//! for smart-contract scripts:
//! - Typed stack items with a cycle-aware reference counter
//! - Lazily decoded, immutable scripts
//! - Execution contexts with slots and try/catch/finally regions
//! - The fetch-decode-execute loop with embedding-layer hooks
//! - A single-stepping debugger, a script builder and a binary serializer

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod call_flags;
pub mod debugger;
pub mod defaults;
pub mod engine;
pub mod evaluation_stack;
pub mod exception_handling;
pub mod execution_context;
pub mod heap;
pub mod instruction;
pub mod limits;
pub mod opcode;
pub mod reference_counter;
pub mod script;
pub mod script_builder;
pub mod slot;
pub mod stack_item;

pub use call_flags::CallFlags;
pub use debugger::Debugger;
pub use engine::{ExecutionEngine, ExecutionHost, LoadOptions, VmState};
pub use evaluation_stack::EvaluationStack;
pub use exception_handling::{ExceptionHandlingContext, ExceptionHandlingState};
pub use execution_context::ExecutionContext;
pub use heap::ObjectId;
pub use instruction::Instruction;
pub use limits::ExecutionEngineLimits;
pub use opcode::OpCode;
pub use reference_counter::ReferenceCounter;
pub use script::Script;
pub use script_builder::ScriptBuilder;
pub use slot::Slot;
pub use stack_item::{InteropInterface, Pointer, StackItem, StackItemType};

/// VM execution errors
///
/// Every failure the engine can observe maps to one of these variants. The
/// `Type`, `InvalidOperation` and `Arithmetic` kinds raised while an opcode
/// executes are turned into script-level exceptions and may be caught by a
/// try region; the remaining kinds always end execution in `Fault`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// Malformed script bytes
    #[error("Format error: {0}")]
    Format(String),

    /// Operand variant mismatch or invalid conversion
    #[error("Type error: {0}")]
    Type(String),

    /// Stack, index, jump target or resource-limit violation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Integer overflow, division by zero or an out-of-domain argument
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// A script exception that no try region caught
    #[error("Unhandled exception: {0}")]
    Unhandled(String),

    /// ABORT, ABORTMSG or a failed ASSERT
    #[error("Execution aborted: {0}")]
    Abort(String),

    /// Failure raised by the embedding layer through a hook
    #[error("External error: {0}")]
    External(String),
}

/// Classification of a [`VmError`] without its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`VmError::Format`]
    Format,
    /// See [`VmError::Type`]
    Type,
    /// See [`VmError::InvalidOperation`]
    InvalidOperation,
    /// See [`VmError::Arithmetic`]
    Arithmetic,
    /// See [`VmError::Unhandled`]
    Unhandled,
    /// See [`VmError::Abort`]
    Abort,
    /// See [`VmError::External`]
    External,
}

impl VmError {
    /// Create a format error
    pub fn format(message: impl Into<String>) -> Self {
        VmError::Format(message.into())
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        VmError::Type(message.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        VmError::InvalidOperation(message.into())
    }

    /// Create an arithmetic error
    pub fn arithmetic(message: impl Into<String>) -> Self {
        VmError::Arithmetic(message.into())
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::Format(_) => ErrorKind::Format,
            VmError::Type(_) => ErrorKind::Type,
            VmError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            VmError::Arithmetic(_) => ErrorKind::Arithmetic,
            VmError::Unhandled(_) => ErrorKind::Unhandled,
            VmError::Abort(_) => ErrorKind::Abort,
            VmError::External(_) => ErrorKind::External,
        }
    }

    /// Message carried by the error, without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            VmError::Format(m)
            | VmError::Type(m)
            | VmError::InvalidOperation(m)
            | VmError::Arithmetic(m)
            | VmError::Unhandled(m)
            | VmError::Abort(m)
            | VmError::External(m) => m,
        }
    }

    /// Whether a script try region may intercept this error
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            VmError::Type(_) | VmError::InvalidOperation(_) | VmError::Arithmetic(_)
        )
    }

    /// Re-tag an error returned from a host hook.
    ///
    /// Host failures are never catchable by the script. Aborts and
    /// exceptions the host re-threw into the script keep their kind; the
    /// rest is reported as [`VmError::External`].
    pub fn into_external(self) -> Self {
        match self {
            VmError::External(_) | VmError::Abort(_) | VmError::Unhandled(_) => self,
            other => VmError::External(other.to_string()),
        }
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catchable_kinds() {
        assert!(VmError::type_error("x").is_catchable());
        assert!(VmError::invalid_operation("x").is_catchable());
        assert!(VmError::arithmetic("x").is_catchable());
        assert!(!VmError::format("x").is_catchable());
        assert!(!VmError::Abort("x".into()).is_catchable());
        assert!(!VmError::External("x".into()).is_catchable());
    }

    #[test]
    fn test_into_external_keeps_message() {
        let error = VmError::arithmetic("boom").into_external();
        assert_eq!(error.kind(), ErrorKind::External);
        assert_eq!(error.message(), "Arithmetic error: boom");
        assert_eq!(VmError::Abort("gas".into()).into_external().kind(), ErrorKind::Abort);
    }
}
