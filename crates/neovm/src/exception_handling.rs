//! Exception handling regions
//!
//! Each TRY pushes an [`ExceptionHandlingContext`] onto the try stack of the
//! current context. The region moves from `Try` to `Catch` when an exception
//! is caught, and to `Finally` when its finally block runs, either on a
//! normal ENDTRY or while an exception is in flight.

use crate::stack_item::StackItem;
use crate::VmError;

/// Phase of a try region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionHandlingState {
    /// Executing the try block
    Try,
    /// Executing the catch block
    Catch,
    /// Executing the finally block
    Finally,
}

/// One try/catch/finally region
#[derive(Debug, Clone)]
pub struct ExceptionHandlingContext {
    catch_pointer: Option<usize>,
    finally_pointer: Option<usize>,
    /// Where execution continues after the region completes
    pub end_pointer: Option<usize>,
    /// Current phase
    pub state: ExceptionHandlingState,
    stack_depth: usize,
    pending: Option<(StackItem, Option<VmError>)>,
}

impl ExceptionHandlingContext {
    /// Open a region; `stack_depth` is the evaluation stack length at TRY
    pub fn new(catch_pointer: Option<usize>, finally_pointer: Option<usize>, stack_depth: usize) -> Self {
        Self {
            catch_pointer,
            finally_pointer,
            end_pointer: None,
            state: ExceptionHandlingState::Try,
            stack_depth,
            pending: None,
        }
    }

    /// Start of the catch block
    pub fn catch_pointer(&self) -> Option<usize> {
        self.catch_pointer
    }

    /// Start of the finally block
    pub fn finally_pointer(&self) -> Option<usize> {
        self.finally_pointer
    }

    /// Check if the region declares a catch block
    pub fn has_catch(&self) -> bool {
        self.catch_pointer.is_some()
    }

    /// Check if the region declares a finally block
    pub fn has_finally(&self) -> bool {
        self.finally_pointer.is_some()
    }

    /// Evaluation stack length when the region was entered
    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    /// Check if an exception will be rethrown at ENDFINALLY
    pub fn is_exception_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Exception rethrown at ENDFINALLY
    pub fn pending_exception(&self) -> Option<&StackItem> {
        self.pending.as_ref().map(|(item, _)| item)
    }

    pub(crate) fn set_pending(&mut self, item: StackItem, cause: Option<VmError>) {
        self.pending = Some((item, cause));
    }

    pub(crate) fn take_pending(&mut self) -> Option<(StackItem, Option<VmError>)> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_region() {
        let region = ExceptionHandlingContext::new(Some(10), None, 2);
        assert_eq!(region.state, ExceptionHandlingState::Try);
        assert!(region.has_catch());
        assert!(!region.has_finally());
        assert_eq!(region.stack_depth(), 2);
        assert!(!region.is_exception_in_flight());
    }

    #[test]
    fn test_pending_exception() {
        let mut region = ExceptionHandlingContext::new(None, Some(4), 0);
        region.set_pending(StackItem::from("oops"), None);
        assert!(region.is_exception_in_flight());
        assert!(region.pending_exception().is_some());
        assert!(region.take_pending().is_some());
        assert!(!region.is_exception_in_flight());
    }
}
