//! Single-stepping debugger
//!
//! Wraps an engine and its host, pausing in [`VmState::Break`] at
//! breakpoints and after each step.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::engine::{ExecutionEngine, ExecutionHost, VmState};
use crate::script::Script;

/// Engine driver with breakpoints and stepping
pub struct Debugger<H: ExecutionHost = ()> {
    engine: ExecutionEngine,
    host: H,
    break_points: Vec<(Arc<Script>, FxHashSet<usize>)>,
}

impl Debugger<()> {
    /// Debug an engine without a host
    pub fn new(engine: ExecutionEngine) -> Self {
        Self::with_host(engine, ())
    }
}

impl<H: ExecutionHost> Debugger<H> {
    /// Debug an engine whose hooks are served by `host`
    pub fn with_host(engine: ExecutionEngine, host: H) -> Self {
        Self { engine, host, break_points: Vec::new() }
    }

    /// The debugged engine
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// The debugged engine, mutably
    pub fn engine_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.engine
    }

    /// The host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Give back the engine and the host
    pub fn into_inner(self) -> (ExecutionEngine, H) {
        (self.engine, self.host)
    }

    /// Break before the instruction at `position` of `script` executes
    pub fn add_break_point(&mut self, script: &Arc<Script>, position: usize) {
        match self.break_points.iter_mut().find(|(s, _)| Arc::ptr_eq(s, script)) {
            Some((_, positions)) => {
                positions.insert(position);
            }
            None => {
                let positions = FxHashSet::from_iter([position]);
                self.break_points.push((Arc::clone(script), positions));
            }
        }
    }

    /// Remove a breakpoint; returns whether it existed
    pub fn remove_break_point(&mut self, script: &Arc<Script>, position: usize) -> bool {
        let Some(index) = self.break_points.iter().position(|(s, _)| Arc::ptr_eq(s, script)) else {
            return false;
        };
        let removed = self.break_points[index].1.remove(&position);
        if self.break_points[index].1.is_empty() {
            self.break_points.swap_remove(index);
        }
        removed
    }

    /// Run until the engine halts, faults or reaches a breakpoint
    pub fn execute(&mut self) -> VmState {
        if self.engine.state() == VmState::Break {
            self.engine.set_state(VmState::None);
        }
        while self.engine.state() == VmState::None {
            self.execute_and_check_break_points();
        }
        self.engine.state()
    }

    /// Execute one instruction, entering calls
    pub fn step_into(&mut self) -> VmState {
        if self.is_finished() {
            return self.engine.state();
        }
        self.engine.execute_next(&mut self.host);
        self.pause()
    }

    /// Execute one instruction, running calls it makes to completion
    pub fn step_over(&mut self) -> VmState {
        if self.is_finished() {
            return self.engine.state();
        }
        self.engine.set_state(VmState::None);
        let depth = self.engine.invocation_stack().len();
        loop {
            self.execute_and_check_break_points();
            if self.engine.state() != VmState::None
                || self.engine.invocation_stack().len() <= depth
            {
                break;
            }
        }
        self.pause()
    }

    /// Run until the current context returns
    pub fn step_out(&mut self) -> VmState {
        if self.is_finished() {
            return self.engine.state();
        }
        self.engine.set_state(VmState::None);
        let depth = self.engine.invocation_stack().len();
        while self.engine.state() == VmState::None
            && self.engine.invocation_stack().len() >= depth
        {
            self.execute_and_check_break_points();
        }
        self.pause()
    }

    fn is_finished(&self) -> bool {
        matches!(self.engine.state(), VmState::Halt | VmState::Fault)
    }

    fn pause(&mut self) -> VmState {
        if self.engine.state() == VmState::None {
            self.engine.set_state(VmState::Break);
        }
        self.engine.state()
    }

    fn execute_and_check_break_points(&mut self) {
        self.engine.execute_next(&mut self.host);
        if self.engine.state() != VmState::None {
            return;
        }
        let Some(context) = self.engine.current_context() else {
            return;
        };
        let hit = self.break_points.iter().any(|(script, positions)| {
            Arc::ptr_eq(script, context.script())
                && positions.contains(&context.instruction_pointer())
        });
        if hit {
            tracing::debug!(position = context.instruction_pointer(), "breakpoint hit");
            self.engine.set_state(VmState::Break);
        }
    }
}
