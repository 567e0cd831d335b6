//! End-to-end execution scenarios
//!
//! Tests cover:
//! - Arithmetic and halting
//! - Engine failures and their fault kinds
//! - Calls, recursion limits and return-value counts
//! - Try/catch/finally across call frames
//! - Host hooks: syscalls, metering and host-raised exceptions
//! - Slots and compound items

use std::sync::Arc;

use neovm::{
    ErrorKind, ExecutionEngine, ExecutionEngineLimits, ExecutionHost, Instruction, LoadOptions,
    OpCode, ScriptBuilder, StackItem, VmError, VmResult, VmState,
};

fn load(engine: &mut ExecutionEngine, builder: &ScriptBuilder, options: LoadOptions) {
    let script = Arc::new(builder.to_script(true).unwrap());
    engine.load_script(script, options).unwrap();
}

fn run(builder: &ScriptBuilder) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new();
    load(&mut engine, builder, LoadOptions::default());
    engine.execute();
    engine
}

fn fault_kind(engine: &ExecutionEngine) -> Option<ErrorKind> {
    engine.fault_error().map(VmError::kind)
}

fn as_i64(engine: &ExecutionEngine, item: &StackItem) -> i64 {
    let value = item.get_integer(engine.reference_counter().heap(), engine.limits()).unwrap();
    i64::try_from(&value).unwrap()
}

fn result_ints(engine: &ExecutionEngine) -> Vec<i64> {
    engine.result_stack().iter().map(|item| as_i64(engine, item)).collect()
}

fn result_strings(engine: &ExecutionEngine) -> Vec<String> {
    let heap = engine.reference_counter().heap();
    engine.result_stack().iter().map(|item| item.get_string(heap).unwrap()).collect()
}

// ============================================================================
// Arithmetic and faults
// ============================================================================

#[test]
fn test_push_add_ret_halts_with_sum() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Push2).emit(OpCode::Add).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![3]);
}

#[test]
fn test_division_operand_order() {
    // Zero divided by one
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push0).emit(OpCode::Push1).emit(OpCode::Div);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![0]);

    // One divided by zero
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Push0).emit(OpCode::Div);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Arithmetic));
    assert!(matches!(engine.uncaught_exception(), Some(StackItem::ByteString(_))));
}

#[test]
fn test_unknown_type_tag_is_invalid_operation() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit_with(OpCode::NewArrayT, &[0x22]);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
    assert!(engine.fault_error().unwrap().message().contains("NEWARRAY_T"));

    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit_with(OpCode::IsType, &[0x22]);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_integer_overflow_faults() {
    // 2^255 * 2 does not fit in 32 bytes
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push2).emit_push_int(255).emit(OpCode::Pow);
    builder.emit(OpCode::Push2).emit(OpCode::Mul);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Arithmetic));
}

#[test]
fn test_stack_underflow_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Add);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_stack_size_limit_faults() {
    let mut builder = ScriptBuilder::new();
    for _ in 0..5 {
        builder.emit(OpCode::Push1);
    }
    let limits = ExecutionEngineLimits { max_stack_size: 4, ..Default::default() };
    let mut engine = ExecutionEngine::with_limits(limits);
    load(&mut engine, &builder, LoadOptions::default());

    assert_eq!(engine.execute(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

// ============================================================================
// Jumps and calls
// ============================================================================

#[test]
fn test_jump_out_of_range_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit_jump(OpCode::Jmp, 100);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_jump_into_operand_faults() {
    // 0: PUSHINT8 -5 ; 2: JMP -1 lands inside the PUSHINT8 operand
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(-5).emit_jump(OpCode::Jmp, -1);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_conditional_loop_counts_down() {
    // 0: PUSH3 ; 1: DEC ; 2: DUP ; 3: JMPIF -2 ; 5: RET
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push3).emit(OpCode::Dec).emit(OpCode::Dup);
    builder.emit_jump(OpCode::JmpIf, -2).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![0]);
}

#[test]
fn test_call_shares_evaluation_stack() {
    // 0: PUSH1 ; 1: CALL +4 ; 3: PUSH3 ; 4: RET ; 5: PUSH2 ; 6: RET
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit_call(4);
    builder.emit(OpCode::Push3).emit(OpCode::Ret);
    builder.emit(OpCode::Push2).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![1, 2, 3]);
}

#[test]
fn test_unbounded_recursion_faults() {
    // 0: CALL +0 calls itself until the invocation stack is full
    let mut builder = ScriptBuilder::new();
    builder.emit_call(0);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
    assert_eq!(
        engine.invocation_stack().len(),
        engine.limits().max_invocation_stack_size
    );
}

#[test]
fn test_pointer_call() {
    // 0: PUSHA +7 ; 5: CALLA ; 6: RET ; 7: PUSH9 ; 8: RET
    let mut builder = ScriptBuilder::new();
    builder.emit_push_pointer(7).emit(OpCode::CallA).emit(OpCode::Ret);
    builder.emit(OpCode::Push9).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![9]);
}

#[test]
fn test_rvcount_mismatch_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Push2).emit(OpCode::Ret);

    let mut engine = ExecutionEngine::new();
    load(&mut engine, &builder, LoadOptions { rvcount: 1, ..Default::default() });
    assert_eq!(engine.execute(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));

    let mut engine = ExecutionEngine::new();
    load(&mut engine, &builder, LoadOptions { rvcount: 2, ..Default::default() });
    assert_eq!(engine.execute(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![1, 2]);
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_throw_in_nested_call_is_caught_by_caller() {
    // 0: TRY +8, 0
    // 3: PUSH7 ; 4: CALL +7 ; 6: ENDTRY +4
    // 8: (catch) ENDTRY +2
    // 10: RET
    // 11: PUSH9 ; 12: PUSHDATA1 "err" ; 17: THROW
    let mut builder = ScriptBuilder::new();
    builder.emit_try(8, 0);
    builder.emit(OpCode::Push7).emit_call(7).emit_end_try(4);
    builder.emit_end_try(2);
    builder.emit(OpCode::Ret);
    builder.emit(OpCode::Push9).emit_push_str("err").emit(OpCode::Throw);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    // The items pushed inside the try block are discarded
    assert_eq!(result_strings(&engine), vec!["err"]);
    assert!(engine.uncaught_exception().is_none());
}

#[test]
fn test_engine_failure_caught_then_finally_runs() {
    // 0: TRY +8, +11
    // 3: PUSH1 ; 4: PUSH0 ; 5: DIV ; 6: ENDTRY +7
    // 8: (catch) DROP ; 9: ENDTRY +4
    // 11: (finally) PUSH7 ; 12: ENDFINALLY
    // 13: RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(8, 11);
    builder.emit(OpCode::Push1).emit(OpCode::Push0).emit(OpCode::Div).emit_end_try(7);
    builder.emit(OpCode::Drop).emit_end_try(4);
    builder.emit(OpCode::Push7).emit(OpCode::EndFinally);
    builder.emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![7]);
}

#[test]
fn test_finally_without_exception_resumes_at_end() {
    // 0: TRY 0, +6 ; 3: PUSH1 ; 4: ENDTRY +4 ; 6: PUSH2 ; 7: ENDFINALLY ; 8: PUSH3 ; 9: RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(0, 6);
    builder.emit(OpCode::Push1).emit_end_try(4);
    builder.emit(OpCode::Push2).emit(OpCode::EndFinally);
    builder.emit(OpCode::Push3).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![1, 2, 3]);
}

#[test]
fn test_finally_rethrows_pending_exception() {
    // 0: TRY 0, +9 ; 3: PUSHDATA1 "x" ; 6: THROW ; 7: ENDTRY +4
    // 9: (finally) PUSH5 ; 10: ENDFINALLY ; 11: RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(0, 9);
    builder.emit_push_str("x").emit(OpCode::Throw).emit_end_try(4);
    builder.emit(OpCode::Push5).emit(OpCode::EndFinally);
    builder.emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Unhandled));
    assert_eq!(engine.fault_error().unwrap().message(), "x");
}

#[test]
fn test_try_without_handlers_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit_try(0, 0).emit(OpCode::Ret);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_abort_is_not_catchable() {
    // 0: TRY +4, 0 ; 3: ABORT ; 4: (catch) RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(4, 0).emit(OpCode::Abort).emit(OpCode::Ret);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Abort));

    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::PushF).emit(OpCode::Assert);
    let engine = run(&builder);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Abort));

    let mut builder = ScriptBuilder::new();
    builder.emit_push_str("why").emit(OpCode::AbortMsg);
    let engine = run(&builder);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Abort));
    assert!(engine.fault_error().unwrap().message().contains("why"));
}

#[test]
fn test_assert_true_continues() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::PushT).emit(OpCode::Assert).emit(OpCode::Push1);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![1]);
}

// ============================================================================
// Host hooks
// ============================================================================

const SYSCALL_ADD: u32 = 0x01;
const SYSCALL_DENY: u32 = 0x03;

#[derive(Default)]
struct TestHost {
    executed: usize,
    budget: Option<usize>,
    faults: usize,
}

impl ExecutionHost for TestHost {
    fn pre_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        self.executed += 1;
        match self.budget {
            Some(budget) if self.executed > budget => Err(VmError::Abort("out of budget".into())),
            _ => Ok(()),
        }
    }

    fn on_fault(&mut self, _engine: &ExecutionEngine, _error: &VmError) {
        self.faults += 1;
    }

    fn on_syscall(&mut self, engine: &mut ExecutionEngine, method: u32) -> VmResult<()> {
        match method {
            SYSCALL_ADD => {
                let b = engine.pop()?;
                let a = engine.pop()?;
                let heap = engine.reference_counter().heap();
                let sum = a.get_integer(heap, engine.limits())? + b.get_integer(heap, engine.limits())?;
                engine.push(StackItem::Integer(sum))
            }
            SYSCALL_DENY => engine.throw(StackItem::from("denied")),
            _ => Err(VmError::External(format!("unknown syscall {method}"))),
        }
    }
}

fn run_with_host(builder: &ScriptBuilder, host: &mut TestHost) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new();
    load(&mut engine, builder, LoadOptions::default());
    engine.execute_with(host);
    engine
}

#[test]
fn test_syscall_uses_evaluation_stack() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push2).emit(OpCode::Push3).emit_syscall(SYSCALL_ADD).emit(OpCode::Ret);

    let mut host = TestHost::default();
    let engine = run_with_host(&builder, &mut host);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![5]);
    assert_eq!(host.executed, 4);
}

#[test]
fn test_host_error_is_not_catchable() {
    // 0: TRY +8, 0 ; 3: SYSCALL 0x02 ; 8: (catch) RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(8, 0).emit_syscall(0x02).emit(OpCode::Ret);

    let mut host = TestHost::default();
    let engine = run_with_host(&builder, &mut host);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::External));
    assert_eq!(host.faults, 1);
}

#[test]
fn test_host_thrown_exception_is_catchable() {
    // 0: TRY +10, 0 ; 3: SYSCALL deny ; 8: ENDTRY +4 ; 10: (catch) ENDTRY +2 ; 12: RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(10, 0).emit_syscall(SYSCALL_DENY).emit_end_try(4);
    builder.emit_end_try(2).emit(OpCode::Ret);

    let mut host = TestHost::default();
    let engine = run_with_host(&builder, &mut host);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_strings(&engine), vec!["denied"]);
}

#[test]
fn test_metering_abort_stops_immediately() {
    // 0: JMP +0 loops forever
    let mut builder = ScriptBuilder::new();
    builder.emit_jump(OpCode::Jmp, 0);

    let mut host = TestHost { budget: Some(100), ..Default::default() };
    let engine = run_with_host(&builder, &mut host);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::Abort));
    assert_eq!(host.executed, 101);
}

#[test]
fn test_unserviced_call_token_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit_call_token(7);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::External));
}

// ============================================================================
// Slots and compound items
// ============================================================================

#[test]
fn test_arguments_and_locals() {
    // Arguments are popped top first: arg0 = 4, arg1 = 3
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push3).emit(OpCode::Push4);
    builder.emit_with(OpCode::InitSlot, &[1, 2]);
    builder.emit(OpCode::LdArg0).emit(OpCode::LdArg1).emit(OpCode::Sub);
    builder.emit(OpCode::StLoc0).emit(OpCode::LdLoc0).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(result_ints(&engine), vec![1]);
}

#[test]
fn test_static_fields() {
    let mut builder = ScriptBuilder::new();
    builder.emit_with(OpCode::InitSSlot, &[2]);
    builder.emit(OpCode::Push5).emit_with(OpCode::StSFld, &[1]);
    builder.emit(OpCode::LdSFld1).emit(OpCode::LdSFld0).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    let stack = engine.result_stack();
    assert_eq!(as_i64(&engine, stack.peek(1).unwrap()), 5);
    assert!(stack.peek(0).unwrap().is_null());
}

#[test]
fn test_uninitialized_slot_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::LdLoc0);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_pack_orders_top_first() {
    // [1, 2, 3] packed becomes [3, 2, 1]; item 0 is then picked
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Push2).emit(OpCode::Push3).emit(OpCode::Push3);
    builder.emit(OpCode::Pack).emit(OpCode::Dup).emit(OpCode::Push0).emit(OpCode::PickItem);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    let stack = engine.result_stack();
    assert_eq!(as_i64(&engine, stack.peek(0).unwrap()), 3);

    let StackItem::Array(id) = stack.peek(1).unwrap() else {
        panic!("expected an array");
    };
    let items = engine.reference_counter().heap().items(*id).unwrap();
    let values: Vec<i64> = items.iter().map(|item| as_i64(&engine, item)).collect();
    assert_eq!(values, vec![3, 2, 1]);
}

#[test]
fn test_struct_equality_is_by_value() {
    let mut builder = ScriptBuilder::new();
    for _ in 0..2 {
        builder.emit(OpCode::Push1).emit(OpCode::Push1).emit(OpCode::PackStruct);
    }
    builder.emit(OpCode::Equal);
    for _ in 0..2 {
        builder.emit(OpCode::Push1).emit(OpCode::Push1).emit(OpCode::Pack);
    }
    builder.emit(OpCode::Equal);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    let results: Vec<bool> = engine
        .result_stack()
        .iter()
        .map(|item| item.get_boolean(engine.limits()).unwrap())
        .collect();
    assert_eq!(results, vec![true, false]);
}

#[test]
fn test_map_set_and_lookup() {
    // m = {}; m[1] = "a"; push m.haskey(1), m[1]
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NewMap);
    builder.emit(OpCode::Dup).emit(OpCode::Push1).emit_push_str("a").emit(OpCode::SetItem);
    builder.emit(OpCode::Dup).emit(OpCode::Push1).emit(OpCode::HasKey).emit(OpCode::Swap);
    builder.emit(OpCode::Push1).emit(OpCode::PickItem);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    let heap = engine.reference_counter().heap();
    let stack = engine.result_stack();
    assert_eq!(stack.peek(0).unwrap().get_string(heap).unwrap(), "a");
    assert!(stack.peek(1).unwrap().get_boolean(engine.limits()).unwrap());
}

#[test]
fn test_missing_map_key_faults() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NewMap).emit(OpCode::Push1).emit(OpCode::PickItem);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(fault_kind(&engine), Some(ErrorKind::InvalidOperation));
}

#[test]
fn test_cat_produces_buffer() {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_str("ab").emit_push_str("cd").emit(OpCode::Cat);
    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert!(matches!(engine.result_stack().peek(0).unwrap(), StackItem::Buffer(_)));
    assert_eq!(result_strings(&engine), vec!["abcd"]);
}
