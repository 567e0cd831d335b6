//! Reference counting and cyclic object graphs
//!
//! The reference total must match what is reachable from the stacks after
//! execution, cycles must be reclaimed, and every recursive operation on a
//! self-referential compound must terminate.

use std::sync::Arc;

use neovm::stack_item::serializer;
use neovm::{
    ErrorKind, ExecutionEngine, ExecutionEngineLimits, LoadOptions, OpCode, ReferenceCounter,
    ScriptBuilder, StackItem, VmState,
};

fn run_with(builder: &ScriptBuilder, limits: ExecutionEngineLimits) -> ExecutionEngine {
    let mut engine = ExecutionEngine::with_limits(limits);
    let script = Arc::new(builder.to_script(true).unwrap());
    engine.load_script(script, LoadOptions::default()).unwrap();
    engine.execute();
    engine
}

fn run(builder: &ScriptBuilder) -> ExecutionEngine {
    run_with(builder, ExecutionEngineLimits::default())
}

#[test]
fn test_count_matches_reachable_items() {
    // [2, 1] stays on the stack, the empty array is dropped
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Push2).emit(OpCode::Push2).emit(OpCode::Pack);
    builder.emit(OpCode::NewArray0).emit(OpCode::Drop).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.result_stack().len(), 1);
    // One stack reference plus two element references
    assert_eq!(engine.reference_counter().count(), 3);
    assert_eq!(engine.reference_counter().tracked_objects(), 1);
}

#[test]
fn test_primitives_count_once_per_position() {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::Push1).emit(OpCode::Dup).emit(OpCode::Dup).emit(OpCode::Drop);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.reference_counter().count(), 2);
    assert_eq!(engine.reference_counter().tracked_objects(), 0);
}

#[test]
fn test_self_referential_array_is_reclaimed() {
    // a = []; a.append(a); drop a
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NewArray0).emit(OpCode::Dup).emit(OpCode::Dup).emit(OpCode::Append);
    builder.emit(OpCode::Drop).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.reference_counter().count(), 0);
    assert_eq!(engine.reference_counter().tracked_objects(), 0);
    assert!(engine.reference_counter().stats().objects_freed >= 1);
}

#[test]
fn test_mutual_cycle_is_reclaimed() {
    // a = []; b = [a]; a.append(b); drop both
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NewArray0); // a
    builder.emit(OpCode::Dup).emit(OpCode::Push1).emit(OpCode::Pack); // a, b
    builder.emit(OpCode::Append); // a.append(b)
    builder.emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert_eq!(engine.reference_counter().tracked_objects(), 0);
    assert_eq!(engine.reference_counter().count(), 0);
}

#[test]
fn test_slot_references_keep_objects_alive() {
    // The array survives in a local while the stack is empty, then is returned
    let mut builder = ScriptBuilder::new();
    builder.emit_with(OpCode::InitSlot, &[1, 0]);
    builder.emit(OpCode::NewArray0).emit(OpCode::StLoc0);
    builder.emit(OpCode::Push1).emit(OpCode::Drop);
    builder.emit(OpCode::LdLoc0).emit(OpCode::Ret);

    let engine = run(&builder);
    assert_eq!(engine.state(), VmState::Halt);
    assert!(matches!(engine.result_stack().peek(0).unwrap(), StackItem::Array(_)));
    assert_eq!(engine.reference_counter().tracked_objects(), 1);
    // The local slot was released when the context unloaded
    assert_eq!(engine.reference_counter().count(), 1);
}

#[test]
fn test_reference_limit_cannot_be_caught() {
    // 0: TRY +10, 0 ; 3: PUSH0 x3 ; 6: PUSH3 ; 7: PACK ; 8: DUP ; 9: RET ; 10: (catch) RET
    let mut builder = ScriptBuilder::new();
    builder.emit_try(10, 0);
    builder.emit(OpCode::Push0).emit(OpCode::Push0).emit(OpCode::Push0).emit(OpCode::Push3);
    builder.emit(OpCode::Pack).emit(OpCode::Dup).emit(OpCode::Ret);
    builder.emit(OpCode::Ret);

    let limits = ExecutionEngineLimits { max_stack_size: 4, ..Default::default() };
    let engine = run_with(&builder, limits);
    assert_eq!(engine.state(), VmState::Fault);
    assert_eq!(engine.fault_error().map(|e| e.kind()), Some(ErrorKind::InvalidOperation));
}

// ============================================================================
// Recursive operations on cycles
// ============================================================================

fn self_referential_array(rc: &mut ReferenceCounter) -> StackItem {
    let array = rc.new_array(Vec::new());
    let id = array.object_id().unwrap();
    rc.append(id, array.clone()).unwrap();
    array
}

#[test]
fn test_serializing_a_cycle_fails() {
    let mut rc = ReferenceCounter::new();
    let array = self_referential_array(&mut rc);
    let result = serializer::serialize(&array, rc.heap(), 1024, 2048);
    assert!(result.is_err());
}

#[test]
fn test_deep_copy_preserves_cycle() {
    let limits = ExecutionEngineLimits::default();
    let mut rc = ReferenceCounter::new();
    let array = self_referential_array(&mut rc);

    let copy = array.deep_copy(&mut rc, false, &limits).unwrap();
    let copy_id = copy.object_id().unwrap();
    assert_ne!(Some(copy_id), array.object_id());
    let items = rc.heap().items(copy_id).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].object_id(), Some(copy_id));
    assert!(rc.is_read_only(copy_id).unwrap());
}

#[test]
fn test_array_equality_is_identity() {
    let limits = ExecutionEngineLimits::default();
    let mut rc = ReferenceCounter::new();
    let a = self_referential_array(&mut rc);
    let b = self_referential_array(&mut rc);
    assert!(a.equals(&a, rc.heap(), &limits).unwrap());
    assert!(!a.equals(&b, rc.heap(), &limits).unwrap());
}

#[test]
fn test_cyclic_struct_comparison_is_bounded() {
    let limits = ExecutionEngineLimits::default();
    let mut rc = ReferenceCounter::new();
    let mut cyclic_struct = || {
        let item = rc.new_struct(Vec::new());
        let id = item.object_id().unwrap();
        rc.append(id, item.clone()).unwrap();
        item
    };
    let a = cyclic_struct();
    let b = cyclic_struct();

    let error = a.equals(&b, rc.heap(), &limits).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_deep_nesting_is_bounded() {
    let limits = ExecutionEngineLimits { max_nesting_depth: 8, ..Default::default() };
    let mut rc = ReferenceCounter::new();
    let mut item = rc.new_array(Vec::new());
    for _ in 0..16 {
        item = rc.new_array(vec![item]);
    }
    assert!(item.deep_copy(&mut rc, false, &limits).is_err());
}
