//! Property tests for integer encoding and instruction decoding

use std::sync::Arc;

use num_bigint::BigInt;
use proptest::prelude::*;

use neovm::stack_item::{integer, serializer};
use neovm::{
    ExecutionEngine, ExecutionEngineLimits, LoadOptions, OpCode, ReferenceCounter, Script,
    ScriptBuilder, StackItem, StackItemType, VmState,
};

proptest! {
    #[test]
    fn integer_bytes_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..=32)) {
        let value = integer::from_bytes(&bytes);
        let encoded = integer::to_bytes(&value);
        prop_assert!(encoded.len() <= bytes.len());
        prop_assert_eq!(integer::from_bytes(&encoded), value);
    }

    #[test]
    fn integer_converts_through_byte_string(value in any::<i128>()) {
        let expected = BigInt::from(value);
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bigint(&expected).unwrap();
        builder.emit_with(OpCode::Convert, &[StackItemType::ByteString as u8]);
        builder.emit_with(OpCode::Convert, &[StackItemType::Integer as u8]);

        let mut engine = ExecutionEngine::new();
        let script = Arc::new(builder.to_script(true).unwrap());
        engine.load_script(script, LoadOptions::default()).unwrap();
        prop_assert_eq!(engine.execute(), VmState::Halt);

        let stack = engine.result_stack();
        let item = stack.peek(0).unwrap();
        prop_assert!(matches!(item, StackItem::Integer(v) if *v == expected));
    }

    #[test]
    fn integer_serialization_round_trip(value in any::<i64>()) {
        let limits = ExecutionEngineLimits::default();
        let mut rc = ReferenceCounter::new();
        let item = StackItem::Integer(BigInt::from(value));
        let data = serializer::serialize(&item, rc.heap(), limits.max_item_size, limits.max_stack_size).unwrap();
        let decoded = serializer::deserialize(&data, &mut rc, &limits).unwrap();
        prop_assert!(matches!(decoded, StackItem::Integer(v) if v == BigInt::from(value)));
    }

    #[test]
    fn decoding_is_idempotent(
        bytes in prop::collection::vec(any::<u8>(), 1..64),
        offset in 0usize..64,
    ) {
        let position = offset % bytes.len();
        let script = Script::new(bytes, false).unwrap();
        let first = script.get_instruction(position);
        let second = script.get_instruction(position);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn arbitrary_scripts_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..48)) {
        let limits = ExecutionEngineLimits {
            max_invocation_stack_size: 16,
            ..Default::default()
        };
        let mut engine = ExecutionEngine::with_limits(limits);
        let script = Arc::new(Script::new(bytes, false).unwrap());
        engine.load_script(script, LoadOptions::default()).unwrap();

        // Bounded stepping: loops in random bytecode would otherwise spin
        for _ in 0..256 {
            if engine.state() != VmState::None {
                break;
            }
            engine.execute_next(&mut ());
        }
        prop_assert_ne!(engine.state(), VmState::Break);
    }
}
