//! Binary serialization of stack items
//!
//! Each item is written as its type tag followed by a payload:
//!
//! | type | payload |
//! |------|---------|
//! | Any (Null) | none |
//! | Boolean | one byte, 0 or 1 |
//! | Integer, ByteString, Buffer | var-int length, then the bytes |
//! | Array, Struct | var-int count, then each element |
//! | Map | var-int count, then key and value of each entry |
//!
//! Var-ints use one byte below 0xFD, otherwise a 0xFD/0xFE/0xFF marker
//! followed by a little-endian u16/u32/u64. A compound may appear only once
//! in a serialized graph, so shared and cyclic structures are rejected.
//! Pointers and interop handles cannot be serialized.

use bytes::{Buf, BufMut, Bytes};
use rustc_hash::FxHashSet;

use super::integer;
use super::ordered_map::PrimitiveKey;
use super::{StackItem, StackItemType};
use crate::heap::Heap;
use crate::limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::{VmError, VmResult};

/// Serialize `item`, failing when the output would exceed `max_size` bytes
/// or the graph holds more than `max_items` items
pub fn serialize(item: &StackItem, heap: &Heap, max_size: usize, max_items: usize) -> VmResult<Vec<u8>> {
    let mut writer = Vec::new();
    let mut serialized = FxHashSet::default();
    let mut pending = vec![item.clone()];
    let mut remaining = max_items;

    while let Some(item) = pending.pop() {
        if remaining == 0 {
            return Err(VmError::invalid_operation(format!(
                "Too many items to serialize: more than {max_items}"
            )));
        }
        remaining -= 1;

        writer.put_u8(item.item_type() as u8);
        match &item {
            StackItem::Null => {}
            StackItem::Boolean(value) => writer.put_u8(u8::from(*value)),
            StackItem::Integer(value) => write_var_bytes(&mut writer, &integer::to_bytes(value)),
            StackItem::ByteString(bytes) => write_var_bytes(&mut writer, bytes),
            StackItem::Buffer(id) => write_var_bytes(&mut writer, heap.buffer(*id)?),
            StackItem::Array(id) | StackItem::Struct(id) => {
                if !serialized.insert(*id) {
                    return Err(shared_reference());
                }
                let items = heap.items(*id)?;
                write_var_int(&mut writer, items.len() as u64);
                pending.extend(items.iter().rev().cloned());
            }
            StackItem::Map(id) => {
                if !serialized.insert(*id) {
                    return Err(shared_reference());
                }
                let entries: Vec<_> = heap.map(*id)?.iter().collect();
                write_var_int(&mut writer, entries.len() as u64);
                for (key, value) in entries.into_iter().rev() {
                    pending.push(value.clone());
                    pending.push(key.to_item());
                }
            }
            StackItem::Pointer(_) | StackItem::InteropInterface(_) => {
                return Err(VmError::type_error(format!(
                    "{} cannot be serialized",
                    item.item_type()
                )));
            }
        }

        if writer.len() > max_size {
            return Err(VmError::invalid_operation(format!(
                "MaxItemSize exceed: {}/{max_size}",
                writer.len()
            )));
        }
    }
    Ok(writer)
}

/// An item read from the stream, or a compound still waiting for its
/// elements
enum Pending {
    Item(StackItem),
    Compound(StackItemType, usize),
}

/// Deserialize one item allocated in `rc`.
///
/// Byte strings are bounded by `max_item_size`, integers by
/// `max_integer_size` and the item count by `max_stack_size`. The input
/// must contain exactly one item.
pub fn deserialize(
    data: &[u8],
    rc: &mut ReferenceCounter,
    limits: &ExecutionEngineLimits,
) -> VmResult<StackItem> {
    let mut reader = data;
    let mut read = Vec::new();
    let mut undeserialized: usize = 1;

    while undeserialized > 0 {
        undeserialized -= 1;
        let tag = read_u8(&mut reader)?;
        let item_type = StackItemType::from_u8(tag)
            .ok_or_else(|| VmError::format(format!("Invalid stack item type: {tag:#04x}")))?;
        let pending = match item_type {
            StackItemType::Any => Pending::Item(StackItem::Null),
            StackItemType::Boolean => match read_u8(&mut reader)? {
                0 => Pending::Item(StackItem::FALSE),
                1 => Pending::Item(StackItem::TRUE),
                other => return Err(VmError::format(format!("Invalid boolean: {other}"))),
            },
            StackItemType::Integer => {
                let bytes = read_var_bytes(&mut reader, limits.max_integer_size)?;
                Pending::Item(StackItem::Integer(integer::from_bytes(&bytes)))
            }
            StackItemType::ByteString => {
                Pending::Item(StackItem::ByteString(read_var_bytes(&mut reader, limits.max_item_size)?))
            }
            StackItemType::Buffer => {
                let bytes = read_var_bytes(&mut reader, limits.max_item_size)?;
                Pending::Item(rc.new_buffer(bytes.to_vec()))
            }
            StackItemType::Array | StackItemType::Struct => {
                let count = read_count(&mut reader, limits.max_stack_size)?;
                undeserialized += count;
                Pending::Compound(item_type, count)
            }
            StackItemType::Map => {
                let count = read_count(&mut reader, limits.max_stack_size)?;
                undeserialized += count * 2;
                Pending::Compound(item_type, count)
            }
            StackItemType::Pointer | StackItemType::InteropInterface => {
                return Err(VmError::format(format!("{item_type} cannot be deserialized")));
            }
        };
        read.push(pending);
        if read.len() > limits.max_stack_size {
            return Err(VmError::format(format!(
                "Too many items to deserialize: more than {}",
                limits.max_stack_size
            )));
        }
    }
    if reader.has_remaining() {
        return Err(VmError::format(format!("{} trailing bytes", reader.remaining())));
    }

    // Rebuild compounds from the end: a compound's elements follow it in
    // the stream and are already assembled when it is reached.
    let mut assembled: Vec<StackItem> = Vec::new();
    while let Some(pending) = read.pop() {
        let item = match pending {
            Pending::Item(item) => item,
            Pending::Compound(StackItemType::Map, count) => {
                let map = rc.new_map();
                let id = map
                    .object_id()
                    .ok_or_else(|| VmError::invalid_operation("Map has no heap object"))?;
                for _ in 0..count {
                    let key = pop_assembled(&mut assembled)?;
                    let value = pop_assembled(&mut assembled)?;
                    let key = PrimitiveKey::from_item(&key)
                        .map_err(|e| VmError::format(e.message().to_string()))?;
                    rc.map_insert(id, key, value)?;
                }
                map
            }
            Pending::Compound(item_type, count) => {
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(pop_assembled(&mut assembled)?);
                }
                if item_type == StackItemType::Struct {
                    rc.new_struct(items)
                } else {
                    rc.new_array(items)
                }
            }
        };
        assembled.push(item);
    }
    pop_assembled(&mut assembled)
}

fn shared_reference() -> VmError {
    VmError::invalid_operation("A compound item is referenced more than once")
}

fn pop_assembled(assembled: &mut Vec<StackItem>) -> VmResult<StackItem> {
    assembled.pop().ok_or_else(|| VmError::format("Missing compound element"))
}

fn write_var_int(writer: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        writer.put_u8(value as u8);
    } else if value <= 0xFFFF {
        writer.put_u8(0xFD);
        writer.put_u16_le(value as u16);
    } else if value <= 0xFFFF_FFFF {
        writer.put_u8(0xFE);
        writer.put_u32_le(value as u32);
    } else {
        writer.put_u8(0xFF);
        writer.put_u64_le(value);
    }
}

fn write_var_bytes(writer: &mut Vec<u8>, bytes: &[u8]) {
    write_var_int(writer, bytes.len() as u64);
    writer.put_slice(bytes);
}

fn ensure(reader: &[u8], size: usize) -> VmResult<()> {
    if reader.remaining() < size {
        return Err(VmError::format("Unexpected end of data"));
    }
    Ok(())
}

fn read_u8(reader: &mut &[u8]) -> VmResult<u8> {
    ensure(reader, 1)?;
    Ok(reader.get_u8())
}

fn read_var_int(reader: &mut &[u8], max: u64) -> VmResult<u64> {
    let value = match read_u8(reader)? {
        0xFD => {
            ensure(reader, 2)?;
            reader.get_u16_le() as u64
        }
        0xFE => {
            ensure(reader, 4)?;
            reader.get_u32_le() as u64
        }
        0xFF => {
            ensure(reader, 8)?;
            reader.get_u64_le()
        }
        small => small as u64,
    };
    if value > max {
        return Err(VmError::format(format!("Length {value} exceeds the limit of {max}")));
    }
    Ok(value)
}

fn read_count(reader: &mut &[u8], max: usize) -> VmResult<usize> {
    Ok(read_var_int(reader, max as u64)? as usize)
}

fn read_var_bytes(reader: &mut &[u8], max: usize) -> VmResult<Bytes> {
    let length = read_count(reader, max)?;
    ensure(reader, length)?;
    Ok(reader.copy_to_bytes(length))
}
