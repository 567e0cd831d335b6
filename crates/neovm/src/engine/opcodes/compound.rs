//! Array, struct, map and buffer element operations
//!
//! Structs have value semantics: a struct stored into a compound by PACK*,
//! APPEND, SETITEM or VALUES is cloned first.

use num_traits::Signed;

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::stack_item::ordered_map::PrimitiveKey;
use crate::stack_item::{clone_struct, StackItem, StackItemType};
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_compound_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        match instruction.opcode {
            OpCode::PackMap => {
                let size = self.pop_index()?;
                let depth = self.with_stack(|stack, _| Ok(stack.len()))?;
                if size.saturating_mul(2) > depth {
                    return Err(out_of_range(size));
                }
                let map = self.reference_counter.new_map();
                let id = object_id(&map)?;
                for _ in 0..size {
                    let key = PrimitiveKey::from_item(&self.pop()?)?;
                    let value = self.pop()?;
                    let value = self.storable(value)?;
                    self.reference_counter.map_insert(id, key, value)?;
                }
                self.push(map)
            }
            OpCode::PackStruct | OpCode::Pack => {
                let size = self.pop_index()?;
                let items = self.pop_items(size)?;
                let packed = if instruction.opcode == OpCode::Pack {
                    self.reference_counter.new_array(items)
                } else {
                    self.reference_counter.new_struct(items)
                };
                self.push(packed)
            }
            OpCode::Unpack => {
                let compound = self.pop()?;
                let heap = self.reference_counter.heap();
                let flattened: Vec<StackItem> = match &compound {
                    StackItem::Map(id) => {
                        let entries: Vec<_> = heap.map(*id)?.iter().collect();
                        entries
                            .into_iter()
                            .rev()
                            .flat_map(|(key, value)| [value.clone(), key.to_item()])
                            .collect()
                    }
                    StackItem::Array(id) | StackItem::Struct(id) => {
                        heap.items(*id)?.iter().rev().cloned().collect()
                    }
                    other => {
                        return Err(VmError::type_error(format!(
                            "Invalid type for UNPACK: {}",
                            other.item_type()
                        )))
                    }
                };
                let count = compound.size(heap)?;
                for item in flattened {
                    self.push(item)?;
                }
                self.push(StackItem::from(count))
            }
            OpCode::NewArray0 => {
                let array = self.reference_counter.new_array(Vec::new());
                self.push(array)
            }
            OpCode::NewArray | OpCode::NewArrayT => {
                let n = self.pop_new_size()?;
                let fill = if instruction.opcode == OpCode::NewArrayT {
                    let tag = instruction.token_u8();
                    let item_type = StackItemType::from_u8(tag).ok_or_else(|| {
                        VmError::invalid_operation(format!(
                            "Invalid type for NEWARRAY_T: {tag:#04x}"
                        ))
                    })?;
                    default_item(item_type)
                } else {
                    StackItem::Null
                };
                let array = self.reference_counter.new_array(vec![fill; n]);
                self.push(array)
            }
            OpCode::NewStruct0 => {
                let item = self.reference_counter.new_struct(Vec::new());
                self.push(item)
            }
            OpCode::NewStruct => {
                let n = self.pop_new_size()?;
                let item = self.reference_counter.new_struct(vec![StackItem::Null; n]);
                self.push(item)
            }
            OpCode::NewMap => {
                let map = self.reference_counter.new_map();
                self.push(map)
            }
            OpCode::Size => {
                let x = self.pop()?;
                let size = x.size(self.reference_counter.heap())?;
                self.push(StackItem::from(size))
            }
            OpCode::HasKey => {
                let key = self.pop()?;
                let x = self.pop()?;
                let found = match &x {
                    StackItem::Map(id) => {
                        let key = PrimitiveKey::from_item(&key)?;
                        self.reference_counter.heap().map(*id)?.contains_key(&key)
                    }
                    StackItem::Array(_)
                    | StackItem::Struct(_)
                    | StackItem::Buffer(_)
                    | StackItem::ByteString(_) => {
                        let index = self.key_integer(&key)?;
                        if index.is_negative() {
                            return Err(VmError::invalid_operation(format!(
                                "The negative value {index} is invalid for OpCode HASKEY"
                            )));
                        }
                        let len = x.size(self.reference_counter.heap())?;
                        usize::try_from(&index).is_ok_and(|index| index < len)
                    }
                    other => {
                        return Err(VmError::type_error(format!(
                            "Invalid type for HASKEY: {}",
                            other.item_type()
                        )))
                    }
                };
                self.push_boolean(found)
            }
            OpCode::Keys => {
                let x = self.pop()?;
                let StackItem::Map(id) = x else {
                    return Err(VmError::type_error(format!(
                        "Invalid type for KEYS: {}",
                        x.item_type()
                    )));
                };
                let keys: Vec<StackItem> =
                    self.reference_counter.heap().map(id)?.keys().map(PrimitiveKey::to_item).collect();
                let array = self.reference_counter.new_array(keys);
                self.push(array)
            }
            OpCode::Values => {
                let x = self.pop()?;
                let heap = self.reference_counter.heap();
                let values: Vec<StackItem> = match x {
                    StackItem::Array(id) | StackItem::Struct(id) => heap.items(id)?.to_vec(),
                    StackItem::Map(id) => heap.map(id)?.values().cloned().collect(),
                    other => {
                        return Err(VmError::type_error(format!(
                            "Invalid type for VALUES: {}",
                            other.item_type()
                        )))
                    }
                };
                let mut copies = Vec::with_capacity(values.len());
                for value in values {
                    copies.push(self.storable(value)?);
                }
                let array = self.reference_counter.new_array(copies);
                self.push(array)
            }
            OpCode::PickItem => {
                let key = self.pop()?;
                let x = self.pop()?;
                let heap = self.reference_counter.heap();
                let item = match &x {
                    StackItem::Array(id) | StackItem::Struct(id) => {
                        let index = self.key_index(&key)?;
                        heap.items(*id)?.get(index).cloned().ok_or_else(|| out_of_range(index))?
                    }
                    StackItem::Map(id) => {
                        let key = PrimitiveKey::from_item(&key)?;
                        heap.map(*id)?.get(&key).cloned().ok_or_else(|| {
                            VmError::invalid_operation(format!("Key not found in Map: {key:?}"))
                        })?
                    }
                    StackItem::Boolean(_)
                    | StackItem::Integer(_)
                    | StackItem::ByteString(_)
                    | StackItem::Buffer(_) => {
                        let index = self.key_index(&key)?;
                        let bytes = x.get_span(heap)?;
                        let byte = bytes.get(index).copied().ok_or_else(|| out_of_range(index))?;
                        StackItem::from(byte)
                    }
                    other => {
                        return Err(VmError::type_error(format!(
                            "Invalid type for PICKITEM: {}",
                            other.item_type()
                        )))
                    }
                };
                self.push(item)
            }
            OpCode::Append => {
                let item = self.pop()?;
                let item = self.storable(item)?;
                match self.pop()? {
                    StackItem::Array(id) | StackItem::Struct(id) => {
                        self.reference_counter.append(id, item)
                    }
                    other => Err(VmError::type_error(format!(
                        "Invalid type for APPEND: {}",
                        other.item_type()
                    ))),
                }
            }
            OpCode::SetItem => {
                let value = self.pop()?;
                let value = self.storable(value)?;
                let key = self.pop()?;
                match self.pop()? {
                    StackItem::Array(id) | StackItem::Struct(id) => {
                        let index = self.key_index(&key)?;
                        self.reference_counter.set_item(id, index, value)
                    }
                    StackItem::Map(id) => {
                        let key = PrimitiveKey::from_item(&key)?;
                        self.reference_counter.map_insert(id, key, value)
                    }
                    StackItem::Buffer(id) => {
                        let index = self.key_index(&key)?;
                        let value = value.get_integer(self.reference_counter.heap(), &self.limits)?;
                        let byte = i16::try_from(&value)
                            .ok()
                            .filter(|v| (-128..=255).contains(v))
                            .ok_or_else(|| {
                                VmError::invalid_operation(format!("Overflow in SETITEM: {value}"))
                            })?;
                        let buffer = self.reference_counter.buffer_mut(id)?;
                        let slot = buffer.get_mut(index).ok_or_else(|| out_of_range(index))?;
                        *slot = byte as u8;
                        Ok(())
                    }
                    other => Err(VmError::type_error(format!(
                        "Invalid type for SETITEM: {}",
                        other.item_type()
                    ))),
                }
            }
            OpCode::ReverseItems => match self.pop()? {
                StackItem::Array(id) | StackItem::Struct(id) | StackItem::Buffer(id) => {
                    self.reference_counter.reverse_items(id)
                }
                other => Err(VmError::type_error(format!(
                    "Invalid type for REVERSEITEMS: {}",
                    other.item_type()
                ))),
            },
            OpCode::Remove => {
                let key = self.pop()?;
                match self.pop()? {
                    StackItem::Array(id) | StackItem::Struct(id) => {
                        let index = self.key_index(&key)?;
                        self.reference_counter.remove_at(id, index).map(drop)
                    }
                    StackItem::Map(id) => {
                        let key = PrimitiveKey::from_item(&key)?;
                        self.reference_counter.map_remove(id, &key).map(drop)
                    }
                    other => Err(VmError::type_error(format!(
                        "Invalid type for REMOVE: {}",
                        other.item_type()
                    ))),
                }
            }
            OpCode::ClearItems => match self.pop()? {
                StackItem::Array(id) | StackItem::Struct(id) | StackItem::Map(id) => {
                    self.reference_counter.clear_items(id)
                }
                other => Err(VmError::type_error(format!(
                    "Invalid type for CLEARITEMS: {}",
                    other.item_type()
                ))),
            },
            OpCode::PopItem => match self.pop()? {
                StackItem::Array(id) | StackItem::Struct(id) => {
                    let item = self.reference_counter.pop_item(id)?;
                    self.push(item)
                }
                other => Err(VmError::type_error(format!(
                    "Invalid type for POPITEM: {}",
                    other.item_type()
                ))),
            },
            _ => Err(unexpected(instruction)),
        }
    }

    /// Pop `count` items to pack; the first popped becomes element 0
    fn pop_items(&mut self, count: usize) -> VmResult<Vec<StackItem>> {
        let depth = self.with_stack(|stack, _| Ok(stack.len()))?;
        if count > depth {
            return Err(out_of_range(count));
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let item = self.pop()?;
            items.push(self.storable(item)?);
        }
        Ok(items)
    }

    /// Element count for NEWARRAY and NEWSTRUCT
    fn pop_new_size(&mut self) -> VmResult<usize> {
        let n = self.pop_index()?;
        if n > self.limits.max_stack_size {
            return Err(VmError::invalid_operation(format!("MaxStackSize exceed: {n}")));
        }
        Ok(n)
    }

    /// Value to store into a compound: structs are cloned
    fn storable(&mut self, item: StackItem) -> VmResult<StackItem> {
        match item {
            StackItem::Struct(id) => clone_struct(&mut self.reference_counter, id, &self.limits),
            other => Ok(other),
        }
    }

    fn key_integer(&self, key: &StackItem) -> VmResult<num_bigint::BigInt> {
        key.get_integer(self.reference_counter.heap(), &self.limits)
    }

    /// Element index from a key item
    fn key_index(&self, key: &StackItem) -> VmResult<usize> {
        let value = self.key_integer(key)?;
        i32::try_from(&value)
            .ok()
            .and_then(|index| usize::try_from(index).ok())
            .ok_or_else(|| VmError::invalid_operation(format!("The value {value} is out of range.")))
    }
}

fn object_id(item: &StackItem) -> VmResult<crate::heap::ObjectId> {
    item.object_id()
        .ok_or_else(|| VmError::invalid_operation("Compound item has no heap object"))
}

fn default_item(item_type: StackItemType) -> StackItem {
    match item_type {
        StackItemType::Boolean => StackItem::FALSE,
        StackItemType::Integer => StackItem::from(0),
        StackItemType::ByteString => StackItem::byte_string(bytes::Bytes::new()),
        _ => StackItem::Null,
    }
}

fn out_of_range(value: usize) -> VmError {
    VmError::invalid_operation(format!("The value {value} is out of range."))
}
