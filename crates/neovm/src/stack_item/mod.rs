//! Stack item model
//!
//! [`StackItem`] is the value type of the VM. Primitive variants (Boolean,
//! Integer, ByteString) are held inline; buffers and compound items live in
//! the engine's [`Heap`] and are referenced by [`ObjectId`], which gives
//! arrays and maps their reference semantics and lets cycles exist without
//! `Rc` loops.

pub mod integer;
pub mod ordered_map;
pub mod serializer;

mod copy;
mod equality;

pub(crate) use copy::clone_struct;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::heap::{Heap, ObjectId};
use crate::limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::{VmError, VmResult};

/// Type tag of a stack item, as encoded in NEWARRAY_T, ISTYPE, CONVERT and
/// the binary serializer
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackItemType {
    /// Matches nothing; Null serializes with this tag
    Any = 0x00,
    /// Script position
    Pointer = 0x10,
    /// Boolean
    Boolean = 0x20,
    /// Bounded integer
    Integer = 0x21,
    /// Immutable bytes
    ByteString = 0x28,
    /// Mutable bytes
    Buffer = 0x30,
    /// Array
    Array = 0x40,
    /// Struct
    Struct = 0x41,
    /// Map
    Map = 0x48,
    /// Host object handle
    InteropInterface = 0x60,
}

impl StackItemType {
    /// Decode a type tag
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(StackItemType::Any),
            0x10 => Some(StackItemType::Pointer),
            0x20 => Some(StackItemType::Boolean),
            0x21 => Some(StackItemType::Integer),
            0x28 => Some(StackItemType::ByteString),
            0x30 => Some(StackItemType::Buffer),
            0x40 => Some(StackItemType::Array),
            0x41 => Some(StackItemType::Struct),
            0x48 => Some(StackItemType::Map),
            0x60 => Some(StackItemType::InteropInterface),
            _ => None,
        }
    }

    /// Check if values of this type are held inline and compared by value
    pub fn is_primitive(self) -> bool {
        matches!(self, StackItemType::Boolean | StackItemType::Integer | StackItemType::ByteString)
    }

    /// Check if values of this type contain other items
    pub fn is_compound(self) -> bool {
        matches!(self, StackItemType::Array | StackItemType::Struct | StackItemType::Map)
    }
}

impl fmt::Display for StackItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackItemType::Any => "Any",
            StackItemType::Pointer => "Pointer",
            StackItemType::Boolean => "Boolean",
            StackItemType::Integer => "Integer",
            StackItemType::ByteString => "ByteString",
            StackItemType::Buffer => "Buffer",
            StackItemType::Array => "Array",
            StackItemType::Struct => "Struct",
            StackItemType::Map => "Map",
            StackItemType::InteropInterface => "InteropInterface",
        };
        f.write_str(name)
    }
}

/// Position inside a script
#[derive(Clone)]
pub struct Pointer {
    script: Arc<Script>,
    position: usize,
}

impl Pointer {
    /// Create a pointer to `position` in `script`
    pub fn new(script: Arc<Script>, position: usize) -> Self {
        Self { script, position }
    }

    /// Script the pointer refers into
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    /// Byte offset
    pub fn position(&self) -> usize {
        self.position
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.script, &other.script) && self.position == other.position
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("script_len", &self.script.len())
            .field("position", &self.position)
            .finish()
    }
}

/// Opaque handle to an object owned by the embedding layer
#[derive(Clone)]
pub struct InteropInterface(Arc<dyn Any + Send + Sync>);

impl InteropInterface {
    /// Wrap a host value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the wrapped value if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Reference identity
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for InteropInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InteropInterface")
    }
}

/// A value on the evaluation stack or in a slot
#[derive(Debug, Clone)]
pub enum StackItem {
    /// Absence of a value
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer bounded by `max_integer_size`
    Integer(BigInt),
    /// Immutable bytes
    ByteString(Bytes),
    /// Mutable bytes stored in the heap
    Buffer(ObjectId),
    /// Array stored in the heap
    Array(ObjectId),
    /// Struct stored in the heap
    Struct(ObjectId),
    /// Map stored in the heap
    Map(ObjectId),
    /// Script position
    Pointer(Pointer),
    /// Host object handle
    InteropInterface(InteropInterface),
}

impl Default for StackItem {
    fn default() -> Self {
        StackItem::Null
    }
}

impl StackItem {
    /// The Boolean `true`
    pub const TRUE: StackItem = StackItem::Boolean(true);
    /// The Boolean `false`
    pub const FALSE: StackItem = StackItem::Boolean(false);

    /// Type tag of this item
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    /// Check if this is Null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Heap handle for buffers and compounds
    #[inline]
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            StackItem::Buffer(id)
            | StackItem::Array(id)
            | StackItem::Struct(id)
            | StackItem::Map(id) => Some(*id),
            _ => None,
        }
    }

    /// Build a ByteString
    pub fn byte_string(bytes: impl Into<Bytes>) -> Self {
        StackItem::ByteString(bytes.into())
    }

    /// Truth value of this item.
    ///
    /// Null is false, numbers and bytes are true when not all zero, and every
    /// reference type is true. A ByteString longer than `max_integer_size`
    /// cannot be interpreted.
    pub fn get_boolean(&self, limits: &ExecutionEngineLimits) -> VmResult<bool> {
        match self {
            StackItem::Null => Ok(false),
            StackItem::Boolean(value) => Ok(*value),
            StackItem::Integer(value) => Ok(!value.is_zero()),
            StackItem::ByteString(bytes) => {
                if bytes.len() > limits.max_integer_size {
                    return Err(VmError::type_error(format!(
                        "Cannot convert a ByteString of {} bytes to Boolean",
                        bytes.len()
                    )));
                }
                Ok(bytes.iter().any(|&b| b != 0))
            }
            _ => Ok(true),
        }
    }

    /// Integer value of this item
    pub fn get_integer(&self, heap: &Heap, limits: &ExecutionEngineLimits) -> VmResult<BigInt> {
        match self {
            StackItem::Boolean(value) => {
                Ok(if *value { BigInt::one() } else { BigInt::zero() })
            }
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::ByteString(bytes) => bytes_to_integer(bytes, limits),
            StackItem::Buffer(id) => bytes_to_integer(heap.buffer(*id)?, limits),
            other => Err(VmError::type_error(format!(
                "Cannot convert {} to Integer",
                other.item_type()
            ))),
        }
    }

    /// Byte representation of a primitive or buffer
    pub fn get_span(&self, heap: &Heap) -> VmResult<Bytes> {
        match self {
            StackItem::Boolean(value) => {
                Ok(Bytes::from_static(if *value { &[1] } else { &[0] }))
            }
            StackItem::Integer(value) => Ok(Bytes::from(integer::to_bytes(value))),
            StackItem::ByteString(bytes) => Ok(bytes.clone()),
            StackItem::Buffer(id) => Ok(Bytes::copy_from_slice(heap.buffer(*id)?)),
            other => Err(VmError::type_error(format!(
                "Cannot convert {} to bytes",
                other.item_type()
            ))),
        }
    }

    /// UTF-8 text of a primitive or buffer
    pub fn get_string(&self, heap: &Heap) -> VmResult<String> {
        let bytes = self.get_span(heap)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| VmError::type_error("Byte sequence is not valid UTF-8"))
    }

    /// Size reported by SIZE: byte length for primitives and buffers,
    /// element count for compounds
    pub fn size(&self, heap: &Heap) -> VmResult<usize> {
        match self {
            StackItem::Boolean(_) => Ok(1),
            StackItem::Integer(value) => Ok(integer::encoded_len(value)),
            StackItem::ByteString(bytes) => Ok(bytes.len()),
            StackItem::Buffer(id) => Ok(heap.buffer(*id)?.len()),
            StackItem::Array(id) | StackItem::Struct(id) => Ok(heap.items(*id)?.len()),
            StackItem::Map(id) => Ok(heap.map(*id)?.len()),
            other => Err(VmError::type_error(format!("{} has no size", other.item_type()))),
        }
    }

    /// Convert to another type following the CONVERT rules.
    ///
    /// Converting to the item's own type returns the item itself.
    pub fn convert_to(
        &self,
        target: StackItemType,
        rc: &mut ReferenceCounter,
        limits: &ExecutionEngineLimits,
    ) -> VmResult<StackItem> {
        if target == self.item_type() {
            return Ok(self.clone());
        }
        let invalid = || {
            VmError::type_error(format!("Cannot convert {} to {}", self.item_type(), target))
        };
        match self {
            StackItem::Null => {
                if target == StackItemType::Any {
                    return Err(invalid());
                }
                Ok(StackItem::Null)
            }
            StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_) => {
                match target {
                    StackItemType::Boolean => Ok(StackItem::Boolean(self.get_boolean(limits)?)),
                    StackItemType::Integer => {
                        Ok(StackItem::Integer(self.get_integer(rc.heap(), limits)?))
                    }
                    StackItemType::ByteString => {
                        Ok(StackItem::ByteString(self.get_span(rc.heap())?))
                    }
                    StackItemType::Buffer => {
                        let bytes = self.get_span(rc.heap())?;
                        limits.assert_max_item_size(bytes.len())?;
                        Ok(rc.new_buffer(bytes.to_vec()))
                    }
                    _ => Err(invalid()),
                }
            }
            StackItem::Buffer(id) => match target {
                StackItemType::Boolean => Ok(StackItem::Boolean(true)),
                StackItemType::Integer => {
                    Ok(StackItem::Integer(bytes_to_integer(rc.heap().buffer(*id)?, limits)?))
                }
                StackItemType::ByteString => {
                    Ok(StackItem::ByteString(Bytes::copy_from_slice(rc.heap().buffer(*id)?)))
                }
                _ => Err(invalid()),
            },
            StackItem::Array(id) | StackItem::Struct(id) => match target {
                StackItemType::Boolean => Ok(StackItem::Boolean(true)),
                StackItemType::Array => {
                    let items = rc.heap().items(*id)?.to_vec();
                    Ok(rc.new_array(items))
                }
                StackItemType::Struct => {
                    let items = rc.heap().items(*id)?.to_vec();
                    Ok(rc.new_struct(items))
                }
                _ => Err(invalid()),
            },
            StackItem::Map(_) | StackItem::Pointer(_) | StackItem::InteropInterface(_) => {
                match target {
                    StackItemType::Boolean => Ok(StackItem::Boolean(true)),
                    _ => Err(invalid()),
                }
            }
        }
    }
}

fn bytes_to_integer(bytes: &[u8], limits: &ExecutionEngineLimits) -> VmResult<BigInt> {
    if bytes.len() > limits.max_integer_size {
        return Err(VmError::type_error(format!(
            "Cannot convert {} bytes to Integer: max size is {}",
            bytes.len(),
            limits.max_integer_size
        )));
    }
    Ok(integer::from_bytes(bytes))
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        StackItem::Boolean(value)
    }
}

impl From<BigInt> for StackItem {
    fn from(value: BigInt) -> Self {
        StackItem::Integer(value)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for StackItem {
                fn from(value: $ty) -> Self {
                    StackItem::Integer(BigInt::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, usize, isize);

impl From<Bytes> for StackItem {
    fn from(value: Bytes) -> Self {
        StackItem::ByteString(value)
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        StackItem::ByteString(Bytes::from(value))
    }
}

impl From<&[u8]> for StackItem {
    fn from(value: &[u8]) -> Self {
        StackItem::ByteString(Bytes::copy_from_slice(value))
    }
}

impl From<&str> for StackItem {
    fn from(value: &str) -> Self {
        StackItem::ByteString(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<InteropInterface> for StackItem {
    fn from(value: InteropInterface) -> Self {
        StackItem::InteropInterface(value)
    }
}

impl From<Pointer> for StackItem {
    fn from(value: Pointer) -> Self {
        StackItem::Pointer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ExecutionEngineLimits {
        ExecutionEngineLimits::default()
    }

    #[test]
    fn test_boolean_truth_table() {
        let limits = limits();
        assert!(!StackItem::Null.get_boolean(&limits).unwrap());
        assert!(!StackItem::from(0).get_boolean(&limits).unwrap());
        assert!(StackItem::from(-5).get_boolean(&limits).unwrap());
        assert!(!StackItem::from(vec![0u8, 0, 0]).get_boolean(&limits).unwrap());
        assert!(StackItem::from(vec![0u8, 1]).get_boolean(&limits).unwrap());
        assert!(StackItem::from(vec![1u8; 33]).get_boolean(&limits).is_err());
    }

    #[test]
    fn test_integer_from_primitives() {
        let rc = ReferenceCounter::new();
        let limits = limits();
        assert_eq!(StackItem::TRUE.get_integer(rc.heap(), &limits).unwrap(), BigInt::one());
        assert_eq!(
            StackItem::from(vec![0x80u8, 0x00]).get_integer(rc.heap(), &limits).unwrap(),
            BigInt::from(128)
        );
        assert!(matches!(
            StackItem::Null.get_integer(rc.heap(), &limits),
            Err(VmError::Type(_))
        ));
    }

    #[test]
    fn test_span_of_integer_is_minimal() {
        let rc = ReferenceCounter::new();
        assert!(StackItem::from(0).get_span(rc.heap()).unwrap().is_empty());
        assert_eq!(StackItem::from(-1).get_span(rc.heap()).unwrap().as_ref(), &[0xff]);
    }

    #[test]
    fn test_convert_primitive_to_buffer_and_back() {
        let mut rc = ReferenceCounter::new();
        let limits = limits();
        let buffer = StackItem::from(258)
            .convert_to(StackItemType::Buffer, &mut rc, &limits)
            .unwrap();
        assert_eq!(buffer.item_type(), StackItemType::Buffer);
        assert_eq!(buffer.get_span(rc.heap()).unwrap().as_ref(), &[0x02, 0x01]);

        let back = buffer.convert_to(StackItemType::Integer, &mut rc, &limits).unwrap();
        assert!(matches!(back, StackItem::Integer(v) if v == BigInt::from(258)));
    }

    #[test]
    fn test_convert_rejections() {
        let mut rc = ReferenceCounter::new();
        let limits = limits();
        let map = rc.new_map();
        assert!(map.convert_to(StackItemType::Integer, &mut rc, &limits).is_err());
        assert!(StackItem::Null.convert_to(StackItemType::Any, &mut rc, &limits).is_err());
        assert!(StackItem::Null
            .convert_to(StackItemType::Integer, &mut rc, &limits)
            .unwrap()
            .is_null());
    }

    #[test]
    fn test_convert_array_to_struct_copies() {
        let mut rc = ReferenceCounter::new();
        let limits = limits();
        let array = rc.new_array(vec![StackItem::from(1), StackItem::from(2)]);
        let converted = array.convert_to(StackItemType::Struct, &mut rc, &limits).unwrap();
        assert_eq!(converted.item_type(), StackItemType::Struct);
        assert_ne!(converted.object_id(), array.object_id());
        assert_eq!(converted.size(rc.heap()).unwrap(), 2);
    }

    #[test]
    fn test_type_tags() {
        for tag in [0x00u8, 0x10, 0x20, 0x21, 0x28, 0x30, 0x40, 0x41, 0x48, 0x60] {
            assert_eq!(StackItemType::from_u8(tag).map(|t| t as u8), Some(tag));
        }
        assert_eq!(StackItemType::from_u8(0x22), None);
    }
}
