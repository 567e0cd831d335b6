//! Instruction set
//!
//! One-byte opcodes with fixed byte values. Operands follow the opcode byte:
//! either a fixed number of bytes or a little-endian length prefix followed
//! by that many bytes.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x20: Constants
//! - 0x21-0x41: Flow control and exceptions
//! - 0x43-0x55: Stack manipulation
//! - 0x56-0x87: Slots
//! - 0x88-0x8E: Splice
//! - 0x90-0x98: Bitwise logic and equality
//! - 0x99-0xBB: Arithmetic and comparison
//! - 0xBE-0xD4: Compound types
//! - 0xD8-0xDB: Type checks and conversion
//! - 0xE0-0xE1: Extensions

use std::fmt;

/// Encoded operand layout of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSize {
    /// Width of the length prefix (0, 1, 2 or 4 bytes)
    pub prefix: usize,
    /// Fixed operand width, used when `prefix` is 0
    pub size: usize,
}

impl OperandSize {
    /// No operand
    pub const NONE: OperandSize = OperandSize { prefix: 0, size: 0 };

    /// Operand of exactly `size` bytes
    pub const fn fixed(size: usize) -> Self {
        OperandSize { prefix: 0, size }
    }

    /// Operand preceded by a `prefix`-byte little-endian length
    pub const fn prefixed(prefix: usize) -> Self {
        OperandSize { prefix, size: 0 }
    }
}

/// Opcode category, used to route execution to a handler group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCodeCategory {
    /// Pushes of constants and pointers
    Constant,
    /// Jumps, calls, exceptions and returns
    FlowControl,
    /// Evaluation stack manipulation
    Stack,
    /// Static field, local and argument access
    Slot,
    /// Byte string and buffer operations
    Splice,
    /// Bitwise operations and equality
    Bitwise,
    /// Integer arithmetic, logic and comparison
    Arithmetic,
    /// Array, struct, map and buffer element access
    Compound,
    /// Type checks and conversion
    Types,
    /// Messaged abort and assert
    Extension,
}

macro_rules! define_opcodes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal, $mnemonic:literal, $operand:expr; )*) => {
        /// Opcode enumeration
        ///
        /// All opcodes are single-byte instructions. Some take an operand that
        /// follows the opcode byte in the script.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpCode {
            $( $(#[$doc])* $name = $value, )*
        }

        impl OpCode {
            /// Every defined opcode in byte order
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$name, )* ];

            /// Decode an opcode byte
            pub const fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $value => Some(OpCode::$name), )*
                    _ => None,
                }
            }

            /// Assembly mnemonic
            pub const fn name(self) -> &'static str {
                match self {
                    $( OpCode::$name => $mnemonic, )*
                }
            }

            /// Operand layout
            pub const fn operand_size(self) -> OperandSize {
                match self {
                    $( OpCode::$name => $operand, )*
                }
            }
        }
    };
}

define_opcodes! {
    // ===== Constants (0x00-0x20) =====
    /// Push a 8-bit signed integer (operand: 1-byte little-endian)
    PushInt8 = 0x00, "PUSHINT8", OperandSize::fixed(1);
    /// Push a 16-bit signed integer (operand: 2-byte little-endian)
    PushInt16 = 0x01, "PUSHINT16", OperandSize::fixed(2);
    /// Push a 32-bit signed integer (operand: 4-byte little-endian)
    PushInt32 = 0x02, "PUSHINT32", OperandSize::fixed(4);
    /// Push a 64-bit signed integer (operand: 8-byte little-endian)
    PushInt64 = 0x03, "PUSHINT64", OperandSize::fixed(8);
    /// Push a 128-bit signed integer (operand: 16-byte little-endian)
    PushInt128 = 0x04, "PUSHINT128", OperandSize::fixed(16);
    /// Push a 256-bit signed integer (operand: 32-byte little-endian)
    PushInt256 = 0x05, "PUSHINT256", OperandSize::fixed(32);
    /// Push boolean true
    PushT = 0x08, "PUSHT", OperandSize::NONE;
    /// Push boolean false
    PushF = 0x09, "PUSHF", OperandSize::NONE;
    /// Push a pointer to an offset relative to this instruction (operand: i32)
    PushA = 0x0A, "PUSHA", OperandSize::fixed(4);
    /// Push null
    PushNull = 0x0B, "PUSHNULL", OperandSize::NONE;
    /// Push a byte string with a 1-byte length prefix
    PushData1 = 0x0C, "PUSHDATA1", OperandSize::prefixed(1);
    /// Push a byte string with a 2-byte length prefix
    PushData2 = 0x0D, "PUSHDATA2", OperandSize::prefixed(2);
    /// Push a byte string with a 4-byte length prefix
    PushData4 = 0x0E, "PUSHDATA4", OperandSize::prefixed(4);
    /// Push integer -1
    PushM1 = 0x0F, "PUSHM1", OperandSize::NONE;
    /// Push integer 0
    Push0 = 0x10, "PUSH0", OperandSize::NONE;
    /// Push integer 1
    Push1 = 0x11, "PUSH1", OperandSize::NONE;
    /// Push integer 2
    Push2 = 0x12, "PUSH2", OperandSize::NONE;
    /// Push integer 3
    Push3 = 0x13, "PUSH3", OperandSize::NONE;
    /// Push integer 4
    Push4 = 0x14, "PUSH4", OperandSize::NONE;
    /// Push integer 5
    Push5 = 0x15, "PUSH5", OperandSize::NONE;
    /// Push integer 6
    Push6 = 0x16, "PUSH6", OperandSize::NONE;
    /// Push integer 7
    Push7 = 0x17, "PUSH7", OperandSize::NONE;
    /// Push integer 8
    Push8 = 0x18, "PUSH8", OperandSize::NONE;
    /// Push integer 9
    Push9 = 0x19, "PUSH9", OperandSize::NONE;
    /// Push integer 10
    Push10 = 0x1A, "PUSH10", OperandSize::NONE;
    /// Push integer 11
    Push11 = 0x1B, "PUSH11", OperandSize::NONE;
    /// Push integer 12
    Push12 = 0x1C, "PUSH12", OperandSize::NONE;
    /// Push integer 13
    Push13 = 0x1D, "PUSH13", OperandSize::NONE;
    /// Push integer 14
    Push14 = 0x1E, "PUSH14", OperandSize::NONE;
    /// Push integer 15
    Push15 = 0x1F, "PUSH15", OperandSize::NONE;
    /// Push integer 16
    Push16 = 0x20, "PUSH16", OperandSize::NONE;
    // ===== Flow control (0x21-0x41) =====
    /// No operation
    Nop = 0x21, "NOP", OperandSize::NONE;
    /// Unconditional jump (operand: i8 offset)
    Jmp = 0x22, "JMP", OperandSize::fixed(1);
    /// Unconditional jump (operand: i32 offset)
    JmpL = 0x23, "JMP_L", OperandSize::fixed(4);
    /// Jump when the popped value is true (operand: i8 offset)
    JmpIf = 0x24, "JMPIF", OperandSize::fixed(1);
    /// Jump when the popped value is true (operand: i32 offset)
    JmpIfL = 0x25, "JMPIF_L", OperandSize::fixed(4);
    /// Jump when the popped value is false (operand: i8 offset)
    JmpIfNot = 0x26, "JMPIFNOT", OperandSize::fixed(1);
    /// Jump when the popped value is false (operand: i32 offset)
    JmpIfNotL = 0x27, "JMPIFNOT_L", OperandSize::fixed(4);
    /// Jump when the two popped integers are equal (operand: i8 offset)
    JmpEq = 0x28, "JMPEQ", OperandSize::fixed(1);
    /// Jump when the two popped integers are equal (operand: i32 offset)
    JmpEqL = 0x29, "JMPEQ_L", OperandSize::fixed(4);
    /// Jump when the two popped integers differ (operand: i8 offset)
    JmpNe = 0x2A, "JMPNE", OperandSize::fixed(1);
    /// Jump when the two popped integers differ (operand: i32 offset)
    JmpNeL = 0x2B, "JMPNE_L", OperandSize::fixed(4);
    /// Jump when the first popped integer is greater (operand: i8 offset)
    JmpGt = 0x2C, "JMPGT", OperandSize::fixed(1);
    /// Jump when the first popped integer is greater (operand: i32 offset)
    JmpGtL = 0x2D, "JMPGT_L", OperandSize::fixed(4);
    /// Jump when the first popped integer is greater or equal (operand: i8 offset)
    JmpGe = 0x2E, "JMPGE", OperandSize::fixed(1);
    /// Jump when the first popped integer is greater or equal (operand: i32 offset)
    JmpGeL = 0x2F, "JMPGE_L", OperandSize::fixed(4);
    /// Jump when the first popped integer is less (operand: i8 offset)
    JmpLt = 0x30, "JMPLT", OperandSize::fixed(1);
    /// Jump when the first popped integer is less (operand: i32 offset)
    JmpLtL = 0x31, "JMPLT_L", OperandSize::fixed(4);
    /// Jump when the first popped integer is less or equal (operand: i8 offset)
    JmpLe = 0x32, "JMPLE", OperandSize::fixed(1);
    /// Jump when the first popped integer is less or equal (operand: i32 offset)
    JmpLeL = 0x33, "JMPLE_L", OperandSize::fixed(4);
    /// Call the function at a relative offset (operand: i8)
    Call = 0x34, "CALL", OperandSize::fixed(1);
    /// Call the function at a relative offset (operand: i32)
    CallL = 0x35, "CALL_L", OperandSize::fixed(4);
    /// Call the function referenced by the popped pointer
    CallA = 0x36, "CALLA", OperandSize::NONE;
    /// Call a function through a host-resolved token (operand: u16)
    CallT = 0x37, "CALLT", OperandSize::fixed(2);
    /// Abort execution unconditionally
    Abort = 0x38, "ABORT", OperandSize::NONE;
    /// Abort execution when the popped value is false
    Assert = 0x39, "ASSERT", OperandSize::NONE;
    /// Throw the popped item as an exception
    Throw = 0x3A, "THROW", OperandSize::NONE;
    /// Enter a try region (operands: i8 catch offset, i8 finally offset)
    Try = 0x3B, "TRY", OperandSize::fixed(2);
    /// Enter a try region (operands: i32 catch offset, i32 finally offset)
    TryL = 0x3C, "TRY_L", OperandSize::fixed(8);
    /// Leave a try or catch block (operand: i8 end offset)
    EndTry = 0x3D, "ENDTRY", OperandSize::fixed(1);
    /// Leave a try or catch block (operand: i32 end offset)
    EndTryL = 0x3E, "ENDTRY_L", OperandSize::fixed(4);
    /// Leave a finally block
    EndFinally = 0x3F, "ENDFINALLY", OperandSize::NONE;
    /// Return from the current context
    Ret = 0x40, "RET", OperandSize::NONE;
    /// Invoke a host service (operand: u32 identifier)
    Syscall = 0x41, "SYSCALL", OperandSize::fixed(4);
    // ===== Stack (0x43-0x55) =====
    /// Push the evaluation stack length
    Depth = 0x43, "DEPTH", OperandSize::NONE;
    /// Remove the top item
    Drop = 0x45, "DROP", OperandSize::NONE;
    /// Remove the second item
    Nip = 0x46, "NIP", OperandSize::NONE;
    /// Remove the item n back, n popped from the stack
    XDrop = 0x48, "XDROP", OperandSize::NONE;
    /// Remove every item
    Clear = 0x49, "CLEAR", OperandSize::NONE;
    /// Duplicate the top item
    Dup = 0x4A, "DUP", OperandSize::NONE;
    /// Copy the second item to the top
    Over = 0x4B, "OVER", OperandSize::NONE;
    /// Copy the item n back to the top
    Pick = 0x4D, "PICK", OperandSize::NONE;
    /// Copy the top item below the second item
    Tuck = 0x4E, "TUCK", OperandSize::NONE;
    /// Swap the top two items
    Swap = 0x50, "SWAP", OperandSize::NONE;
    /// Move the third item to the top
    Rot = 0x51, "ROT", OperandSize::NONE;
    /// Move the item n back to the top
    Roll = 0x52, "ROLL", OperandSize::NONE;
    /// Reverse the top three items
    Reverse3 = 0x53, "REVERSE3", OperandSize::NONE;
    /// Reverse the top four items
    Reverse4 = 0x54, "REVERSE4", OperandSize::NONE;
    /// Reverse the top n items
    ReverseN = 0x55, "REVERSEN", OperandSize::NONE;
    // ===== Slots (0x56-0x87) =====
    /// Initialize the static field slot (operand: field count)
    InitSSlot = 0x56, "INITSSLOT", OperandSize::fixed(1);
    /// Initialize local and argument slots (operands: local count, argument count)
    InitSlot = 0x57, "INITSLOT", OperandSize::fixed(2);
    /// Load static field 0
    LdSFld0 = 0x58, "LDSFLD0", OperandSize::NONE;
    /// Load static field 1
    LdSFld1 = 0x59, "LDSFLD1", OperandSize::NONE;
    /// Load static field 2
    LdSFld2 = 0x5A, "LDSFLD2", OperandSize::NONE;
    /// Load static field 3
    LdSFld3 = 0x5B, "LDSFLD3", OperandSize::NONE;
    /// Load static field 4
    LdSFld4 = 0x5C, "LDSFLD4", OperandSize::NONE;
    /// Load static field 5
    LdSFld5 = 0x5D, "LDSFLD5", OperandSize::NONE;
    /// Load static field 6
    LdSFld6 = 0x5E, "LDSFLD6", OperandSize::NONE;
    /// Load the static field at the operand index
    LdSFld = 0x5F, "LDSFLD", OperandSize::fixed(1);
    /// Store the popped item to static field 0
    StSFld0 = 0x60, "STSFLD0", OperandSize::NONE;
    /// Store the popped item to static field 1
    StSFld1 = 0x61, "STSFLD1", OperandSize::NONE;
    /// Store the popped item to static field 2
    StSFld2 = 0x62, "STSFLD2", OperandSize::NONE;
    /// Store the popped item to static field 3
    StSFld3 = 0x63, "STSFLD3", OperandSize::NONE;
    /// Store the popped item to static field 4
    StSFld4 = 0x64, "STSFLD4", OperandSize::NONE;
    /// Store the popped item to static field 5
    StSFld5 = 0x65, "STSFLD5", OperandSize::NONE;
    /// Store the popped item to static field 6
    StSFld6 = 0x66, "STSFLD6", OperandSize::NONE;
    /// Store the popped item to the static field at the operand index
    StSFld = 0x67, "STSFLD", OperandSize::fixed(1);
    /// Load local variable 0
    LdLoc0 = 0x68, "LDLOC0", OperandSize::NONE;
    /// Load local variable 1
    LdLoc1 = 0x69, "LDLOC1", OperandSize::NONE;
    /// Load local variable 2
    LdLoc2 = 0x6A, "LDLOC2", OperandSize::NONE;
    /// Load local variable 3
    LdLoc3 = 0x6B, "LDLOC3", OperandSize::NONE;
    /// Load local variable 4
    LdLoc4 = 0x6C, "LDLOC4", OperandSize::NONE;
    /// Load local variable 5
    LdLoc5 = 0x6D, "LDLOC5", OperandSize::NONE;
    /// Load local variable 6
    LdLoc6 = 0x6E, "LDLOC6", OperandSize::NONE;
    /// Load the local variable at the operand index
    LdLoc = 0x6F, "LDLOC", OperandSize::fixed(1);
    /// Store the popped item to local variable 0
    StLoc0 = 0x70, "STLOC0", OperandSize::NONE;
    /// Store the popped item to local variable 1
    StLoc1 = 0x71, "STLOC1", OperandSize::NONE;
    /// Store the popped item to local variable 2
    StLoc2 = 0x72, "STLOC2", OperandSize::NONE;
    /// Store the popped item to local variable 3
    StLoc3 = 0x73, "STLOC3", OperandSize::NONE;
    /// Store the popped item to local variable 4
    StLoc4 = 0x74, "STLOC4", OperandSize::NONE;
    /// Store the popped item to local variable 5
    StLoc5 = 0x75, "STLOC5", OperandSize::NONE;
    /// Store the popped item to local variable 6
    StLoc6 = 0x76, "STLOC6", OperandSize::NONE;
    /// Store the popped item to the local variable at the operand index
    StLoc = 0x77, "STLOC", OperandSize::fixed(1);
    /// Load argument 0
    LdArg0 = 0x78, "LDARG0", OperandSize::NONE;
    /// Load argument 1
    LdArg1 = 0x79, "LDARG1", OperandSize::NONE;
    /// Load argument 2
    LdArg2 = 0x7A, "LDARG2", OperandSize::NONE;
    /// Load argument 3
    LdArg3 = 0x7B, "LDARG3", OperandSize::NONE;
    /// Load argument 4
    LdArg4 = 0x7C, "LDARG4", OperandSize::NONE;
    /// Load argument 5
    LdArg5 = 0x7D, "LDARG5", OperandSize::NONE;
    /// Load argument 6
    LdArg6 = 0x7E, "LDARG6", OperandSize::NONE;
    /// Load the argument at the operand index
    LdArg = 0x7F, "LDARG", OperandSize::fixed(1);
    /// Store the popped item to argument 0
    StArg0 = 0x80, "STARG0", OperandSize::NONE;
    /// Store the popped item to argument 1
    StArg1 = 0x81, "STARG1", OperandSize::NONE;
    /// Store the popped item to argument 2
    StArg2 = 0x82, "STARG2", OperandSize::NONE;
    /// Store the popped item to argument 3
    StArg3 = 0x83, "STARG3", OperandSize::NONE;
    /// Store the popped item to argument 4
    StArg4 = 0x84, "STARG4", OperandSize::NONE;
    /// Store the popped item to argument 5
    StArg5 = 0x85, "STARG5", OperandSize::NONE;
    /// Store the popped item to argument 6
    StArg6 = 0x86, "STARG6", OperandSize::NONE;
    /// Store the popped item to the argument at the operand index
    StArg = 0x87, "STARG", OperandSize::fixed(1);
    // ===== Splice (0x88-0x8E) =====
    /// Create a zeroed buffer of the popped length
    NewBuffer = 0x88, "NEWBUFFER", OperandSize::NONE;
    /// Copy a byte range into a buffer
    MemCpy = 0x89, "MEMCPY", OperandSize::NONE;
    /// Concatenate two byte strings into a new buffer
    Cat = 0x8B, "CAT", OperandSize::NONE;
    /// Extract a byte range into a new buffer
    Substr = 0x8C, "SUBSTR", OperandSize::NONE;
    /// Keep the leftmost n bytes
    Left = 0x8D, "LEFT", OperandSize::NONE;
    /// Keep the rightmost n bytes
    Right = 0x8E, "RIGHT", OperandSize::NONE;
    // ===== Bitwise logic (0x90-0x98) =====
    /// Bitwise complement
    Invert = 0x90, "INVERT", OperandSize::NONE;
    /// Bitwise and
    And = 0x91, "AND", OperandSize::NONE;
    /// Bitwise or
    Or = 0x92, "OR", OperandSize::NONE;
    /// Bitwise exclusive or
    Xor = 0x93, "XOR", OperandSize::NONE;
    /// Push whether the two popped items are equal
    Equal = 0x97, "EQUAL", OperandSize::NONE;
    /// Push whether the two popped items differ
    NotEqual = 0x98, "NOTEQUAL", OperandSize::NONE;
    // ===== Arithmetic (0x99-0xBB) =====
    /// Push the sign of the popped integer
    Sign = 0x99, "SIGN", OperandSize::NONE;
    /// Absolute value
    Abs = 0x9A, "ABS", OperandSize::NONE;
    /// Negation
    Negate = 0x9B, "NEGATE", OperandSize::NONE;
    /// Add one
    Inc = 0x9C, "INC", OperandSize::NONE;
    /// Subtract one
    Dec = 0x9D, "DEC", OperandSize::NONE;
    /// Addition
    Add = 0x9E, "ADD", OperandSize::NONE;
    /// Subtraction
    Sub = 0x9F, "SUB", OperandSize::NONE;
    /// Multiplication
    Mul = 0xA0, "MUL", OperandSize::NONE;
    /// Truncating division
    Div = 0xA1, "DIV", OperandSize::NONE;
    /// Remainder with the sign of the dividend
    Mod = 0xA2, "MOD", OperandSize::NONE;
    /// Exponentiation
    Pow = 0xA3, "POW", OperandSize::NONE;
    /// Integer square root
    Sqrt = 0xA4, "SQRT", OperandSize::NONE;
    /// Modular multiplication
    ModMul = 0xA5, "MODMUL", OperandSize::NONE;
    /// Modular exponentiation; exponent -1 computes the inverse
    ModPow = 0xA6, "MODPOW", OperandSize::NONE;
    /// Arithmetic left shift
    Shl = 0xA8, "SHL", OperandSize::NONE;
    /// Arithmetic right shift
    Shr = 0xA9, "SHR", OperandSize::NONE;
    /// Boolean negation
    Not = 0xAA, "NOT", OperandSize::NONE;
    /// Boolean and
    BoolAnd = 0xAB, "BOOLAND", OperandSize::NONE;
    /// Boolean or
    BoolOr = 0xAC, "BOOLOR", OperandSize::NONE;
    /// Push whether the popped integer is non-zero
    Nz = 0xB1, "NZ", OperandSize::NONE;
    /// Numeric equality
    NumEqual = 0xB3, "NUMEQUAL", OperandSize::NONE;
    /// Numeric inequality
    NumNotEqual = 0xB4, "NUMNOTEQUAL", OperandSize::NONE;
    /// Less than
    Lt = 0xB5, "LT", OperandSize::NONE;
    /// Less than or equal
    Le = 0xB6, "LE", OperandSize::NONE;
    /// Greater than
    Gt = 0xB7, "GT", OperandSize::NONE;
    /// Greater than or equal
    Ge = 0xB8, "GE", OperandSize::NONE;
    /// Smaller of two integers
    Min = 0xB9, "MIN", OperandSize::NONE;
    /// Larger of two integers
    Max = 0xBA, "MAX", OperandSize::NONE;
    /// Push whether a <= x < b
    Within = 0xBB, "WITHIN", OperandSize::NONE;
    // ===== Compound types (0xBE-0xD4) =====
    /// Pack n key/value pairs into a map
    PackMap = 0xBE, "PACKMAP", OperandSize::NONE;
    /// Pack n items into a struct
    PackStruct = 0xBF, "PACKSTRUCT", OperandSize::NONE;
    /// Pack n items into an array
    Pack = 0xC0, "PACK", OperandSize::NONE;
    /// Push the elements of a compound followed by its size
    Unpack = 0xC1, "UNPACK", OperandSize::NONE;
    /// Push an empty array
    NewArray0 = 0xC2, "NEWARRAY0", OperandSize::NONE;
    /// Push an array of n nulls
    NewArray = 0xC3, "NEWARRAY", OperandSize::NONE;
    /// Push an array of n default values of the operand type
    NewArrayT = 0xC4, "NEWARRAY_T", OperandSize::fixed(1);
    /// Push an empty struct
    NewStruct0 = 0xC5, "NEWSTRUCT0", OperandSize::NONE;
    /// Push a struct of n nulls
    NewStruct = 0xC6, "NEWSTRUCT", OperandSize::NONE;
    /// Push an empty map
    NewMap = 0xC8, "NEWMAP", OperandSize::NONE;
    /// Push the size of the popped item
    Size = 0xCA, "SIZE", OperandSize::NONE;
    /// Push whether a compound or buffer contains a key
    HasKey = 0xCB, "HASKEY", OperandSize::NONE;
    /// Push the keys of a map as an array
    Keys = 0xCC, "KEYS", OperandSize::NONE;
    /// Push the values of a compound as an array
    Values = 0xCD, "VALUES", OperandSize::NONE;
    /// Push the element at a key
    PickItem = 0xCE, "PICKITEM", OperandSize::NONE;
    /// Append an item to an array
    Append = 0xCF, "APPEND", OperandSize::NONE;
    /// Store an item at a key
    SetItem = 0xD0, "SETITEM", OperandSize::NONE;
    /// Reverse the elements of an array or buffer
    ReverseItems = 0xD1, "REVERSEITEMS", OperandSize::NONE;
    /// Remove the element at a key
    Remove = 0xD2, "REMOVE", OperandSize::NONE;
    /// Remove every element
    ClearItems = 0xD3, "CLEARITEMS", OperandSize::NONE;
    /// Remove and push the last element of an array
    PopItem = 0xD4, "POPITEM", OperandSize::NONE;
    // ===== Types (0xD8-0xDB) =====
    /// Push whether the popped item is null
    IsNull = 0xD8, "ISNULL", OperandSize::NONE;
    /// Push whether the popped item has the operand type
    IsType = 0xD9, "ISTYPE", OperandSize::fixed(1);
    /// Convert the popped item to the operand type
    Convert = 0xDB, "CONVERT", OperandSize::fixed(1);
    // ===== Extensions (0xE0-0xE1) =====
    /// Abort execution with the popped message
    AbortMsg = 0xE0, "ABORTMSG", OperandSize::NONE;
    /// Abort with the popped message when the next popped value is false
    AssertMsg = 0xE1, "ASSERTMSG", OperandSize::NONE;
}

impl OpCode {
    /// Convert to the encoded byte
    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Handler group for this opcode
    pub const fn category(self) -> OpCodeCategory {
        match self as u8 {
            0x00..=0x20 => OpCodeCategory::Constant,
            0x21..=0x42 => OpCodeCategory::FlowControl,
            0x43..=0x55 => OpCodeCategory::Stack,
            0x56..=0x87 => OpCodeCategory::Slot,
            0x88..=0x8F => OpCodeCategory::Splice,
            0x90..=0x98 => OpCodeCategory::Bitwise,
            0x99..=0xBD => OpCodeCategory::Arithmetic,
            0xBE..=0xD7 => OpCodeCategory::Compound,
            0xD8..=0xDF => OpCodeCategory::Types,
            _ => OpCodeCategory::Extension,
        }
    }

    /// Check if this is a jump (conditional or not)
    pub const fn is_jump(self) -> bool {
        matches!(self as u8, 0x22..=0x33)
    }

    /// Check if this is a call
    pub const fn is_call(self) -> bool {
        matches!(self, OpCode::Call | OpCode::CallL | OpCode::CallA | OpCode::CallT)
    }

    /// Long (4-byte offset) form of a short jump, call, TRY or ENDTRY
    pub const fn long_form(self) -> Option<OpCode> {
        match self {
            OpCode::Jmp => Some(OpCode::JmpL),
            OpCode::JmpIf => Some(OpCode::JmpIfL),
            OpCode::JmpIfNot => Some(OpCode::JmpIfNotL),
            OpCode::JmpEq => Some(OpCode::JmpEqL),
            OpCode::JmpNe => Some(OpCode::JmpNeL),
            OpCode::JmpGt => Some(OpCode::JmpGtL),
            OpCode::JmpGe => Some(OpCode::JmpGeL),
            OpCode::JmpLt => Some(OpCode::JmpLtL),
            OpCode::JmpLe => Some(OpCode::JmpLeL),
            OpCode::Call => Some(OpCode::CallL),
            OpCode::Try => Some(OpCode::TryL),
            OpCode::EndTry => Some(OpCode::EndTryL),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
