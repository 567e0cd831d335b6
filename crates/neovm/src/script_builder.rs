//! Script builder
//!
//! Emits opcodes and their operands into a byte buffer. Jump, call, TRY and
//! PUSHA offsets are relative to the start of the instruction being emitted.

use num_bigint::{BigInt, Sign};

use crate::opcode::OpCode;
use crate::script::Script;
use crate::{VmError, VmResult};

/// Bytecode writer for NeoVM scripts
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    buffer: Vec<u8>,
}

impl ScriptBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity) }
    }

    /// Offset the next instruction will be written at
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes emitted so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the builder and return the script bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Build a [`Script`] from a copy of the emitted bytes
    pub fn to_script(&self, strict: bool) -> VmResult<Script> {
        Script::new(self.buffer.clone(), strict)
    }

    // ===== Basic Emission =====

    /// Emit an opcode without operand
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.buffer.push(opcode.to_u8());
        self
    }

    /// Emit an opcode followed by raw operand bytes
    pub fn emit_with(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.buffer.push(opcode.to_u8());
        self.buffer.extend_from_slice(operand);
        self
    }

    // ===== Constants =====

    /// Emit the shortest push of `value`
    pub fn emit_push_int(&mut self, value: i64) -> &mut Self {
        match value {
            -1 => self.emit(OpCode::PushM1),
            0..=16 => {
                let opcode = OpCode::from_u8(OpCode::Push0.to_u8() + value as u8);
                self.emit(opcode.unwrap_or(OpCode::Push0))
            }
            _ if i8::try_from(value).is_ok() => {
                self.emit_with(OpCode::PushInt8, &(value as i8).to_le_bytes())
            }
            _ if i16::try_from(value).is_ok() => {
                self.emit_with(OpCode::PushInt16, &(value as i16).to_le_bytes())
            }
            _ if i32::try_from(value).is_ok() => {
                self.emit_with(OpCode::PushInt32, &(value as i32).to_le_bytes())
            }
            _ => self.emit_with(OpCode::PushInt64, &value.to_le_bytes()),
        }
    }

    /// Emit the shortest push of an integer up to 256 bits
    pub fn emit_push_bigint(&mut self, value: &BigInt) -> VmResult<&mut Self> {
        if let Ok(small) = i64::try_from(value) {
            return Ok(self.emit_push_int(small));
        }
        let mut bytes = value.to_signed_bytes_le();
        let (opcode, width) = match bytes.len() {
            0..=16 => (OpCode::PushInt128, 16),
            17..=32 => (OpCode::PushInt256, 32),
            size => {
                return Err(VmError::arithmetic(format!(
                    "Integer overflow: {size} bytes exceed the 32-byte limit"
                )))
            }
        };
        let fill = if value.sign() == Sign::Minus { 0xFF } else { 0x00 };
        bytes.resize(width, fill);
        Ok(self.emit_with(opcode, &bytes))
    }

    /// Emit PUSHT or PUSHF
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PushT } else { OpCode::PushF })
    }

    /// Emit PUSHNULL
    pub fn emit_push_null(&mut self) -> &mut Self {
        self.emit(OpCode::PushNull)
    }

    /// Emit the shortest PUSHDATA form for `data`
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> &mut Self {
        if let Ok(len) = u8::try_from(data.len()) {
            self.emit_with(OpCode::PushData1, &[len]);
        } else if let Ok(len) = u16::try_from(data.len()) {
            self.emit_with(OpCode::PushData2, &len.to_le_bytes());
        } else {
            self.emit_with(OpCode::PushData4, &(data.len() as u32).to_le_bytes());
        }
        self.buffer.extend_from_slice(data);
        self
    }

    /// Emit a push of the UTF-8 bytes of `text`
    pub fn emit_push_str(&mut self, text: &str) -> &mut Self {
        self.emit_push_bytes(text.as_bytes())
    }

    /// Emit PUSHA with a relative offset
    pub fn emit_push_pointer(&mut self, offset: i32) -> &mut Self {
        self.emit_with(OpCode::PushA, &offset.to_le_bytes())
    }

    // ===== Flow Control =====

    /// Emit a jump, CALL or ENDTRY, choosing the short form when the offset
    /// fits in one byte.
    ///
    /// `opcode` may be either form; a long-form opcode is always emitted long.
    pub fn emit_jump(&mut self, opcode: OpCode, offset: i32) -> &mut Self {
        match (opcode.long_form(), i8::try_from(offset)) {
            (Some(_), Ok(short)) => self.emit_with(opcode, &short.to_le_bytes()),
            (Some(long), Err(_)) => self.emit_with(long, &offset.to_le_bytes()),
            (None, _) => self.emit_with(opcode, &offset.to_le_bytes()),
        }
    }

    /// Emit CALL to a relative offset
    pub fn emit_call(&mut self, offset: i32) -> &mut Self {
        self.emit_jump(OpCode::Call, offset)
    }

    /// Emit CALLT with a method token
    pub fn emit_call_token(&mut self, token: u16) -> &mut Self {
        self.emit_with(OpCode::CallT, &token.to_le_bytes())
    }

    /// Emit SYSCALL with a method id
    pub fn emit_syscall(&mut self, method: u32) -> &mut Self {
        self.emit_with(OpCode::Syscall, &method.to_le_bytes())
    }

    /// Emit TRY; an offset of 0 declares no catch or no finally block
    pub fn emit_try(&mut self, catch_offset: i32, finally_offset: i32) -> &mut Self {
        match (i8::try_from(catch_offset), i8::try_from(finally_offset)) {
            (Ok(catch), Ok(finally)) => {
                self.emit_with(OpCode::Try, &[catch as u8, finally as u8])
            }
            _ => {
                let mut operand = [0u8; 8];
                operand[..4].copy_from_slice(&catch_offset.to_le_bytes());
                operand[4..].copy_from_slice(&finally_offset.to_le_bytes());
                self.emit_with(OpCode::TryL, &operand)
            }
        }
    }

    /// Emit ENDTRY to a relative offset
    pub fn emit_end_try(&mut self, offset: i32) -> &mut Self {
        self.emit_jump(OpCode::EndTry, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(build: impl FnOnce(&mut ScriptBuilder)) -> Vec<u8> {
        let mut builder = ScriptBuilder::new();
        build(&mut builder);
        builder.into_bytes()
    }

    #[test]
    fn test_small_integers() {
        assert_eq!(bytes(|b| { b.emit_push_int(-1); }), vec![0x0F]);
        assert_eq!(bytes(|b| { b.emit_push_int(0); }), vec![0x10]);
        assert_eq!(bytes(|b| { b.emit_push_int(16); }), vec![0x20]);
        assert_eq!(bytes(|b| { b.emit_push_int(17); }), vec![0x00, 0x11]);
        assert_eq!(bytes(|b| { b.emit_push_int(-129); }), vec![0x01, 0x7F, 0xFF]);
        assert_eq!(bytes(|b| { b.emit_push_int(1 << 20); }), vec![0x02, 0x00, 0x00, 0x10, 0x00]);
    }

    #[test]
    fn test_big_integers() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bigint(&-(BigInt::from(1i32) << 64usize)).unwrap();
        let bytes = builder.into_bytes();
        assert_eq!(bytes[0], OpCode::PushInt128.to_u8());
        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[9..], &[0xFF; 8]);

        let mut builder = ScriptBuilder::new();
        assert!(builder.emit_push_bigint(&(BigInt::from(1) << 256)).is_err());
    }

    #[test]
    fn test_push_data_forms() {
        assert_eq!(bytes(|b| { b.emit_push_str("hi"); }), vec![0x0C, 0x02, b'h', b'i']);
        let long = bytes(|b| {
            b.emit_push_bytes(&[0u8; 300]);
        });
        assert_eq!(&long[..3], &[0x0D, 0x2C, 0x01]);
        assert_eq!(long.len(), 303);
    }

    #[test]
    fn test_jump_forms() {
        assert_eq!(bytes(|b| { b.emit_jump(OpCode::Jmp, -2); }), vec![0x22, 0xFE]);
        assert_eq!(
            bytes(|b| { b.emit_jump(OpCode::Jmp, 300); }),
            vec![0x23, 0x2C, 0x01, 0x00, 0x00]
        );
        assert_eq!(
            bytes(|b| { b.emit_jump(OpCode::JmpL, 3); }),
            vec![0x23, 0x03, 0x00, 0x00, 0x00]
        );
        assert_eq!(bytes(|b| { b.emit_try(3, 0); }), vec![0x3B, 0x03, 0x00]);
        assert_eq!(bytes(|b| { b.emit_try(200, 0); }).len(), 9);
    }

    #[test]
    fn test_built_script_decodes() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(1000).emit_syscall(0xDEADBEEF).emit(OpCode::Ret);
        let script = builder.to_script(true).unwrap();
        let listing: Vec<String> =
            script.instructions().map(|(_, i)| i.unwrap().to_string()).collect();
        assert_eq!(listing, vec!["PUSHINT16 232 3", "SYSCALL 0xdeadbeef", "RET"]);
    }
}
