//! Decoded instructions

use std::fmt;

use bytes::Bytes;

use crate::opcode::OpCode;
use crate::{VmError, VmResult};

/// One decoded instruction: opcode, operand bytes and encoded size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode
    pub opcode: OpCode,
    operand: Bytes,
    size: usize,
}

impl Instruction {
    /// Implicit return executed when the instruction pointer runs past the
    /// end of the script
    pub const RET: Instruction = Instruction { opcode: OpCode::Ret, operand: Bytes::new(), size: 1 };

    /// Decode the instruction starting at `position`
    ///
    /// # Errors
    ///
    /// Returns `VmError::Format` for an undefined opcode or an operand that
    /// runs past the end of the script.
    pub fn decode(script: &Bytes, position: usize) -> VmResult<Instruction> {
        let byte = *script
            .get(position)
            .ok_or_else(|| VmError::format(format!("Position {position} is outside the script")))?;
        let opcode = OpCode::from_u8(byte)
            .ok_or_else(|| VmError::format(format!("Invalid opcode {byte:#04x} at {position}")))?;

        let layout = opcode.operand_size();
        let mut cursor = position + 1;
        let operand_size = match layout.prefix {
            0 => layout.size,
            prefix => {
                let bytes = script.get(cursor..cursor + prefix).ok_or_else(|| truncated(position))?;
                cursor += prefix;
                let mut buf = [0u8; 4];
                buf[..prefix].copy_from_slice(bytes);
                let size = u32::from_le_bytes(buf);
                if prefix == 4 && size > i32::MAX as u32 {
                    return Err(VmError::format(format!("Invalid operand length at {position}")));
                }
                size as usize
            }
        };

        let end = cursor
            .checked_add(operand_size)
            .filter(|&end| end <= script.len())
            .ok_or_else(|| truncated(position))?;

        Ok(Instruction {
            opcode,
            operand: script.slice(cursor..end),
            size: end - position,
        })
    }

    /// Encoded size in bytes, including opcode and length prefix
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Operand bytes, without the length prefix
    #[inline]
    pub fn operand(&self) -> &[u8] {
        &self.operand
    }

    /// Operand bytes as a cheaply cloneable buffer
    pub fn operand_bytes(&self) -> Bytes {
        self.operand.clone()
    }

    fn bytes_at<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut buf = [0u8; N];
        if let Some(src) = self.operand.get(offset..offset + N) {
            buf.copy_from_slice(src);
        }
        buf
    }

    /// First operand byte as `u8`
    #[inline]
    pub fn token_u8(&self) -> u8 {
        self.bytes_at::<1>(0)[0]
    }

    /// Second operand byte as `u8`
    #[inline]
    pub fn token_u8_1(&self) -> u8 {
        self.bytes_at::<1>(1)[0]
    }

    /// First operand byte as `i8`
    #[inline]
    pub fn token_i8(&self) -> i8 {
        i8::from_le_bytes(self.bytes_at(0))
    }

    /// Second operand byte as `i8`
    #[inline]
    pub fn token_i8_1(&self) -> i8 {
        i8::from_le_bytes(self.bytes_at(1))
    }

    /// First two operand bytes as `u16`
    #[inline]
    pub fn token_u16(&self) -> u16 {
        u16::from_le_bytes(self.bytes_at(0))
    }

    /// First four operand bytes as `i32`
    #[inline]
    pub fn token_i32(&self) -> i32 {
        i32::from_le_bytes(self.bytes_at(0))
    }

    /// Operand bytes 4..8 as `i32`
    #[inline]
    pub fn token_i32_1(&self) -> i32 {
        i32::from_le_bytes(self.bytes_at(4))
    }

    /// First four operand bytes as `u32`
    #[inline]
    pub fn token_u32(&self) -> u32 {
        u32::from_le_bytes(self.bytes_at(0))
    }

    /// Relative offset of a jump, call, PUSHA or ENDTRY, short or long form
    pub fn jump_offset(&self) -> i32 {
        if self.operand.len() == 1 {
            self.token_i8() as i32
        } else {
            self.token_i32()
        }
    }
}

fn truncated(position: usize) -> VmError {
    VmError::format(format!("Instruction at {position} is truncated"))
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match self.opcode {
            _ if self.opcode.is_jump()
                || matches!(
                    self.opcode,
                    OpCode::Call | OpCode::CallL | OpCode::PushA | OpCode::EndTry | OpCode::EndTryL
                ) =>
            {
                write!(f, " {:+}", self.jump_offset())
            }
            OpCode::Try => write!(f, " {:+}, {:+}", self.token_i8(), self.token_i8_1()),
            OpCode::TryL => write!(f, " {:+}, {:+}", self.token_i32(), self.token_i32_1()),
            OpCode::Syscall => write!(f, " {:#010x}", self.token_u32()),
            OpCode::CallT => write!(f, " {}", self.token_u16()),
            _ if self.operand.is_empty() => Ok(()),
            OpCode::PushData1 | OpCode::PushData2 | OpCode::PushData4 => {
                write!(f, " 0x")?;
                for byte in self.operand.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            _ => {
                write!(f, " ")?;
                for (i, byte) in self.operand.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{byte}")?;
                }
                Ok(())
            }
        }
    }
}
