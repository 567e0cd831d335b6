//! Scripts
//!
//! A script is an immutable byte buffer with a write-once decode cache.
//! Instructions are decoded on first access; jump targets are checked when
//! a jump executes, against the instruction boundaries found by a linear
//! decode from offset 0.

use std::fmt;
use std::sync::OnceLock;

use bytes::Bytes;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::instruction::Instruction;
use crate::VmResult;

/// Immutable executable byte sequence
pub struct Script {
    value: Bytes,
    strict: bool,
    instructions: RwLock<FxHashMap<usize, Instruction>>,
    boundaries: OnceLock<FxHashSet<usize>>,
}

impl Script {
    /// Create a script.
    ///
    /// In strict mode every instruction reachable by a linear decode must
    /// decode completely; otherwise decoding is deferred to first use.
    ///
    /// # Errors
    ///
    /// Returns `VmError::Format` in strict mode when an opcode is undefined
    /// or an operand runs past the end of the buffer.
    pub fn new(value: impl Into<Bytes>, strict: bool) -> VmResult<Script> {
        let script = Script {
            value: value.into(),
            strict,
            instructions: RwLock::new(FxHashMap::default()),
            boundaries: OnceLock::new(),
        };
        if strict {
            let mut position = 0;
            while position < script.value.len() {
                position += script.get_instruction(position)?.size();
            }
        }
        Ok(script)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &Bytes {
        &self.value
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Check if the script has no bytes
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether the script was validated on construction
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Instruction starting at `position`, decoded once and cached
    pub fn get_instruction(&self, position: usize) -> VmResult<Instruction> {
        if let Some(instruction) = self.instructions.read().get(&position) {
            return Ok(instruction.clone());
        }
        let instruction = Instruction::decode(&self.value, position)?;
        self.instructions
            .write()
            .entry(position)
            .or_insert_with(|| instruction.clone());
        Ok(instruction)
    }

    /// Check whether `position` starts an instruction in the linear decode
    pub fn is_instruction_boundary(&self, position: usize) -> bool {
        self.boundaries
            .get_or_init(|| {
                let mut boundaries = FxHashSet::default();
                let mut position = 0;
                while position < self.value.len() {
                    boundaries.insert(position);
                    match self.get_instruction(position) {
                        Ok(instruction) => position += instruction.size(),
                        Err(_) => break,
                    }
                }
                boundaries
            })
            .contains(&position)
    }

    /// Decode linearly from offset 0, yielding each instruction with its
    /// offset. Stops after the first decode error.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { script: self, position: 0, failed: false }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("len", &self.value.len())
            .field("strict", &self.strict)
            .finish()
    }
}

/// Iterator over the instructions of a script
pub struct Instructions<'a> {
    script: &'a Script,
    position: usize,
    failed: bool,
}

impl Iterator for Instructions<'_> {
    type Item = (usize, VmResult<Instruction>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.script.len() {
            return None;
        }
        let position = self.position;
        let result = self.script.get_instruction(position);
        match &result {
            Ok(instruction) => self.position += instruction.size(),
            Err(_) => self.failed = true,
        }
        Some((position, result))
    }
}
