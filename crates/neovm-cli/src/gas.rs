//! Gas metering host
//!
//! Charges each instruction its price from the opcode price table before it
//! executes. Prices are exponents of two in datoshi (1 GAS = 10^8 datoshi)
//! and are scaled by the execution fee factor.

use neovm::{ExecutionEngine, ExecutionHost, Instruction, OpCode, VmError, VmResult};

/// Datoshi in one GAS
pub const DATOSHI_PER_GAS: u64 = 100_000_000;

/// Default multiplier applied to every opcode price
pub const DEFAULT_FEE_FACTOR: u64 = 30;

/// Base price of `opcode` in datoshi, before the fee factor
pub const fn opcode_price(opcode: OpCode) -> u64 {
    1 << price_exponent(opcode)
}

const fn price_exponent(opcode: OpCode) -> u32 {
    use OpCode::*;
    match opcode {
        PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushT | PushF | PushNull | PushM1
        | Push0 | Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8 | Push9
        | Push10 | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 | Nop | Assert
        | AssertMsg => 0,
        Jmp | JmpL | JmpIf | JmpIfL | JmpIfNot | JmpIfNotL | JmpEq | JmpEqL | JmpNe
        | JmpNeL | JmpGt | JmpGtL | JmpGe | JmpGeL | JmpLt | JmpLtL | JmpLe | JmpLeL
        | Depth | Drop | Nip | Dup | Over | Pick | Tuck | Swap | Rot | Reverse3 | Reverse4
        | LdSFld0 | LdSFld1 | LdSFld2 | LdSFld3 | LdSFld4 | LdSFld5 | LdSFld6 | LdSFld
        | StSFld0 | StSFld1 | StSFld2 | StSFld3 | StSFld4 | StSFld5 | StSFld6 | StSFld
        | LdLoc0 | LdLoc1 | LdLoc2 | LdLoc3 | LdLoc4 | LdLoc5 | LdLoc6 | LdLoc | StLoc0
        | StLoc1 | StLoc2 | StLoc3 | StLoc4 | StLoc5 | StLoc6 | StLoc | LdArg0 | LdArg1
        | LdArg2 | LdArg3 | LdArg4 | LdArg5 | LdArg6 | LdArg | StArg0 | StArg1 | StArg2
        | StArg3 | StArg4 | StArg5 | StArg6 | StArg | IsNull | IsType => 1,
        PushInt128 | PushInt256 | PushA | Try | TryL | EndTry | EndTryL | EndFinally
        | ReverseN | Invert | Sign | Abs | Negate | Inc | Dec | Not | Nz | Size => 2,
        PushData1 | And | Or | Xor | Add | Sub | Mul | Div | Mod | Shl | Shr | BoolAnd
        | BoolOr | NumEqual | NumNotEqual | Lt | Le | Gt | Ge | Min | Max | Within
        | NewMap => 3,
        XDrop | Clear | Roll | InitSSlot | NewArray0 | NewStruct0 | Keys | Remove
        | ClearItems | PopItem => 4,
        Equal | NotEqual | ModMul => 5,
        InitSlot | Pow | Sqrt | HasKey | PickItem => 6,
        NewBuffer | Unpack => 8,
        PushData2 | Call | CallL | CallA | Throw | NewArray | NewArrayT | NewStruct => 9,
        MemCpy | Cat | Substr | Left | Right | ModPow | PackMap | PackStruct | Pack => 11,
        PushData4 => 12,
        Values | Append | SetItem | ReverseItems | Convert => 13,
        CallT => 15,
        Ret | Abort | AbortMsg | Syscall => 0,
    }
}

/// Host that meters execution against an optional budget
#[derive(Debug, Clone)]
pub struct GasMeter {
    budget: Option<u64>,
    fee_factor: u64,
    consumed: u64,
}

impl GasMeter {
    /// Meter with `budget` datoshi; `None` only counts
    pub fn new(budget: Option<u64>, fee_factor: u64) -> Self {
        Self { budget, fee_factor, consumed: 0 }
    }

    /// Datoshi charged so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Budget in datoshi, if any
    pub fn budget(&self) -> Option<u64> {
        self.budget
    }

    fn charge(&mut self, opcode: OpCode) -> VmResult<()> {
        let fee = opcode_price(opcode).saturating_mul(self.fee_factor);
        self.consumed = self.consumed.saturating_add(fee);
        match self.budget {
            Some(budget) if self.consumed > budget => Err(VmError::External(format!(
                "Insufficient GAS: {} > {budget} datoshi",
                self.consumed
            ))),
            _ => Ok(()),
        }
    }
}

impl ExecutionHost for GasMeter {
    fn pre_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        instruction: &Instruction,
    ) -> VmResult<()> {
        self.charge(instruction.opcode)
    }

    fn on_fault(&mut self, _engine: &ExecutionEngine, error: &VmError) {
        tracing::debug!(consumed = self.consumed, error = %error, "execution faulted");
    }
}
