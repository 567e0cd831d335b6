//! Integer arithmetic, boolean logic and numeric comparison
//!
//! Division truncates toward zero and the remainder takes the sign of the
//! dividend. SHR rounds toward negative infinity. Every result is checked
//! against `max_integer_size` before it is pushed.

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use super::unexpected;
use crate::engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn exec_numeric_ops(&mut self, instruction: &Instruction) -> VmResult<()> {
        let opcode = instruction.opcode;
        match opcode {
            OpCode::Sign => {
                let x = self.pop_integer()?;
                let sign = match x.sign() {
                    Sign::Minus => -1,
                    Sign::NoSign => 0,
                    Sign::Plus => 1,
                };
                self.push_integer(BigInt::from(sign))
            }
            OpCode::Abs => {
                let x = self.pop_integer()?;
                self.push_integer(x.abs())
            }
            OpCode::Negate => {
                let x = self.pop_integer()?;
                self.push_integer(-x)
            }
            OpCode::Inc => {
                let x = self.pop_integer()?;
                self.push_integer(x + 1)
            }
            OpCode::Dec => {
                let x = self.pop_integer()?;
                self.push_integer(x - 1)
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let result = match opcode {
                    OpCode::Add => x1 + x2,
                    OpCode::Sub => x1 - x2,
                    OpCode::Mul => x1 * x2,
                    OpCode::Div => {
                        check_divisor(&x2)?;
                        x1 / x2
                    }
                    _ => {
                        check_divisor(&x2)?;
                        x1 % x2
                    }
                };
                self.push_integer(result)
            }
            OpCode::Pow => {
                let exponent = self.pop_integer()?;
                let exponent = self.limits.assert_shift(&exponent)?;
                let value = self.pop_integer()?;
                self.push_integer(value.pow(exponent))
            }
            OpCode::Sqrt => {
                let x = self.pop_integer()?;
                if x.is_negative() {
                    return Err(VmError::arithmetic("value can not be negative"));
                }
                self.push_integer(x.sqrt())
            }
            OpCode::ModMul => {
                let modulus = self.pop_integer()?;
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                check_divisor(&modulus)?;
                self.push_integer((x1 * x2) % modulus)
            }
            OpCode::ModPow => {
                let modulus = self.pop_integer()?;
                let exponent = self.pop_integer()?;
                let value = self.pop_integer()?;
                let result = if exponent == BigInt::from(-1) {
                    mod_inverse(&value, &modulus)?
                } else {
                    mod_pow(&value, &exponent, &modulus)?
                };
                self.push_integer(result)
            }
            OpCode::Shl | OpCode::Shr => {
                let shift = self.pop_integer()?;
                let shift = self.limits.assert_shift(&shift)?;
                if shift == 0 {
                    return Ok(());
                }
                let x = self.pop_integer()?;
                let result = if opcode == OpCode::Shl { x << shift } else { x >> shift };
                self.push_integer(result)
            }
            OpCode::Not => {
                let x = self.pop_boolean()?;
                self.push_boolean(!x)
            }
            OpCode::BoolAnd | OpCode::BoolOr => {
                let x2 = self.pop_boolean()?;
                let x1 = self.pop_boolean()?;
                let result = if opcode == OpCode::BoolAnd { x1 && x2 } else { x1 || x2 };
                self.push_boolean(result)
            }
            OpCode::Nz => {
                let x = self.pop_integer()?;
                self.push_boolean(!x.is_zero())
            }
            OpCode::NumEqual | OpCode::NumNotEqual => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                self.push_boolean((x1 == x2) == (opcode == OpCode::NumEqual))
            }
            OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                let x2 = self.pop()?;
                let x1 = self.pop()?;
                if x1.is_null() || x2.is_null() {
                    return self.push_boolean(false);
                }
                let heap = self.reference_counter.heap();
                let x2 = x2.get_integer(heap, &self.limits)?;
                let x1 = x1.get_integer(heap, &self.limits)?;
                let result = match opcode {
                    OpCode::Lt => x1 < x2,
                    OpCode::Le => x1 <= x2,
                    OpCode::Gt => x1 > x2,
                    _ => x1 >= x2,
                };
                self.push_boolean(result)
            }
            OpCode::Min | OpCode::Max => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let result = if opcode == OpCode::Min { x1.min(x2) } else { x1.max(x2) };
                self.push_integer(result)
            }
            OpCode::Within => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                let x = self.pop_integer()?;
                self.push_boolean(a <= x && x < b)
            }
            _ => Err(unexpected(instruction)),
        }
    }
}

fn check_divisor(divisor: &BigInt) -> VmResult<()> {
    if divisor.is_zero() {
        return Err(VmError::arithmetic("Attempted to divide by zero."));
    }
    Ok(())
}

/// `value ^ exponent mod modulus` with the remainder taking the sign of the
/// power, as for MOD
fn mod_pow(value: &BigInt, exponent: &BigInt, modulus: &BigInt) -> VmResult<BigInt> {
    if exponent.is_negative() {
        return Err(VmError::arithmetic(format!("Invalid exponent: {exponent}")));
    }
    check_divisor(modulus)?;
    let magnitude = value.magnitude().modpow(exponent.magnitude(), modulus.magnitude());
    let sign = if value.is_negative() && exponent.is_odd() { Sign::Minus } else { Sign::Plus };
    Ok(BigInt::from_biguint(sign, magnitude))
}

/// Multiplicative inverse of `value` modulo `modulus`, in `[0, modulus)`
fn mod_inverse(value: &BigInt, modulus: &BigInt) -> VmResult<BigInt> {
    if !value.is_positive() {
        return Err(VmError::arithmetic(format!("Value must be positive: {value}")));
    }
    if *modulus < BigInt::from(2) {
        return Err(VmError::arithmetic(format!("Invalid modulus: {modulus}")));
    }
    let gcd = value.extended_gcd(modulus);
    if !gcd.gcd.is_one() {
        return Err(VmError::arithmetic(format!("No modular inverse of {value} mod {modulus}")));
    }
    Ok(gcd.x.mod_floor(modulus))
}
