//! Integer encoding
//!
//! Integers are exchanged with byte strings in minimal two's-complement
//! little-endian form. Zero encodes to an empty sequence.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::{VmError, VmResult};

/// Encode an integer in minimal two's-complement little-endian form
pub fn to_bytes(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

/// Decode a two's-complement little-endian byte sequence
pub fn from_bytes(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::zero();
    }
    BigInt::from_signed_bytes_le(bytes)
}

/// Encoded width of `value` in bytes
pub fn encoded_len(value: &BigInt) -> usize {
    if value.is_zero() {
        return 0;
    }
    value.to_signed_bytes_le().len()
}

/// Fail when `value` needs more than `max_size` bytes
#[inline]
pub fn check_size(value: &BigInt, max_size: usize) -> VmResult<()> {
    let size = encoded_len(value);
    if size > max_size {
        return Err(VmError::arithmetic(format!(
            "Integer overflow: {size} bytes exceed the {max_size}-byte limit"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_empty() {
        assert!(to_bytes(&BigInt::zero()).is_empty());
        assert_eq!(from_bytes(&[]), BigInt::zero());
    }

    #[test]
    fn test_minimal_encoding() {
        assert_eq!(to_bytes(&BigInt::from(1)), vec![0x01]);
        assert_eq!(to_bytes(&BigInt::from(-1)), vec![0xff]);
        assert_eq!(to_bytes(&BigInt::from(127)), vec![0x7f]);
        assert_eq!(to_bytes(&BigInt::from(128)), vec![0x80, 0x00]);
        assert_eq!(to_bytes(&BigInt::from(-128)), vec![0x80]);
        assert_eq!(to_bytes(&BigInt::from(256)), vec![0x00, 0x01]);
    }

    #[test]
    fn test_non_minimal_input_decodes() {
        assert_eq!(from_bytes(&[0x01, 0x00, 0x00]), BigInt::from(1));
        assert_eq!(from_bytes(&[0xff, 0xff]), BigInt::from(-1));
    }

    #[test]
    fn test_check_size() {
        let max = (BigInt::from(1) << 255) - 1;
        assert!(check_size(&max, 32).is_ok());
        assert!(check_size(&(max + 1), 32).is_err());
        let min = -(BigInt::from(1i32) << 255usize);
        assert!(check_size(&min, 32).is_ok());
        assert!(check_size(&(min - 1), 32).is_err());
    }
}
