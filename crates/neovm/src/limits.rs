//! Engine resource limits
//!
//! All numeric policy the engine enforces lives here so that the embedding
//! layer can pick protocol values per deployment. Limits can be loaded from
//! any serde format; missing fields take their defaults.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::defaults::*;
use crate::{VmError, VmResult};

/// Restrictions applied while a script executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionEngineLimits {
    /// Largest shift and POW exponent
    pub max_shift: u32,
    /// Maximum evaluation stack length and tracked reference count
    pub max_stack_size: usize,
    /// Maximum ByteString/Buffer length
    pub max_item_size: usize,
    /// Maximum number of bytes one equality check may compare
    pub max_comparable_size: usize,
    /// Maximum invocation stack depth
    pub max_invocation_stack_size: usize,
    /// Maximum number of nested try regions per context
    pub max_try_nesting_depth: usize,
    /// Maximum nesting followed by deep copies
    pub max_nesting_depth: usize,
    /// Maximum Integer width in bytes
    pub max_integer_size: usize,
    /// Whether failures raised inside the VM can be caught by scripts
    pub catch_engine_exceptions: bool,
}

impl Default for ExecutionEngineLimits {
    fn default() -> Self {
        Self {
            max_shift: DEFAULT_MAX_SHIFT,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            max_comparable_size: DEFAULT_MAX_COMPARABLE_SIZE,
            max_invocation_stack_size: DEFAULT_MAX_INVOCATION_STACK_SIZE,
            max_try_nesting_depth: DEFAULT_MAX_TRY_NESTING_DEPTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_integer_size: DEFAULT_MAX_INTEGER_SIZE,
            catch_engine_exceptions: true,
        }
    }
}

impl ExecutionEngineLimits {
    /// Fail when `size` exceeds `max_item_size`
    #[inline]
    pub fn assert_max_item_size(&self, size: usize) -> VmResult<()> {
        if size > self.max_item_size {
            return Err(VmError::invalid_operation(format!(
                "MaxItemSize exceed: {size}/{}",
                self.max_item_size
            )));
        }
        Ok(())
    }

    /// Validate a shift amount or POW exponent and narrow it
    pub fn assert_shift(&self, shift: &BigInt) -> VmResult<u32> {
        match u32::try_from(shift) {
            Ok(value) if value <= self.max_shift => Ok(value),
            _ => Err(VmError::invalid_operation(format!("Invalid shift value: {shift}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = ExecutionEngineLimits::default();
        assert_eq!(limits.max_stack_size, 2048);
        assert_eq!(limits.max_item_size, 131070);
        assert_eq!(limits.max_integer_size, 32);
        assert!(limits.catch_engine_exceptions);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let limits: ExecutionEngineLimits = toml::from_str("max_stack_size = 16").unwrap();
        assert_eq!(limits.max_stack_size, 16);
        assert_eq!(limits.max_shift, DEFAULT_MAX_SHIFT);
    }

    #[test]
    fn test_json_roundtrip() {
        let limits = ExecutionEngineLimits { catch_engine_exceptions: false, ..Default::default() };
        let json = serde_json::to_string(&limits).unwrap();
        let back: ExecutionEngineLimits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limits);
    }

    #[test]
    fn test_assert_shift() {
        let limits = ExecutionEngineLimits::default();
        assert_eq!(limits.assert_shift(&BigInt::from(256)).unwrap(), 256);
        assert!(limits.assert_shift(&BigInt::from(257)).is_err());
        assert!(limits.assert_shift(&BigInt::from(-1)).is_err());
    }
}
