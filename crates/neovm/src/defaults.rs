//! Default constants for engine configuration.
//!
//! These are the N3 protocol values. Deployments override them through
//! [`ExecutionEngineLimits`](crate::limits::ExecutionEngineLimits).

/// Largest shift (and POW exponent) accepted by SHL, SHR and POW.
pub const DEFAULT_MAX_SHIFT: u32 = 256;

/// Maximum number of items on an evaluation stack, and the upper bound for
/// the reference counter's tracked total.
pub const DEFAULT_MAX_STACK_SIZE: usize = 2 * 1024;

/// Maximum length of a ByteString or Buffer in bytes.
pub const DEFAULT_MAX_ITEM_SIZE: usize = u16::MAX as usize * 2;

/// Maximum number of bytes compared by a single equality check.
pub const DEFAULT_MAX_COMPARABLE_SIZE: usize = 65536;

/// Maximum depth of the invocation stack.
pub const DEFAULT_MAX_INVOCATION_STACK_SIZE: usize = 1024;

/// Maximum number of nested try regions in one context.
pub const DEFAULT_MAX_TRY_NESTING_DEPTH: usize = 16;

/// Maximum nesting followed by a deep copy.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

/// Maximum encoded width of an Integer in bytes (256 bits).
pub const DEFAULT_MAX_INTEGER_SIZE: usize = 32;

/// Maximum encoded length of a map key in bytes.
pub const MAX_MAP_KEY_SIZE: usize = 64;
