//! Call flags
//!
//! Permissions attached to an execution context. The engine only stores and
//! propagates them; hosts consult them when servicing SYSCALL and CALLT.

use bitflags::bitflags;

bitflags! {
    /// Permissions granted to a context
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallFlags: u8 {
        /// May read persistent state
        const READ_STATES = 0b0000_0001;
        /// May write persistent state
        const WRITE_STATES = 0b0000_0010;
        /// May call other contracts
        const ALLOW_CALL = 0b0000_0100;
        /// May emit notifications
        const ALLOW_NOTIFY = 0b0000_1000;

        /// Read and write state
        const STATES = Self::READ_STATES.bits() | Self::WRITE_STATES.bits();
        /// Read state and call
        const READ_ONLY = Self::READ_STATES.bits() | Self::ALLOW_CALL.bits();
        /// Everything
        const ALL = Self::STATES.bits() | Self::ALLOW_CALL.bits() | Self::ALLOW_NOTIFY.bits();
    }
}
