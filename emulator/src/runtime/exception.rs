use thiserror::Error;

use super::instructions::Opcode;
use super::memory::MemoryError;
use crate::constants::{Address, Word};

/// Faults raised by the CPU itself. They all abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Exception {
    #[error("division by zero")]
    DivByZero,

    #[error("invalid instruction {opcode:#04x} at address {address:#x}")]
    InvalidInstruction { opcode: u8, address: Address },

    #[error("unimplemented instruction {0}")]
    Unimplemented(Opcode),

    #[error("unknown syscall {0}")]
    UnknownSyscall(Word),

    #[error("invalid memory access ({0})")]
    InvalidMemoryAccess(#[from] MemoryError),
}

impl Exception {
    /// Numeric code of the exception, as shown in diagnostics
    #[must_use]
    pub const fn code(&self) -> Word {
        match self {
            Exception::DivByZero => 1,
            Exception::InvalidInstruction { .. } => 2,
            Exception::Unimplemented(_) => 3,
            Exception::UnknownSyscall(_) => 4,
            Exception::InvalidMemoryAccess(_) => 5,
        }
    }
}
