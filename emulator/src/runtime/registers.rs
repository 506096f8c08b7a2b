use parse_display::Display;

use crate::constants::{Address, Word, PROGRAM_ORIGIN};

/// Operand width of every register and stack instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum Width {
    /// 8-bit: `register` and single bytes on the operand stack
    Byte,

    /// 32-bit: `lregister` and 4-byte words on the operand stack
    Word,
}

impl Width {
    #[must_use]
    pub const fn from_large_mode(large_mode: bool) -> Self {
        if large_mode {
            Self::Word
        } else {
            Self::Byte
        }
    }

    /// Number of bytes moved by a push or pop in this width
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 4,
        }
    }

    /// Number of bits of a value in this width
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Byte => u8::BITS,
            Self::Word => u32::BITS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    /// 8-bit accumulator
    pub register: u8,

    /// 32-bit accumulator
    pub lregister: Word,

    /// Carry flag, holds 0 or 1 unless written through the system page
    pub carry: u8,

    /// Program counter, as a global address
    pub pc: Address,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            register: 0,
            lregister: 0,
            carry: 0,
            pc: PROGRAM_ORIGIN,
        }
    }
}

impl Registers {
    /// Value of the accumulator selected by `width`
    #[must_use]
    pub fn get(&self, width: Width) -> Word {
        match width {
            Width::Byte => Word::from(self.register),
            Width::Word => self.lregister,
        }
    }

    /// Set the accumulator selected by `width`. In byte width, only the low byte is kept.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set(&mut self, width: Width, value: Word) {
        match width {
            Width::Byte => self.register = value as u8,
            Width::Word => self.lregister = value,
        }
    }

    #[must_use]
    pub fn carry_set(&self) -> bool {
        self.carry == 1
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "r = {} | lr = {} | carry = {} | pc = {:#010x}",
            self.register, self.lregister, self.carry, self.pc
        )
    }
}
