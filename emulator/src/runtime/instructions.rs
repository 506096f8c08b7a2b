use parse_display::{Display, FromStr};
use thiserror::Error;
use tracing::{debug, warn};

use super::{exception::Exception, registers::Width, Computer, ProcessorError};
use crate::constants::{Address, Word};
use crate::util::{as_address, as_word};

/// The 23 opcodes, numbered by their encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromStr)]
#[display(style = "UPPERCASE")]
pub enum Opcode {
    Bge = 0,
    Ldi = 1,
    Cmp = 2,
    Add = 3,
    Push = 4,
    Pop = 5,
    Ldr = 6,
    Str = 7,
    Clc = 8,
    Sec = 9,
    Ret = 10,
    Hlt = 11,
    Grt = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Sys = 16,
    Flp = 17,
    Les = 18,
    Cpop = 19,
    Lshft = 20,
    Rshft = 21,
    Iret = 22,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid opcode {0:#04x}")]
pub struct InvalidOpcode(pub u8);

impl Opcode {
    const ALL: [Opcode; 23] = [
        Opcode::Bge,
        Opcode::Ldi,
        Opcode::Cmp,
        Opcode::Add,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Ldr,
        Opcode::Str,
        Opcode::Clc,
        Opcode::Sec,
        Opcode::Ret,
        Opcode::Hlt,
        Opcode::Grt,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Sys,
        Opcode::Flp,
        Opcode::Les,
        Opcode::Cpop,
        Opcode::Lshft,
        Opcode::Rshft,
        Opcode::Iret,
    ];

    /// Look up a mnemonic, case-insensitively
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        mnemonic.to_ascii_uppercase().parse().ok()
    }

    /// Whether the opcode is followed by a 4-byte operand
    #[must_use]
    pub const fn has_operand(self) -> bool {
        matches!(self, Opcode::Bge | Opcode::Ldi)
    }

    /// Number of bytes of the encoded instruction
    #[must_use]
    pub const fn encoded_len(self) -> usize {
        if self.has_operand() {
            5
        } else {
            1
        }
    }

    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or(InvalidOpcode(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// If the carry is set, push the return address and branch to a program offset
    Bge(Address),

    /// Load an immediate in the register
    Ldi(Word),

    /// Set the carry if the popped value equals the register
    Cmp,

    /// Add the popped value and the carry to the register
    Add,

    /// Push the register
    Push,

    /// Pop into the register
    Pop,

    /// Load the register from the popped address
    Ldr,

    /// Store the popped value at the address held by the register
    Str,

    /// Clear the carry
    Clc,

    /// Set the carry
    Sec,

    /// If the carry is set, return to the last pushed return address
    Ret,

    /// Stop the computer
    Hlt,

    /// Set the carry if the register is greater than the popped value
    Grt,

    /// Popped value minus the register
    Sub,

    /// Popped value times the register times the carry
    Mul,

    /// Popped value divided by the register
    Div,

    /// Call the host syscall selected by the register
    Sys,

    /// Flip the carry
    Flp,

    /// Set the carry if the register is less than the popped value
    Les,

    /// Drop the last return address
    Cpop,

    /// Popped value shifted left by the register
    Lshft,

    /// Popped value shifted right by the register
    Rshft,

    /// Return from an interrupt
    Iret,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.opcode().to_string();
        match self {
            Self::Bge(target) => write!(f, "{mnemonic:<5} ${target:X}"),
            Self::Ldi(value) => write!(f, "{mnemonic:<5} #{value}"),
            _ => f.write_str(&mnemonic),
        }
    }
}

/// What the program counter does after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Move to the next instruction
    Next,

    /// The instruction already set the program counter
    Jump,
}

impl Instruction {
    /// Build an instruction from its opcode and operand.
    ///
    /// The operand is ignored for opcodes which do not carry one.
    #[must_use]
    pub const fn decode(opcode: Opcode, operand: Word) -> Self {
        match opcode {
            Opcode::Bge => Self::Bge(as_address(operand)),
            Opcode::Ldi => Self::Ldi(operand),
            Opcode::Cmp => Self::Cmp,
            Opcode::Add => Self::Add,
            Opcode::Push => Self::Push,
            Opcode::Pop => Self::Pop,
            Opcode::Ldr => Self::Ldr,
            Opcode::Str => Self::Str,
            Opcode::Clc => Self::Clc,
            Opcode::Sec => Self::Sec,
            Opcode::Ret => Self::Ret,
            Opcode::Hlt => Self::Hlt,
            Opcode::Grt => Self::Grt,
            Opcode::Sub => Self::Sub,
            Opcode::Mul => Self::Mul,
            Opcode::Div => Self::Div,
            Opcode::Sys => Self::Sys,
            Opcode::Flp => Self::Flp,
            Opcode::Les => Self::Les,
            Opcode::Cpop => Self::Cpop,
            Opcode::Lshft => Self::Lshft,
            Opcode::Rshft => Self::Rshft,
            Opcode::Iret => Self::Iret,
        }
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Bge(_) => Opcode::Bge,
            Self::Ldi(_) => Opcode::Ldi,
            Self::Cmp => Opcode::Cmp,
            Self::Add => Opcode::Add,
            Self::Push => Opcode::Push,
            Self::Pop => Opcode::Pop,
            Self::Ldr => Opcode::Ldr,
            Self::Str => Opcode::Str,
            Self::Clc => Opcode::Clc,
            Self::Sec => Opcode::Sec,
            Self::Ret => Opcode::Ret,
            Self::Hlt => Opcode::Hlt,
            Self::Grt => Opcode::Grt,
            Self::Sub => Opcode::Sub,
            Self::Mul => Opcode::Mul,
            Self::Div => Opcode::Div,
            Self::Sys => Opcode::Sys,
            Self::Flp => Opcode::Flp,
            Self::Les => Opcode::Les,
            Self::Cpop => Opcode::Cpop,
            Self::Lshft => Opcode::Lshft,
            Self::Rshft => Opcode::Rshft,
            Self::Iret => Opcode::Iret,
        }
    }

    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        self.opcode().encoded_len()
    }

    /// Append the binary encoding of the instruction
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().byte());
        match self {
            Self::Bge(target) => out.extend_from_slice(&target.to_le_bytes()),
            Self::Ldi(value) => out.extend_from_slice(&value.to_le_bytes()),
            _ => {}
        }
    }

    /// Execute the instruction
    #[tracing::instrument(skip(computer))]
    pub(crate) fn execute(&self, computer: &mut Computer) -> Result<Flow, ProcessorError> {
        use Instruction as I;

        let width = computer.cpu.width();

        match self {
            I::Bge(target) => {
                if computer.cpu.registers.carry_set() {
                    let pc = computer.cpu.registers.pc;
                    computer.cpu.call_stack.push(pc.wrapping_add(5));
                    let address = computer.memory.program_origin().wrapping_add(*target);
                    computer.jump(address);
                    return Ok(Flow::Jump);
                }
            }

            I::Ldi(value) => computer.cpu.registers.set(width, *value),

            I::Cmp => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                computer.set_carry(a == b);
                debug!("cmp({}, {}) => {}", a, b, computer.cpu.registers.carry);
            }

            I::Grt => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                computer.set_carry(b > a);
                debug!("{} > {} => {}", b, a, computer.cpu.registers.carry);
            }

            I::Les => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                computer.set_carry(b < a);
                debug!("{} < {} => {}", b, a, computer.cpu.registers.carry);
            }

            I::Add => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                let carry = Word::from(computer.cpu.registers.carry);
                let res = match width {
                    // Overflowing the byte resets the register
                    Width::Byte => {
                        let sum = a + b + carry;
                        if sum > 0xFF {
                            0
                        } else {
                            sum
                        }
                    }
                    Width::Word => a.wrapping_add(b).wrapping_add(carry),
                };
                debug!("{} + {} + {} = {}", a, b, carry, res);
                computer.cpu.registers.set(width, res);
            }

            I::Sub => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                let res = match width {
                    Width::Byte => (a - b).max(0),
                    Width::Word => a.wrapping_sub(b),
                };
                debug!("{} - {} = {}", a, b, res);
                computer.cpu.registers.set(width, res);
            }

            I::Mul => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                let carry = Word::from(computer.cpu.registers.carry);
                let res = match width {
                    Width::Byte => (a * b * carry).clamp(0, 0xFF),
                    Width::Word => a.wrapping_mul(b).wrapping_mul(carry),
                };
                debug!("{} * {} * {} = {}", a, b, carry, res);
                computer.cpu.registers.set(width, res);
            }

            I::Div => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                if b == 0 {
                    return Err(Exception::DivByZero.into());
                }
                let res = match width {
                    Width::Byte => (a / b).max(0),
                    Width::Word => a.wrapping_div(b),
                };
                debug!("{} / {} = {}", a, b, res);
                computer.cpu.registers.set(width, res);
            }

            I::Lshft => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                let res = shift(a, b, width, u32::checked_shl);
                debug!("{} << {} = {}", a, b, res);
                computer.cpu.registers.set(width, res);
            }

            I::Rshft => {
                let a = computer.cpu.pop(width);
                let b = computer.cpu.registers.get(width);
                let res = shift(a, b, width, u32::checked_shr);
                debug!("{} >> {} = {}", a, b, res);
                computer.cpu.registers.set(width, res);
            }

            I::Push => {
                let val = computer.cpu.registers.get(width);
                debug!("push({})", val);
                computer.cpu.push(width, val);
            }

            I::Pop => {
                let val = computer.cpu.pop(width);
                debug!("pop => {}", val);
                computer.cpu.registers.set(width, val);
            }

            I::Ldr => {
                let address = as_address(computer.cpu.pop(width));
                let val = computer.load(width, address)?;
                debug!("[{:#x}] => {}", address, val);
                computer.cpu.registers.set(width, val);
            }

            I::Str => {
                let address = as_address(computer.cpu.registers.get(width));
                let val = computer.cpu.pop(width);
                debug!("[{:#x}] <= {}", address, val);
                computer.store(width, address, val)?;
            }

            I::Clc => computer.set_carry(false),

            I::Sec => computer.set_carry(true),

            I::Flp => {
                let carry = computer.cpu.registers.carry;
                computer.set_carry(carry == 0);
            }

            I::Ret => {
                if computer.cpu.registers.carry > 0 {
                    let ret = computer.cpu.call_stack.pop().unwrap_or_else(|| {
                        warn!("Call stack is empty, returning to address 0");
                        0
                    });
                    debug!("Returning to {:#x}", ret);
                    computer.jump(ret);
                    return Ok(Flow::Jump);
                }
            }

            I::Cpop => {
                if computer.cpu.call_stack.pop().is_none() {
                    tracing::error!("Call stack is empty");
                }
            }

            I::Hlt => computer.running = false,

            I::Sys => {
                let index = computer.cpu.registers.get(width);
                computer.syscall(index)?;
            }

            I::Iret => return Err(Exception::Unimplemented(Opcode::Iret).into()),
        }

        Ok(Flow::Next)
    }
}

/// Shift the raw bits of `value` by `amount`. Shifting by the width or more yields 0.
fn shift(value: Word, amount: Word, width: Width, op: fn(u32, u32) -> Option<u32>) -> Word {
    let amount = as_address(amount);
    if amount >= width.bits() {
        return 0;
    }

    let bits = op(as_address(value), amount).unwrap_or(0);
    match width {
        Width::Byte => Word::from(bits.to_le_bytes()[0]),
        Width::Word => as_word(bits),
    }
}

/// Decode a program image, skipping the zero padding at its end.
///
/// Each entry holds the offset of the instruction in the image.
#[must_use]
pub fn disassemble(image: &[u8]) -> Vec<(usize, Result<Instruction, InvalidOpcode>)> {
    let end = image.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
    let mut listing = Vec::new();
    let mut offset = 0;

    while offset < end {
        let entry = match Opcode::try_from(image[offset]) {
            Ok(opcode) => {
                let mut operand = [0; 4];
                if opcode.has_operand() {
                    // A truncated operand reads as zeroes
                    for (i, byte) in operand.iter_mut().enumerate() {
                        *byte = image.get(offset + 1 + i).copied().unwrap_or(0);
                    }
                }
                Ok(Instruction::decode(opcode, Word::from_le_bytes(operand)))
            }
            Err(e) => Err(e),
        };

        let len = entry.as_ref().map_or(1, Instruction::encoded_len);
        listing.push((offset, entry));
        offset += len;
    }

    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_test() {
        assert_eq!(Opcode::from_mnemonic("ldi"), Some(Opcode::Ldi));
        assert_eq!(Opcode::from_mnemonic("LSHFT"), Some(Opcode::Lshft));
        assert_eq!(Opcode::from_mnemonic("PG"), None);
        assert_eq!(Opcode::from_mnemonic("NOP"), None);

        for (byte, opcode) in Opcode::ALL.iter().enumerate() {
            assert_eq!(usize::from(opcode.byte()), byte);
            assert_eq!(Opcode::try_from(opcode.byte()), Ok(*opcode));
            assert_eq!(Opcode::from_mnemonic(&opcode.to_string()), Some(*opcode));
        }

        assert_eq!(Opcode::try_from(23), Err(InvalidOpcode(23)));
    }

    #[test]
    fn encoded_len_test() {
        assert_eq!(Opcode::Bge.encoded_len(), 5);
        assert_eq!(Opcode::Ldi.encoded_len(), 5);
        let single = Opcode::ALL.iter().filter(|o| o.encoded_len() == 1).count();
        assert_eq!(single, 21);
    }

    #[test]
    fn encode_test() {
        let mut out = Vec::new();
        Instruction::Ldi(0x0102_0304).encode(&mut out);
        Instruction::Hlt.encode(&mut out);
        Instruction::Bge(0x10).encode(&mut out);
        assert_eq!(out, vec![1, 4, 3, 2, 1, 11, 0, 0x10, 0, 0, 0]);
    }

    #[test]
    fn display_test() {
        assert_eq!(Instruction::Bge(0x1F).to_string(), "BGE   $1F");
        assert_eq!(Instruction::Ldi(42).to_string(), "LDI   #42");
        assert_eq!(Instruction::Lshft.to_string(), "LSHFT");
    }

    #[test]
    fn disassemble_test() {
        let mut image = Vec::new();
        Instruction::Ldi(5).encode(&mut image);
        Instruction::Push.encode(&mut image);
        image.push(0xFE);
        Instruction::Hlt.encode(&mut image);
        image.resize(32, 0);

        let listing = disassemble(&image);
        assert_eq!(
            listing,
            vec![
                (0, Ok(Instruction::Ldi(5))),
                (5, Ok(Instruction::Push)),
                (6, Err(InvalidOpcode(0xFE))),
                (7, Ok(Instruction::Hlt)),
            ]
        );
    }

    #[test]
    fn shift_test() {
        assert_eq!(shift(0b1000_0001, 1, Width::Byte, u32::checked_shl), 0b10);
        assert_eq!(shift(0x80, 7, Width::Byte, u32::checked_shr), 1);
        assert_eq!(shift(1, 8, Width::Byte, u32::checked_shl), 0);
        assert_eq!(shift(-1, 28, Width::Word, u32::checked_shr), 0xF);
        assert_eq!(shift(1, 31, Width::Word, u32::checked_shl), i32::MIN);
        assert_eq!(shift(1, -1, Width::Word, u32::checked_shl), 0);
    }
}
