use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::constants::{Address, Word, PROGRAM_LENGTH};
use crate::display::{DisplayLink, DisplayState, Frame, Offer};

mod exception;
mod fs;
pub mod instructions;
pub mod memory;
mod registers;
mod stack;
pub mod syscalls;

pub use self::exception::Exception;
pub use self::fs::{Filesystem, InMemoryFilesystem, NativeFilesystem};
pub use self::instructions::{disassemble, Instruction, Opcode};
pub use self::memory::{Memory, MemoryError, MemoryLayout, Permissions, Region, RegionKind};
pub use self::registers::{Registers, Width};
pub use self::stack::{CallStack, OperandStack};
pub use self::syscalls::{Syscall, SyscallTable};

use self::instructions::Flow;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("CPU exception: {0}")]
    Exception(#[from] Exception),

    #[error("could not read host file {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cycle limit of {0} reached")]
    CycleLimit(usize),
}

// Implement a MemoryError -> ProcessorError conversion to simplify code
impl From<MemoryError> for ProcessorError {
    fn from(e: MemoryError) -> Self {
        Self::Exception(Exception::InvalidMemoryAccess(e))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("program image is {size} bytes long, the program ROM holds {}", PROGRAM_LENGTH)]
    TooLarge { size: usize },
}

type Result<T> = std::result::Result<T, ProcessorError>;

/// Knobs of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub layout: MemoryLayout,

    /// Directory the `read file chunk` syscall resolves paths against
    pub data_dir: Utf8PathBuf,

    /// Stop with [`ProcessorError::CycleLimit`] after this many steps
    pub max_cycles: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: MemoryLayout::default(),
            data_dir: Utf8PathBuf::from("data"),
            max_cycles: None,
        }
    }
}

/// Everything the memory map can observe: accumulators, stacks and the width flag
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Cpu {
    pub registers: Registers,
    pub stack: OperandStack,
    pub call_stack: CallStack,

    /// Operate on the 32-bit accumulator instead of the 8-bit one
    pub large_mode: bool,
}

impl Cpu {
    #[must_use]
    pub const fn width(&self) -> Width {
        Width::from_large_mode(self.large_mode)
    }

    /// Pop one operand of the given width
    pub fn pop(&mut self, width: Width) -> Word {
        match width {
            Width::Byte => Word::from(self.stack.pop_byte()),
            Width::Word => self.stack.pop_word(),
        }
    }

    /// Push one operand of the given width. In byte width, only the low byte is pushed.
    pub fn push(&mut self, width: Width, value: Word) {
        match width {
            Width::Byte => self.stack.push_byte(value.to_le_bytes()[0]),
            Width::Word => self.stack.push_word(value),
        }
    }
}

pub struct Computer {
    pub cpu: Cpu,
    pub memory: Memory,
    pub display: DisplayState,
    pub running: bool,
    pub initialized: bool,
    pub cycles: usize,
    pub exit_code: Option<Word>,

    /// Lines printed by the program
    pub console: Vec<String>,

    max_cycles: Option<usize>,
    syscalls: Arc<SyscallTable>,
    filesystem: Box<dyn Filesystem>,
    display_link: Option<DisplayLink>,
}

impl Default for Computer {
    fn default() -> Self {
        Self::from_parts(
            &[0; PROGRAM_LENGTH],
            &Config::default(),
            Arc::new(SyscallTable::standard()),
        )
    }
}

impl std::fmt::Debug for Computer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Computer {{ cpu: {:?}, running: {}, cycles: {}, memory: [...] }}",
            self.cpu, self.running, self.cycles
        )
    }
}

impl Computer {
    /// Load a program image at the start of the program ROM
    ///
    /// # Errors
    ///
    /// Fails if the image does not fit in the program ROM. Shorter images are padded with zeroes.
    pub fn new(
        image: &[u8],
        config: &Config,
        syscalls: Arc<SyscallTable>,
    ) -> std::result::Result<Self, LoadError> {
        if image.len() > PROGRAM_LENGTH {
            return Err(LoadError::TooLarge { size: image.len() });
        }

        let mut rom = image.to_vec();
        rom.resize(PROGRAM_LENGTH, 0);
        Ok(Self::from_parts(&rom, config, syscalls))
    }

    fn from_parts(rom: &[u8], config: &Config, syscalls: Arc<SyscallTable>) -> Self {
        let memory = Memory::with_layout(&config.layout, rom);
        let mut cpu = Cpu::default();
        cpu.registers.pc = memory.program_origin();

        Self {
            cpu,
            memory,
            display: DisplayState::default(),
            running: true,
            initialized: false,
            cycles: 0,
            exit_code: None,
            console: Vec::new(),
            max_cycles: config.max_cycles,
            syscalls,
            filesystem: Box::new(NativeFilesystem::new(config.data_dir.clone())),
            display_link: None,
        }
    }

    /// Serve the `read file chunk` syscall from another filesystem
    #[must_use]
    pub fn with_filesystem(mut self, filesystem: impl Filesystem + 'static) -> Self {
        self.filesystem = Box::new(filesystem);
        self
    }

    /// Hand blitted frames to a display
    #[must_use]
    pub fn with_display_link(mut self, link: DisplayLink) -> Self {
        self.display_link = Some(link);
        self
    }

    pub(crate) fn filesystem(&self) -> &dyn Filesystem {
        self.filesystem.as_ref()
    }

    pub(crate) fn jump(&mut self, address: Address) {
        debug!("Jumping to address {:#x}", address);
        self.cpu.registers.pc = address;
    }

    pub(crate) fn set_carry(&mut self, carry: bool) {
        self.cpu.registers.carry = u8::from(carry);
    }

    /// Read a value of the given width from memory
    pub(crate) fn load(&self, width: Width, address: Address) -> Result<Word> {
        let value = match width {
            Width::Byte => Word::from(self.memory.read8(&self.cpu, address)?),
            Width::Word => self.memory.read32(&self.cpu, address)?,
        };
        Ok(value)
    }

    /// Write a value of the given width to memory
    pub(crate) fn store(&mut self, width: Width, address: Address, value: Word) -> Result<()> {
        match width {
            Width::Byte => {
                self.memory
                    .write8(&mut self.cpu, address, value.to_le_bytes()[0])?;
            }
            Width::Word => self.memory.write32(&mut self.cpu, address, value)?,
        }
        Ok(())
    }

    /// Read a string made of a length byte followed by that many characters
    pub(crate) fn read_string(&self, address: Address) -> Result<String> {
        let len = self.memory.read8(&self.cpu, address)?;
        let mut text = String::with_capacity(usize::from(len));
        for i in 0..Address::from(len) {
            let byte = self.memory.read8(&self.cpu, address.wrapping_add(1 + i))?;
            text.push(char::from(byte));
        }
        Ok(text)
    }

    pub(crate) fn syscall(&mut self, index: Word) -> Result<()> {
        let handler = self
            .syscalls
            .get(index)
            .ok_or(Exception::UnknownSyscall(index))?;
        debug!(index, "Calling syscall");
        handler(self)
    }

    #[tracing::instrument(skip(self), err)]
    fn decode_instruction(&self) -> Result<Instruction> {
        self.instruction_at(self.cpu.registers.pc)
    }

    /// Decode the instruction stored at a global address, without executing it
    ///
    /// # Errors
    ///
    /// Fails if the byte at `address` is not an opcode, or if the operand straddles a region end.
    pub fn instruction_at(&self, address: Address) -> Result<Instruction> {
        let opcode = self.memory.read8(&self.cpu, address)?;
        let opcode = Opcode::try_from(opcode)
            .map_err(|_| Exception::InvalidInstruction { opcode, address })?;

        let operand = if opcode.has_operand() {
            self.memory.read32(&self.cpu, address.wrapping_add(1))?
        } else {
            0
        };

        Ok(Instruction::decode(opcode, operand))
    }

    /// Fetch, decode and execute one instruction
    ///
    /// # Errors
    ///
    /// Fails on a CPU exception or a host I/O error in a syscall. The machine state is left as
    /// it was when the fault happened.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn step(&mut self) -> Result<()> {
        let inst = self.decode_instruction()?;
        debug!(pc = self.cpu.registers.pc, "Executing instruction \"{}\"", inst);

        if inst.execute(self)? == Flow::Next {
            let len = Address::try_from(inst.encoded_len()).unwrap_or(1);
            self.cpu.registers.pc = self.cpu.registers.pc.wrapping_add(len);
        }

        self.cycles += 1;
        debug!("Register state {}", self.cpu.registers);
        self.present();
        Ok(())
    }

    /// Check the configured cycle limit
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::CycleLimit`] once as many steps as the limit were executed.
    pub fn check_cycle_limit(&self) -> Result<()> {
        match self.max_cycles {
            Some(limit) if self.cycles >= limit => Err(ProcessorError::CycleLimit(limit)),
            _ => Ok(()),
        }
    }

    /// Step until the program halts
    ///
    /// # Errors
    ///
    /// Stops at the first failing step, or when the configured cycle limit is reached.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<()> {
        while self.running {
            self.check_cycle_limit()?;
            self.step()?;
        }

        info!(cycles = self.cycles, exit_code = ?self.exit_code, "Program halted");
        Ok(())
    }

    /// Hand a frame to the display if a blit is pending and the display took the last one
    fn present(&mut self) {
        if !self.display.blit_requested {
            return;
        }

        let Some(link) = &self.display_link else {
            trace!("No display attached, dropping the blit request");
            self.display.blit_requested = false;
            return;
        };

        let vram = self
            .memory
            .region(RegionKind::Vram)
            .map_or(&[][..], Region::data);

        match Frame::capture(&self.display, vram) {
            Ok(frame) => match link.offer(frame) {
                Offer::Delivered => self.display.blit_requested = false,
                Offer::Busy => trace!("Display busy, keeping the blit request"),
                Offer::Disconnected => {
                    warn!("Display disconnected");
                    self.display_link = None;
                    self.display.blit_requested = false;
                }
            },
            Err(e) => {
                error!("Dropping frame: {}", e);
                self.display.blit_requested = false;
            }
        }
    }
}
