//! Segmented address space.
//!
//! Regions are registered in order and laid out back to back: a global address belongs to
//! the first region whose cumulative end is above it. Accesses the region does not permit,
//! and accesses past the last region, are soft faults: they are logged and degrade to a
//! zero read or an ignored write. Writes to the program ROM or the stack view, and 4-byte
//! accesses straddling the end of a region, are hard faults.

use bitflags::bitflags;
use parse_display::Display;
use thiserror::Error;
use tracing::{error, trace, warn};

use super::Cpu;
use crate::constants::{
    Address, Word, DEFAULT_REGION_SIZE, SYSTEM_CALL_DEPTH, SYSTEM_CARRY, SYSTEM_PC,
};
use crate::util::{as_address, as_word, read_word, write_word};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const READ    = 0b001;
        const WRITE   = 0b010;
        const EXECUTE = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RegionKind {
    #[display("RAM")]
    Ram,

    #[display("VRAM")]
    Vram,

    #[display("system page")]
    SystemPage,

    #[display("stack")]
    Stack,

    #[display("program ROM")]
    ProgramRom,
}

impl RegionKind {
    /// Regions which can never be written to, whatever their permissions say
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Stack | Self::ProgramRom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum Access {
    Read,
    Write,
}

/// A degraded access, logged and otherwise ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SoftFault {
    #[error("unauthorized memory {access} in {region} at address {address:#x}")]
    Unauthorized {
        region: RegionKind,
        access: Access,
        address: Address,
    },

    #[error("out of range memory {access} at address {address:#x}")]
    OutOfRange { access: Access, address: Address },
}

impl SoftFault {
    fn log(&self) {
        match self {
            Self::Unauthorized { .. } => error!("{self}"),
            Self::OutOfRange { .. } => warn!("{self}"),
        }
    }
}

/// An access that aborts the execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("write to the read-only {region} at address {address:#x}")]
    ReadOnly {
        region: RegionKind,
        address: Address,
    },

    #[error("4-byte access at address {address:#x} overflows the {region}")]
    SpanOutOfBounds {
        region: RegionKind,
        address: Address,
    },
}

#[derive(Debug, Clone)]
pub struct Region {
    kind: RegionKind,
    size: Address,
    permissions: Permissions,

    /// Backing bytes. Empty for the system page and the stack view, which mirror CPU state.
    data: Vec<u8>,
}

impl Region {
    fn buffer(kind: RegionKind, size: Address) -> Self {
        Self {
            kind,
            size,
            permissions: Permissions::READ | Permissions::WRITE,
            data: vec![0; size as usize],
        }
    }

    #[must_use]
    pub fn ram(size: Address) -> Self {
        Self::buffer(RegionKind::Ram, size)
    }

    #[must_use]
    pub fn vram(size: Address) -> Self {
        Self::buffer(RegionKind::Vram, size)
    }

    #[must_use]
    pub fn system_page(size: Address) -> Self {
        Self {
            kind: RegionKind::SystemPage,
            size,
            permissions: Permissions::READ | Permissions::WRITE,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn stack(size: Address) -> Self {
        Self {
            kind: RegionKind::Stack,
            size,
            permissions: Permissions::READ,
            data: Vec::new(),
        }
    }

    /// The program ROM, sized after the image. Bytes past the 32-bit address space are not mapped.
    #[must_use]
    pub fn program_rom(image: &[u8]) -> Self {
        Self {
            kind: RegionKind::ProgramRom,
            size: Address::try_from(image.len()).unwrap_or(Address::MAX),
            permissions: Permissions::READ | Permissions::EXECUTE,
            data: image.to_vec(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        self.kind
    }

    #[must_use]
    pub const fn size(&self) -> Address {
        self.size
    }

    #[must_use]
    pub const fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Backing bytes of buffer regions (RAM, VRAM, program ROM)
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn read8(&self, cpu: &Cpu, offset: Address) -> u8 {
        match self.kind {
            RegionKind::Ram | RegionKind::Vram | RegionKind::ProgramRom => {
                self.data[offset as usize]
            }

            RegionKind::SystemPage => system_value(cpu, offset).to_le_bytes()[0],

            RegionKind::Stack => cpu.stack.view().nth(offset as usize).unwrap_or_else(|| {
                error!(offset, depth = cpu.stack.len(), "Out of bounds stack read");
                0
            }),
        }
    }

    fn read32(&self, cpu: &Cpu, offset: Address) -> Word {
        match self.kind {
            RegionKind::Ram | RegionKind::Vram | RegionKind::ProgramRom => {
                // The span was checked against the region size already
                read_word(&self.data, offset as usize).unwrap_or_default()
            }

            RegionKind::SystemPage => system_value(cpu, offset),

            RegionKind::Stack => {
                let bytes: Vec<u8> = cpu.stack.view().skip(offset as usize).take(4).collect();
                if let Some(word) = read_word(&bytes, 0) {
                    word
                } else {
                    error!(offset, depth = cpu.stack.len(), "Out of bounds stack read");
                    0
                }
            }
        }
    }

    fn write32(
        &mut self,
        cpu: &mut Cpu,
        offset: Address,
        address: Address,
        value: Word,
    ) -> Result<(), MemoryError> {
        match self.kind {
            RegionKind::Ram | RegionKind::Vram => {
                write_word(&mut self.data, offset as usize, value);
            }

            RegionKind::SystemPage => set_system_value(cpu, offset, value),

            RegionKind::Stack | RegionKind::ProgramRom => {
                return Err(MemoryError::ReadOnly {
                    region: self.kind,
                    address,
                });
            }
        }

        Ok(())
    }

    fn write8(
        &mut self,
        cpu: &mut Cpu,
        offset: Address,
        address: Address,
        value: u8,
    ) -> Result<(), MemoryError> {
        match self.kind {
            RegionKind::Ram | RegionKind::Vram => {
                self.data[offset as usize] = value;
            }

            RegionKind::SystemPage => set_system_value(cpu, offset, Word::from(value)),

            RegionKind::Stack | RegionKind::ProgramRom => {
                return Err(MemoryError::ReadOnly {
                    region: self.kind,
                    address,
                });
            }
        }

        Ok(())
    }
}

fn system_value(cpu: &Cpu, offset: Address) -> Word {
    match offset {
        SYSTEM_PC => as_word(cpu.registers.pc),
        SYSTEM_CARRY => Word::from(cpu.registers.carry),
        SYSTEM_CALL_DEPTH => Word::try_from(cpu.call_stack.depth()).unwrap_or(Word::MAX),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn set_system_value(cpu: &mut Cpu, offset: Address, value: Word) {
    match offset {
        SYSTEM_PC => cpu.registers.pc = as_address(value),
        SYSTEM_CARRY => cpu.registers.carry = value as u8,
        SYSTEM_CALL_DEPTH => warn!("Cannot write to the call stack depth"),
        _ => trace!(offset, "Ignoring write to an unmapped system page offset"),
    }
}

/// Sizes of the regions laid out before the program ROM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    pub ram_size: Address,
    pub vram_size: Address,
    pub system_page_size: Address,
    pub stack_size: Address,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_REGION_SIZE,
            vram_size: DEFAULT_REGION_SIZE,
            system_page_size: DEFAULT_REGION_SIZE,
            stack_size: DEFAULT_REGION_SIZE,
        }
    }
}

/// Where an access landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub index: usize,
    pub kind: RegionKind,
    pub offset: Address,
}

#[derive(Debug, Default, Clone)]
pub struct Memory {
    regions: Vec<Region>,
}

impl Memory {
    /// Lay out RAM, VRAM, system page, stack view and program ROM, in that order
    #[must_use]
    pub fn with_layout(layout: &MemoryLayout, image: &[u8]) -> Self {
        let mut memory = Self::default();
        memory.register(Region::ram(layout.ram_size));
        memory.register(Region::vram(layout.vram_size));
        memory.register(Region::system_page(layout.system_page_size));
        memory.register(Region::stack(layout.stack_size));
        memory.register(Region::program_rom(image));
        memory
    }

    /// Append a region at the end of the address space
    pub fn register(&mut self, region: Region) {
        self.regions.push(region);
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// First region of the given kind
    #[must_use]
    pub fn region(&self, kind: RegionKind) -> Option<&Region> {
        self.regions.iter().find(|r| r.kind == kind)
    }

    /// Global address of the first byte of the first region of the given kind
    #[must_use]
    pub fn base_of(&self, kind: RegionKind) -> Option<Address> {
        let mut start: u64 = 0;
        for region in &self.regions {
            if region.kind == kind {
                return Address::try_from(start).ok();
            }
            start += u64::from(region.size);
        }

        None
    }

    /// Global address of the program ROM.
    ///
    /// Falls back to the end of a default layout if no ROM is registered.
    #[must_use]
    pub fn program_origin(&self) -> Address {
        self.base_of(RegionKind::ProgramRom)
            .unwrap_or(crate::constants::PROGRAM_ORIGIN)
    }

    /// Change the permissions of the first region of the given kind.
    ///
    /// Returns `false` if there is no such region.
    pub fn set_permissions(&mut self, kind: RegionKind, permissions: Permissions) -> bool {
        if let Some(region) = self.regions.iter_mut().find(|r| r.kind == kind) {
            region.permissions = permissions;
            true
        } else {
            false
        }
    }

    /// Find the region owning an address and check the access against its permissions
    ///
    /// # Errors
    ///
    /// Returns the soft fault this access would trigger.
    pub fn locate(&self, address: Address, access: Access) -> Result<Location, SoftFault> {
        let target = u64::from(address);
        let mut start: u64 = 0;

        for (index, region) in self.regions.iter().enumerate() {
            let end = start + u64::from(region.size);
            if target < end {
                let needed = match access {
                    Access::Read => Permissions::READ,
                    Access::Write => Permissions::WRITE,
                };

                if !region.permissions.contains(needed) {
                    return Err(SoftFault::Unauthorized {
                        region: region.kind,
                        access,
                        address,
                    });
                }

                #[allow(clippy::cast_possible_truncation)]
                let offset = (target - start) as Address;
                return Ok(Location {
                    index,
                    kind: region.kind,
                    offset,
                });
            }
            start = end;
        }

        Err(SoftFault::OutOfRange { access, address })
    }

    /// Locate a write, turning a denied write to a read-only region into a hard fault
    fn locate_write(&self, address: Address) -> Result<Option<Location>, MemoryError> {
        match self.locate(address, Access::Write) {
            Ok(location) => Ok(Some(location)),
            Err(SoftFault::Unauthorized { region, .. }) if region.is_read_only() => {
                Err(MemoryError::ReadOnly { region, address })
            }
            Err(fault) => {
                fault.log();
                Ok(None)
            }
        }
    }

    fn check_span(&self, location: Location, address: Address) -> Result<(), MemoryError> {
        let size = self.regions[location.index].size;
        if u64::from(location.offset) + 4 > u64::from(size) {
            return Err(MemoryError::SpanOutOfBounds {
                region: location.kind,
                address,
            });
        }
        Ok(())
    }

    /// Read a byte
    ///
    /// # Errors
    ///
    /// This never fails today; the `Result` keeps the signature aligned with the other accessors.
    pub fn read8(&self, cpu: &Cpu, address: Address) -> Result<u8, MemoryError> {
        match self.locate(address, Access::Read) {
            Ok(location) => Ok(self.regions[location.index].read8(cpu, location.offset)),
            Err(fault) => {
                fault.log();
                Ok(0)
            }
        }
    }

    /// Read a 4-byte little-endian word
    ///
    /// # Errors
    ///
    /// Fails if the word straddles the end of its region.
    pub fn read32(&self, cpu: &Cpu, address: Address) -> Result<Word, MemoryError> {
        match self.locate(address, Access::Read) {
            Ok(location) => {
                self.check_span(location, address)?;
                Ok(self.regions[location.index].read32(cpu, location.offset))
            }
            Err(fault) => {
                fault.log();
                Ok(0)
            }
        }
    }

    /// Write a byte
    ///
    /// # Errors
    ///
    /// Fails on a write to the program ROM or the stack view.
    pub fn write8(&mut self, cpu: &mut Cpu, address: Address, value: u8) -> Result<(), MemoryError> {
        let Some(location) = self.locate_write(address)? else {
            return Ok(());
        };

        self.regions[location.index].write8(cpu, location.offset, address, value)
    }

    /// Write a 4-byte little-endian word
    ///
    /// # Errors
    ///
    /// Fails on a write to the program ROM or the stack view, or if the word straddles the end
    /// of its region.
    pub fn write32(
        &mut self,
        cpu: &mut Cpu,
        address: Address,
        value: Word,
    ) -> Result<(), MemoryError> {
        let Some(location) = self.locate_write(address)? else {
            return Ok(());
        };

        self.check_span(location, address)?;
        self.regions[location.index].write32(cpu, location.offset, address, value)
    }
}
