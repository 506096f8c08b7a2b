pub type Address = u32;
pub type Word = i32;

/// Size of an assembled program image, and capacity of the program ROM
pub const PROGRAM_LENGTH: usize = 4096;

/// Default size of every general region (RAM, VRAM, system page, stack view)
pub const DEFAULT_REGION_SIZE: Address = 0x00FF_FFFF;

/// Address of the first ROM byte with the default memory layout
///
/// Regions are laid out back to back: RAM, VRAM, system page, stack view, then ROM.
pub const PROGRAM_ORIGIN: Address = 4 * DEFAULT_REGION_SIZE;

/// System page offset mirroring the program counter
pub const SYSTEM_PC: Address = 0;

/// System page offset mirroring the carry flag
pub const SYSTEM_CARRY: Address = 4;

/// System page offset exposing the call stack depth
pub const SYSTEM_CALL_DEPTH: Address = 8;
