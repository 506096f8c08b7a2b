//! Assembler and emulator for the VRISC architecture.
//!
//! [`assemble`] turns a source file into a program image. A [`runtime::Computer`] loads that
//! image in its program ROM and runs it.

pub mod assembler;
pub mod constants;
pub mod display;
pub mod runtime;
pub mod util;

pub use self::assembler::{assemble, Assembly, AssemblyError, DebugSymbols};
pub use self::runtime::{Computer, Config};
