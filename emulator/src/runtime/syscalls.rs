//! Host services reachable through the `SYS` instruction.
//!
//! The table maps a syscall number to a handler. Arguments are popped from the operand stack
//! using the current width, results are pushed back the same way.

#![allow(clippy::unnecessary_wraps)]

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use super::registers::Width;
use super::{Computer, ProcessorError};
use crate::constants::{Address, Word};
use crate::display::DisplayMode;
use crate::util::as_address;

pub type Syscall = fn(&mut Computer) -> Result<(), ProcessorError>;

pub const EXIT: Word = 0;
pub const PRINT: Word = 1;
pub const ASSERT: Word = 2;
pub const BLIT: Word = 3;
pub const INITIALIZED: Word = 4;
pub const TOGGLE_WIDTH: Word = 5;
pub const READ_FILE_CHUNK: Word = 6;
pub const DISPLAY_MODE: Word = 7;
pub const DISPLAY_WIDTH: Word = 8;
pub const DISPLAY_HEIGHT: Word = 9;

#[derive(Clone, Default)]
pub struct SyscallTable {
    handlers: BTreeMap<Word, Syscall>,
}

impl std::fmt::Debug for SyscallTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl SyscallTable {
    /// An empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The host services every program can rely on
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(EXIT, exit)
            .with(PRINT, print)
            .with(ASSERT, assert)
            .with(BLIT, blit)
            .with(INITIALIZED, initialized)
            .with(TOGGLE_WIDTH, toggle_width)
            .with(READ_FILE_CHUNK, read_file_chunk)
            .with(DISPLAY_MODE, display_mode)
            .with(DISPLAY_WIDTH, display_width)
            .with(DISPLAY_HEIGHT, display_height)
    }

    /// Install a handler, returning the one it replaces
    pub fn register(&mut self, index: Word, handler: Syscall) -> Option<Syscall> {
        self.handlers.insert(index, handler)
    }

    #[must_use]
    pub fn with(mut self, index: Word, handler: Syscall) -> Self {
        self.register(index, handler);
        self
    }

    #[must_use]
    pub fn get(&self, index: Word) -> Option<Syscall> {
        self.handlers.get(&index).copied()
    }

    pub fn indices(&self) -> impl Iterator<Item = Word> + '_ {
        self.handlers.keys().copied()
    }
}

fn exit(computer: &mut Computer) -> Result<(), ProcessorError> {
    let code = computer.cpu.pop(computer.cpu.width());
    info!(code, "Program exited");
    computer.exit_code = Some(code);
    computer.running = false;
    Ok(())
}

fn print(computer: &mut Computer) -> Result<(), ProcessorError> {
    let pointer = as_address(computer.cpu.pop(computer.cpu.width()));
    let text = computer.read_string(pointer)?;
    info!("APPLICATION: {}", text);
    computer.console.push(text);
    Ok(())
}

fn assert(computer: &mut Computer) -> Result<(), ProcessorError> {
    let value = computer.cpu.pop(computer.cpu.width());
    let line = format!("ASSERT: 0x{value:02x}");
    info!("{}", line);
    computer.console.push(line);
    Ok(())
}

fn blit(computer: &mut Computer) -> Result<(), ProcessorError> {
    debug!("Blit requested");
    computer.display.blit_requested = true;
    Ok(())
}

fn initialized(computer: &mut Computer) -> Result<(), ProcessorError> {
    info!("Program initialized");
    computer.initialized = true;
    Ok(())
}

fn toggle_width(computer: &mut Computer) -> Result<(), ProcessorError> {
    computer.cpu.large_mode = !computer.cpu.large_mode;
    debug!(width = %computer.cpu.width(), "Toggled operand width");
    Ok(())
}

/// Copy part of a host file into memory, one byte at a time, and push the file length
fn read_file_chunk(computer: &mut Computer) -> Result<(), ProcessorError> {
    let width = computer.cpu.width();
    let path_pointer = as_address(computer.cpu.pop(width));
    let path = Utf8PathBuf::from(computer.read_string(path_pointer)?);
    let destination = as_address(computer.cpu.pop(width));
    let chunk_offset = computer.cpu.pop(width);
    let chunk_size = computer.cpu.pop(width);

    let contents = computer
        .filesystem()
        .read(&path)
        .map_err(|source| ProcessorError::Io {
            path: path.clone(),
            source,
        })?;

    info!(
        %path,
        length = contents.len(),
        chunk_offset,
        chunk_size,
        "Reading file chunk"
    );

    let start = usize::try_from(chunk_offset).unwrap_or(usize::MAX);
    let size = Address::try_from(chunk_size).unwrap_or(0);
    for index in 0..size {
        let byte = usize::try_from(index)
            .ok()
            .and_then(|i| start.checked_add(i))
            .and_then(|i| contents.get(i).copied());

        let Some(byte) = byte else {
            warn!(%path, "File chunk overflowed the file contents");
            break;
        };

        computer.store(
            Width::Byte,
            destination.wrapping_add(index),
            Word::from(byte),
        )?;
    }

    let length = Word::try_from(contents.len()).unwrap_or(Word::MAX);
    computer.cpu.push(width, length);
    Ok(())
}

fn display_mode(computer: &mut Computer) -> Result<(), ProcessorError> {
    let value = computer.cpu.pop(computer.cpu.width());
    computer.display.mode = DisplayMode::from_word(value).unwrap_or_else(|| {
        warn!(value, "Unknown display mode, falling back to the console");
        DisplayMode::Console
    });
    debug!(mode = %computer.display.mode, "Display mode set");
    Ok(())
}

fn display_dimension(computer: &mut Computer) -> u32 {
    let value = computer.cpu.pop(computer.cpu.width());
    u32::try_from(value).unwrap_or_else(|_| {
        warn!(value, "Negative display dimension");
        0
    })
}

fn display_width(computer: &mut Computer) -> Result<(), ProcessorError> {
    computer.display.width = display_dimension(computer);
    Ok(())
}

fn display_height(computer: &mut Computer) -> Result<(), ProcessorError> {
    computer.display.height = display_dimension(computer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::{Config, InMemoryFilesystem, MemoryLayout, NativeFilesystem, RegionKind};

    fn computer() -> Computer {
        let config = Config {
            layout: MemoryLayout {
                ram_size: 32,
                vram_size: 8,
                system_page_size: 12,
                stack_size: 16,
            },
            ..Config::default()
        };
        Computer::new(&[], &config, Arc::new(SyscallTable::standard())).unwrap()
    }

    fn write_string(computer: &mut Computer, address: Address, text: &str) {
        let len = Word::try_from(text.len()).unwrap();
        computer.store(Width::Byte, address, len).unwrap();
        for (i, byte) in text.bytes().enumerate() {
            let i = Address::try_from(i).unwrap();
            computer
                .store(Width::Byte, address + 1 + i, Word::from(byte))
                .unwrap();
        }
    }

    fn ram(computer: &Computer) -> &[u8] {
        computer.memory.region(RegionKind::Ram).unwrap().data()
    }

    #[test]
    fn standard_table_test() {
        let table = SyscallTable::standard();
        assert_eq!(table.indices().collect::<Vec<_>>(), (0..=9).collect::<Vec<_>>());
        assert!(table.get(10).is_none());
    }

    #[test]
    fn register_test() {
        fn noop(_: &mut Computer) -> Result<(), ProcessorError> {
            Ok(())
        }

        let mut table = SyscallTable::new();
        assert!(table.register(42, noop).is_none());
        assert!(table.register(42, noop).is_some());
        assert!(table.get(42).is_some());
    }

    #[test]
    fn exit_test() {
        let mut computer = computer();
        computer.cpu.push(Width::Byte, 3);
        computer.syscall(EXIT).unwrap();
        assert_eq!(computer.exit_code, Some(3));
        assert!(!computer.running);
    }

    #[test]
    fn print_test() {
        let mut computer = computer();
        write_string(&mut computer, 4, "hello");
        computer.cpu.push(Width::Byte, 4);
        computer.syscall(PRINT).unwrap();
        assert_eq!(computer.console, vec!["hello".to_owned()]);
    }

    #[test]
    fn assert_test() {
        let mut computer = computer();
        computer.cpu.push(Width::Byte, 5);
        computer.syscall(ASSERT).unwrap();

        computer.cpu.large_mode = true;
        computer.cpu.push(Width::Word, 0x1234);
        computer.syscall(ASSERT).unwrap();

        assert_eq!(
            computer.console,
            vec!["ASSERT: 0x05".to_owned(), "ASSERT: 0x1234".to_owned()]
        );
    }

    #[test]
    fn flags_test() {
        let mut computer = computer();
        computer.syscall(INITIALIZED).unwrap();
        computer.syscall(BLIT).unwrap();
        assert!(computer.initialized);
        assert!(computer.display.blit_requested);

        computer.syscall(TOGGLE_WIDTH).unwrap();
        assert!(computer.cpu.large_mode);
        computer.syscall(TOGGLE_WIDTH).unwrap();
        assert!(!computer.cpu.large_mode);
    }

    #[test]
    fn display_parameters_test() {
        let mut computer = computer();
        computer.cpu.push(Width::Byte, 3);
        computer.syscall(DISPLAY_MODE).unwrap();
        computer.cpu.push(Width::Byte, 16);
        computer.syscall(DISPLAY_WIDTH).unwrap();
        computer.cpu.push(Width::Byte, 9);
        computer.syscall(DISPLAY_HEIGHT).unwrap();

        assert_eq!(computer.display.mode, DisplayMode::Bitmap);
        assert_eq!(computer.display.width, 16);
        assert_eq!(computer.display.height, 9);

        computer.cpu.push(Width::Byte, 7);
        computer.syscall(DISPLAY_MODE).unwrap();
        assert_eq!(computer.display.mode, DisplayMode::Console);
    }

    #[test]
    fn read_file_chunk_test() {
        let mut computer = computer()
            .with_filesystem(InMemoryFilesystem::default().with_file("level.bin", *b"abcdef"));
        write_string(&mut computer, 0, "level.bin");

        // size, chunk offset, destination, then the path on top
        computer.cpu.push(Width::Byte, 3);
        computer.cpu.push(Width::Byte, 2);
        computer.cpu.push(Width::Byte, 20);
        computer.cpu.push(Width::Byte, 0);
        computer.syscall(READ_FILE_CHUNK).unwrap();

        assert_eq!(&ram(&computer)[20..24], b"cde\0");
        assert_eq!(computer.cpu.pop(Width::Byte), 6);
        assert!(computer.cpu.stack.is_empty());
    }

    #[test]
    fn read_file_chunk_overflow_test() {
        let mut computer = computer()
            .with_filesystem(InMemoryFilesystem::default().with_file("a", *b"xyz"));
        write_string(&mut computer, 0, "a");

        computer.cpu.push(Width::Byte, 10);
        computer.cpu.push(Width::Byte, 1);
        computer.cpu.push(Width::Byte, 20);
        computer.cpu.push(Width::Byte, 0);
        computer.syscall(READ_FILE_CHUNK).unwrap();

        // Copying stops at the end of the file
        assert_eq!(&ram(&computer)[20..23], b"yz\0");
        assert_eq!(computer.cpu.pop(Width::Byte), 3);
    }

    #[test]
    fn read_missing_file_test() {
        let mut computer = computer().with_filesystem(InMemoryFilesystem::default());
        write_string(&mut computer, 0, "missing");
        computer.cpu.push(Width::Byte, 1);
        computer.cpu.push(Width::Byte, 0);
        computer.cpu.push(Width::Byte, 20);
        computer.cpu.push(Width::Byte, 0);

        let err = computer.syscall(READ_FILE_CHUNK).unwrap_err();
        assert!(matches!(err, ProcessorError::Io { path, .. } if path == "missing"));
    }

    #[test]
    fn read_file_outside_data_dir_test() {
        let mut computer = computer().with_filesystem(NativeFilesystem::new("data"));
        write_string(&mut computer, 0, "../Cargo.toml");
        computer.cpu.push(Width::Byte, 1);
        computer.cpu.push(Width::Byte, 0);
        computer.cpu.push(Width::Byte, 20);
        computer.cpu.push(Width::Byte, 0);

        let err = computer.syscall(READ_FILE_CHUNK).unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::InvalidInput
        ));
        assert_eq!(&ram(&computer)[20..24], &[0, 0, 0, 0]);
    }
}
