use std::sync::Arc;

use anyhow::{anyhow, Context};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgAction, Parser, ValueHint};
use tracing::{debug, error, info, warn};
use vrisc_emulator::constants::{Address, Word, DEFAULT_REGION_SIZE};
use vrisc_emulator::display::{DisplayLink, Frame};
use vrisc_emulator::runtime::{MemoryLayout, ProcessorError, Registers, SyscallTable};
use vrisc_emulator::{Computer, Config};

use super::dump::load_symbols;
use crate::interactive::run_interactive;

#[derive(Parser, Debug)]
pub struct RunOpt {
    /// Program image
    #[arg(value_hint = ValueHint::FilePath)]
    binary: Utf8PathBuf,

    /// Run the program in interactive mode
    #[arg(short, long, action = ArgAction::SetTrue)]
    interactive: bool,

    /// Write every blitted frame as a PPM file in this directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    frames: Option<Utf8PathBuf>,

    /// Debug symbols, used by the interactive mode. Defaults to the image path with a `_dbg`
    /// suffix, if it exists
    #[arg(long, value_hint = ValueHint::FilePath)]
    symbols: Option<Utf8PathBuf>,

    /// Size of the RAM region, in bytes
    #[arg(long, default_value_t = DEFAULT_REGION_SIZE)]
    ram_size: Address,

    /// Size of the VRAM region, in bytes
    #[arg(long, default_value_t = DEFAULT_REGION_SIZE)]
    vram_size: Address,

    /// Directory the program reads its data files from
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    data_dir: Utf8PathBuf,

    /// Abort the program after this many instructions
    #[arg(long)]
    max_cycles: Option<usize>,
}

/// Where the frames blitted by the program end up
#[derive(Debug, Default)]
pub(crate) struct FrameSink {
    directory: Option<Utf8PathBuf>,
    count: usize,
}

impl FrameSink {
    fn new(directory: Option<Utf8PathBuf>) -> anyhow::Result<Self> {
        if let Some(directory) = &directory {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("could not create {directory}"))?;
        }

        Ok(Self {
            directory,
            count: 0,
        })
    }

    fn path(directory: &Utf8Path, index: usize) -> Utf8PathBuf {
        directory.join(format!("frame-{index:04}.ppm"))
    }

    pub(crate) fn accept(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let index = self.count;
        self.count += 1;
        info!(
            index,
            mode = %frame.mode,
            width = frame.width,
            height = frame.height,
            "Frame blitted"
        );

        let Some(directory) = &self.directory else {
            return Ok(());
        };

        match frame.to_ppm() {
            Ok(ppm) => {
                let path = Self::path(directory, index);
                std::fs::write(&path, ppm).with_context(|| format!("could not write {path}"))?;
                debug!(%path, "Wrote frame");
            }
            Err(e) => warn!(index, "Frame not written: {e}"),
        }

        Ok(())
    }
}

/// What is left of a computer once the execution thread is done with it
#[derive(Debug)]
struct Outcome {
    result: Result<(), ProcessorError>,
    registers: Registers,
    cycles: usize,
    exit_code: Option<Word>,
    console: Vec<String>,
}

impl Outcome {
    fn from_computer(computer: Computer, result: Result<(), ProcessorError>) -> Self {
        Self {
            result,
            registers: computer.cpu.registers,
            cycles: computer.cycles,
            exit_code: computer.exit_code,
            console: computer.console,
        }
    }
}

impl RunOpt {
    fn config(&self) -> Config {
        Config {
            layout: MemoryLayout {
                ram_size: self.ram_size,
                vram_size: self.vram_size,
                ..MemoryLayout::default()
            },
            data_dir: self.data_dir.clone(),
            max_cycles: self.max_cycles,
        }
    }

    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.binary, "Reading program image");
        let image = std::fs::read(&self.binary)
            .with_context(|| format!("could not read {}", self.binary))?;

        let config = self.config();
        debug!(?config, "Building computer");
        let computer = Computer::new(&image, &config, Arc::new(SyscallTable::standard()))?;
        let (link, frames) = DisplayLink::channel();
        let mut computer = computer.with_display_link(link);
        let mut sink = FrameSink::new(self.frames.clone())?;

        if self.interactive {
            let symbols = load_symbols(&self.binary, self.symbols.as_deref())?;
            run_interactive(&mut computer, symbols, &frames, &mut sink)?;
            info!(registers = %computer.cpu.registers, "End of program");
            return Ok(());
        }

        info!("Running program");
        let execution = std::thread::Builder::new()
            .name("execution".into())
            .spawn(move || {
                let result = computer.run();
                // Dropping the computer closes the display link, which ends the frame loop
                Outcome::from_computer(computer, result)
            })?;

        for frame in &frames {
            sink.accept(&frame)?;
        }

        let outcome = execution
            .join()
            .map_err(|_| anyhow!("the execution thread panicked"))?;

        info!(
            registers = %outcome.registers,
            cycles = outcome.cycles,
            lines = outcome.console.len(),
            "End of program"
        );

        if let Err(e) = outcome.result {
            if let ProcessorError::Exception(exception) = &e {
                error!(code = exception.code(), "{exception}");
            }
            return Err(e.into());
        }

        if let Some(code) = outcome.exit_code {
            info!(code, "Program exited");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn frame_path_test() {
        assert_eq!(
            FrameSink::path(Utf8Path::new("out"), 7),
            Utf8PathBuf::from("out/frame-0007.ppm")
        );
    }

    #[test]
    fn config_test() {
        let opt = RunOpt::parse_from([
            "run",
            "game.bin",
            "--ram-size",
            "256",
            "--max-cycles",
            "1000",
        ]);
        let config = opt.config();
        assert_eq!(config.layout.ram_size, 256);
        assert_eq!(config.layout.vram_size, DEFAULT_REGION_SIZE);
        assert_eq!(config.data_dir, Utf8PathBuf::from("data"));
        assert_eq!(config.max_cycles, Some(1000));
    }
}
