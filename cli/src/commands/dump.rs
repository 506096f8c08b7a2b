use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueHint};
use tracing::{debug, info, warn};
use vrisc_emulator::runtime::disassemble;
use vrisc_emulator::DebugSymbols;

#[derive(Parser, Debug)]
pub struct DumpOpt {
    /// Program image
    #[arg(value_hint = ValueHint::FilePath)]
    input: Utf8PathBuf,

    /// Debug symbols to annotate the listing with. Defaults to the image path with a `_dbg`
    /// suffix, if it exists
    #[arg(long, value_hint = ValueHint::FilePath)]
    symbols: Option<Utf8PathBuf>,
}

/// Load the symbols of a binary, falling back to empty symbols when the default file is missing
pub(crate) fn load_symbols(
    binary: &Utf8Path,
    explicit: Option<&Utf8Path>,
) -> anyhow::Result<DebugSymbols> {
    let path = match explicit {
        Some(path) => path.to_owned(),
        None => {
            let path = DebugSymbols::path_for(binary);
            if !path.exists() {
                debug!(%path, "No debug symbols found");
                return Ok(DebugSymbols::default());
            }
            path
        }
    };

    let json =
        std::fs::read_to_string(&path).with_context(|| format!("could not read {path}"))?;
    let symbols =
        DebugSymbols::from_json(&json).with_context(|| format!("invalid symbol file {path}"))?;
    Ok(symbols)
}

impl DumpOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.input, "Reading program image");
        let image =
            std::fs::read(&self.input).with_context(|| format!("could not read {}", self.input))?;
        let symbols = load_symbols(&self.input, self.symbols.as_deref())?;

        for (offset, instruction) in disassemble(&image) {
            let offset = u32::try_from(offset)?;
            for label in symbols.labels_at(offset) {
                println!("{label}:");
            }

            match instruction {
                Ok(instruction) => println!("{offset:04X}  {instruction}"),
                Err(e) => {
                    warn!(offset, "{e}");
                    println!("{offset:04X}  ???");
                }
            }
        }

        Ok(())
    }
}
