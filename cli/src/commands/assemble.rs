use std::process::exit;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueHint};
use miette::NamedSource;
use tracing::{debug, info, warn};
use vrisc_emulator::{assemble, Assembly, DebugSymbols};

#[derive(Parser, Debug)]
pub struct AssembleOpt {
    /// Assembly source file
    #[arg(value_hint = ValueHint::FilePath)]
    source: Utf8PathBuf,

    /// Where to write the program image
    #[arg(value_hint = ValueHint::FilePath)]
    output: Utf8PathBuf,

    /// Where to write the debug symbols. Defaults to the output path with a `_dbg` suffix
    #[arg(long, value_hint = ValueHint::FilePath)]
    symbols: Option<Utf8PathBuf>,
}

impl AssembleOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.source, "Reading program");
        let source = std::fs::read_to_string(&self.source)
            .with_context(|| format!("could not read {}", self.source))?;

        let assembly = match assemble(&source) {
            Ok(assembly) => assembly,
            Err(e) => {
                let report = miette::Report::new(e)
                    .with_source_code(NamedSource::new(self.source.as_str(), source));
                eprintln!("{report:?}");
                exit(1);
            }
        };

        debug!(
            labels = assembly.symbols.labels.len(),
            variables = assembly.symbols.variables.len(),
            "Program assembled"
        );

        let symbols_path = self
            .symbols
            .unwrap_or_else(|| DebugSymbols::path_for(&self.output));
        write_outputs(&assembly, &self.output, &symbols_path)
    }
}

/// Write the image and its symbols. Either both files are written or the image is removed.
fn write_outputs(
    assembly: &Assembly,
    output: &Utf8Path,
    symbols_path: &Utf8Path,
) -> anyhow::Result<()> {
    let json = assembly.symbols.to_json()?;

    std::fs::write(output, &assembly.binary)
        .with_context(|| format!("could not write {output}"))?;
    info!(path = %output, bytes = assembly.binary.len(), "Wrote program image");

    if let Err(e) = std::fs::write(symbols_path, json) {
        if let Err(cleanup) = std::fs::remove_file(output) {
            warn!(path = %output, "Could not remove the program image: {cleanup}");
        }
        return Err(e).with_context(|| format!("could not write {symbols_path}"));
    }
    info!(path = %symbols_path, "Wrote debug symbols");

    Ok(())
}
