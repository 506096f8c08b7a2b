use std::io::IsTerminal;
use std::process::exit;

use clap::{ArgAction, ArgGroup, Parser};
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;
mod interactive;

use crate::commands::Subcommand;

#[derive(Parser)]
#[command(version, author, about, group = ArgGroup::new("format"))]
struct Opt {
    /// Increase the level of verbosity. Can be used multiple times.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Force colored output. Default is to check if the output is a tty
    #[arg(short = 'c', long, global = true, group = "format")]
    color: bool,

    /// Force non-colored output. Default is to check if the output is a tty
    #[arg(short = 'C', long, global = true, group = "format")]
    no_color: bool,

    /// Use JSON output for log messages
    #[arg(short, long, global = true, group = "format")]
    json: bool,

    #[command(subcommand)]
    command: Subcommand,
}

impl Opt {
    const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "vrisc_emulator=debug,vrisc_cli=debug,info",
            2 => "vrisc_emulator=trace,vrisc_cli=trace,info",
            3 => "vrisc_emulator=trace,vrisc_cli=trace,debug",
            4..=u8::MAX => "trace",
        }
    }

    fn should_use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            std::io::stdout().is_terminal()
        }
    }

    fn filter_layer(&self) -> EnvFilter {
        // Parse log level from env
        EnvFilter::try_from_default_env()
            // or infer from args
            .or_else(|_| EnvFilter::try_new(self.log_filter()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn main() {
    // First, parse the arguments
    let opt = Opt::parse();

    // Then, setup the tracing formatter for logging and instrumentation
    let registry = tracing_subscriber::Registry::default().with(opt.filter_layer());

    if opt.json {
        let json_layer = tracing_subscriber::fmt::layer().json();
        registry.with(json_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_ansi(opt.should_use_colors())
            .with_target(false);
        registry.with(fmt_layer).init();
    }

    // And run the command
    if let Err(e) = opt.command.exec() {
        error!("{:#}", e);
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opt::command().debug_assert();
    }

    #[test]
    fn verbosity_test() {
        let opt = Opt::parse_from(["vrisc", "-vv", "dump", "program.bin"]);
        assert_eq!(opt.log_filter(), "vrisc_emulator=trace,vrisc_cli=trace,info");
    }

    #[test]
    fn format_flags_conflict() {
        assert!(Opt::try_parse_from(["vrisc", "--json", "--color", "dump", "a.bin"]).is_err());
    }
}
