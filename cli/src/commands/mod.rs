mod assemble;
mod completion;
mod dump;
mod run;

pub(crate) use self::run::FrameSink;

#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Assemble a source file into a program image
    Assemble(self::assemble::AssembleOpt),

    /// Run a program image
    Run(self::run::RunOpt),

    /// Disassemble a program image
    Dump(self::dump::DumpOpt),

    /// Generate shell completions
    Completion(self::completion::CompletionOpt),
}

impl Subcommand {
    /// Run a subcommand
    pub fn exec(self) -> anyhow::Result<()> {
        match self {
            Self::Assemble(opt) => opt.exec(),
            Self::Run(opt) => opt.exec(),
            Self::Dump(opt) => opt.exec(),
            Self::Completion(opt) => opt.exec(),
        }
    }
}
