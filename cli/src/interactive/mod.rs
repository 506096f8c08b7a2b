//! This module implements the TTY interactive interface.
//!
//! It is mainly based on two crates:
//!   - rustyline, to handle the line-editting logic
//!   - clap, to handle the parsing of those interactive commands
//!
//! Using Parser to do this is a bit of a hack, and requires some weird options
//! to have it working but works nonetheless.

use std::collections::BTreeSet;
use std::sync::mpsc::Receiver;

use clap::Parser;
use rustyline::history::DefaultHistory;
use rustyline::{Behavior, CompletionType, Config, EditMode, Editor};
use tracing::{debug, info, warn};
use vrisc_emulator::constants::Address;
use vrisc_emulator::display::Frame;
use vrisc_emulator::{Computer, DebugSymbols};

use crate::commands::FrameSink;

mod helper;
mod parse;
use self::helper::RunHelper;

static HELP: &str = r#"
Run "help [command]" for command-specific help.
An empty line re-runs the last valid command."#;

#[derive(Parser, Clone, Debug)]
#[command(
    help_template = "{about}\n\nCOMMANDS:\n{subcommands}\n{after-help}",
    after_help = HELP,
    disable_version_flag = true,
    infer_subcommands = true,
    no_binary_name = true,
)]
/// Interactive mode commands
enum Command {
    /// Execute the next instructions
    #[command(alias = "s")]
    Step {
        /// Number of steps to execute
        #[arg(default_value = "1")]
        number: u64,
    },

    /// Exit the emulator
    Exit,

    /// Show the state of registers
    Registers,

    /// Show the operand stack and the call stack
    Stack,

    /// Show the content of a block in memory
    Memory {
        /// The address to show, as a literal (`$40`, `#64`), a label or a variable
        address: parse::Argument,

        /// Number of bytes to show
        #[arg(default_value = "16")]
        number: u32,
    },

    /// Show the next few instructions
    List {
        /// Number of instructions to show
        #[arg(default_value = "10")]
        number: u32,
    },

    /// Set a breakpoint
    Break {
        /// The address where to set the breakpoint
        address: parse::Argument,
    },

    /// Remove a breakpoint
    Unbreak {
        /// The address of the breakpoint to remove
        address: parse::Argument,
    },

    /// Continue the program until the next breakpoint or halt
    #[command(alias = "c")]
    Continue,

    /// Show informations about the current debugging session
    Info {
        #[command(subcommand)]
        sub: Option<InfoCommand>,
    },
}

#[derive(clap::Subcommand, Clone, Debug)]
enum InfoCommand {
    /// List active breakpoints
    Breakpoints,

    /// List program labels
    Labels,

    /// Show the number of CPU cycles used since the beginning of the program
    Cycles,
}

/// Holds informations about a interactive session
#[derive(Debug)]
struct Session {
    /// List of active breakpoints
    breakpoints: BTreeSet<Address>,

    /// Labels and variables of the program
    symbols: DebugSymbols,

    /// Global address of the first ROM byte, labels are relative to it
    origin: Address,

    /// Current address for the `list` command
    list_address: Option<Address>,
}

impl Session {
    fn new(symbols: DebugSymbols, origin: Address) -> Self {
        Self {
            breakpoints: BTreeSet::new(),
            symbols,
            origin,
            list_address: None,
        }
    }

    fn resolve(&self, argument: &parse::Argument) -> Result<Address, parse::ResolveError> {
        argument.resolve(&self.symbols, self.origin)
    }

    /// Add a breakpoint
    fn add_breakpoint(&mut self, address: Address) {
        if self.breakpoints.insert(address) {
            info!(address, "Setting a breakpoint");
        } else {
            warn!(address, "A breakpoint was already set");
        }
    }

    /// Remove a breakpoint
    fn remove_breakpoint(&mut self, address: Address) {
        if self.breakpoints.remove(&address) {
            info!(address, "Removing breakpoint");
        } else {
            warn!(address, "No breakpoint was set here");
        }
    }

    fn has_breakpoint(&self, address: Address) -> bool {
        self.breakpoints.contains(&address)
    }

    /// Reset the `list` command (after running an instruction)
    fn reset_list(&mut self) {
        self.list_address = None;
    }

    /// Execute `count` instructions, or until a breakpoint when `count` is `None`.
    ///
    /// Returns `true` once the computer can no longer run.
    fn advance(&mut self, computer: &mut Computer, count: Option<u64>) -> bool {
        self.reset_list();
        if count == Some(0) {
            return false;
        }
        let mut executed = 0;

        loop {
            if let Err(e) = computer.check_cycle_limit().and_then(|()| computer.step()) {
                warn!(error = &e as &dyn std::error::Error, "Halted");
                return true;
            }
            executed += 1;

            if !computer.running {
                info!(exit_code = ?computer.exit_code, "Program halted");
                return true;
            }

            let pc = computer.cpu.registers.pc;
            match count {
                Some(count) if executed >= count => return false,
                None if self.has_breakpoint(pc) => {
                    info!(address = pc, "Stopped at a breakpoint");
                    return false;
                }
                _ => {}
            }
        }
    }

    /// Display the list of breakpoints
    fn display_breakpoints(&self, computer: &Computer) {
        match self.breakpoints.len() {
            0 => info!("No breakpoints"),
            1 => info!("1 breakpoint:"),
            x => info!("{} breakpoints:", x),
        }

        for &address in &self.breakpoints {
            self.display_instruction(computer, address);
        }
    }

    /// Display an instruction at specified address, returns the address of the next one
    fn display_instruction(&self, computer: &Computer, address: Address) -> Address {
        // First, display the labels on the line if any
        if let Some(offset) = address.checked_sub(self.origin) {
            for label in self.symbols.labels_at(offset) {
                info!("            {}:", label);
            }
        }

        // Then compute what is supposed to show in the gutter
        let is_current_line = computer.cpu.registers.pc == address;
        let has_breakpoint = self.has_breakpoint(address);

        let gutter = match (has_breakpoint, is_current_line) {
            (true, true) => "B>",
            (true, false) => "B ",
            (false, true) => " >",
            (false, false) => "  ",
        };

        match computer.instruction_at(address) {
            Ok(instruction) => {
                info!("{:<2} {:#010x}    {}", gutter, address, instruction);
                let len = Address::try_from(instruction.encoded_len()).unwrap_or(1);
                address.wrapping_add(len)
            }
            Err(_) => {
                info!("{:<2} {:#010x}    –", gutter, address);
                address.wrapping_add(1)
            }
        }
    }

    /// Display `number` instructions, continuing where the last `list` stopped
    fn display_list(&mut self, computer: &Computer, number: u32) {
        let mut address = self.list_address.unwrap_or(computer.cpu.registers.pc);
        for _ in 0..number {
            address = self.display_instruction(computer, address);
        }
        self.list_address = Some(address);
    }

    /// Display the list of labels
    fn display_labels(&self) {
        match self.symbols.labels.len() {
            0 => info!("No labels"),
            1 => info!("1 label:"),
            x => info!("{} labels:", x),
        }

        for (label, &offset) in &self.symbols.labels {
            info!("  {} => {:#010x}", label, self.origin.wrapping_add(offset));
        }
    }

    /// Display the number of CPU cycles used
    fn display_cycles(computer: &Computer) {
        info!("Cycles: {}", computer.cycles);
    }
}

fn display_memory(computer: &Computer, address: Address, number: u32) {
    let mut row = Vec::with_capacity(8);
    let mut start = address;
    for i in 0..number {
        let current = address.wrapping_add(i);
        match computer.memory.read8(&computer.cpu, current) {
            Ok(byte) => row.push(format!("{byte:02x}")),
            Err(e) => {
                warn!(address = current, "{e}");
                row.push("--".to_owned());
            }
        }

        if row.len() == 8 || i + 1 == number {
            info!("{:#010x}  {}", start, row.join(" "));
            row.clear();
            start = current.wrapping_add(1);
        }
    }
}

fn display_stack(computer: &Computer) {
    let cpu = &computer.cpu;
    let bytes: Vec<String> = cpu.stack.view().map(|b| format!("{b:02x}")).collect();
    if bytes.is_empty() {
        info!("Operand stack: empty");
    } else {
        info!("Operand stack ({} bytes, top first): {}", bytes.len(), bytes.join(" "));
    }

    let frames = cpu.call_stack.frames();
    if frames.is_empty() {
        info!("Call stack: empty");
    } else {
        info!("Call stack ({} frames, innermost first):", frames.len());
        for &frame in frames.iter().rev() {
            info!("  {:#010x}", frame);
        }
    }
}

/// Hand the frames blitted since the last command to the sink
fn drain_frames(frames: &Receiver<Frame>, sink: &mut FrameSink) -> anyhow::Result<()> {
    for frame in frames.try_iter() {
        sink.accept(&frame)?;
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
pub(crate) fn run_interactive(
    computer: &mut Computer,
    symbols: DebugSymbols,
    frames: &Receiver<Frame>,
    sink: &mut FrameSink,
) -> anyhow::Result<()> {
    info!("Running in interactive mode. Type \"help\" to list available commands.");
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .behavior(Behavior::PreferTerm)
        .auto_add_history(true)
        .build();

    let names = symbols
        .labels
        .keys()
        .chain(symbols.variables.keys())
        .cloned()
        .collect();
    let mut session = Session::new(symbols, computer.memory.program_origin());

    let h: RunHelper<Command> = RunHelper::new(names);
    let mut rl: Editor<RunHelper<Command>, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(h));

    let mut last_command: Option<Command> = None;
    let mut halted = false;

    'read: loop {
        // A macro to unwrap an error, log it and continue the loop
        macro_rules! warn_and_continue {
            ($e:expr) => {
                match $e {
                    Ok(o) => o,
                    Err(e) => {
                        tracing::warn!(error = %e);
                        continue 'read;
                    }
                }
            };
        }

        let Ok(readline) = rl.readline(">> ") else {
            info!("EOF, exitting");
            return Ok(());
        };

        let command = if readline.is_empty() {
            if let Some(command) = &last_command {
                command.clone()
            } else {
                info!("Type \"help\" to get the list of available commands");
                continue 'read;
            }
        } else {
            let Ok(words) = shell_words::split(readline.as_str()) else {
                warn!("Invalid input");
                continue 'read;
            };

            let command = warn_and_continue!(Command::try_parse_from(words));
            last_command = Some(command.clone());
            command
        };

        debug!("Executing command: {:?}", command);

        match (command, halted) {
            (Command::Exit, _) => break,
            (Command::Step { number }, false) => {
                halted = session.advance(computer, Some(number));
                drain_frames(frames, sink)?;
            }

            (Command::Registers, _) => {
                info!("Registers: {}", computer.cpu.registers);
                info!(
                    "Width: {}",
                    if computer.cpu.large_mode { "32-bit" } else { "8-bit" }
                );
            }

            (Command::Stack, _) => display_stack(computer),

            (Command::Memory { address, number }, _) => {
                let address = warn_and_continue!(session.resolve(&address));
                display_memory(computer, address, number);
            }

            (Command::List { number }, _) => session.display_list(computer, number),

            (Command::Break { address }, false) => {
                let address = warn_and_continue!(session.resolve(&address));
                session.add_breakpoint(address);
            }

            (Command::Unbreak { address }, false) => {
                let address = warn_and_continue!(session.resolve(&address));
                session.remove_breakpoint(address);
            }

            (Command::Continue, false) => {
                halted = session.advance(computer, None);
                drain_frames(frames, sink)?;
            }

            (Command::Info { sub }, _) => match sub {
                Some(InfoCommand::Breakpoints) => {
                    session.display_breakpoints(computer);
                }
                Some(InfoCommand::Labels) => {
                    session.display_labels();
                }
                Some(InfoCommand::Cycles) => {
                    Session::display_cycles(computer);
                }
                None => {
                    session.display_breakpoints(computer);
                    info!("–");
                    session.display_labels();
                    info!("–");
                    Session::display_cycles(computer);
                }
            },

            (_, true) => {
                // Computer is halted but the user asked to continue, we just warn
                warn!("Computer is halted. Use \"exit\" to quit");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use vrisc_emulator::runtime::{MemoryLayout, SyscallTable};
    use vrisc_emulator::{assemble, Config as MachineConfig};

    use super::*;

    fn session_and_computer() -> (Session, Computer) {
        let assembly = assemble("start: ldi #1\nloop: push\nhlt\n").unwrap();
        let config = MachineConfig {
            layout: MemoryLayout {
                ram_size: 64,
                vram_size: 16,
                system_page_size: 12,
                stack_size: 16,
            },
            ..MachineConfig::default()
        };
        let computer =
            Computer::new(&assembly.binary, &config, Arc::new(SyscallTable::standard())).unwrap();
        let session = Session::new(assembly.symbols, computer.memory.program_origin());
        (session, computer)
    }

    #[test]
    fn parse_command_test() {
        let command = Command::try_parse_from(["b", "loop"]).unwrap();
        assert!(matches!(
            command,
            Command::Break { address: parse::Argument::Name(ref name) } if name == "LOOP"
        ));

        let command = Command::try_parse_from(["mem", "$40", "4"]).unwrap();
        assert!(matches!(
            command,
            Command::Memory {
                address: parse::Argument::Number(0x40),
                number: 4
            }
        ));

        assert!(matches!(
            Command::try_parse_from(["s"]).unwrap(),
            Command::Step { number: 1 }
        ));
        assert!(Command::try_parse_from(["memory"]).is_err());
    }

    #[test]
    fn resolve_label_test() {
        let (session, _) = session_and_computer();
        let loop_label = parse::Argument::Name("LOOP".to_owned());
        assert_eq!(session.resolve(&loop_label), Ok(108 + 5));
    }

    #[test]
    fn list_continues_test() {
        let (mut session, computer) = session_and_computer();
        session.display_list(&computer, 2);
        assert_eq!(session.list_address, Some(108 + 6));
        session.display_list(&computer, 1);
        assert_eq!(session.list_address, Some(108 + 7));
        session.reset_list();
        assert_eq!(session.list_address, None);
    }

    #[test]
    fn advance_test() {
        let (mut session, mut computer) = session_and_computer();
        assert!(!session.advance(&mut computer, Some(1)));
        assert_eq!(computer.cpu.registers.pc, 108 + 5);

        // Runs into the HLT
        assert!(session.advance(&mut computer, None));
        assert!(!computer.running);
    }

    #[test]
    fn advance_stops_at_breakpoint_test() {
        let (mut session, mut computer) = session_and_computer();
        session.add_breakpoint(108 + 6);
        assert!(!session.advance(&mut computer, None));
        assert_eq!(computer.cpu.registers.pc, 108 + 6);
        assert!(computer.running);
    }

    #[test]
    fn advance_respects_cycle_limit_test() {
        let assembly = assemble("spin: sec\nbge spin\n").unwrap();
        let config = MachineConfig {
            layout: MemoryLayout {
                ram_size: 64,
                vram_size: 16,
                system_page_size: 12,
                stack_size: 16,
            },
            max_cycles: Some(20),
            ..MachineConfig::default()
        };
        let mut computer =
            Computer::new(&assembly.binary, &config, Arc::new(SyscallTable::standard())).unwrap();
        let mut session = Session::new(assembly.symbols, computer.memory.program_origin());

        assert!(session.advance(&mut computer, None));
        assert_eq!(computer.cycles, 20);
    }

    #[test]
    fn breakpoints_test() {
        let (mut session, _) = session_and_computer();
        session.add_breakpoint(113);
        session.add_breakpoint(113);
        assert!(session.has_breakpoint(113));
        session.remove_breakpoint(113);
        assert!(!session.has_breakpoint(113));
    }
}
