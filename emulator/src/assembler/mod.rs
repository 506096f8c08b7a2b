//! Two-pass assembler.
//!
//! The first pass parses every line, expands macros, places labels and resolves the operands it
//! already can: numbers and variables defined earlier. Every other reference is left pending. The
//! second pass resolves pending operands once all labels and variables are known, variables
//! first, then labels.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{Address, Word, PROGRAM_LENGTH};
use crate::runtime::{Instruction, Opcode};

mod encode;
mod line;
mod literal;
mod symbols;

pub use self::literal::{parse_literal, Literal};
pub use self::symbols::DebugSymbols;

use self::encode::{expand, Emitted, Operand};
use self::line::{parse_statement, source_lines, SourceLine, Statement};

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("syntax error on line {line}: {reason}")]
    #[diagnostic(code(vrisc::syntax))]
    Syntax {
        line: usize,
        reason: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("label {name} defined while label {pending} is still waiting for an instruction")]
    #[diagnostic(code(vrisc::duplicate_open_label))]
    DuplicateOpenLabel {
        name: String,
        pending: String,
        #[label("this label")]
        span: SourceSpan,
        #[label("is not attached to anything")]
        pending_span: SourceSpan,
    },

    #[error("duplicate label {name}")]
    #[diagnostic(code(vrisc::duplicate_label))]
    DuplicateLabel {
        name: String,
        #[label("redefined here")]
        span: SourceSpan,
        #[label("first defined here")]
        first: SourceSpan,
    },

    #[error("label {name} is not followed by any instruction")]
    #[diagnostic(code(vrisc::dangling_label))]
    DanglingLabel {
        name: String,
        #[label("dangling label")]
        span: SourceSpan,
    },

    #[error("integer {value} outside of the expected range")]
    #[diagnostic(code(vrisc::integer_out_of_range))]
    IntegerOutOfRange {
        value: i64,
        #[label("expected {expected}")]
        span: SourceSpan,
        expected: String,
    },

    #[error("unrecognized instruction {mnemonic}")]
    #[diagnostic(code(vrisc::unrecognized_instruction))]
    UnrecognizedInstruction {
        mnemonic: String,
        #[label("unknown mnemonic")]
        span: SourceSpan,
    },

    #[error("reference not found: {name}")]
    #[diagnostic(code(vrisc::unresolved_reference))]
    UnresolvedReference {
        name: String,
        #[label("no label or variable with this name")]
        span: SourceSpan,
    },

    #[error("variable {name} is defined in terms of itself")]
    #[diagnostic(code(vrisc::circular_variable))]
    CircularVariable {
        name: String,
        #[label("used here")]
        span: SourceSpan,
    },

    #[error("program is too large: {size} bytes, at most {} fit", PROGRAM_LENGTH)]
    #[diagnostic(code(vrisc::program_too_large))]
    ProgramTooLarge { size: usize },
}

/// An assembled program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// The program image, exactly [`PROGRAM_LENGTH`] bytes long
    pub binary: Vec<u8>,
    pub symbols: DebugSymbols,
}

#[derive(Debug, Clone, Copy)]
struct Label {
    offset: Address,
    span: SourceSpan,
}

#[derive(Debug, Clone, Copy)]
struct Variable<'a> {
    literal: Literal<'a>,
    span: SourceSpan,
}

/// The operand of an instruction, once the first pass went over it
#[derive(Debug, Clone, Copy)]
enum Slot<'a> {
    Resolved(Word),
    Pending(Operand<'a>),
}

#[derive(Debug, Clone, Copy)]
struct Placed<'a> {
    opcode: Opcode,
    operand: Option<Slot<'a>>,
}

/// Names visible when resolving a reference
struct Scope<'s, 'a> {
    variables: &'s HashMap<&'a str, Variable<'a>>,

    /// `None` during the first pass, when labels are not all known yet
    labels: Option<&'s BTreeMap<&'a str, Label>>,
}

impl<'s, 'a> Scope<'s, 'a> {
    /// Resolve a literal to a value, or `None` if it has to wait for the second pass
    fn resolve(
        &self,
        literal: Literal<'a>,
        span: SourceSpan,
        referenced: &mut BTreeSet<&'a str>,
        visiting: &mut Vec<&'a str>,
    ) -> Result<Option<Word>, AssemblyError> {
        let name = match literal {
            Literal::Hex(value) | Literal::Decimal(value) => {
                return check_range(value, span).map(Some);
            }
            Literal::Reference(name) => name,
        };

        if let Some(variable) = self.variables.get(name) {
            if visiting.contains(&name) {
                return Err(AssemblyError::CircularVariable {
                    name: name.to_owned(),
                    span,
                });
            }

            referenced.insert(name);
            visiting.push(name);
            let value = self.resolve(variable.literal, variable.span, referenced, visiting);
            visiting.pop();
            return value;
        }

        match self.labels {
            None => Ok(None),
            Some(labels) => match labels.get(name) {
                Some(label) => Ok(Some(check_range(i64::from(label.offset), span)?)),
                None => Err(AssemblyError::UnresolvedReference {
                    name: name.to_owned(),
                    span,
                }),
            },
        }
    }
}

fn check_range(value: i64, span: SourceSpan) -> Result<Word, AssemblyError> {
    Word::try_from(value)
        .ok()
        .filter(|v| *v >= 0)
        .ok_or_else(|| AssemblyError::IntegerOutOfRange {
            value,
            span,
            expected: format!("a value between 0 and {}", Word::MAX),
        })
}

#[derive(Default)]
struct Assembler<'a> {
    placed: Vec<Placed<'a>>,
    offset: usize,
    labels: BTreeMap<&'a str, Label>,
    variables: HashMap<&'a str, Variable<'a>>,
    referenced: BTreeSet<&'a str>,
    pending_label: Option<(&'a str, SourceSpan)>,
}

impl<'a> Assembler<'a> {
    fn ingest(&mut self, line: &'a SourceLine) -> Result<(), AssemblyError> {
        let (_, statement) = parse_statement(&line.text).map_err(|_| AssemblyError::Syntax {
            line: line.number,
            reason: "could not parse line".to_owned(),
            span: line.span(),
        })?;

        match statement {
            Statement::Label(name) => {
                let span = line.span_of(name);
                self.check_no_pending_label(name, span)?;
                self.pending_label = Some((name, span));
            }

            Statement::Variable { name, value } => {
                if let Some((label, span)) = self.pending_label.take() {
                    self.define_label(label, span)?;
                }

                let (_, literal) = nom::combinator::all_consuming(parse_literal)(value).map_err(
                    |_| AssemblyError::Syntax {
                        line: line.number,
                        reason: format!("invalid value {value}"),
                        span: line.span_of(value),
                    },
                )?;

                if self.variables.contains_key(name) {
                    warn!(name, line = line.number, "Ignoring variable redefinition");
                } else {
                    debug!(name, value, "Defining variable");
                    self.variables.insert(
                        name,
                        Variable {
                            literal,
                            span: line.span_of(value),
                        },
                    );
                }
            }

            Statement::Instruction {
                label,
                mnemonic,
                arguments,
            } => {
                let label = match label {
                    Some(name) => {
                        let span = line.span_of(name);
                        self.check_no_pending_label(name, span)?;
                        Some((name, span))
                    }
                    None => self.pending_label.take(),
                };

                let mut emitted = expand(mnemonic, &arguments, line)?;

                // The label of a macro line lands on its trailing instruction
                let last = emitted.pop();
                for e in emitted {
                    self.place(e)?;
                }

                if let Some((name, span)) = label {
                    self.define_label(name, span)?;
                }

                if let Some(e) = last {
                    self.place(e)?;
                }
            }
        }

        Ok(())
    }

    fn check_no_pending_label(&self, name: &str, span: SourceSpan) -> Result<(), AssemblyError> {
        match self.pending_label {
            Some((pending, pending_span)) => Err(AssemblyError::DuplicateOpenLabel {
                name: name.to_owned(),
                pending: pending.to_owned(),
                span,
                pending_span,
            }),
            None => Ok(()),
        }
    }

    fn define_label(&mut self, name: &'a str, span: SourceSpan) -> Result<(), AssemblyError> {
        if let Some(first) = self.labels.get(name) {
            return Err(AssemblyError::DuplicateLabel {
                name: name.to_owned(),
                span,
                first: first.span,
            });
        }

        // Offsets past the address space can only come with a program far too large
        let offset = Address::try_from(self.offset).unwrap_or(Address::MAX);
        debug!(name, offset, "Placing label");
        self.labels.insert(name, Label { offset, span });
        Ok(())
    }

    /// Append an instruction, resolving its operand if possible
    fn place(&mut self, emitted: Emitted<'a>) -> Result<(), AssemblyError> {
        let operand = match emitted.operand {
            None => None,
            Some(operand) => {
                let scope = Scope {
                    variables: &self.variables,
                    labels: None,
                };
                let value = scope.resolve(
                    operand.literal,
                    operand.span,
                    &mut self.referenced,
                    &mut Vec::new(),
                )?;
                if let Some(value) = value {
                    check_target(emitted.opcode, value, operand.span)?;
                }
                Some(value.map_or(Slot::Pending(operand), Slot::Resolved))
            }
        };

        self.offset += emitted.opcode.encoded_len();
        self.placed.push(Placed {
            opcode: emitted.opcode,
            operand,
        });
        Ok(())
    }

    /// Resolve the pending operands, then emit the image
    fn finish(mut self) -> Result<Assembly, AssemblyError> {
        if let Some((name, span)) = self.pending_label {
            return Err(AssemblyError::DanglingLabel {
                name: name.to_owned(),
                span,
            });
        }

        if self.offset > PROGRAM_LENGTH {
            return Err(AssemblyError::ProgramTooLarge { size: self.offset });
        }

        let scope = Scope {
            variables: &self.variables,
            labels: Some(&self.labels),
        };

        let mut binary = Vec::with_capacity(PROGRAM_LENGTH);
        for placed in &self.placed {
            let value = match placed.operand {
                None => 0,
                Some(Slot::Resolved(value)) => value,
                Some(Slot::Pending(operand)) => {
                    let value = scope
                        .resolve(
                            operand.literal,
                            operand.span,
                            &mut self.referenced,
                            &mut Vec::new(),
                        )?
                        .unwrap_or_default();
                    check_target(placed.opcode, value, operand.span)?;
                    value
                }
            };

            Instruction::decode(placed.opcode, value).encode(&mut binary);
        }
        binary.resize(PROGRAM_LENGTH, 0);

        let mut symbols = DebugSymbols {
            labels: self
                .labels
                .iter()
                .map(|(name, label)| ((*name).to_owned(), label.offset))
                .collect(),
            variables: BTreeMap::new(),
        };

        for name in &self.referenced {
            let value = scope
                .resolve(
                    Literal::Reference(name),
                    SourceSpan::from(0),
                    &mut BTreeSet::new(),
                    &mut Vec::new(),
                )?
                .unwrap_or_default();
            symbols.variables.insert((*name).to_owned(), value);
        }

        Ok(Assembly { binary, symbols })
    }
}

/// Branch targets must land in the program
fn check_target(opcode: Opcode, value: Word, span: SourceSpan) -> Result<(), AssemblyError> {
    if opcode == Opcode::Bge && usize::try_from(value).is_ok_and(|v| v >= PROGRAM_LENGTH) {
        return Err(AssemblyError::IntegerOutOfRange {
            value: value.into(),
            span,
            expected: format!("an offset below {PROGRAM_LENGTH}"),
        });
    }
    Ok(())
}

/// Assemble a program
///
/// # Errors
///
/// Fails on the first error found. No partial image is returned.
#[tracing::instrument(skip(source))]
pub fn assemble(source: &str) -> Result<Assembly, AssemblyError> {
    let lines = source_lines(source);
    debug!(lines = lines.len(), "Assembling program");

    let mut assembler = Assembler::default();
    for line in &lines {
        assembler.ingest(line)?;
    }

    assembler.finish()
}
