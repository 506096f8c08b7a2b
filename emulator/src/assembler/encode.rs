//! Turn an instruction line into the instructions it stands for.
//!
//! Most mnemonics map to a single instruction. Two forms are macros:
//!
//! - `STR A B` loads `B`, pushes it, loads `A` and stores, which writes `B` at address `A`;
//! - `PG X` is `STR $00 X`.

use miette::SourceSpan;
use nom::combinator::all_consuming;

use super::line::SourceLine;
use super::literal::{parse_literal, Literal};
use super::AssemblyError;
use crate::runtime::Opcode;

/// An operand as written in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Operand<'a> {
    pub literal: Literal<'a>,
    pub span: SourceSpan,
}

/// One instruction to emit, with its operand still unresolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Emitted<'a> {
    pub opcode: Opcode,
    pub operand: Option<Operand<'a>>,
}

impl<'a> Emitted<'a> {
    const fn bare(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    const fn with(opcode: Opcode, operand: Operand<'a>) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }
}

/// Parse an operand token
fn parse_operand<'a>(token: &'a str, line: &SourceLine) -> Result<Operand<'a>, AssemblyError> {
    let (_, literal) = all_consuming(parse_literal)(token).map_err(|_| AssemblyError::Syntax {
        line: line.number,
        reason: format!("invalid operand {token}"),
        span: line.span_of(token),
    })?;

    Ok(Operand {
        literal,
        span: line.span_of(token),
    })
}

fn check_arity(
    mnemonic: &str,
    arguments: &[&str],
    expected: &[usize],
    line: &SourceLine,
) -> Result<(), AssemblyError> {
    if expected.contains(&arguments.len()) {
        return Ok(());
    }

    let expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
    Err(AssemblyError::Syntax {
        line: line.number,
        reason: format!(
            "{mnemonic} takes {} operand(s), got {}",
            expected.join(" or "),
            arguments.len()
        ),
        span: line.span(),
    })
}

/// Store `value` at `address`
fn store_immediate<'a>(address: Operand<'a>, value: Operand<'a>) -> Vec<Emitted<'a>> {
    vec![
        Emitted::with(Opcode::Ldi, value),
        Emitted::bare(Opcode::Push),
        Emitted::with(Opcode::Ldi, address),
        Emitted::bare(Opcode::Str),
    ]
}

/// Expand an instruction line
pub(crate) fn expand<'a>(
    mnemonic: &'a str,
    arguments: &[&'a str],
    line: &SourceLine,
) -> Result<Vec<Emitted<'a>>, AssemblyError> {
    if mnemonic == "PG" {
        check_arity(mnemonic, arguments, &[1], line)?;
        let page = Operand {
            literal: Literal::Hex(0),
            span: line.span(),
        };
        return Ok(store_immediate(page, parse_operand(arguments[0], line)?));
    }

    let opcode =
        Opcode::from_mnemonic(mnemonic).ok_or_else(|| AssemblyError::UnrecognizedInstruction {
            mnemonic: mnemonic.to_owned(),
            span: line.span_of(mnemonic),
        })?;

    if opcode == Opcode::Str {
        check_arity(mnemonic, arguments, &[0, 2], line)?;
        if let &[address, value] = arguments {
            return Ok(store_immediate(
                parse_operand(address, line)?,
                parse_operand(value, line)?,
            ));
        }
        return Ok(vec![Emitted::bare(opcode)]);
    }

    if opcode.has_operand() {
        check_arity(mnemonic, arguments, &[1], line)?;
        Ok(vec![Emitted::with(opcode, parse_operand(arguments[0], line)?)])
    } else {
        check_arity(mnemonic, arguments, &[0], line)?;
        Ok(vec![Emitted::bare(opcode)])
    }
}
