//! Program line parsing
//!
//! Lines are stripped of their comment, trimmed and upper-cased before being parsed. The
//! upper-casing only touches ASCII letters, so every byte of a cleaned line still sits at the same
//! distance from the start of the line as in the source, which lets errors point at the original
//! text.

use miette::SourceSpan;
use nom::{
    branch::alt,
    bytes::complete::is_not,
    character::complete::{char, space0, space1},
    combinator::{all_consuming, eof, map, opt},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use super::literal::parse_identifier;

/// A non-blank line of the source, after cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceLine {
    /// Line number, starting at 1
    pub number: usize,

    /// Byte offset of `text` in the source
    pub offset: usize,

    pub text: String,
}

impl SourceLine {
    /// Span of the whole line
    pub fn span(&self) -> SourceSpan {
        (self.offset, self.text.len()).into()
    }

    /// Span of a slice of `text`
    pub fn span_of(&self, part: &str) -> SourceSpan {
        let start = part.as_ptr() as usize - self.text.as_ptr() as usize;
        (self.offset + start, part.len()).into()
    }
}

/// Split the source in lines, drop comments and blank lines
pub(crate) fn source_lines(source: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut offset = 0;

    for (index, raw) in source.split('\n').enumerate() {
        let code = raw.split(';').next().unwrap_or_default();
        let leading = code.len() - code.trim_start().len();
        let text = code.trim();

        if !text.is_empty() {
            lines.push(SourceLine {
                number: index + 1,
                offset: offset + leading,
                text: text.to_ascii_uppercase(),
            });
        }

        offset += raw.len() + 1;
    }

    lines
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Statement<'a> {
    /// `NAME:` on its own, labelling the next instruction
    Label(&'a str),

    /// `NAME = VALUE`
    Variable { name: &'a str, value: &'a str },

    /// `[NAME:] MNEMONIC ARGS...`
    Instruction {
        label: Option<&'a str>,
        mnemonic: &'a str,
        arguments: Vec<&'a str>,
    },
}

/// Parses a label definition
fn parse_label_definition(input: &str) -> IResult<&str, &str> {
    terminated(parse_identifier, pair(space0, char(':')))(input)
}

/// Parses a whitespace-separated token
fn parse_token(input: &str) -> IResult<&str, &str> {
    is_not(" \t")(input)
}

/// Parses a line holding only a label
fn parse_label_line(input: &str) -> IResult<&str, Statement> {
    map(
        terminated(parse_label_definition, pair(space0, eof)),
        Statement::Label,
    )(input)
}

/// Parses a variable definition
fn parse_variable_line(input: &str) -> IResult<&str, Statement> {
    let (input, name) = parse_identifier(input)?;
    let (input, _) = delimited(space0, char('='), space0)(input)?;
    let (input, value) = parse_token(input)?;
    let (input, _) = pair(space0, eof)(input)?;
    Ok((input, Statement::Variable { name, value }))
}

/// Parses an instruction, with its optional inline label
fn parse_instruction_line(input: &str) -> IResult<&str, Statement> {
    let (input, label) = opt(terminated(parse_label_definition, space0))(input)?;
    let (input, mnemonic) = parse_identifier(input)?;
    let (input, arguments) = many0(preceded(space1, parse_token))(input)?;
    let (input, _) = space0(input)?;
    Ok((
        input,
        Statement::Instruction {
            label,
            mnemonic,
            arguments,
        },
    ))
}

/// Parses a whole cleaned line
pub(crate) fn parse_statement(input: &str) -> IResult<&str, Statement> {
    all_consuming(alt((
        parse_label_line,
        parse_variable_line,
        parse_instruction_line,
    )))(input)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[track_caller]
    fn fully_parsed<T>(result: IResult<&str, T>) -> T {
        let (input, result) = result.unwrap();
        assert_eq!(input, "");
        result
    }

    #[test]
    fn parse_label_line_test() {
        assert_eq!(
            fully_parsed(parse_statement("LOOP:")),
            Statement::Label("LOOP")
        );
        assert_eq!(
            fully_parsed(parse_statement("LOOP :")),
            Statement::Label("LOOP")
        );
    }

    #[test]
    fn parse_variable_line_test() {
        assert_eq!(
            fully_parsed(parse_statement("SCREEN = $40")),
            Statement::Variable {
                name: "SCREEN",
                value: "$40"
            }
        );
        assert_eq!(
            fully_parsed(parse_statement("X=#3")),
            Statement::Variable {
                name: "X",
                value: "#3"
            }
        );
    }

    #[test]
    fn parse_instruction_line_test() {
        assert_eq!(
            fully_parsed(parse_statement("HLT")),
            Statement::Instruction {
                label: None,
                mnemonic: "HLT",
                arguments: vec![],
            }
        );
        assert_eq!(
            fully_parsed(parse_statement("START: LDI   #5")),
            Statement::Instruction {
                label: Some("START"),
                mnemonic: "LDI",
                arguments: vec!["#5"],
            }
        );
        assert_eq!(
            fully_parsed(parse_statement("STR\t$10 #1")),
            Statement::Instruction {
                label: None,
                mnemonic: "STR",
                arguments: vec!["$10", "#1"],
            }
        );
    }

    #[test]
    fn parse_invalid_line_test() {
        assert!(parse_statement(": LDI #5").is_err());
        assert!(parse_statement("X: Y:").is_err());
        assert!(parse_statement("%%").is_err());
    }

    #[test]
    fn source_lines_test() {
        let source = "; header comment\nstart:\n  ldi #5 ; load\n\r\n  hlt\r\n";

        let lines = source_lines(source);
        assert_eq!(
            lines,
            vec![
                SourceLine {
                    number: 2,
                    offset: 17,
                    text: "START:".to_owned(),
                },
                SourceLine {
                    number: 3,
                    offset: 26,
                    text: "LDI #5".to_owned(),
                },
                SourceLine {
                    number: 5,
                    offset: 44,
                    text: "HLT".to_owned(),
                },
            ]
        );

        // Spans point back at the source
        let span = lines[1].span_of(&lines[1].text[4..]);
        assert_eq!(&source[span.offset()..span.offset() + span.len()], "#5");
    }
}
