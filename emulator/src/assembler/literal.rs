//! Parse operand tokens.
//!
//! A token is either a hexadecimal number (prefixed by `$` or `@`), a decimal number (prefixed by
//! `#`) or a reference to a variable or a label.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize},
    sequence::{pair, preceded},
    IResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal<'a> {
    Hex(i64),
    Decimal(i64),

    /// Name of a variable, or of a label
    Reference(&'a str),
}

impl<'a> Literal<'a> {
    /// The numeric value of the token, if it is not a reference
    #[must_use]
    pub const fn number(&self) -> Option<i64> {
        match self {
            Literal::Hex(value) | Literal::Decimal(value) => Some(*value),
            Literal::Reference(_) => None,
        }
    }
}

/// Parse a hexadecimal number. Values too large for an `i64` saturate, the range check catches
/// them later.
fn from_hexadecimal(input: &str) -> i64 {
    i64::from_str_radix(input, 16).unwrap_or(i64::MAX)
}

/// Parse a signed decimal number, saturating like [`from_hexadecimal`]
fn from_decimal(input: &str) -> i64 {
    input.parse().unwrap_or(if input.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Check if character is a hexadecimal digit
fn is_hex_digit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

/// Extract a hexadecimal literal
fn take_hexadecimal_literal(input: &str) -> IResult<&str, &str> {
    preceded(one_of("$@"), take_while1(is_hex_digit))(input)
}

/// Extract a decimal literal, with its sign
fn take_decimal_literal(input: &str) -> IResult<&str, &str> {
    preceded(char('#'), recognize(pair(opt(one_of("+-")), digit1)))(input)
}

/// Check if character can be part of a label, variable or mnemonic name
fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Parse a label, variable or mnemonic name
pub(crate) fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_identifier_char)(input)
}

/// Parse an operand token
pub fn parse_literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(take_hexadecimal_literal, |digits| {
            Literal::Hex(from_hexadecimal(digits))
        }),
        map(take_decimal_literal, |digits| {
            Literal::Decimal(from_decimal(digits))
        }),
        map(parse_identifier, Literal::Reference),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hexadecimal_test() {
        assert_eq!(from_hexadecimal("4F"), 0x4f);
        assert_eq!(from_hexadecimal("4f"), 0x4f);
        assert_eq!(from_hexadecimal("7FFFFFFF"), 0x7FFF_FFFF);
        assert_eq!(from_hexadecimal("FFFFFFFFFFFFFFFFFF"), i64::MAX);
    }

    #[test]
    fn from_decimal_test() {
        assert_eq!(from_decimal("16"), 16);
        assert_eq!(from_decimal("+16"), 16);
        assert_eq!(from_decimal("-3"), -3);
        assert_eq!(from_decimal("99999999999999999999"), i64::MAX);
        assert_eq!(from_decimal("-99999999999999999999"), i64::MIN);
    }

    #[test]
    fn take_hexadecimal_literal_test() {
        assert_eq!(take_hexadecimal_literal("$4F"), Ok(("", "4F")));
        assert_eq!(take_hexadecimal_literal("@10 rest"), Ok((" rest", "10")));
        assert!(take_hexadecimal_literal("$").is_err());
        assert!(take_hexadecimal_literal("#10").is_err());
        assert!(take_hexadecimal_literal("FF").is_err()); // No prefix
    }

    #[test]
    fn take_decimal_literal_test() {
        assert_eq!(take_decimal_literal("#42"), Ok(("", "42")));
        assert_eq!(take_decimal_literal("#-42"), Ok(("", "-42")));
        assert!(take_decimal_literal("#").is_err());
        assert!(take_decimal_literal("42").is_err());
    }

    #[test]
    fn parse_literal_test() {
        assert_eq!(parse_literal("$FF"), Ok(("", Literal::Hex(255))));
        assert_eq!(parse_literal("@FF"), Ok(("", Literal::Hex(255))));
        assert_eq!(parse_literal("#255"), Ok(("", Literal::Decimal(255))));
        assert_eq!(parse_literal("LOOP"), Ok(("", Literal::Reference("LOOP"))));
        assert_eq!(
            parse_literal("MAIN_LOOP2"),
            Ok(("", Literal::Reference("MAIN_LOOP2")))
        );
        assert!(parse_literal("%A").is_err());
        assert_eq!(Literal::Reference("X").number(), None);
        assert_eq!(Literal::Decimal(3).number(), Some(3));
    }
}
