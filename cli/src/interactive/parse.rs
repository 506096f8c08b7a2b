use std::str::FromStr;

use nom::combinator::all_consuming;
use nom::Finish;
use thiserror::Error;
use vrisc_emulator::assembler::{parse_literal, Literal};
use vrisc_emulator::constants::Address;
use vrisc_emulator::DebugSymbols;

/// An address typed in a debugger command, using the assembler's literal syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// A global address, like `$3FFFFFC` or `#64`
    Number(i64),

    /// A label, which points in the program ROM, or a variable
    Name(String),
}

#[derive(Debug, Error)]
#[error("could not parse address: {0}")]
pub struct ParseAddressError(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{0} is not a valid address")]
    OutOfRange(i64),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
}

impl FromStr for Argument {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_ascii_uppercase();
        let (_, literal) = all_consuming(parse_literal)(&input)
            .finish()
            .map_err(|e| ParseAddressError(format!("unexpected input at \"{}\"", e.input)))?;

        Ok(match literal {
            Literal::Hex(value) | Literal::Decimal(value) => Self::Number(value),
            Literal::Reference(name) => Self::Name(name.to_owned()),
        })
    }
}

impl Argument {
    /// Turn the argument into a global address.
    ///
    /// Labels are relative to the program origin, variables and numbers are taken as is.
    pub fn resolve(&self, symbols: &DebugSymbols, origin: Address) -> Result<Address, ResolveError> {
        match self {
            Self::Number(value) => {
                Address::try_from(*value).map_err(|_| ResolveError::OutOfRange(*value))
            }
            Self::Name(name) => {
                if let Some(offset) = symbols.label(name) {
                    return Ok(origin.wrapping_add(offset));
                }

                let value = symbols
                    .variables
                    .get(name)
                    .copied()
                    .ok_or_else(|| ResolveError::UnknownSymbol(name.clone()))?;
                Address::try_from(value).map_err(|_| ResolveError::OutOfRange(value.into()))
            }
        }
    }
}
