use std::borrow::Cow;
use std::collections::BTreeSet;
use std::marker::PhantomData;

use anstyle::Style;
use clap::{Command, CommandFactory};
use rustyline::{
    completion::Completer,
    highlight::Highlighter,
    hint::Hinter,
    validate::{ValidationContext, ValidationResult, Validator},
    Context,
};
use rustyline_derive::Helper;

/// Rustyline helper, that handles interactive completion, highlighting and hinting.
#[derive(Helper, Debug)]
pub(crate) struct RunHelper<T: CommandFactory> {
    app: PhantomData<T>,

    /// Symbol names offered when completing an address
    symbols: Vec<String>,
}

impl<T: CommandFactory> RunHelper<T> {
    pub fn new(symbols: Vec<String>) -> Self {
        RunHelper {
            app: PhantomData,
            symbols,
        }
    }

    /// Split the line up to the cursor, with an empty last word if the cursor follows a space
    fn words(line: &str) -> Option<Vec<String>> {
        let complete = line.ends_with([' ', '\t']);
        let mut words = shell_words::split(line).ok()?;
        if complete {
            words.push(String::new());
        }
        Some(words)
    }
}

fn suggest(command: &Command, symbols: &[String], input: &[String]) -> (usize, BTreeSet<String>) {
    let mut suggestions: BTreeSet<_> = command
        .get_subcommands()
        .flat_map(|cmd| {
            std::iter::once(cmd.get_name().to_string())
                .chain(cmd.get_visible_aliases().map(ToString::to_string))
        })
        .collect();

    // If the app has subcommands, it has a `help` command
    if command.has_subcommands() {
        suggestions.insert("help".to_string());
    }

    let index = input.len().saturating_sub(1);

    if let Some(arg) = command.get_positionals().nth(index) {
        if arg.get_id().as_str() == "address" {
            suggestions.extend(symbols.iter().cloned());
        }
    }

    match input {
        [last] => {
            let upper = last.to_ascii_uppercase();
            (
                last.len(),
                suggestions
                    .into_iter()
                    .filter(|candidate| {
                        candidate.starts_with(last.as_str()) || candidate.starts_with(&upper)
                    })
                    .collect(),
            )
        }

        [head, tail @ ..] => command
            .find_subcommand(head)
            .map(|sub: &Command| suggest(sub, symbols, tail))
            .unwrap_or_default(),

        [] => (0, suggestions),
    }
}

impl<T: CommandFactory> Completer for RunHelper<T> {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let Some(words) = Self::words(&line[..pos]) else {
            return Ok((0, Vec::new()));
        };

        let app = T::command();
        let (offset, candidates) = suggest(&app, &self.symbols, words.as_slice());
        Ok((pos - offset, candidates.into_iter().collect()))
    }
}

impl<T: CommandFactory> Highlighter for RunHelper<T> {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        let style = Style::new().dimmed();
        Cow::Owned(format!("{style}{hint}{style:#}"))
    }

    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        _default: bool,
    ) -> Cow<'b, str> {
        let style = Style::new().bold();
        Cow::Owned(format!("{style}{prompt}{style:#}"))
    }
}

impl<T: CommandFactory> Hinter for RunHelper<T> {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let words = Self::words(&line[..pos])?;
        let app = T::command();
        let (offset, candidates) = suggest(&app, &self.symbols, words.as_slice());

        if candidates.len() == 1 {
            candidates
                .into_iter()
                .next()
                .and_then(|candidate| candidate.get(offset..).map(ToString::to_string))
        } else {
            None
        }
    }
}

impl<T: CommandFactory> Validator for RunHelper<T> {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if shell_words::split(ctx.input()).is_err() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Parser)]
    #[command(no_binary_name = true)]
    enum Commands {
        Step,
        Stack,
        Break { address: String },
    }

    fn run(input: &[&str]) -> (usize, Vec<String>) {
        let input: Vec<String> = input.iter().map(ToString::to_string).collect();
        let symbols = vec!["LOOP".to_owned(), "START".to_owned()];
        let (offset, candidates) = suggest(&Commands::command(), &symbols, &input);
        (offset, candidates.into_iter().collect())
    }

    #[test]
    fn suggest_subcommand_test() {
        assert_eq!(run(&["st"]), (2, vec!["stack".to_owned(), "step".to_owned()]));
        assert_eq!(run(&["b"]), (1, vec!["break".to_owned()]));
    }

    #[test]
    fn suggest_symbol_test() {
        assert_eq!(run(&["break", "lo"]), (2, vec!["LOOP".to_owned()]));
        assert_eq!(run(&["step", "lo"]), (2, Vec::new()));
    }
}
