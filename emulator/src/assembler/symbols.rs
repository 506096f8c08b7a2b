use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::{Address, Word};

/// Names the assembler resolved, kept for debugging
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSymbols {
    /// Label name to offset in the program image
    pub labels: BTreeMap<String, Address>,

    /// Variables referenced by the program, with their resolved value
    pub variables: BTreeMap<String, Word>,
}

impl DebugSymbols {
    /// Where the symbols of a binary are written by default
    #[must_use]
    pub fn path_for(binary: &Utf8Path) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{binary}_dbg"))
    }

    /// Serialize to pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Forwards serialization errors.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// # Errors
    ///
    /// Fails if the input is not a valid symbol file.
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    /// Labels placed at an offset, in name order
    pub fn labels_at(&self, offset: Address) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(move |(_, o)| **o == offset)
            .map(|(name, _)| name.as_str())
    }

    /// Offset of a label. Lookups are case-insensitive, like the source.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<Address> {
        self.labels.get(&name.to_ascii_uppercase()).copied()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn symbols() -> DebugSymbols {
        DebugSymbols {
            labels: [("LOOP".to_owned(), 5), ("START".to_owned(), 0), ("TOP".to_owned(), 5)]
                .into_iter()
                .collect(),
            variables: [("SCREEN".to_owned(), 64)].into_iter().collect(),
        }
    }

    #[test]
    fn json_test() {
        let json = symbols().to_json().unwrap();
        assert_eq!(
            json,
            indoc! {r#"
                {
                  "labels": {
                    "LOOP": 5,
                    "START": 0,
                    "TOP": 5
                  },
                  "variables": {
                    "SCREEN": 64
                  }
                }"#}
        );
        assert_eq!(DebugSymbols::from_json(&json).unwrap(), symbols());
    }

    #[test]
    fn lookup_test() {
        let symbols = symbols();
        assert_eq!(symbols.label("loop"), Some(5));
        assert_eq!(symbols.label("missing"), None);
        assert_eq!(symbols.labels_at(5).collect::<Vec<_>>(), vec!["LOOP", "TOP"]);
        assert_eq!(symbols.labels_at(1).count(), 0);
    }

    #[test]
    fn path_for_test() {
        assert_eq!(
            DebugSymbols::path_for(Utf8Path::new("out/program.bin")),
            Utf8PathBuf::from("out/program.bin_dbg")
        );
    }
}
