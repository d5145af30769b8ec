//! Stack trace policy handed to every plug-in on its command line.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// When plug-ins should print a stack trace after a fatal signal.
///
/// The numeric form is part of the plug-in command line contract: the last
/// argument passed to a plug-in is `0`, `1` or `2`.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StackTraceMode {
    /// Never print a stack trace.
    #[default]
    Never,
    /// Ask the user before printing one.
    Query,
    /// Always print a stack trace.
    Always,
}

impl StackTraceMode {
    /// Returns the argument handed to plug-ins.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Never => "0",
            Self::Query => "1",
            Self::Always => "2",
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::never(StackTraceMode::Never, "0")]
    #[case::query(StackTraceMode::Query, "1")]
    #[case::always(StackTraceMode::Always, "2")]
    fn argument_is_numeric(#[case] mode: StackTraceMode, #[case] expected: &str) {
        assert_eq!(mode.as_arg(), expected);
    }

    #[test]
    fn parses_case_insensitively() {
        let mode: StackTraceMode = "ALWAYS".parse().expect("parse mode");
        assert_eq!(mode, StackTraceMode::Always);
    }
}
