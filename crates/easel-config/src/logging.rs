//! Output formats for the host's log sink.
//!
//! `log_filter` is an `EnvFilter` expression over tracing targets. The host
//! library logs under one target per concern (`easel_plugins::interpreter`,
//! `easel_plugins::process`, `easel_plugins::frame`,
//! `easel_plugins::manager`), and notifications meant for the user go to
//! `easel_plugins::notify`. For example `warn,easel_plugins::process=debug`
//! traces plug-in spawning and teardown only.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How log records are rendered on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record with the plug-in fields flattened in.
    #[default]
    Json,
    /// Single-line text for reading plug-in traces in a terminal.
    Compact,
}

impl LogFormat {
    /// Returns `true` when records are emitted as machine-readable JSON.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Error returned when a `log_format` value names no known format.
pub type LogFormatParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::json("json", LogFormat::Json, true)]
    #[case::upper("COMPACT", LogFormat::Compact, false)]
    fn formats_parse_without_case(
        #[case] text: &str,
        #[case] format: LogFormat,
        #[case] structured: bool,
    ) {
        let parsed: LogFormat = text.parse().expect("parse format");
        assert_eq!(parsed, format);
        assert_eq!(parsed.is_structured(), structured);
    }

    #[rstest]
    fn unknown_format_is_rejected() {
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
