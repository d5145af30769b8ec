//! Configuration loading helpers for the CLI.
//!
//! Leading configuration flags are split off for `ortho_config` so the
//! command parser only sees the command and its own arguments.

use std::ffi::{OsStr, OsString};

use easel_config::Config;
use ortho_config::OrthoConfig;

use crate::AppError;

/// Configuration flags that take a value.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--interpreter-path",
    "--plug-in-path",
    "--stack-trace-mode",
    "--debug-wrap",
    "--debug-wrapper",
];

/// Configuration flags that stand alone.
const CONFIG_CLI_SWITCHES: &[&str] = &["--new-process-group"];

pub(crate) trait ConfigLoader {
    /// Loads configuration for the CLI.
    ///
    /// Configuration flags must appear before the command. Flags after it
    /// belong to the command.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_SWITCHES.contains(&flag) {
        return FlagAction::Include { needs_value: false };
    }
    if CONFIG_CLI_FLAGS.contains(&flag) {
        return FlagAction::Include {
            needs_value: !inline_value,
        };
    }
    FlagAction::Skip
}

pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut config_arguments: Vec<OsString> = Vec::new();
    let mut arguments = args.iter().enumerate();
    let Some((_, program)) = arguments.next() else {
        return ConfigArgumentSplit {
            config_arguments,
            command_start: 0,
        };
    };
    config_arguments.push(program.clone());

    let mut command_start = 1_usize;
    let mut pending_value = false;
    for (index, argument) in arguments {
        if pending_value {
            pending_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => pending_value = needs_value,
                FlagAction::Skip => break,
            }
        }
        config_arguments.push(argument.clone());
        command_start = index + 1;
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}

/// Arguments for the command parser: the program name and everything after
/// the configuration flags.
pub(crate) fn command_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    args.first()
        .into_iter()
        .chain(args.get(split.command_start..).unwrap_or_default())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn args(parts: &[&str]) -> Vec<OsString> {
        parts.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case::inline("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case::separate("--log-filter", FlagAction::Include { needs_value: true })]
    #[case::switch("--new-process-group", FlagAction::Include { needs_value: false })]
    #[case::command("query", FlagAction::Skip)]
    #[case::command_flag("--kind", FlagAction::Skip)]
    fn flags_are_classified(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify(OsStr::new(argument)), expected);
    }

    #[test]
    fn configuration_flags_stop_at_the_command() {
        let all = args(&[
            "easel",
            "--stack-trace-mode",
            "always",
            "--new-process-group",
            "--log-format=compact",
            "identify",
            "--kind",
            "save",
            "photo.png",
        ]);
        let split = split_config_arguments(&all);
        assert_eq!(
            split.config_arguments,
            args(&[
                "easel",
                "--stack-trace-mode",
                "always",
                "--new-process-group",
                "--log-format=compact",
            ])
        );
        assert_eq!(
            command_arguments(&all, &split),
            args(&["easel", "identify", "--kind", "save", "photo.png"])
        );
    }

    #[test]
    fn empty_arguments_split_cleanly() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert!(command_arguments(&[], &split).is_empty());
    }
}
