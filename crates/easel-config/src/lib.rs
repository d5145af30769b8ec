//! Shared configuration for the Easel plug-in host.
//!
//! Values are layered by `ortho_config`: command-line flags override
//! `EASEL_*` environment variables, which override the configuration file
//! named by `--config-path`, which overrides the built-in defaults below.

use std::path::PathBuf;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod stack_trace;

pub use defaults::{
    DEFAULT_LOG_FILTER, default_interpreter_path, default_log_filter, default_log_filter_string,
    default_log_format, default_plug_in_path, default_stack_trace_mode,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use stack_trace::StackTraceMode;

/// Wrapper target that applies the debug wrapper to every plug-in.
pub const DEBUG_WRAP_ALL: &str = "all";

/// Resolved configuration for the host and its command-line front end.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "EASEL")]
pub struct Config {
    /// Tracing filter expression, for example `info` or `easel_plugins=debug`.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the log sink.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Directories holding interpreter definition files, in `PATH` syntax.
    #[ortho_config(default = defaults::default_interpreter_path())]
    pub interpreter_path: String,
    /// Directories scanned for plug-in executables, in `PATH` syntax.
    #[ortho_config(default = defaults::default_plug_in_path())]
    pub plug_in_path: String,
    /// Stack trace policy handed to plug-ins.
    #[ortho_config(default = defaults::default_stack_trace_mode())]
    pub stack_trace_mode: StackTraceMode,
    /// Spawns every plug-in in a process group of its own.
    #[ortho_config(default = false)]
    pub new_process_group: bool,
    /// File name of the plug-in to run under the debug wrapper, or `all`.
    pub debug_wrap: Option<String>,
    /// Wrapper command line, for example `valgrind --leak-check=full`.
    pub debug_wrapper: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            interpreter_path: default_interpreter_path(),
            plug_in_path: default_plug_in_path(),
            stack_trace_mode: default_stack_trace_mode(),
            new_process_group: false,
            debug_wrap: None,
            debug_wrapper: None,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format of the log sink.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Interpreter directories in search order.
    #[must_use]
    pub fn interpreter_dirs(&self) -> Vec<PathBuf> {
        split_search_path(&self.interpreter_path)
    }

    /// Plug-in directories in search order.
    #[must_use]
    pub fn plug_in_dirs(&self) -> Vec<PathBuf> {
        split_search_path(&self.plug_in_path)
    }

    /// Stack trace policy handed to plug-ins.
    #[must_use]
    pub const fn stack_trace_mode(&self) -> StackTraceMode {
        self.stack_trace_mode
    }

    /// Whether plug-ins are spawned in a process group of their own.
    #[must_use]
    pub const fn new_process_group(&self) -> bool {
        self.new_process_group
    }

    /// Debug wrapper target and command, when both are configured.
    #[must_use]
    pub fn debug_wrap(&self) -> Option<(&str, &str)> {
        let target = self.debug_wrap.as_deref()?;
        let wrapper = self.debug_wrapper.as_deref()?;
        Some((target, wrapper))
    }
}

/// Splits a `PATH`-style list, dropping empty entries.
#[must_use]
pub fn split_search_path(path: &str) -> Vec<PathBuf> {
    std::env::split_paths(path)
        .filter(|entry| !entry.as_os_str().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_json_logs() {
        let config = Config::default();
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.stack_trace_mode(), StackTraceMode::Never);
        assert!(!config.new_process_group());
    }

    #[cfg(unix)]
    #[test]
    fn search_path_skips_empty_entries() {
        let dirs = split_search_path("/a::/b:");
        assert_eq!(dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn debug_wrap_requires_both_fields() {
        let mut config = Config {
            debug_wrap: Some(DEBUG_WRAP_ALL.to_owned()),
            ..Config::default()
        };
        assert!(config.debug_wrap().is_none());
        config.debug_wrapper = Some("valgrind".to_owned());
        assert_eq!(config.debug_wrap(), Some((DEBUG_WRAP_ALL, "valgrind")));
    }
}
