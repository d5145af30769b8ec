use std::env;
use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::stack_trace::StackTraceMode;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Sub-directory of the platform configuration directory holding interpreter files.
const INTERPRETER_DIR: &str = "interpreters";

/// Sub-directory of the platform data directory holding plug-in executables.
const PLUG_IN_DIR: &str = "plug-ins";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default stack trace policy passed to plug-ins.
#[must_use]
pub const fn default_stack_trace_mode() -> StackTraceMode {
    StackTraceMode::Never
}

/// Default interpreter search path, rendered in `PATH` syntax.
#[must_use]
pub fn default_interpreter_path() -> String {
    render_search_path(dirs::config_dir(), INTERPRETER_DIR)
}

/// Default plug-in search path, rendered in `PATH` syntax.
#[must_use]
pub fn default_plug_in_path() -> String {
    render_search_path(dirs::data_dir(), PLUG_IN_DIR)
}

fn render_search_path(base: Option<PathBuf>, leaf: &str) -> String {
    let mut dir = base.unwrap_or_else(env::temp_dir);
    dir.push("easel");
    dir.push(leaf);
    dir.to_string_lossy().into_owned()
}
