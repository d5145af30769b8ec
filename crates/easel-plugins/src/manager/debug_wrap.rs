//! Running selected plug-ins under a debugger or profiler.

use std::ffi::OsString;
use std::path::Path;

use easel_config::{Config, DEBUG_WRAP_ALL};

use crate::host::ArgvRewriter;

/// Prefixes the argv of matching plug-ins with a wrapper command, for
/// example `valgrind --leak-check=full`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugWrapper {
    target: String,
    command: Vec<OsString>,
}

impl DebugWrapper {
    /// Wraps plug-ins whose file name is `target`, or every plug-in when
    /// `target` is `all`.
    #[must_use]
    pub fn new(target: impl Into<String>, command_line: &str) -> Self {
        Self {
            target: target.into(),
            command: command_line.split_whitespace().map(OsString::from).collect(),
        }
    }

    /// Wrapper configured through `debug_wrap` and `debug_wrapper`.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        let (target, command_line) = config.debug_wrap()?;
        let wrapper = Self::new(target, command_line);
        (!wrapper.command.is_empty()).then_some(wrapper)
    }

    fn applies_to(&self, plug_in: &Path) -> bool {
        self.target == DEBUG_WRAP_ALL
            || plug_in
                .file_name()
                .is_some_and(|name| name.to_string_lossy() == self.target)
    }
}

impl ArgvRewriter for DebugWrapper {
    fn rewrite(&self, plug_in: &Path, argv: Vec<OsString>) -> Vec<OsString> {
        if !self.applies_to(plug_in) {
            return argv;
        }
        self.command.iter().cloned().chain(argv).collect()
    }
}
