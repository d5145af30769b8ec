//! Settings the manager applies to every plug-in it starts.

use std::path::PathBuf;

use easel_config::{Config, StackTraceMode};

use crate::protocol::DEFAULT_WRITE_BUFFER_CAPACITY;

/// Manager settings derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    interpreter_dirs: Vec<PathBuf>,
    stack_trace_mode: StackTraceMode,
    new_process_group: bool,
    write_buffer_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            interpreter_dirs: Vec::new(),
            stack_trace_mode: StackTraceMode::default(),
            new_process_group: false,
            write_buffer_capacity: DEFAULT_WRITE_BUFFER_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Takes the plug-in settings from the layered configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            interpreter_dirs: config.interpreter_dirs(),
            stack_trace_mode: config.stack_trace_mode(),
            new_process_group: config.new_process_group(),
            write_buffer_capacity: DEFAULT_WRITE_BUFFER_CAPACITY,
        }
    }

    /// Replaces the interpreter search path.
    #[must_use]
    pub fn with_interpreter_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.interpreter_dirs = dirs;
        self
    }

    /// Sets the stack trace policy.
    #[must_use]
    pub const fn with_stack_trace_mode(mut self, mode: StackTraceMode) -> Self {
        self.stack_trace_mode = mode;
        self
    }

    /// Spawns plug-ins in a process group of their own.
    #[must_use]
    pub const fn with_new_process_group(mut self, enabled: bool) -> Self {
        self.new_process_group = enabled;
        self
    }

    /// Sets the write buffer capacity.
    #[must_use]
    pub const fn with_write_buffer_capacity(mut self, capacity: usize) -> Self {
        self.write_buffer_capacity = capacity;
        self
    }

    /// Interpreter definition directories.
    #[must_use]
    pub fn interpreter_dirs(&self) -> &[PathBuf] {
        &self.interpreter_dirs
    }

    /// Stack trace policy.
    #[must_use]
    pub const fn stack_trace_mode(&self) -> StackTraceMode {
        self.stack_trace_mode
    }

    /// Whether plug-ins get a process group of their own.
    #[must_use]
    pub const fn new_process_group(&self) -> bool {
        self.new_process_group
    }

    /// Capacity of each plug-in's write buffer.
    #[must_use]
    pub const fn write_buffer_capacity(&self) -> usize {
        self.write_buffer_capacity
    }
}
