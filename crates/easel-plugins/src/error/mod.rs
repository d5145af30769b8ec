//! Domain errors raised by plug-in host operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from the lifetime of a plug-in process.
#[derive(Debug, Error)]
pub enum PlugInError {
    /// Pipe or process creation failed; no process was left behind.
    #[error("plug-in '{path}' failed to start: {message}")]
    SpawnFailed {
        /// Plug-in executable.
        path: PathBuf,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plug-in broke the wire protocol mid-session.
    #[error("plug-in '{path}' violated the protocol: {message}")]
    Protocol {
        /// Plug-in executable.
        path: PathBuf,
        /// Description of the violation.
        message: String,
    },

    /// The plug-in exited or hung up without the expected handshake.
    #[error("plug-in '{path}' crashed")]
    Crashed {
        /// Plug-in executable.
        path: PathBuf,
    },

    /// The operation needs an open plug-in.
    #[error("plug-in '{path}' is not open")]
    NotOpen {
        /// Plug-in executable.
        path: PathBuf,
    },

    /// Plug-in processes are one-shot and cannot be opened twice.
    #[error("plug-in '{path}' has already been opened")]
    AlreadyUsed {
        /// Plug-in executable.
        path: PathBuf,
    },

    /// Writing to or flushing the plug-in's pipe failed.
    #[error("I/O error communicating with plug-in '{path}': {source}")]
    Io {
        /// Plug-in executable.
        path: PathBuf,
        /// Underlying wire error.
        #[source]
        source: WireError,
    },
}

/// Errors raised by the wire codec and the buffered writer.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// The channel failed at the operating-system level.
    #[error("channel error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// A frame was received but could not be decoded.
    #[error("undecodable frame: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// A message could not be encoded.
    #[error("failed to encode message: {message}")]
    Encode {
        /// Description of the encoding failure.
        message: String,
    },

    /// The channel closed in the middle of a frame.
    #[error("channel closed in the middle of a frame")]
    Truncated,
}

impl From<std::io::Error> for WireError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

/// Problems found while loading interpreter definition files.
///
/// These are never returned from [`InterpreterDb::load`]: the offending
/// record is skipped and the error is logged.
///
/// [`InterpreterDb::load`]: crate::interpreter::InterpreterDb::load
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// A `name=program` declaration names no usable executable.
    #[error("bad interpreter referenced in interpreter file {file}: {program}")]
    BadInterpreter {
        /// Interpreter definition file.
        file: PathBuf,
        /// Program that could not be located.
        program: String,
    },

    /// A binfmt-style record is malformed.
    #[error("bad binary format string in interpreter file {file}: {reason}")]
    BadBinfmt {
        /// Interpreter definition file.
        file: PathBuf,
        /// Which rule the record broke.
        reason: &'static str,
    },

    /// An interpreter directory or file could not be read.
    #[error("failed to read interpreter file {file}: {source}")]
    Io {
        /// File or directory being read.
        file: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Misuse of a plug-in's procedure frame stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No temporary frame is on the stack.
    #[error("no temporary procedure frame is active")]
    Empty,

    /// The frame being popped is not the top of the stack.
    #[error("attempted to pop a procedure frame that is not the current top")]
    NotTop,
}

/// Failures while choosing a file procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileProcedureError {
    /// No candidate matched the file.
    #[error("unknown file type: {uri}")]
    UnknownFileType {
        /// The file that could not be matched.
        uri: String,
    },

    /// A magic rule could not be parsed.
    #[error("invalid magic rule '{rule}': {reason}")]
    InvalidMagic {
        /// Offending rule text.
        rule: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Errors raised by the procedure registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A temporary procedure with this name already exists.
    #[error("procedure '{name}' is already registered")]
    DuplicateTemporary {
        /// Procedure name.
        name: String,
    },

    /// No procedure with this name is registered.
    #[error("procedure '{name}' is not registered")]
    UnknownProcedure {
        /// Procedure name.
        name: String,
    },

    /// The procedure belongs to another plug-in.
    #[error("procedure '{name}' is not owned by '{owner}'")]
    NotOwner {
        /// Procedure name.
        name: String,
        /// Plug-in that attempted the change.
        owner: PathBuf,
    },

    /// A file handler carried an unusable magic rule.
    #[error("file handler for '{name}' is invalid: {source}")]
    InvalidHandler {
        /// Procedure name.
        name: String,
        /// Underlying parse failure.
        #[source]
        source: FileProcedureError,
    },
}

#[cfg(test)]
mod tests;
