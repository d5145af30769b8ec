//! Plug-in host for the Easel image editor.
//!
//! The `easel-plugins` crate launches external helper programs, talks to
//! them over a line-framed protocol on two private pipes, and keeps track of
//! the procedures and file handlers they register. It answers two questions
//! the editor asks all the time: how a given plug-in executable has to be
//! started, and which registered procedure should load, save or export a
//! given file.
//!
//! # Architecture
//!
//! - [`interpreter`] reads interpreter definitions and picks the program
//!   that runs a script plug-in (shebang, binary magic, file extension).
//! - [`process`] owns one child process: its pipes, its input watch and its
//!   [`frame`] stack of in-flight calls.
//! - [`registry`] holds every installed procedure; [`file_procedure`]
//!   identifies files against the registered handlers.
//! - [`manager`] ties it together and routes procedure calls by kind.
//!
//! Everything runs on the editor's thread. Asynchronous calls are awaited
//! inside a `tokio` `LocalSet`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use easel_plugins::{Collaborators, ManagerConfig, PlugInManager};
//!
//! let manager = PlugInManager::new(ManagerConfig::default(), Collaborators::default());
//! manager.load_interpreters();
//! let outcome = manager.query(Path::new("/opt/easel/plug-ins/blur")).expect("query");
//! for procedure in &outcome.procedures {
//!     println!("{}", procedure.name);
//! }
//! ```

pub mod error;
pub mod file_procedure;
pub mod frame;
pub mod host;
pub mod interpreter;
pub mod manager;
pub mod process;
pub mod protocol;
pub mod registry;

#[cfg(test)]
mod tests;

pub use self::error::{
    FileProcedureError, FrameError, InterpreterError, PlugInError, RegistryError, WireError,
};
pub use self::file_procedure::FileProcedure;
pub use self::host::{
    ArgvRewriter, CancelHandle, Context, EnvironmentTable, LogNotifier, Notifier,
    ProcedureHandler, ProgressSink,
};
pub use self::interpreter::{InterpreterDb, ResolvedInterpreter};
pub use self::manager::{Collaborators, DebugWrapper, ManagerConfig, PlugInManager, QueryOutcome};
pub use self::process::{PlugInId, PlugInProcess};
pub use self::protocol::{
    CallMode, FileHandlerDef, FileHandlerKind, Message, PdbStatus, ProcedureDef, ProcedureKind,
    ReturnValues, Value, ValueType,
};
pub use self::registry::{ProcedureOwner, ProcedureRegistry, RegisteredProcedure};
