//! Collaborators supplied by the embedding editor.
//!
//! The plug-in host never shows dialogs or draws progress bars itself. It
//! reports through these traits; the editor decides how to present them.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use tracing::warn;

use crate::protocol::{ReturnValues, Value};

/// Tracing target for user-facing notifications.
const NOTIFY_TARGET: &str = "easel_plugins::notify";

/// The editor state a procedure call runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    name: String,
    display_id: Option<u32>,
}

impl Context {
    /// Context called `name` without a display.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_id: None,
        }
    }

    /// Binds the context to a display.
    #[must_use]
    pub const fn with_display(mut self, display_id: u32) -> Self {
        self.display_id = Some(display_id);
        self
    }

    /// Context name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Display the call came from.
    #[must_use]
    pub const fn display_id(&self) -> Option<u32> {
        self.display_id
    }

    /// Nested context pushed by a plug-in at `depth`.
    #[must_use]
    pub fn child(&self, depth: usize) -> Self {
        Self {
            name: format!("{}/{depth}", self.name),
            display_id: self.display_id,
        }
    }
}

/// Cancels the call a progress sink is attached to.
#[derive(Clone)]
pub struct CancelHandle(Rc<dyn Fn()>);

impl CancelHandle {
    /// Wraps the cancellation callback.
    #[must_use]
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Self(Rc::new(callback))
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        (self.0)();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("CancelHandle")
    }
}

/// Progress display for a running call.
pub trait ProgressSink {
    /// Called once a frame adopts the sink. `cancel` stays valid until
    /// [`ProgressSink::detach`].
    fn attach(&self, cancel: CancelHandle);

    /// The frame no longer reports through this sink.
    fn detach(&self);

    /// Shows a message, for example a crash warning.
    fn message(&self, text: &str);
}

/// Presents messages that have no progress sink to go to.
pub trait Notifier {
    /// Reports `message` about the plug-in at `plug_in`.
    fn notify(&self, plug_in: &Path, message: &str);
}

/// Notifier that writes every message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, plug_in: &Path, message: &str) {
        warn!(target: NOTIFY_TARGET, plug_in = %plug_in.display(), "{message}");
    }
}

/// Procedures implemented by the editor itself.
pub trait ProcedureHandler {
    /// Runs `name`, or returns `None` when the editor has no such procedure.
    fn call(&self, name: &str, context: &Context, args: &[Value]) -> Option<ReturnValues>;
}

/// Rewrites a plug-in's command line before it is spawned.
pub trait ArgvRewriter {
    /// Returns the argv to execute for the plug-in at `plug_in`.
    fn rewrite(&self, plug_in: &Path, argv: Vec<OsString>) -> Vec<OsString>;
}

/// Extra environment handed to every plug-in.
pub trait EnvironmentTable {
    /// Variables to set in the child, in addition to the inherited ones.
    fn environment(&self) -> Vec<(OsString, OsString)>;
}
