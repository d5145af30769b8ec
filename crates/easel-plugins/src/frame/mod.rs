//! Procedure frames of an open plug-in.
//!
//! Every call the host makes into a plug-in runs in a [`ProcFrame`]. The
//! main frame serves `proc_run`; each `temp_proc_run` pushes a temporary
//! frame on the plug-in's [`ProcFrameStack`]. Frames are shared handles with
//! an explicit reference count: the stack owns one reference and a caller
//! awaiting the result may hold another, so the return values survive the
//! pop performed by the reply handler.
//!
//! Waiting is cooperative. [`ProcFrame::run_blocking`] awaits a
//! [`Notify`] on the host's single-threaded scheduler, and
//! [`ProcFrame::quit_blocking`] wakes it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tokio::sync::Notify;
use tracing::{debug, error};

use crate::error::FrameError;
use crate::host::{CancelHandle, Context, ProgressSink};
use crate::protocol::{PdbStatus, ProcedureDef, ReturnValues, Value};

/// Tracing target for frame bookkeeping.
const FRAME_TARGET: &str = "easel_plugins::frame";

/// Lifecycle position of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Set up, nothing awaited yet.
    Created,
    /// A caller is awaiting the reply.
    BlockedWaiting,
    /// The wait was quit, normally because the reply arrived.
    Returned,
    /// The last reference was released.
    Disposed,
}

/// One in-flight procedure call.
pub struct ProcFrame {
    context: RefCell<Context>,
    progress: RefCell<Option<Rc<dyn ProgressSink>>>,
    procedure: RefCell<Option<ProcedureDef>>,
    return_values: RefCell<Option<ReturnValues>>,
    wait: RefCell<Option<Rc<Notify>>>,
    quit: Cell<bool>,
    ref_count: Cell<usize>,
    sub_contexts: RefCell<Vec<Context>>,
}

impl ProcFrame {
    fn new(context: Context) -> Self {
        Self {
            context: RefCell::new(context),
            progress: RefCell::new(None),
            procedure: RefCell::new(None),
            return_values: RefCell::new(None),
            wait: RefCell::new(None),
            quit: Cell::new(false),
            ref_count: Cell::new(1),
            sub_contexts: RefCell::new(Vec::new()),
        }
    }

    fn prepare(
        &self,
        context: Context,
        progress: Option<Rc<dyn ProgressSink>>,
        procedure: Option<ProcedureDef>,
        cancel: &CancelHandle,
    ) {
        self.detach_progress();
        if let Some(sink) = &progress {
            sink.attach(cancel.clone());
        }
        *self.context.borrow_mut() = context;
        *self.progress.borrow_mut() = progress;
        *self.procedure.borrow_mut() = procedure;
        self.return_values.borrow_mut().take();
        self.sub_contexts.borrow_mut().clear();
        self.quit.set(false);
        if self.ref_count.get() == 0 {
            self.ref_count.set(1);
        }
    }

    /// Innermost context: the latest sub-context pushed by the plug-in, else
    /// the frame's own.
    #[must_use]
    pub fn context(&self) -> Context {
        self.sub_contexts
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| self.context.borrow().clone())
    }

    /// Progress sink of the call, if any.
    #[must_use]
    pub fn progress(&self) -> Option<Rc<dyn ProgressSink>> {
        self.progress.borrow().clone()
    }

    /// Procedure being executed.
    #[must_use]
    pub fn procedure(&self) -> Option<ProcedureDef> {
        self.procedure.borrow().clone()
    }

    /// Current reference count.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count.get()
    }

    /// Where the frame is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> FrameState {
        if self.ref_count.get() == 0 {
            FrameState::Disposed
        } else if self.quit.get() {
            FrameState::Returned
        } else if self.wait.borrow().is_some() {
            FrameState::BlockedWaiting
        } else {
            FrameState::Created
        }
    }

    /// Adds a reference.
    pub fn retain(&self) {
        self.ref_count.set(self.ref_count.get() + 1);
    }

    /// Drops a reference, disposing of the frame's resources at zero.
    /// Returns `true` when this call disposed of the frame.
    pub fn release(&self) -> bool {
        match self.ref_count.get() {
            0 => false,
            1 => {
                self.ref_count.set(0);
                self.dispose();
                true
            }
            count => {
                self.ref_count.set(count - 1);
                false
            }
        }
    }

    /// Releases the call's resources without touching the reference count.
    /// Used for the main frame when its plug-in closes.
    pub(crate) fn reset(&self) {
        self.dispose();
    }

    fn dispose(&self) {
        self.detach_progress();
        self.sub_contexts.borrow_mut().clear();
        self.return_values.borrow_mut().take();
        if let Some(wait) = self.wait.borrow_mut().take() {
            self.quit.set(true);
            wait.notify_one();
        }
    }

    fn detach_progress(&self) {
        let sink = self.progress.borrow_mut().take();
        if let Some(sink) = sink {
            sink.detach();
        }
    }

    /// Stores the reply of the plug-in.
    pub fn set_return_values(&self, values: ReturnValues) {
        *self.return_values.borrow_mut() = Some(values);
    }

    /// Returns `true` when a reply is stored.
    #[must_use]
    pub fn has_return_values(&self) -> bool {
        self.return_values.borrow().is_some()
    }

    /// Pushes a nested context on behalf of the plug-in.
    pub fn push_context(&self) {
        let child = self.context().child(self.sub_contexts.borrow().len() + 1);
        self.sub_contexts.borrow_mut().push(child);
    }

    /// Pops the innermost nested context. Returns `false` when none is left.
    pub fn pop_context(&self) -> bool {
        self.sub_contexts.borrow_mut().pop().is_some()
    }

    /// Number of nested contexts.
    #[must_use]
    pub fn sub_context_depth(&self) -> usize {
        self.sub_contexts.borrow().len()
    }

    /// Waits until [`ProcFrame::quit_blocking`] is called.
    ///
    /// Returns at once when the wait was already quit, so a reply that
    /// lands before the caller starts waiting is not lost.
    pub async fn run_blocking(&self) {
        if self.quit.get() {
            return;
        }
        let notify = Rc::new(Notify::new());
        *self.wait.borrow_mut() = Some(Rc::clone(&notify));
        while !self.quit.get() {
            notify.notified().await;
        }
        self.wait.borrow_mut().take();
    }

    /// Ends the wait. Returns `true` when a caller was actually waiting.
    pub fn quit_blocking(&self) -> bool {
        self.quit.set(true);
        let wait = self.wait.borrow().clone();
        if let Some(notify) = wait {
            notify.notify_one();
            return true;
        }
        false
    }

    /// Returns `true` while a caller awaits this frame.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        !self.quit.get() && self.wait.borrow().is_some()
    }

    /// Takes the reply, shaped to the procedure's declared return values.
    ///
    /// A reply of full arity is returned as is. A short reply keeps its
    /// status and values and is padded with defaults. A missing reply becomes
    /// an execution error. The stored values are consumed.
    #[must_use]
    pub fn get_return_values(&self) -> ReturnValues {
        let procedure = self.procedure.borrow().clone();
        let name = procedure.as_ref().map_or("", |def| def.name.as_str());
        let taken = self.return_values.borrow_mut().take();
        let Some(reply) = taken else {
            return ReturnValues::error(
                PdbStatus::ExecutionError,
                format!("Procedure '{name}' returned no return values"),
            );
        };
        let Some(def) = procedure.as_ref() else {
            return reply;
        };
        if reply.values().len() >= def.return_types.len() {
            return reply;
        }
        let (status, given, message) = reply.into_parts();
        let given_len = given.len();
        let mut shaped: Vec<Value> = given;
        shaped.extend(
            def.return_types
                .iter()
                .skip(given_len)
                .map(|value_type| value_type.default_value()),
        );
        ReturnValues::new(status, shaped, message)
    }
}

/// The main frame plus temporary frames of one plug-in, innermost last.
pub struct ProcFrameStack {
    main: Rc<ProcFrame>,
    temporaries: RefCell<Vec<Rc<ProcFrame>>>,
}

impl Default for ProcFrameStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFrameStack {
    /// Stack holding only an idle main frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            main: Rc::new(ProcFrame::new(Context::default())),
            temporaries: RefCell::new(Vec::new()),
        }
    }

    /// The main frame.
    #[must_use]
    pub const fn main(&self) -> &Rc<ProcFrame> {
        &self.main
    }

    /// Top temporary frame, else the main frame.
    #[must_use]
    pub fn current(&self) -> Rc<ProcFrame> {
        self.temporaries
            .borrow()
            .last()
            .map_or_else(|| Rc::clone(&self.main), Rc::clone)
    }

    /// Top temporary frame.
    #[must_use]
    pub fn top_temporary(&self) -> Option<Rc<ProcFrame>> {
        self.temporaries.borrow().last().cloned()
    }

    /// Number of temporary frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.temporaries.borrow().len()
    }

    /// Re-initialises the main frame for a new call.
    pub fn init_main(
        &self,
        context: Context,
        progress: Option<Rc<dyn ProgressSink>>,
        procedure: Option<ProcedureDef>,
        cancel: &CancelHandle,
    ) {
        self.main.prepare(context, progress, procedure, cancel);
    }

    /// Pushes a temporary frame with one reference and returns it.
    pub fn push(
        &self,
        context: Context,
        progress: Option<Rc<dyn ProgressSink>>,
        procedure: ProcedureDef,
        cancel: &CancelHandle,
    ) -> Rc<ProcFrame> {
        let frame = Rc::new(ProcFrame::new(Context::default()));
        frame.prepare(context, progress, Some(procedure), cancel);
        self.temporaries.borrow_mut().push(Rc::clone(&frame));
        debug!(target: FRAME_TARGET, depth = self.depth(), "pushed procedure frame");
        frame
    }

    /// Pops `expected`, which must be the top temporary frame, and releases
    /// the stack's reference to it.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Empty`] when no temporary frame exists and
    /// [`FrameError::NotTop`] when `expected` is not the top. Both are
    /// programming errors and are logged.
    pub fn pop(&self, expected: &Rc<ProcFrame>) -> Result<(), FrameError> {
        let mut temporaries = self.temporaries.borrow_mut();
        let outcome = match temporaries.last() {
            None => Err(FrameError::Empty),
            Some(top) if !Rc::ptr_eq(top, expected) => Err(FrameError::NotTop),
            Some(_) => Ok(()),
        };
        if let Err(err) = outcome {
            error!(target: FRAME_TARGET, error = %err, "procedure frame stack misuse");
            return Err(err);
        }
        let popped = temporaries.pop();
        drop(temporaries);
        if let Some(frame) = popped {
            frame.release();
        }
        debug!(target: FRAME_TARGET, depth = self.depth(), "popped procedure frame");
        Ok(())
    }

    /// All temporary frames, outermost first.
    #[must_use]
    pub fn temporaries(&self) -> Vec<Rc<ProcFrame>> {
        self.temporaries.borrow().clone()
    }
}
