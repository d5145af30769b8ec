//! A single plug-in child process.
//!
//! [`PlugInProcess`] owns the child, its two pipes and the procedure frame
//! stack. It is opened once in a [`CallMode`], exchanges messages with the
//! plug-in and is closed either by the plug-in's `quit` or forcibly by the
//! host. Handles are `Rc`-shared and must stay on the host's thread.
//!
//! In asynchronous mode the process is driven by an input watch whose
//! dispatch task runs on the current `tokio` [`LocalSet`]. Opening
//! asynchronously with no runtime fails with [`PlugInError::SpawnFailed`];
//! inside a runtime the caller must also be driving a `LocalSet`. Synchronous mode is used for
//! QUERY and INIT passes, which are driven by [`PlugInProcess::run_synchronous`].
//!
//! [`LocalSet`]: tokio::task::LocalSet

mod argv;
mod dispatch;
mod pipes;
mod watch;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{PlugInError, WireError};
use crate::frame::ProcFrameStack;
use crate::host::{CancelHandle, Context, ProgressSink};
use crate::manager::PlugInManager;
use crate::protocol::{
    CallMode, Message, PdbStatus, ProcCall, ProcedureDef, ReturnValues, Value,
};

use self::pipes::Channels;
use self::watch::{InputWatch, WatchEvent};

pub use self::argv::PLUG_IN_FLAG;

/// Tracing target for plug-in process operations.
const PROCESS_TARGET: &str = "easel_plugins::process";

/// Grace period between the final `quit` and `SIGKILL`.
const KILL_GRACE: Duration = Duration::from_millis(10);

/// Identity of one plug-in process within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugInId(u64);

impl PlugInId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlugInId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

#[derive(Default)]
struct ProcessState {
    child: Option<Child>,
    pid: Option<u32>,
    process_group: bool,
    channels: Channels,
    watch: Option<InputWatch>,
}

/// One plug-in executable, opened at most once.
pub struct PlugInProcess {
    id: PlugInId,
    path: PathBuf,
    manager: Weak<PlugInManager>,
    weak_self: Weak<Self>,
    state: RefCell<ProcessState>,
    frames: ProcFrameStack,
    mode: Cell<Option<CallMode>>,
    open: Cell<bool>,
    used: Cell<bool>,
    synchronous: Cell<bool>,
    crashed: Cell<bool>,
    has_init: Cell<bool>,
    extension_ready: Cell<bool>,
    extension_waiting: Cell<bool>,
    extension_notify: Notify,
}

impl PlugInProcess {
    pub(crate) fn new(id: PlugInId, path: PathBuf, manager: Weak<PlugInManager>) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            id,
            path,
            manager,
            weak_self: Weak::clone(weak_self),
            state: RefCell::new(ProcessState::default()),
            frames: ProcFrameStack::new(),
            mode: Cell::new(None),
            open: Cell::new(false),
            used: Cell::new(false),
            synchronous: Cell::new(false),
            crashed: Cell::new(false),
            has_init: Cell::new(false),
            extension_ready: Cell::new(false),
            extension_waiting: Cell::new(false),
            extension_notify: Notify::new(),
        })
    }

    /// Identity within the manager.
    #[must_use]
    pub const fn id(&self) -> PlugInId {
        self.id
    }

    /// Plug-in executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the executable, used in user-facing messages.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |name| {
                name.to_string_lossy().into_owned()
            })
    }

    /// Returns `true` while the child runs and the pipes are connected.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Mode the process was opened in.
    #[must_use]
    pub fn mode(&self) -> Option<CallMode> {
        self.mode.get()
    }

    /// Process id of the child while open.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        if self.is_open() {
            self.state.borrow().pid
        } else {
            None
        }
    }

    /// Whether the plug-in asked for an INIT pass during QUERY.
    #[must_use]
    pub fn has_init(&self) -> bool {
        self.has_init.get()
    }

    /// Whether an extension acknowledged its start.
    #[must_use]
    pub fn extension_ready(&self) -> bool {
        self.extension_ready.get()
    }

    /// The procedure frame stack.
    #[must_use]
    pub const fn frames(&self) -> &ProcFrameStack {
        &self.frames
    }

    /// Returns `true` when the process ended by crashing, failing to read,
    /// or breaking the protocol.
    #[must_use]
    pub fn crashed(&self) -> bool {
        self.crashed.get()
    }

    fn manager(&self) -> Option<Rc<PlugInManager>> {
        self.manager.upgrade()
    }

    /// Spawns the child in `mode`.
    ///
    /// When `synchronous` is `false` an input watch is started on the current
    /// `LocalSet`.
    ///
    /// # Errors
    ///
    /// Returns [`PlugInError::AlreadyUsed`] on a second call and
    /// [`PlugInError::SpawnFailed`] when the pipes, the child or the watch
    /// cannot be created, including an asynchronous open with no tokio
    /// runtime on the current thread. On failure the user is notified and nothing is
    /// left open.
    pub fn open(&self, mode: CallMode, synchronous: bool) -> Result<(), PlugInError> {
        if self.used.replace(true) {
            return Err(PlugInError::AlreadyUsed {
                path: self.path.clone(),
            });
        }
        let manager = self.manager().ok_or_else(|| PlugInError::SpawnFailed {
            path: self.path.clone(),
            message: "the plug-in manager has shut down".into(),
            source: None,
        })?;
        let config = manager.config();
        if !synchronous && tokio::runtime::Handle::try_current().is_err() {
            return Err(self.spawn_failure(
                &manager,
                "no async runtime to watch the plug-in",
                std::io::Error::other("asynchronous plug-ins need a tokio runtime with a LocalSet"),
            ));
        }

        let mut channels = Channels::create(config.write_buffer_capacity())
            .map_err(|err| self.spawn_failure(&manager, "failed to create pipes", err))?;
        let mut command = match self.command(&manager, &channels, mode) {
            Ok(command) => command,
            Err(err) => {
                channels.release();
                return Err(self.spawn_failure(&manager, "failed to build command line", err));
            }
        };
        if config.new_process_group() {
            set_process_group(&mut command);
        }
        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                channels.release();
                return Err(self.spawn_failure(&manager, "failed to spawn plug-in", err));
            }
        };
        channels.close_child_ends();

        let pid = child.id();
        {
            let mut state = self.state.borrow_mut();
            state.pid = Some(pid);
            state.child = Some(child);
            state.process_group = config.new_process_group();
            state.channels = channels;
        }
        self.mode.set(Some(mode));
        self.synchronous.set(synchronous);
        self.open.set(true);
        info!(
            target: PROCESS_TARGET,
            plug_in = %self.path.display(),
            pid,
            mode = mode.as_arg(),
            synchronous,
            "plug-in started"
        );

        if !synchronous {
            if let Err(err) = self.start_watch(&manager) {
                self.close(true);
                return Err(self.spawn_failure(&manager, "failed to watch plug-in output", err));
            }
        }
        if let Some(this) = self.weak_self.upgrade() {
            manager.add_open(this);
        }
        Ok(())
    }

    fn command(
        &self,
        manager: &PlugInManager,
        channels: &Channels,
        mode: CallMode,
    ) -> std::io::Result<Command> {
        let (read_fd, write_fd) = child_fds(channels)?;
        let interpreter = manager.resolve_interpreter(&self.path);
        let mut argv = argv::build(
            &self.path,
            interpreter.as_ref(),
            read_fd,
            write_fd,
            mode,
            manager.config().stack_trace_mode(),
        );
        if let Some(rewriter) = manager.argv_rewriter() {
            argv = rewriter.rewrite(&self.path, argv);
        }
        let mut parts = argv.into_iter();
        let program = parts.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line")
        })?;
        let mut command = Command::new(program);
        command.args(parts);
        if let Some(environment) = manager.environment() {
            command.envs(environment.environment());
        }
        debug!(target: PROCESS_TARGET, plug_in = %self.path.display(), ?command, "built command");
        Ok(command)
    }

    fn spawn_failure(
        &self,
        manager: &PlugInManager,
        message: &str,
        err: std::io::Error,
    ) -> PlugInError {
        warn!(
            target: PROCESS_TARGET,
            plug_in = %self.path.display(),
            error = %err,
            "{message}"
        );
        manager.notify(
            &self.path,
            &format!(
                "Unable to run plug-in \"{}\"\n({})\n\n{err}",
                self.name(),
                self.path.display()
            ),
        );
        PlugInError::SpawnFailed {
            path: self.path.clone(),
            message: message.to_owned(),
            source: Some(Arc::new(err)),
        }
    }

    fn start_watch(&self, manager: &PlugInManager) -> std::io::Result<()> {
        let pipe = {
            let state = self.state.borrow();
            let reader = state.channels.host_read.as_ref().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "read pipe released")
            })?;
            reader.get_ref().try_clone()?
        };
        let mut events = watch::spawn_reader(self.id.to_string(), pipe, manager.codec())?;
        let weak = Weak::clone(&self.weak_self);
        let task = tokio::task::spawn_local(async move {
            while let Some(event) = events.recv().await {
                let Some(plug_in) = weak.upgrade() else {
                    break;
                };
                plug_in.dispatch(event);
                if !plug_in.is_open() {
                    break;
                }
            }
        });
        self.state.borrow_mut().watch = Some(InputWatch::new(task));
        Ok(())
    }

    /// Reads and handles messages until the plug-in closes.
    ///
    /// # Errors
    ///
    /// Returns [`PlugInError::NotOpen`] when the process is not open in
    /// synchronous mode, and [`PlugInError::Crashed`] when it ended without
    /// a `quit`.
    pub fn run_synchronous(&self) -> Result<(), PlugInError> {
        if !self.is_open() || !self.synchronous.get() {
            return Err(PlugInError::NotOpen {
                path: self.path.clone(),
            });
        }
        let codec = self
            .manager()
            .map(|manager| manager.codec())
            .ok_or_else(|| PlugInError::NotOpen {
                path: self.path.clone(),
            })?;
        while self.is_open() {
            let event = {
                let mut state = self.state.borrow_mut();
                let Some(reader) = state.channels.host_read.as_mut() else {
                    break;
                };
                match codec.read_message(reader) {
                    Ok(Some(message)) => WatchEvent::Message(message),
                    Ok(None) => WatchEvent::Hangup,
                    Err(err) => WatchEvent::ReadFailed(err),
                }
            };
            self.dispatch(event);
        }
        if self.crashed() {
            return Err(PlugInError::Crashed {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn dispatch(&self, event: WatchEvent) {
        match event {
            WatchEvent::Message(message) => self.handle_message(message),
            WatchEvent::Hangup => {
                self.crashed.set(true);
                self.report_crash();
                self.close(true);
            }
            WatchEvent::ReadFailed(err) => {
                self.crashed.set(true);
                warn!(
                    target: PROCESS_TARGET,
                    plug_in = %self.path.display(),
                    error = %err,
                    "failed to read from plug-in"
                );
                self.close(true);
            }
        }
    }

    fn report_crash(&self) {
        let text = format!(
            "Plug-in crashed: \"{}\"\n({})\n\nThe dying plug-in may have left the editor in an \
             inconsistent state. You may want to save your work and restart to be on the safe \
             side.",
            self.name(),
            self.path.display()
        );
        if let Some(progress) = self.frames.current().progress() {
            progress.message(&text);
        } else if let Some(manager) = self.manager() {
            manager.notify(&self.path, &text);
        }
    }

    /// Writes one message into the write buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PlugInError::NotOpen`] once the pipe is released and
    /// [`PlugInError::Io`] when encoding or writing fails.
    pub fn send(&self, message: &Message) -> Result<(), PlugInError> {
        let manager = self.manager().ok_or_else(|| self.not_open())?;
        let mut state = self.state.borrow_mut();
        let writer = state
            .channels
            .host_write
            .as_mut()
            .ok_or_else(|| self.not_open())?;
        manager
            .codec()
            .write_message(writer, message)
            .map_err(|source| self.io_error(source))
    }

    /// Flushes the write buffer to the pipe.
    ///
    /// # Errors
    ///
    /// Returns [`PlugInError::NotOpen`] once the pipe is released and
    /// [`PlugInError::Io`] when the pipe fails.
    pub fn flush(&self) -> Result<(), PlugInError> {
        let mut state = self.state.borrow_mut();
        let writer = state
            .channels
            .host_write
            .as_mut()
            .ok_or_else(|| self.not_open())?;
        std::io::Write::flush(writer).map_err(|err| self.io_error(WireError::from(err)))
    }

    fn not_open(&self) -> PlugInError {
        PlugInError::NotOpen {
            path: self.path.clone(),
        }
    }

    fn io_error(&self, source: WireError) -> PlugInError {
        PlugInError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn send_all(&self, messages: &[Message]) -> Result<(), PlugInError> {
        for message in messages {
            self.send(message)?;
        }
        self.flush()
    }

    /// Closes the process. With `kill_it` the child is asked to quit and
    /// then killed; the child is always reaped. Does nothing unless open.
    pub fn close(&self, kill_it: bool) {
        if !self.open.replace(false) {
            return;
        }
        let codec = self.manager().map(|manager| manager.codec());
        {
            let mut state = self.state.borrow_mut();
            if kill_it {
                if let (Some(codec), Some(writer)) = (codec, state.channels.host_write.as_mut()) {
                    drop(codec.write_message(writer, &Message::Quit));
                    drop(std::io::Write::flush(writer));
                }
                std::thread::sleep(KILL_GRACE);
                kill_child(&mut state);
            }
            if let Some(mut child) = state.child.take() {
                match child.wait() {
                    Ok(status) => debug!(
                        target: PROCESS_TARGET,
                        plug_in = %self.path.display(),
                        %status,
                        "plug-in exited"
                    ),
                    Err(err) => warn!(
                        target: PROCESS_TARGET,
                        plug_in = %self.path.display(),
                        error = %err,
                        "failed to reap plug-in"
                    ),
                }
            }
            if let Some(watch) = state.watch.take() {
                watch.stop();
            }
            state.channels.release();
        }

        let interrupted = self.quit_waits();
        if interrupted {
            warn!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                "plug-in terminated while a call was waiting for it"
            );
        }

        if let Some(manager) = self.manager() {
            let removed = manager.registry_mut().remove_temporaries(self.id);
            if !removed.is_empty() {
                debug!(
                    target: PROCESS_TARGET,
                    plug_in = %self.path.display(),
                    procedures = ?removed,
                    "removed temporary procedures"
                );
            }
            manager.remove_open(self.id);
        }
        info!(target: PROCESS_TARGET, plug_in = %self.path.display(), kill_it, "plug-in closed");
    }

    /// Quits every blocked call; returns `true` when one was interrupted.
    fn quit_waits(&self) -> bool {
        let mut interrupted = false;
        while let Some(top) = self.frames.top_temporary() {
            interrupted |= top.is_waiting();
            top.quit_blocking();
            drop(self.frames.pop(&top));
        }
        let main = self.frames.main();
        interrupted |= main.is_waiting();
        main.quit_blocking();
        if self.extension_waiting.get() {
            interrupted = true;
            self.extension_notify.notify_one();
        }
        interrupted
    }

    fn cancel_handle(&self) -> CancelHandle {
        let weak = Weak::clone(&self.weak_self);
        CancelHandle::new(move || {
            if let Some(plug_in) = weak.upgrade() {
                plug_in.cancel();
            }
        })
    }

    /// Cancels the running calls and kills the plug-in.
    pub fn cancel(&self) {
        if !self.is_open() {
            return;
        }
        info!(target: PROCESS_TARGET, plug_in = %self.path.display(), "cancelling plug-in");
        for frame in self.frames.temporaries() {
            if frame.is_waiting() {
                frame.set_return_values(ReturnValues::cancelled());
            }
        }
        let main = self.frames.main();
        if main.is_waiting() {
            main.set_return_values(ReturnValues::cancelled());
        }
        self.close(true);
    }

    /// Runs `procedure` in the main frame and awaits its `proc_return`.
    pub async fn run(
        &self,
        procedure: &ProcedureDef,
        context: &Context,
        progress: Option<Rc<dyn ProgressSink>>,
        args: Vec<Value>,
    ) -> ReturnValues {
        if let Err(failure) = self.start_call(procedure, context, progress, args) {
            return failure;
        }
        let main = self.frames.main();
        main.run_blocking().await;
        let values = main.get_return_values();
        main.reset();
        values
    }

    /// Starts an extension's procedure and awaits its `extension_ack`.
    pub async fn run_extension(
        &self,
        procedure: &ProcedureDef,
        context: &Context,
        progress: Option<Rc<dyn ProgressSink>>,
        args: Vec<Value>,
    ) -> ReturnValues {
        if let Err(failure) = self.start_call(procedure, context, progress, args) {
            return failure;
        }
        let ready = self.wait_for_extension().await;
        let main = self.frames.main();
        let values = if ready {
            main.set_return_values(ReturnValues::success(Vec::new()));
            main.get_return_values()
        } else {
            ReturnValues::error(
                PdbStatus::ExecutionError,
                format!(
                    "Plug-in \"{}\" exited before acknowledging its start",
                    self.name()
                ),
            )
        };
        main.reset();
        values
    }

    fn start_call(
        &self,
        procedure: &ProcedureDef,
        context: &Context,
        progress: Option<Rc<dyn ProgressSink>>,
        args: Vec<Value>,
    ) -> Result<(), ReturnValues> {
        let manager = self
            .manager()
            .filter(|_| self.is_open())
            .ok_or_else(|| self.call_failure())?;
        self.frames.init_main(
            context.clone(),
            progress,
            Some(procedure.clone()),
            &self.cancel_handle(),
        );
        let messages = [
            Message::Config(manager.host_config(context)),
            Message::ProcRun(ProcCall {
                name: procedure.name.clone(),
                args,
            }),
        ];
        if let Err(err) = self.send_all(&messages) {
            warn!(
                target: PROCESS_TARGET,
                plug_in = %self.path.display(),
                error = %err,
                "failed to send procedure call"
            );
            self.close(true);
            self.frames.main().reset();
            return Err(self.call_failure());
        }
        Ok(())
    }

    fn call_failure(&self) -> ReturnValues {
        ReturnValues::error(
            PdbStatus::ExecutionError,
            format!("Failed to run plug-in \"{}\"", self.name()),
        )
    }

    /// Calls a temporary procedure of this plug-in and awaits its
    /// `temp_proc_return`.
    pub async fn run_temp(
        &self,
        procedure: &ProcedureDef,
        context: &Context,
        progress: Option<Rc<dyn ProgressSink>>,
        args: Vec<Value>,
    ) -> ReturnValues {
        if !self.is_open() {
            return self.call_failure();
        }
        let frame = self.frames.push(
            context.clone(),
            progress,
            procedure.clone(),
            &self.cancel_handle(),
        );
        frame.retain();
        let call = Message::TempProcRun(ProcCall {
            name: procedure.name.clone(),
            args,
        });
        let values = match self.send_all(&[call]) {
            Ok(()) => {
                frame.run_blocking().await;
                frame.get_return_values()
            }
            Err(err) => {
                warn!(
                    target: PROCESS_TARGET,
                    plug_in = %self.path.display(),
                    error = %err,
                    "failed to send temporary procedure call"
                );
                self.close(true);
                self.call_failure()
            }
        };
        frame.release();
        values
    }

    /// Waits for `extension_ack`. Returns early, with `false`, when the
    /// plug-in closes first.
    pub async fn wait_for_extension(&self) -> bool {
        self.extension_waiting.set(true);
        while self.is_open() && !self.extension_ready.get() {
            self.extension_notify.notified().await;
        }
        self.extension_waiting.set(false);
        self.extension_ready.get()
    }
}

impl Drop for PlugInProcess {
    fn drop(&mut self) {
        if self.open.get() {
            self.close(true);
        }
    }
}

#[cfg(unix)]
fn child_fds(channels: &Channels) -> std::io::Result<(i32, i32)> {
    channels.child_fds().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "child pipe ends released")
    })
}

#[cfg(not(unix))]
fn child_fds(_channels: &Channels) -> std::io::Result<(i32, i32)> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "plug-in pipes require a unix host",
    ))
}

#[cfg(unix)]
fn set_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn set_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_child(state: &mut ProcessState) {
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    let Some(pid) = state.pid.and_then(|raw| i32::try_from(raw).ok()) else {
        return;
    };
    let target = Pid::from_raw(pid);
    let outcome = if state.process_group {
        killpg(target, Signal::SIGKILL)
    } else {
        kill(target, Signal::SIGKILL)
    };
    if let Err(err) = outcome {
        debug!(target: PROCESS_TARGET, pid, error = %err, "kill failed");
    }
}

#[cfg(not(unix))]
fn kill_child(state: &mut ProcessState) {
    if let Some(child) = state.child.as_mut() {
        if let Err(err) = child.kill() {
            debug!(target: PROCESS_TARGET, error = %err, "kill failed");
        }
    }
}
