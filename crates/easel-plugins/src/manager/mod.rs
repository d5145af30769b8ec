//! The plug-in manager.
//!
//! [`PlugInManager`] ties the pieces together: it loads interpreter
//! definitions, spawns [`PlugInProcess`] instances, keeps the procedure
//! registry they install into, and routes procedure calls by kind. It is
//! shared through `Rc` and lives on the editor's thread.

mod config;
mod debug_wrap;

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use easel_config::Config;
use tracing::{debug, info};
use url::Url;

use crate::error::{FileProcedureError, PlugInError};
use crate::file_procedure::{self, FileProcedure};
use crate::host::{
    ArgvRewriter, Context, EnvironmentTable, LogNotifier, Notifier, ProcedureHandler, ProgressSink,
};
use crate::interpreter::{InterpreterDb, ResolvedInterpreter};
use crate::process::{PlugInId, PlugInProcess};
use crate::protocol::{
    CallMode, FileHandlerKind, HostConfig, JsonLineCodec, PROTOCOL_VERSION, PdbStatus,
    ProcedureDef, ProcedureKind, ReturnValues, Value, WireCodec,
};
use crate::registry::ProcedureRegistry;

pub use self::config::ManagerConfig;
pub use self::debug_wrap::DebugWrapper;

/// Tracing target for manager operations.
const MANAGER_TARGET: &str = "easel_plugins::manager";

/// The editor-side hooks a manager reports through.
#[derive(Clone)]
pub struct Collaborators {
    codec: Arc<dyn WireCodec>,
    notifier: Rc<dyn Notifier>,
    procedure_handler: Option<Rc<dyn ProcedureHandler>>,
    argv_rewriter: Option<Rc<dyn ArgvRewriter>>,
    environment: Option<Rc<dyn EnvironmentTable>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            codec: Arc::new(JsonLineCodec),
            notifier: Rc::new(LogNotifier),
            procedure_handler: None,
            argv_rewriter: None,
            environment: None,
        }
    }
}

impl Collaborators {
    /// Replaces the wire codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn WireCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Rc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Serves procedures the editor implements itself.
    #[must_use]
    pub fn with_procedure_handler(mut self, handler: Rc<dyn ProcedureHandler>) -> Self {
        self.procedure_handler = Some(handler);
        self
    }

    /// Rewrites command lines before spawning.
    #[must_use]
    pub fn with_argv_rewriter(mut self, rewriter: Rc<dyn ArgvRewriter>) -> Self {
        self.argv_rewriter = Some(rewriter);
        self
    }

    /// Supplies extra environment variables.
    #[must_use]
    pub fn with_environment(mut self, environment: Rc<dyn EnvironmentTable>) -> Self {
        self.environment = Some(environment);
        self
    }
}

/// What a QUERY or INIT pass learned about a plug-in.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// Permanent procedures the executable owns after the pass.
    pub procedures: Vec<ProcedureDef>,
    /// Whether the plug-in asked for an INIT pass.
    pub has_init: bool,
}

/// Spawns plug-ins and owns everything they register.
pub struct PlugInManager {
    config: ManagerConfig,
    collaborators: Collaborators,
    interpreters: RefCell<InterpreterDb>,
    registry: RefCell<ProcedureRegistry>,
    open: RefCell<Vec<Rc<PlugInProcess>>>,
    next_id: Cell<u64>,
    weak_self: Weak<Self>,
}

impl PlugInManager {
    /// Creates a manager. Interpreters are not loaded until
    /// [`PlugInManager::load_interpreters`].
    #[must_use]
    pub fn new(config: ManagerConfig, collaborators: Collaborators) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            config,
            collaborators,
            interpreters: RefCell::new(InterpreterDb::new()),
            registry: RefCell::new(ProcedureRegistry::new()),
            open: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            weak_self: Weak::clone(weak_self),
        })
    }

    /// Creates a manager from the layered configuration, installing the
    /// [`DebugWrapper`] when one is configured.
    #[must_use]
    pub fn from_config(config: &Config, collaborators: Collaborators) -> Rc<Self> {
        let wrapped = match DebugWrapper::from_config(config) {
            Some(wrapper) => collaborators.with_argv_rewriter(Rc::new(wrapper)),
            None => collaborators,
        };
        Self::new(ManagerConfig::from_config(config), wrapped)
    }

    /// Manager settings.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Rebuilds the interpreter tables from the configured directories.
    pub fn load_interpreters(&self) {
        let mut db = InterpreterDb::new();
        db.load(self.config.interpreter_dirs());
        info!(
            target: MANAGER_TARGET,
            magics = db.magic_count(),
            empty = db.is_empty(),
            "loaded interpreters"
        );
        *self.interpreters.borrow_mut() = db;
    }

    /// The loaded interpreter tables.
    #[must_use]
    pub fn interpreters(&self) -> Ref<'_, InterpreterDb> {
        self.interpreters.borrow()
    }

    /// Interpreter needed to execute `path`, if any.
    #[must_use]
    pub fn resolve_interpreter(&self, path: &Path) -> Option<ResolvedInterpreter> {
        self.interpreters.borrow().resolve(path)
    }

    /// Procedure registry.
    #[must_use]
    pub fn registry(&self) -> Ref<'_, ProcedureRegistry> {
        self.registry.borrow()
    }

    pub(crate) fn registry_mut(&self) -> RefMut<'_, ProcedureRegistry> {
        self.registry.borrow_mut()
    }

    /// Creates a closed process for the executable at `path`.
    #[must_use]
    pub fn create_plug_in(&self, path: impl Into<PathBuf>) -> Rc<PlugInProcess> {
        let id = PlugInId::new(self.next_id.get());
        self.next_id.set(id.get().saturating_add(1));
        PlugInProcess::new(id, path.into(), Weak::clone(&self.weak_self))
    }

    /// Runs the QUERY pass of the plug-in at `path`.
    ///
    /// # Errors
    ///
    /// Returns the [`PlugInError`] raised while spawning, or
    /// [`PlugInError::Crashed`] when the plug-in ended without `quit`.
    /// Procedures installed before a crash stay registered.
    pub fn query(&self, path: &Path) -> Result<QueryOutcome, PlugInError> {
        self.synchronous_pass(path, CallMode::Query)
    }

    /// Runs the INIT pass of the plug-in at `path`.
    ///
    /// # Errors
    ///
    /// As [`PlugInManager::query`].
    pub fn init(&self, path: &Path) -> Result<QueryOutcome, PlugInError> {
        self.synchronous_pass(path, CallMode::Init)
    }

    fn synchronous_pass(&self, path: &Path, mode: CallMode) -> Result<QueryOutcome, PlugInError> {
        let plug_in = self.create_plug_in(path);
        plug_in.open(mode, true)?;
        plug_in.run_synchronous()?;
        let procedures = self
            .registry
            .borrow()
            .procedures_of(path)
            .into_iter()
            .filter(|registered| registered.kind() != ProcedureKind::Temporary)
            .map(|registered| registered.def().clone())
            .collect::<Vec<_>>();
        debug!(
            target: MANAGER_TARGET,
            plug_in = %path.display(),
            mode = mode.as_arg(),
            procedures = procedures.len(),
            "synchronous pass finished"
        );
        Ok(QueryOutcome {
            procedures,
            has_init: plug_in.has_init(),
        })
    }

    /// Runs the procedure called `name`.
    ///
    /// Temporary procedures are sent to the process that installed them.
    /// Plug-in and extension procedures start a new process in RUN mode.
    /// Names the registry does not know go to the editor's
    /// [`ProcedureHandler`]. Must be awaited inside a `LocalSet`.
    pub async fn run_procedure(
        &self,
        name: &str,
        context: &Context,
        progress: Option<Rc<dyn ProgressSink>>,
        args: Vec<Value>,
    ) -> ReturnValues {
        let found = self.registry.borrow().get(name).cloned();
        let Some(registered) = found else {
            return self.call_host_procedure(name, context, &args);
        };
        let def = registered.def();
        match def.kind {
            ProcedureKind::Temporary => {
                let owner = registered
                    .owner()
                    .plug_in()
                    .and_then(|id| self.open_plug_in(id));
                match owner {
                    Some(plug_in) => plug_in.run_temp(def, context, progress, args).await,
                    None => ReturnValues::error(
                        PdbStatus::ExecutionError,
                        format!("The plug-in providing '{name}' is no longer running"),
                    ),
                }
            }
            ProcedureKind::PlugIn | ProcedureKind::Extension => {
                let plug_in = self.create_plug_in(registered.owner().path());
                if let Err(err) = plug_in.open(CallMode::Run, false) {
                    return ReturnValues::error(PdbStatus::ExecutionError, err.to_string());
                }
                if def.kind == ProcedureKind::Extension {
                    plug_in.run_extension(def, context, progress, args).await
                } else {
                    plug_in.run(def, context, progress, args).await
                }
            }
        }
    }

    /// Runs a procedure the editor implements.
    #[must_use]
    pub fn call_host_procedure(&self, name: &str, context: &Context, args: &[Value]) -> ReturnValues {
        self.collaborators
            .procedure_handler
            .as_ref()
            .and_then(|handler| handler.call(name, context, args))
            .unwrap_or_else(|| {
                debug!(target: MANAGER_TARGET, procedure = name, "unknown procedure");
                ReturnValues::error(
                    PdbStatus::CallingError,
                    format!("Procedure '{name}' not found"),
                )
            })
    }

    /// Finds the file procedure of `kind` for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FileProcedureError::UnknownFileType`] when no registered
    /// handler matches.
    pub fn find_file_procedure(
        &self,
        kind: FileHandlerKind,
        url: &Url,
    ) -> Result<FileProcedure, FileProcedureError> {
        let candidates = self.registry.borrow().file_procedures(kind);
        file_procedure::find(&candidates, url).cloned()
    }

    /// Processes currently open.
    #[must_use]
    pub fn open_plug_ins(&self) -> Vec<Rc<PlugInProcess>> {
        self.open.borrow().clone()
    }

    /// The open process with `id`.
    #[must_use]
    pub fn open_plug_in(&self, id: PlugInId) -> Option<Rc<PlugInProcess>> {
        self.open
            .borrow()
            .iter()
            .find(|plug_in| plug_in.id() == id)
            .cloned()
    }

    /// Kills every open plug-in.
    pub fn exit(&self) {
        let open = self.open_plug_ins();
        if !open.is_empty() {
            info!(target: MANAGER_TARGET, count = open.len(), "closing open plug-ins");
        }
        for plug_in in open {
            plug_in.close(true);
        }
    }

    pub(crate) fn add_open(&self, plug_in: Rc<PlugInProcess>) {
        self.open.borrow_mut().push(plug_in);
    }

    pub(crate) fn remove_open(&self, id: PlugInId) {
        self.open.borrow_mut().retain(|plug_in| plug_in.id() != id);
    }

    pub(crate) fn notify(&self, plug_in: &Path, message: &str) {
        self.collaborators.notifier.notify(plug_in, message);
    }

    pub(crate) fn codec(&self) -> Arc<dyn WireCodec> {
        Arc::clone(&self.collaborators.codec)
    }

    pub(crate) fn argv_rewriter(&self) -> Option<Rc<dyn ArgvRewriter>> {
        self.collaborators.argv_rewriter.clone()
    }

    pub(crate) fn environment(&self) -> Option<Rc<dyn EnvironmentTable>> {
        self.collaborators.environment.clone()
    }

    pub(crate) fn host_config(&self, context: &Context) -> HostConfig {
        HostConfig {
            protocol_version: PROTOCOL_VERSION,
            context: context.name().to_owned(),
            display_id: context.display_id(),
        }
    }
}

impl Drop for PlugInManager {
    fn drop(&mut self) {
        self.exit();
    }
}
