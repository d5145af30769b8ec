//! Wire protocol spoken between the host and its plug-ins.
//!
//! Each plug-in owns two unidirectional pipes. Messages are framed by a
//! [`WireCodec`]; the default [`JsonLineCodec`] writes one serde-tagged JSON
//! object per line, for example `{"type":"quit"}`. Host-bound writes go
//! through a bounded [`BufferedWriter`] that is flushed explicitly at the end
//! of every exchange.

mod codec;
mod writer;

use serde::{Deserialize, Serialize};

pub use self::codec::{JsonLineCodec, WireCodec};
pub use self::writer::{BufferedWriter, DEFAULT_WRITE_BUFFER_CAPACITY};

/// Version of the message set understood by this host.
pub const PROTOCOL_VERSION: u32 = 1;

/// Mode a plug-in is started in, passed on its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Register procedures and file handlers, then exit.
    Query,
    /// One-time initialisation pass requested through `has_init`.
    Init,
    /// Execute a procedure.
    Run,
}

impl CallMode {
    /// Command-line flag announcing this mode to the plug-in.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Query => "-query",
            Self::Init => "-init",
            Self::Run => "-run",
        }
    }
}

/// A procedure argument or return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte payload.
    Bytes(Vec<u8>),
}

impl Value {
    /// Type tag of this value.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Bool(_) => ValueType::Bool,
            Self::Str(_) => ValueType::Str,
            Self::Bytes(_) => ValueType::Bytes,
        }
    }
}

/// Declared type of a procedure parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Signed integer.
    Int,
    /// Floating-point number.
    Float,
    /// Boolean flag.
    Bool,
    /// UTF-8 string.
    Str,
    /// Opaque byte payload.
    Bytes,
}

impl ValueType {
    /// Value used when a procedure returns fewer values than it declares.
    #[must_use]
    pub const fn default_value(self) -> Value {
        match self {
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Bool => Value::Bool(false),
            Self::Str => Value::Str(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
        }
    }
}

/// Outcome of a procedure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdbStatus {
    /// The procedure completed.
    Success,
    /// The procedure ran and failed.
    ExecutionError,
    /// The procedure could not be called.
    CallingError,
    /// The procedure declined and handed the call on.
    PassThrough,
    /// The user cancelled the call.
    Cancel,
}

/// Status, values and optional message produced by a procedure call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnValues {
    status: PdbStatus,
    #[serde(default)]
    values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReturnValues {
    /// Successful result carrying `values`.
    #[must_use]
    pub const fn success(values: Vec<Value>) -> Self {
        Self {
            status: PdbStatus::Success,
            values,
            error: None,
        }
    }

    /// Failed result with a human-readable message.
    #[must_use]
    pub fn error(status: PdbStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            values: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Result of a cancelled call.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            status: PdbStatus::Cancel,
            values: Vec::new(),
            error: None,
        }
    }

    /// Builds a result from its parts.
    #[must_use]
    pub const fn new(status: PdbStatus, values: Vec<Value>, error: Option<String>) -> Self {
        Self {
            status,
            values,
            error,
        }
    }

    /// Call status.
    #[must_use]
    pub const fn status(&self) -> PdbStatus {
        self.status
    }

    /// Returned values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Error message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns `true` for [`PdbStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == PdbStatus::Success
    }

    /// Splits the result into status, values and message.
    #[must_use]
    pub fn into_parts(self) -> (PdbStatus, Vec<Value>, Option<String>) {
        (self.status, self.values, self.error)
    }
}

/// How a registered procedure is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    /// Runs in a fresh plug-in process started in RUN mode.
    PlugIn,
    /// Runs in a long-lived extension process.
    Extension,
    /// Served by an already-open plug-in until it closes.
    Temporary,
}

/// Procedure declaration sent by a plug-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureDef {
    /// Unique procedure name.
    pub name: String,
    /// Execution kind.
    pub kind: ProcedureKind,
    /// Parameter types in call order.
    #[serde(default)]
    pub params: Vec<ValueType>,
    /// Return value types.
    #[serde(default)]
    pub return_types: Vec<ValueType>,
    /// Menu label shown by the editor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_label: Option<String>,
}

impl ProcedureDef {
    /// Declaration without parameters or return values.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ProcedureKind) -> Self {
        Self {
            name: name.into(),
            kind,
            params: Vec::new(),
            return_types: Vec::new(),
            menu_label: None,
        }
    }

    /// Sets the declared return types.
    #[must_use]
    pub fn with_return_types(mut self, return_types: Vec<ValueType>) -> Self {
        self.return_types = return_types;
        self
    }

    /// Sets the declared parameter types.
    #[must_use]
    pub fn with_params(mut self, params: Vec<ValueType>) -> Self {
        self.params = params;
        self
    }
}

/// Role of a file procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileHandlerKind {
    /// Opens files.
    Load,
    /// Saves in a native format.
    Save,
    /// Exports to a foreign format.
    Export,
}

/// File-handler registration sent by a plug-in for one of its procedures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandlerDef {
    /// Procedure that handles the files.
    pub procedure: String,
    /// Handler role.
    pub kind: FileHandlerKind,
    /// File name extensions without the leading dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Literal URL prefixes, for example `http:`.
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Comma-separated `offset,type,value` magic triples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magics: Option<String>,
    /// Handled mime types.
    #[serde(default)]
    pub mime_types: Vec<String>,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: i32,
    /// Accepts non-local URIs.
    #[serde(default)]
    pub handles_remote: bool,
    /// Handles raw camera data.
    #[serde(default)]
    pub handles_raw: bool,
    /// Generic handler without a fixed format.
    #[serde(default)]
    pub generic: bool,
}

impl FileHandlerDef {
    /// Handler for `procedure` with no matching criteria yet.
    #[must_use]
    pub fn new(procedure: impl Into<String>, kind: FileHandlerKind) -> Self {
        Self {
            procedure: procedure.into(),
            kind,
            extensions: Vec::new(),
            prefixes: Vec::new(),
            magics: None,
            mime_types: Vec::new(),
            priority: 0,
            handles_remote: false,
            handles_raw: false,
            generic: false,
        }
    }
}

/// Host configuration sent before a procedure is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Message set version.
    pub protocol_version: u32,
    /// Name of the calling context.
    pub context: String,
    /// Display the call was issued from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_id: Option<u32>,
}

/// A procedure call travelling in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcCall {
    /// Procedure name.
    pub name: String,
    /// Arguments in declaration order.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// The reply to a [`ProcCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcResult {
    /// Procedure that was called.
    pub name: String,
    /// Call status.
    pub status: PdbStatus,
    /// Returned values.
    #[serde(default)]
    pub values: Vec<Value>,
    /// Error message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcResult {
    /// Pairs `name` with a call result.
    #[must_use]
    pub fn from_return_values(name: impl Into<String>, values: ReturnValues) -> Self {
        let (status, values, error) = values.into_parts();
        Self {
            name: name.into(),
            status,
            values,
            error,
        }
    }

    /// Drops the procedure name.
    #[must_use]
    pub fn into_return_values(self) -> ReturnValues {
        ReturnValues::new(self.status, self.values, self.error)
    }
}

/// Every message exchanged on a plug-in's pipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Either side asks the other to terminate.
    Quit,
    /// Host configuration, host to plug-in only.
    Config(HostConfig),
    /// A procedure call.
    ProcRun(ProcCall),
    /// Reply to `proc_run`.
    ProcReturn(ProcResult),
    /// Host calls a temporary procedure, host to plug-in only.
    TempProcRun(ProcCall),
    /// Reply to `temp_proc_run`.
    TempProcReturn(ProcResult),
    /// Plug-in installs a procedure.
    ProcInstall(ProcedureDef),
    /// Plug-in removes one of its temporary procedures.
    ProcUninstall {
        /// Procedure name.
        name: String,
    },
    /// Plug-in attaches a file handler to one of its procedures.
    RegisterFileHandler(FileHandlerDef),
    /// Extension finished starting up.
    ExtensionAck,
    /// Plug-in wants an INIT pass.
    HasInit,
    /// Plug-in pushes a sub-context on the current call.
    ContextPush,
    /// Plug-in pops its innermost sub-context.
    ContextPop,
}

impl Message {
    /// Wire tag of the message, used in log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Config(_) => "config",
            Self::ProcRun(_) => "proc_run",
            Self::ProcReturn(_) => "proc_return",
            Self::TempProcRun(_) => "temp_proc_run",
            Self::TempProcReturn(_) => "temp_proc_return",
            Self::ProcInstall(_) => "proc_install",
            Self::ProcUninstall { .. } => "proc_uninstall",
            Self::RegisterFileHandler(_) => "register_file_handler",
            Self::ExtensionAck => "extension_ack",
            Self::HasInit => "has_init",
            Self::ContextPush => "context_push",
            Self::ContextPop => "context_pop",
        }
    }
}
