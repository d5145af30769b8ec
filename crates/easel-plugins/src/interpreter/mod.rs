//! Interpreter resolution for script plug-ins.
//!
//! [`InterpreterDb`] is loaded from interpreter definition files and answers
//! one question: which program, if any, must run a given plug-in file. It
//! consults the file's `#!` line first, then magic byte patterns, then the
//! file name extension.
//!
//! Definition files contain three kinds of lines:
//!
//! ```text
//! # comment
//! python=/usr/bin/python3
//! :python:E::py::python:
//! :lua:M::\x1bLua::/usr/bin/lua:
//! ```

mod binfmt;
mod shebang;

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::InterpreterError;

use self::binfmt::{BinfmtRecord, InterpreterMagic};

/// Size of the inspected head buffer. One byte less is read from disk.
pub const BUFSIZE: usize = 4096;

const HEAD_READ_LIMIT: u64 = 4095;

/// Tracing target for interpreter resolution.
const INTERPRETER_TARGET: &str = "easel_plugins::interpreter";

const ENV_PROGRAM: &str = "/usr/bin/env";

/// Program and optional argument that must run a plug-in file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterpreter {
    program: String,
    interp_arg: Option<String>,
}

impl ResolvedInterpreter {
    /// Builds a resolution result.
    #[must_use]
    pub fn new(program: impl Into<String>, interp_arg: Option<String>) -> Self {
        Self {
            program: program.into(),
            interp_arg,
        }
    }

    /// Interpreter executable.
    #[must_use]
    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Argument placed between the interpreter and the plug-in path.
    #[must_use]
    pub fn interp_arg(&self) -> Option<&str> {
        self.interp_arg.as_deref()
    }
}

/// Interpreter tables built from definition files.
#[derive(Debug, Clone, Default)]
pub struct InterpreterDb {
    programs: HashMap<String, String>,
    extensions: HashMap<String, String>,
    extension_names: HashSet<String>,
    magics: Vec<InterpreterMagic>,
    magic_names: HashSet<String>,
}

impl InterpreterDb {
    /// Creates an empty database that resolves every file to direct
    /// execution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the tables from every definition file in `dirs`.
    ///
    /// Missing directories are skipped. Malformed lines are logged and
    /// skipped; loading never fails.
    pub fn load<P: AsRef<Path>>(&mut self, dirs: &[P]) {
        *self = Self::default();
        for dir in dirs {
            for file in definition_files(dir.as_ref()) {
                self.load_file(&file);
            }
        }
        self.resolve_program_references();
        debug!(
            target: INTERPRETER_TARGET,
            programs = self.programs.len(),
            extensions = self.extensions.len(),
            magics = self.magics.len(),
            "loaded interpreter definitions"
        );
    }

    /// Registered path of the interpreter called `name`.
    #[must_use]
    pub fn program(&self, name: &str) -> Option<&str> {
        self.programs.get(name).map(String::as_str)
    }

    /// Program registered for the file extension `extension`.
    #[must_use]
    pub fn extension_program(&self, extension: &str) -> Option<&str> {
        self.extensions.get(extension).map(String::as_str)
    }

    /// Number of magic rules in registration order.
    #[must_use]
    pub fn magic_count(&self) -> usize {
        self.magics.len()
    }

    /// Returns `true` when no definitions are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty() && self.extensions.is_empty() && self.magics.is_empty()
    }

    /// Chooses the interpreter for the plug-in at `path`.
    ///
    /// Returns `None` when the file should be executed directly, including
    /// when it cannot be read.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Option<ResolvedInterpreter> {
        let head = read_head(path)?;
        if let Some(resolved) = self.resolve_shebang(&head) {
            return Some(resolved);
        }
        let mut padded = head;
        padded.resize(BUFSIZE, 0);
        if let Some(magic) = self.magics.iter().find(|magic| magic.matches(&padded)) {
            return Some(ResolvedInterpreter::new(magic.program.clone(), None));
        }
        self.resolve_extension(path)
    }

    fn resolve_shebang(&self, head: &[u8]) -> Option<ResolvedInterpreter> {
        let shebang = shebang::parse(head)?;
        if shebang.name == ENV_PROGRAM {
            if let Some((program, rest)) = shebang.arg.as_deref().and_then(|arg| {
                let (candidate, rest) = shebang::split_token(arg);
                self.program(candidate).map(|program| (program, rest))
            }) {
                return Some(ResolvedInterpreter::new(program, rest.map(str::to_owned)));
            }
        }
        let program = self
            .program(&shebang.name)
            .map_or_else(|| shebang.name.clone(), str::to_owned);
        Some(ResolvedInterpreter::new(program, shebang.arg))
    }

    fn resolve_extension(&self, path: &Path) -> Option<ResolvedInterpreter> {
        let name = path.file_name()?.to_str()?;
        let (_, extension) = name.rsplit_once('.')?;
        if extension.is_empty() {
            return None;
        }
        self.extension_program(extension)
            .map(|program| ResolvedInterpreter::new(program, None))
    }

    fn load_file(&mut self, file: &Path) {
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(err) => {
                report(&InterpreterError::Io {
                    file: file.to_path_buf(),
                    source: Arc::new(err),
                });
                return;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        for line in text.lines() {
            self.load_line(file, line);
        }
    }

    fn load_line(&mut self, file: &Path, line: &str) {
        let Some(first) = line.chars().next() else {
            return;
        };
        if first == '#' || first.is_whitespace() {
            return;
        }
        if first.is_ascii_alphanumeric() || first == '/' {
            self.add_program(file, line);
            return;
        }
        match binfmt::parse(line) {
            Ok(BinfmtRecord::Extension {
                name,
                extension,
                program,
            }) => self.add_extension(name, extension, program),
            Ok(BinfmtRecord::Magic(magic)) => self.add_magic(magic),
            Err(reason) => report(&InterpreterError::BadBinfmt {
                file: file.to_path_buf(),
                reason,
            }),
        }
    }

    fn add_program(&mut self, file: &Path, line: &str) {
        let Some((name, program)) = line.split_once('=') else {
            return;
        };
        let trimmed = program.trim_end();
        let Some(located) = locate_program(trimmed) else {
            report(&InterpreterError::BadInterpreter {
                file: file.to_path_buf(),
                program: trimmed.to_owned(),
            });
            return;
        };
        self.programs.entry(name.to_owned()).or_insert(located);
    }

    fn add_extension(&mut self, name: String, extension: String, program: String) {
        if !self.extension_names.insert(name) {
            return;
        }
        self.extensions.insert(extension, program);
    }

    fn add_magic(&mut self, magic: InterpreterMagic) {
        if self.magic_names.insert(magic.name.clone()) {
            self.magics.push(magic);
        }
    }

    fn resolve_program_references(&mut self) {
        let references = self
            .extensions
            .values_mut()
            .chain(self.magics.iter_mut().map(|magic| &mut magic.program));
        for program in references {
            if let Some(path) = self.programs.get(program.as_str()) {
                program.clone_from(path);
            }
        }
    }
}

fn report(error: &InterpreterError) {
    warn!(target: INTERPRETER_TARGET, %error, "skipping interpreter definition");
}

/// Visible regular files of `dir` in file-name order.
fn definition_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            report(&InterpreterError::Io {
                file: dir.to_path_buf(),
                source: Arc::new(err),
            });
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    files
}

fn read_head(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut head = Vec::with_capacity(BUFSIZE);
    file.take(HEAD_READ_LIMIT).read_to_end(&mut head).ok()?;
    Some(head)
}

/// Accepts an executable path as given, otherwise looks it up on `PATH`.
fn locate_program(program: &str) -> Option<String> {
    if program.is_empty() {
        return None;
    }
    if is_executable(Path::new(program)) {
        return Some(program.to_owned());
    }
    which::which(program)
        .ok()
        .map(|found| found.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
