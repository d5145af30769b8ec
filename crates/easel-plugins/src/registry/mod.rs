//! Registry of procedures installed by plug-ins.
//!
//! [`ProcedureRegistry`] keeps [`RegisteredProcedure`] entries densely in
//! registration order with a name index. Permanent procedures installed again under the same name
//! replace the previous entry; temporary procedures must have unique names
//! and disappear when the plug-in that installed them closes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::RegistryError;
use crate::file_procedure::FileProcedure;
use crate::process::PlugInId;
use crate::protocol::{FileHandlerDef, FileHandlerKind, ProcedureDef, ProcedureKind};

/// Who installed a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureOwner {
    path: PathBuf,
    plug_in: Option<PlugInId>,
}

impl ProcedureOwner {
    /// Owner identified by its executable only.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            plug_in: None,
        }
    }

    /// Owner that is a specific open plug-in process.
    #[must_use]
    pub fn open_plug_in(path: impl Into<PathBuf>, plug_in: PlugInId) -> Self {
        Self {
            path: path.into(),
            plug_in: Some(plug_in),
        }
    }

    /// Executable that installed the procedure.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open process that installed the procedure, if any.
    #[must_use]
    pub const fn plug_in(&self) -> Option<PlugInId> {
        self.plug_in
    }
}

/// A procedure and its registration details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredProcedure {
    def: ProcedureDef,
    owner: ProcedureOwner,
    file_procedure: Option<FileProcedure>,
}

impl RegisteredProcedure {
    /// The declaration sent by the plug-in.
    #[must_use]
    pub const fn def(&self) -> &ProcedureDef {
        &self.def
    }

    /// Procedure name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.def.name.as_str()
    }

    /// Execution kind.
    #[must_use]
    pub const fn kind(&self) -> ProcedureKind {
        self.def.kind
    }

    /// Registration owner.
    #[must_use]
    pub const fn owner(&self) -> &ProcedureOwner {
        &self.owner
    }

    /// File handler attached to the procedure, if any.
    #[must_use]
    pub const fn file_procedure(&self) -> Option<&FileProcedure> {
        self.file_procedure.as_ref()
    }
}

/// Arena of installed procedures.
///
/// # Example
///
/// ```
/// use easel_plugins::protocol::{ProcedureDef, ProcedureKind};
/// use easel_plugins::registry::{ProcedureOwner, ProcedureRegistry};
///
/// let mut registry = ProcedureRegistry::new();
/// registry
///     .install(
///         ProcedureDef::new("easel-sharpen", ProcedureKind::PlugIn),
///         ProcedureOwner::new("/opt/plug-ins/sharpen"),
///     )
///     .expect("install succeeds");
/// assert!(registry.get("easel-sharpen").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProcedureRegistry {
    slots: Vec<RegisteredProcedure>,
    index: HashMap<String, usize>,
}

impl ProcedureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `def` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTemporary`] when a temporary
    /// procedure's name is already taken.
    pub fn install(
        &mut self,
        def: ProcedureDef,
        owner: ProcedureOwner,
    ) -> Result<(), RegistryError> {
        if def.kind == ProcedureKind::Temporary && self.index.contains_key(&def.name) {
            return Err(RegistryError::DuplicateTemporary { name: def.name });
        }
        self.remove(&def.name);
        let slot = self.slots.len();
        self.index.insert(def.name.clone(), slot);
        self.slots.push(RegisteredProcedure {
            def,
            owner,
            file_procedure: None,
        });
        Ok(())
    }

    /// Removes a temporary procedure installed by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProcedure`] when nothing is registered
    /// under `name`, and [`RegistryError::NotOwner`] when the procedure is not
    /// a temporary procedure of `owner`.
    pub fn uninstall_temporary(
        &mut self,
        name: &str,
        owner: &ProcedureOwner,
    ) -> Result<(), RegistryError> {
        let entry = self.get(name).ok_or_else(|| RegistryError::UnknownProcedure {
            name: name.to_owned(),
        })?;
        if entry.kind() != ProcedureKind::Temporary || entry.owner.plug_in != owner.plug_in {
            return Err(RegistryError::NotOwner {
                name: name.to_owned(),
                owner: owner.path.clone(),
            });
        }
        self.remove(name);
        Ok(())
    }

    /// Removes every temporary procedure of `plug_in` and returns their
    /// names.
    pub fn remove_temporaries(&mut self, plug_in: PlugInId) -> Vec<String> {
        let names: Vec<String> = self
            .iter()
            .filter(|entry| {
                entry.kind() == ProcedureKind::Temporary && entry.owner.plug_in == Some(plug_in)
            })
            .map(|entry| entry.name().to_owned())
            .collect();
        for name in &names {
            self.remove(name);
        }
        names
    }

    /// Looks up a procedure by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredProcedure> {
        let slot = *self.index.get(name)?;
        self.slots.get(slot)
    }

    /// Attaches a file handler to a procedure installed from `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProcedure`] for an unregistered
    /// procedure, [`RegistryError::NotOwner`] when another executable owns
    /// it, and [`RegistryError::InvalidHandler`] when its magic rules do not
    /// parse.
    pub fn set_file_handler(
        &mut self,
        def: &FileHandlerDef,
        owner: &Path,
    ) -> Result<(), RegistryError> {
        let unknown = || RegistryError::UnknownProcedure {
            name: def.procedure.clone(),
        };
        let slot = *self.index.get(&def.procedure).ok_or_else(unknown)?;
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or_else(unknown)?;
        if entry.owner.path != owner {
            return Err(RegistryError::NotOwner {
                name: def.procedure.clone(),
                owner: owner.to_path_buf(),
            });
        }
        let file_procedure =
            FileProcedure::from_def(def).map_err(|source| RegistryError::InvalidHandler {
                name: def.procedure.clone(),
                source,
            })?;
        entry.file_procedure = Some(file_procedure);
        Ok(())
    }

    /// File procedures of `kind`, sorted by priority.
    #[must_use]
    pub fn file_procedures(&self, kind: FileHandlerKind) -> Vec<FileProcedure> {
        let mut procedures: Vec<FileProcedure> = self
            .iter()
            .filter_map(RegisteredProcedure::file_procedure)
            .filter(|procedure| procedure.kind() == kind)
            .cloned()
            .collect();
        procedures.sort_by_key(FileProcedure::priority);
        procedures
    }

    /// Procedures installed from the executable at `path`.
    #[must_use]
    pub fn procedures_of(&self, path: &Path) -> Vec<&RegisteredProcedure> {
        self.iter().filter(|entry| entry.owner.path == path).collect()
    }

    /// Installed procedures in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProcedure> {
        self.slots.iter()
    }

    /// Returns the number of installed procedures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` when nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of arena slots in use. Always equal to [`ProcedureRegistry::len`].
    #[must_use]
    pub fn capacity_in_use(&self) -> usize {
        self.slots.len()
    }

    fn remove(&mut self, name: &str) {
        let Some(slot) = self.index.remove(name) else {
            return;
        };
        if slot >= self.slots.len() {
            return;
        }
        self.slots.remove(slot);
        for later in self.index.values_mut() {
            if *later > slot {
                *later -= 1;
            }
        }
    }
}
