//! Choosing the procedure that loads, saves or exports a file.
//!
//! [`find`] walks the candidates in priority order. Cheap name-based checks
//! run first; magic rules are only evaluated for local files, against a
//! head buffer read once per lookup.

mod magic;

use std::fs::File;

use tracing::debug;
use url::Url;

use crate::error::FileProcedureError;
use crate::protocol::{FileHandlerDef, FileHandlerKind};

use self::magic::{MagicSource, check_rules};

pub use self::magic::{MAGIC_HEAD_SIZE, MIN_MAGIC_HEAD, MagicMatch, MagicRule, parse_magics};

/// Tracing target for file procedure lookups.
const FILE_PROCEDURE_TARGET: &str = "easel_plugins::file_procedure";

/// A procedure registered as a file handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProcedure {
    procedure: String,
    kind: FileHandlerKind,
    extensions: Vec<String>,
    prefixes: Vec<String>,
    magics: Vec<MagicRule>,
    mime_types: Vec<String>,
    priority: i32,
    handles_remote: bool,
    handles_raw: bool,
    generic: bool,
}

impl FileProcedure {
    /// Builds the record from a plug-in's registration.
    ///
    /// # Errors
    ///
    /// Returns [`FileProcedureError::InvalidMagic`] when the magic rules do
    /// not parse.
    pub fn from_def(def: &FileHandlerDef) -> Result<Self, FileProcedureError> {
        let magics = parse_magics(def.magics.as_deref().unwrap_or_default())?;
        Ok(Self {
            procedure: def.procedure.clone(),
            kind: def.kind,
            extensions: def.extensions.clone(),
            prefixes: def.prefixes.clone(),
            magics,
            mime_types: def.mime_types.clone(),
            priority: def.priority,
            handles_remote: def.handles_remote,
            handles_raw: def.handles_raw,
            generic: def.generic,
        })
    }

    /// Name of the handling procedure.
    #[must_use]
    pub fn procedure(&self) -> &str {
        self.procedure.as_str()
    }

    /// Handler role.
    #[must_use]
    pub const fn kind(&self) -> FileHandlerKind {
        self.kind
    }

    /// Handled extensions.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Handled URL prefixes.
    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Magic rules in declaration order.
    #[must_use]
    pub fn magics(&self) -> &[MagicRule] {
        &self.magics
    }

    /// Handled mime types.
    #[must_use]
    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    /// Sort key; lower runs first.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Accepts non-local URIs.
    #[must_use]
    pub const fn handles_remote(&self) -> bool {
        self.handles_remote
    }

    /// Handles raw camera data.
    #[must_use]
    pub const fn handles_raw(&self) -> bool {
        self.handles_raw
    }

    /// Generic handler without a fixed format.
    #[must_use]
    pub const fn is_generic(&self) -> bool {
        self.generic
    }

    fn has_magic(&self) -> bool {
        !self.magics.is_empty()
    }

    fn matches_prefix(&self, url: &str) -> bool {
        self.prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    fn matches_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(extension))
    }
}

/// Candidates sorted by priority, keeping registration order for ties.
fn by_priority(candidates: &[FileProcedure]) -> Vec<&FileProcedure> {
    let mut sorted: Vec<&FileProcedure> = candidates.iter().collect();
    sorted.sort_by_key(|candidate| candidate.priority);
    sorted
}

/// Extension of the last path segment, without the dot.
fn url_extension(url: &Url) -> Option<String> {
    let segment = url.path().rsplit('/').next()?;
    let (_, extension) = segment.rsplit_once('.')?;
    (!extension.is_empty()).then(|| extension.to_owned())
}

/// Finds the procedure for `url` among `candidates`.
///
/// # Errors
///
/// Returns [`FileProcedureError::UnknownFileType`] when nothing matches.
pub fn find<'a>(
    candidates: &'a [FileProcedure],
    url: &Url,
) -> Result<&'a FileProcedure, FileProcedureError> {
    let sorted = by_priority(candidates);
    if let Some(found) = find_by_name(&sorted, url, true) {
        debug!(target: FILE_PROCEDURE_TARGET, procedure = found.procedure(), "matched by name");
        return Ok(found);
    }
    if let Some(found) = find_by_magic(&sorted, url) {
        debug!(target: FILE_PROCEDURE_TARGET, procedure = found.procedure(), "matched by magic");
        return Ok(found);
    }
    if let Some(found) = find_by_name(&sorted, url, false) {
        debug!(
            target: FILE_PROCEDURE_TARGET,
            procedure = found.procedure(),
            "matched by name after magic failed"
        );
        return Ok(found);
    }
    Err(FileProcedureError::UnknownFileType {
        uri: url.to_string(),
    })
}

fn find_by_name<'a>(
    sorted: &[&'a FileProcedure],
    url: &Url,
    skip_magic: bool,
) -> Option<&'a FileProcedure> {
    let eligible = || {
        sorted
            .iter()
            .copied()
            .filter(move |candidate| !(skip_magic && candidate.has_magic()))
    };
    if let Some(found) = eligible().find(|candidate| candidate.matches_prefix(url.as_str())) {
        return Some(found);
    }
    let extension = url_extension(url)?;
    eligible().find(|candidate| candidate.matches_extension(&extension))
}

fn find_by_magic<'a>(sorted: &[&'a FileProcedure], url: &Url) -> Option<&'a FileProcedure> {
    if url.scheme() != "file" {
        return None;
    }
    let mut source: Option<MagicSource> = None;
    let mut opened = false;
    let mut size_match: Option<&'a FileProcedure> = None;
    let mut size_match_count = 0_usize;
    let mut best: Option<(&'a FileProcedure, usize)> = None;

    for candidate in sorted.iter().copied().filter(|c| c.has_magic()) {
        if !opened {
            opened = true;
            source = url
                .to_file_path()
                .ok()
                .and_then(|path| File::open(path).ok())
                .and_then(MagicSource::open);
        }
        let head = source.as_mut()?;
        match check_rules(candidate.magics(), head) {
            MagicMatch::None => {}
            MagicMatch::Size => {
                size_match_count += 1;
                size_match.get_or_insert(candidate);
            }
            MagicMatch::Bytes(score) => {
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((candidate, score));
                }
            }
        }
    }

    match best {
        Some((found, _)) => Some(found),
        None if size_match_count == 1 => size_match,
        None => None,
    }
}

/// First candidate, by priority, with a prefix of `url`.
#[must_use]
pub fn find_by_prefix<'a>(candidates: &'a [FileProcedure], url: &Url) -> Option<&'a FileProcedure> {
    by_priority(candidates)
        .into_iter()
        .find(|candidate| candidate.matches_prefix(url.as_str()))
}

/// First candidate, by priority, handling the extension of `url`.
#[must_use]
pub fn find_by_extension<'a>(
    candidates: &'a [FileProcedure],
    url: &Url,
) -> Option<&'a FileProcedure> {
    let extension = url_extension(url)?;
    by_priority(candidates)
        .into_iter()
        .find(|candidate| candidate.matches_extension(&extension))
}

/// First candidate, by priority, handling `mime_type`.
#[must_use]
pub fn find_by_mime_type<'a>(
    candidates: &'a [FileProcedure],
    mime_type: &str,
) -> Option<&'a FileProcedure> {
    by_priority(candidates).into_iter().find(|candidate| {
        candidate
            .mime_types
            .iter()
            .any(|known| known.eq_ignore_ascii_case(mime_type))
    })
}

#[cfg(test)]
mod tests;
