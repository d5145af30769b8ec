//! Implementations of the `easel` commands.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use easel_config::Config;
use easel_plugins::{Collaborators, FileHandlerKind, PlugInManager, ProcedureDef};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::AppError;
use crate::cli::CliCommand;

const COMMAND_TARGET: &str = "easel_cli::commands";

/// One line of `easel query` output.
#[derive(Debug, Serialize)]
struct QueryReport<'a> {
    plug_in: &'a Path,
    has_init: bool,
    procedures: &'a [ProcedureDef],
}

pub(crate) fn execute<W: Write>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<(), AppError> {
    let manager = PlugInManager::from_config(config, Collaborators::default());
    manager.load_interpreters();
    let outcome = match command {
        CliCommand::Resolve { plug_in } => resolve(&manager, &plug_in, stdout),
        CliCommand::Query { plug_ins } => query(&manager, &plug_ins, stdout),
        CliCommand::Identify {
            kind,
            plug_ins,
            file,
        } => {
            let candidates = if plug_ins.is_empty() {
                scan_plug_in_dirs(&config.plug_in_dirs())?
            } else {
                plug_ins
            };
            identify(&manager, &candidates, kind.into(), &file, stdout)
        }
    };
    manager.exit();
    outcome
}

fn resolve<W: Write>(manager: &PlugInManager, plug_in: &Path, stdout: &mut W) -> Result<(), AppError> {
    match manager.resolve_interpreter(plug_in) {
        Some(resolved) => match resolved.interp_arg() {
            Some(arg) => writeln!(stdout, "{} {arg}", resolved.program())?,
            None => writeln!(stdout, "{}", resolved.program())?,
        },
        None => writeln!(stdout, "direct")?,
    }
    Ok(())
}

fn query<W: Write>(
    manager: &PlugInManager,
    plug_ins: &[PathBuf],
    stdout: &mut W,
) -> Result<(), AppError> {
    for plug_in in plug_ins {
        let outcome = manager.query(plug_in).map_err(|source| AppError::Query {
            path: plug_in.clone(),
            source,
        })?;
        let report = QueryReport {
            plug_in,
            has_init: outcome.has_init,
            procedures: &outcome.procedures,
        };
        serde_json::to_writer(&mut *stdout, &report)?;
        writeln!(stdout)?;
    }
    Ok(())
}

fn identify<W: Write>(
    manager: &PlugInManager,
    plug_ins: &[PathBuf],
    kind: FileHandlerKind,
    file: &str,
    stdout: &mut W,
) -> Result<(), AppError> {
    for plug_in in plug_ins {
        if let Err(err) = manager.query(plug_in) {
            warn!(target: COMMAND_TARGET, plug_in = %plug_in.display(), error = %err, "skipping plug-in");
        }
    }
    let url = file_url(file)?;
    let found = manager.find_file_procedure(kind, &url)?;
    info!(target: COMMAND_TARGET, %url, procedure = found.procedure(), "identified file");
    writeln!(stdout, "{}", found.procedure())?;
    Ok(())
}

/// Parses `file` as a URL when it has a scheme, otherwise as a local path.
fn file_url(file: &str) -> Result<Url, AppError> {
    let invalid = || AppError::InvalidFile {
        file: file.to_owned(),
    };
    if file.contains("://") {
        return Url::parse(file).map_err(|_| invalid());
    }
    let absolute = std::path::absolute(file).map_err(|_| invalid())?;
    Url::from_file_path(absolute).map_err(|()| invalid())
}

/// Regular files in `dirs`, in directory order then file-name order.
fn scan_plug_in_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, AppError> {
    let mut plug_ins = Vec::new();
    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(AppError::ReadPlugInDir {
                    path: dir.clone(),
                    source,
                });
            }
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        found.sort();
        plug_ins.extend(found);
    }
    Ok(plug_ins)
}
