//! Error types for the CLI runtime.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use easel_plugins::{FileProcedureError, PlugInError};
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to query {}: {source}", path.display())]
    Query { path: PathBuf, source: PlugInError },
    #[error("cannot turn {file} into a URL")]
    InvalidFile { file: String },
    #[error("no handler found: {0}")]
    Identify(#[from] FileProcedureError),
    #[error("failed to read plug-in directory {}: {source}", path.display())]
    ReadPlugInDir { path: PathBuf, source: io::Error },
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(#[from] io::Error),
}
