//! Command-line argument definitions for `easel`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use easel_plugins::FileHandlerKind;

/// Command-line interface of the Easel plug-in host.
#[derive(Parser, Debug)]
#[command(name = "easel", disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Commands understood by `easel`.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Prints the interpreter that would run a plug-in.
    Resolve {
        /// Plug-in executable or script.
        #[arg(value_name = "PLUG_IN")]
        plug_in: PathBuf,
    },
    /// Queries plug-ins and prints the procedures they install.
    Query {
        /// Plug-in executables to query.
        #[arg(value_name = "PLUG_IN", required = true)]
        plug_ins: Vec<PathBuf>,
    },
    /// Prints the procedure that would handle a file.
    Identify {
        /// Which kind of handler to look for.
        #[arg(long, value_enum, default_value_t = HandlerKind::Load)]
        kind: HandlerKind,
        /// Plug-ins to query instead of scanning the plug-in path.
        #[arg(long = "plug-in", value_name = "PLUG_IN")]
        plug_ins: Vec<PathBuf>,
        /// File path or URL to identify.
        #[arg(value_name = "FILE")]
        file: String,
    },
}

/// File handler kinds selectable on the command line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum HandlerKind {
    /// Procedures that open files.
    #[default]
    Load,
    /// Procedures that save in a native format.
    Save,
    /// Procedures that export to a foreign format.
    Export,
}

impl From<HandlerKind> for FileHandlerKind {
    fn from(kind: HandlerKind) -> Self {
        match kind {
            HandlerKind::Load => Self::Load,
            HandlerKind::Save => Self::Save,
            HandlerKind::Export => Self::Export,
        }
    }
}
