//! Crate-level integration and BDD tests.

use std::path::Path;

use url::Url;

use crate::file_procedure::FileProcedure;
use crate::protocol::{FileHandlerDef, FileHandlerKind, ProcedureDef, ProcedureKind};
use crate::registry::{ProcedureOwner, ProcedureRegistry};

mod behaviour;
#[cfg(unix)]
pub(crate) mod support;

/// Installs `procedure` from `owner` with `handler` attached.
fn install_handler(registry: &mut ProcedureRegistry, owner: &Path, handler: &FileHandlerDef) {
    registry
        .install(
            ProcedureDef::new(handler.procedure.clone(), ProcedureKind::PlugIn),
            ProcedureOwner::new(owner),
        )
        .expect("install procedure");
    registry
        .set_file_handler(handler, owner)
        .expect("register file handler");
}

#[test]
fn registered_handlers_identify_remote_files_by_prefix() {
    let owner = Path::new("/opt/easel/plug-ins/web");
    let mut registry = ProcedureRegistry::new();
    let mut web = FileHandlerDef::new("easel-web-load", FileHandlerKind::Load);
    web.prefixes = vec!["https:".into()];
    web.handles_remote = true;
    install_handler(&mut registry, owner, &web);
    let mut png = FileHandlerDef::new("easel-png-load", FileHandlerKind::Load);
    png.extensions = vec!["png".into()];
    install_handler(&mut registry, owner, &png);

    let candidates: Vec<FileProcedure> = registry.file_procedures(FileHandlerKind::Load);
    let url = Url::parse("https://example.com/photo.png").expect("url");
    let found = crate::file_procedure::find(&candidates, &url).expect("match");

    assert_eq!(found.procedure(), "easel-web-load");
    assert!(found.handles_remote());
}
