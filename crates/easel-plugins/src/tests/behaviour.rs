//! Behaviour-driven tests for interpreter resolution and file
//! identification.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use url::Url;

use crate::error::FileProcedureError;
use crate::file_procedure::{self, FileProcedure};
use crate::interpreter::{InterpreterDb, ResolvedInterpreter};
use crate::protocol::{FileHandlerDef, FileHandlerKind};
use crate::registry::ProcedureRegistry;

use super::install_handler;

// ---------------------------------------------------------------------------
// Typed wrappers for Gherkin step parameters
// ---------------------------------------------------------------------------

/// A quoted string value from a Gherkin feature file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QuotedString(String);

impl FromStr for QuotedString {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim_matches('"').to_owned()))
    }
}

impl QuotedString {
    fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    workspace: TempDir,
    definitions: Vec<String>,
    plug_in: Option<PathBuf>,
    resolved: Option<ResolvedInterpreter>,
    registry: ProcedureRegistry,
    identified: Option<Result<FileProcedure, FileProcedureError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld {
        workspace: TempDir::new().expect("tempdir"),
        definitions: Vec::new(),
        plug_in: None,
        resolved: None,
        registry: ProcedureRegistry::new(),
        identified: None,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn handler(world: &mut TestWorld, procedure: &str, configure: impl FnOnce(&mut FileHandlerDef)) {
    let mut def = FileHandlerDef::new(procedure, FileHandlerKind::Load);
    configure(&mut def);
    let owner = world.workspace.path().join("plug-ins").join(procedure);
    install_handler(&mut world.registry, &owner, &def);
}

fn identified(world: &TestWorld) -> &Result<FileProcedure, FileProcedureError> {
    world.identified.as_ref().expect("no file identified")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("the interpreter definition {line}")]
fn given_definition(world: &mut TestWorld, line: QuotedString) {
    world.definitions.push(line.as_str().to_owned());
}

#[given("a plug-in {name} starting with {text}")]
fn given_plug_in(world: &mut TestWorld, name: QuotedString, text: QuotedString) {
    let path = world.workspace.path().join(name.as_str());
    fs::write(&path, format!("{}\n", text.as_str())).expect("write plug-in");
    world.plug_in = Some(path);
}

#[given("a load handler {procedure} for extension {extension}")]
fn given_extension_handler(world: &mut TestWorld, procedure: QuotedString, extension: QuotedString) {
    handler(world, procedure.as_str(), |def| {
        def.extensions = vec![extension.as_str().to_owned()];
    });
}

#[given("a magic load handler {procedure} for extension {extension} matching {magic}")]
fn given_magic_handler(
    world: &mut TestWorld,
    procedure: QuotedString,
    extension: QuotedString,
    magic: QuotedString,
) {
    handler(world, procedure.as_str(), |def| {
        def.extensions = vec![extension.as_str().to_owned()];
        def.magics = Some(magic.as_str().to_owned());
    });
}

#[given("a load handler {procedure} for prefix {prefix}")]
fn given_prefix_handler(world: &mut TestWorld, procedure: QuotedString, prefix: QuotedString) {
    handler(world, procedure.as_str(), |def| {
        def.prefixes = vec![prefix.as_str().to_owned()];
    });
}

#[given("a file {name} containing {text}")]
fn given_file(world: &mut TestWorld, name: QuotedString, text: QuotedString) {
    fs::write(world.workspace.path().join(name.as_str()), text.as_str()).expect("write file");
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the interpreter is resolved")]
fn when_resolved(world: &mut TestWorld) {
    let defs = world.workspace.path().join("interpreters");
    fs::create_dir_all(&defs).expect("create definitions dir");
    let mut contents = world.definitions.join("\n");
    contents.push('\n');
    fs::write(defs.join("easel.interp"), contents).expect("write definitions");
    let mut db = InterpreterDb::new();
    db.load(&[defs]);
    let plug_in = world.plug_in.as_ref().expect("no plug-in written");
    world.resolved = db.resolve(plug_in);
}

#[when("the file {name} is identified")]
fn when_identified(world: &mut TestWorld, name: QuotedString) {
    let url = if name.as_str().contains("://") {
        Url::parse(name.as_str()).expect("url")
    } else {
        Url::from_file_path(world.workspace.path().join(name.as_str())).expect("file url")
    };
    let candidates = world.registry.file_procedures(FileHandlerKind::Load);
    world.identified = Some(file_procedure::find(&candidates, &url).cloned());
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the plug-in runs under {program}")]
fn then_program(world: &mut TestWorld, program: QuotedString) {
    let resolved = world.resolved.as_ref().expect("expected an interpreter");
    assert_eq!(resolved.program(), program.as_str());
}

#[then("the interpreter argument is {arg}")]
fn then_interp_arg(world: &mut TestWorld, arg: QuotedString) {
    let resolved = world.resolved.as_ref().expect("expected an interpreter");
    assert_eq!(resolved.interp_arg(), Some(arg.as_str()));
}

#[then("there is no interpreter argument")]
fn then_no_interp_arg(world: &mut TestWorld) {
    let resolved = world.resolved.as_ref().expect("expected an interpreter");
    assert!(resolved.interp_arg().is_none());
}

#[then("the plug-in is executed directly")]
fn then_direct(world: &mut TestWorld) {
    assert!(
        world.resolved.is_none(),
        "expected direct execution, got {:?}",
        world.resolved
    );
}

#[then("the file is handled by {procedure}")]
fn then_handled_by(world: &mut TestWorld, procedure: QuotedString) {
    match identified(world) {
        Ok(found) => assert_eq!(found.procedure(), procedure.as_str()),
        Err(err) => panic!("expected {}, got: {err}", procedure.as_str()),
    }
}

#[then("the file type is unknown")]
fn then_unknown(world: &mut TestWorld) {
    let result = identified(world);
    assert!(
        matches!(result, Err(FileProcedureError::UnknownFileType { .. })),
        "expected UnknownFileType, got: {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/interpreter_resolution.feature")]
fn interpreter_resolution_behaviour(world: TestWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/file_identification.feature")]
fn file_identification_behaviour(world: TestWorld) {
    let _ = world;
}
