//! Unit tests for plug-in host error types.

use std::path::PathBuf;
use std::sync::Arc;

use rstest::rstest;

use super::*;

#[test]
fn spawn_failed_message_includes_path_and_detail() {
    let error = PlugInError::SpawnFailed {
        path: PathBuf::from("/opt/plug-ins/blur"),
        message: "permission denied".into(),
        source: None,
    };
    let message = error.to_string();
    assert!(
        message.contains("/opt/plug-ins/blur"),
        "expected path in message: {message}"
    );
    assert!(
        message.contains("permission denied"),
        "expected detail in message: {message}"
    );
}

#[rstest]
#[case::crashed(PlugInError::Crashed { path: PathBuf::from("/p/sharpen") }, "crashed")]
#[case::not_open(PlugInError::NotOpen { path: PathBuf::from("/p/sharpen") }, "not open")]
#[case::already_used(
    PlugInError::AlreadyUsed { path: PathBuf::from("/p/sharpen") },
    "already been opened"
)]
fn lifecycle_errors_describe_state(#[case] error: PlugInError, #[case] expected: &str) {
    let message = error.to_string();
    assert!(message.contains("/p/sharpen"), "expected path: {message}");
    assert!(message.contains(expected), "expected '{expected}': {message}");
}

#[test]
fn wire_errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WireError>();
    assert_send_sync::<PlugInError>();
    let error = WireError::from(std::io::Error::other("broken pipe"));
    assert!(matches!(error, WireError::Io(_)));
    assert!(error.to_string().contains("broken pipe"));
}

#[test]
fn interpreter_io_error_names_file() {
    let error = InterpreterError::Io {
        file: PathBuf::from("/etc/easel/interpreters/python.interp"),
        source: Arc::new(std::io::Error::other("denied")),
    };
    let message = error.to_string();
    assert!(message.contains("python.interp"), "{message}");
}

#[test]
fn unknown_file_type_names_uri() {
    let error = FileProcedureError::UnknownFileType {
        uri: "file:///tmp/photo.xyz".into(),
    };
    assert!(error.to_string().contains("file:///tmp/photo.xyz"));
}

#[test]
fn registry_handler_error_keeps_source() {
    let error = RegistryError::InvalidHandler {
        name: "file-png-load".into(),
        source: FileProcedureError::InvalidMagic {
            rule: "0,quad,1".into(),
            reason: "unknown rule type",
        },
    };
    let source = std::error::Error::source(&error).map(ToString::to_string);
    assert_eq!(
        source.as_deref(),
        Some("invalid magic rule '0,quad,1': unknown rule type")
    );
}
