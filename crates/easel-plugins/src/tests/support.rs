//! Shell-script plug-ins and harness helpers shared by the process tests.
//!
//! Scripts talk through `/proc/self/fd` because the pipe descriptors may be
//! larger than the single digit `dash` accepts in redirections.

use std::cell::RefCell;
use std::fs;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::LocalSet;

use crate::host::{CancelHandle, Notifier, ProgressSink};
use crate::manager::{Collaborators, ManagerConfig, PlugInManager};

/// Child pipe ends are inherited by every child spawned while they are
/// open, so concurrent spawns would delay each other's hang-ups.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

const PREAMBLE: &str = r#"#!/bin/sh
in=/proc/self/fd/$2
out=/proc/self/fd/$3
send() { printf '%s\n' "$1" > "$out"; }
"#;

/// Installs `easel-answer` during query and answers 42 when run.
pub(crate) const ANSWER: &str = r#"
case "$4" in
-query)
  send '{"type":"proc_install","name":"easel-answer","kind":"plug_in","return_types":["int"]}'
  send '{"type":"register_file_handler","procedure":"easel-answer","kind":"load","extensions":["ans"]}'
  send '{"type":"has_init"}'
  ;;
-run)
  read -r config < "$in"
  read -r call < "$in"
  send '{"type":"proc_return","name":"easel-answer","status":"success","values":[{"type":"int","value":42}]}'
  ;;
esac
send '{"type":"quit"}'
"#;

/// An extension serving the temporary procedure `easel-ext-ping`.
pub(crate) const EXTENSION: &str = r#"
case "$4" in
-query)
  send '{"type":"proc_install","name":"easel-ext","kind":"extension"}'
  ;;
-run)
  read -r config < "$in"
  read -r call < "$in"
  send '{"type":"proc_install","name":"easel-ext-ping","kind":"temporary","return_types":["str"]}'
  send '{"type":"extension_ack"}'
  while read -r request < "$in"; do
    send '{"type":"temp_proc_return","name":"easel-ext-ping","status":"success","values":[{"type":"str","value":"pong"}]}'
  done
  ;;
esac
send '{"type":"quit"}'
"#;

/// Calls the host procedure `easel-echo` during query and installs
/// `easel-echoed` only when the reply carries the argument back.
pub(crate) const HOST_CALL: &str = r#"
send '{"type":"proc_run","name":"easel-echo","args":[{"type":"int","value":7}]}'
read -r reply < "$in"
case "$reply" in
*'"value":7'*)
  send '{"type":"proc_install","name":"easel-echoed","kind":"plug_in"}'
  ;;
esac
send '{"type":"quit"}'
"#;

/// Exits without saying `quit`.
pub(crate) const CRASH: &str = r#"
send '{"type":"proc_install","name":"easel-doomed","kind":"plug_in"}'
exit 3
"#;

/// Sends a message only the host may send.
pub(crate) const VIOLATION: &str = r#"
send '{"type":"config","protocol_version":1,"context":"stolen"}'
exec sleep 5
"#;

/// Reads its call and then never answers.
pub(crate) const STUCK: &str = r#"
read -r config < "$in"
read -r call < "$in"
exec sleep 30
"#;

/// Holds the spawn lock for the rest of the test.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `future` to completion on a current-thread runtime inside a
/// `LocalSet`, holding the spawn lock.
pub(crate) fn block_on_local<F: Future>(future: F) -> F::Output {
    let _guard = serial();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("build runtime");
    LocalSet::new().block_on(&runtime, future)
}

/// Writes an executable shell plug-in called `name` into `dir`.
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{PREAMBLE}{body}")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Notifier that keeps every message.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: RefCell<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, _plug_in: &Path, message: &str) {
        self.messages.borrow_mut().push(message.to_owned());
    }
}

/// Progress sink that keeps the cancel handle it is given.
#[derive(Default)]
pub(crate) struct CancellingSink {
    cancel: RefCell<Option<CancelHandle>>,
    messages: RefCell<Vec<String>>,
}

impl CancellingSink {
    pub(crate) fn cancel(&self) {
        let handle = self.cancel.borrow().clone();
        if let Some(cancel) = handle {
            cancel.cancel();
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.cancel.borrow().is_some()
    }
}

impl ProgressSink for CancellingSink {
    fn attach(&self, cancel: CancelHandle) {
        *self.cancel.borrow_mut() = Some(cancel);
    }

    fn detach(&self) {
        self.cancel.borrow_mut().take();
    }

    fn message(&self, text: &str) {
        self.messages.borrow_mut().push(text.to_owned());
    }
}

/// Manager reporting to `notifier`, with `collaborators` for the rest.
pub(crate) fn manager_with(
    config: ManagerConfig,
    notifier: &Rc<RecordingNotifier>,
    collaborators: Collaborators,
) -> Rc<PlugInManager> {
    let shared: Rc<dyn Notifier> = Rc::clone(notifier) as Rc<dyn Notifier>;
    PlugInManager::new(config, collaborators.with_notifier(shared))
}
