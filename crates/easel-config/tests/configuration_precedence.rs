//! Behavioural tests for configuration layering.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use easel_config::{Config, LogFormat, StackTraceMode};
use ortho_config::OrthoConfig;

const STACK_TRACE_ENV: &str = "EASEL_STACK_TRACE_MODE";

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        let previous = std::env::var_os(STACK_TRACE_ENV);
        // Start every scenario from a clean environment; the previous value
        // is restored in `Drop`.
        unsafe { std::env::remove_var(STACK_TRACE_ENV) };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("easel")]),
            env_overrides: RefCell::new(vec![(STACK_TRACE_ENV.to_owned(), previous)]),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _guard: guard,
        }
    }

    fn write_config(&self, mode: &str) {
        let path = self.temp_dir.path().join("easel.toml");
        if let Err(error) = fs::write(&path, format!("stack_trace_mode = \"{mode}\"\n")) {
            panic!("failed to write configuration: {error}");
        }
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn load(&self) {
        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => *self.loaded.borrow_mut() = Some(config),
            Err(error) => *self.error.borrow_mut() = Some(error.to_string()),
        }
    }

    fn config(&self) -> Config {
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            if let Some(os_value) = value {
                unsafe { std::env::set_var(&key, os_value) };
            } else {
                unsafe { std::env::remove_var(&key) };
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the stack trace mode to \"{mode}\"")]
fn given_configuration_file(harness: &Harness, mode: String) {
    harness.write_config(&mode);
}

#[given("the environment sets the stack trace mode to \"{mode}\"")]
fn given_environment(harness: &Harness, mode: String) {
    harness.set_env(STACK_TRACE_ENV, &mode);
}

#[given("the command line sets the stack trace mode to \"{mode}\"")]
fn given_command_line(harness: &Harness, mode: String) {
    let mut args = harness.cli_args.borrow_mut();
    args.push(OsString::from("--stack-trace-mode"));
    args.push(OsString::from(mode));
}

#[when("the configuration is loaded")]
fn when_loaded(harness: &Harness) {
    harness.load();
}

#[then("the stack trace mode is \"{mode}\"")]
fn then_stack_trace_mode(harness: &Harness, mode: String) {
    let expected: StackTraceMode = match mode.parse() {
        Ok(parsed) => parsed,
        Err(error) => panic!("invalid mode '{mode}': {error}"),
    };
    assert_eq!(harness.config().stack_trace_mode(), expected);
}

#[then("the log format is \"{format}\"")]
fn then_log_format(harness: &Harness, format: String) {
    let expected: LogFormat = match format.parse() {
        Ok(parsed) => parsed,
        Err(error) => panic!("invalid format '{format}': {error}"),
    };
    assert_eq!(harness.config().log_format(), expected);
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Defaults apply when nothing is configured"
)]
fn defaults_apply(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Configuration file sets the stack trace mode"
)]
fn file_sets_stack_trace_mode(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Environment overrides the configuration file"
)]
fn environment_overrides_file(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Command line overrides the environment"
)]
fn command_line_overrides_environment(#[from(harness)] harness: Harness) {
    let _ = harness;
}
