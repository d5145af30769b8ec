//! Integration tests for the `easel` binary entry point.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn help_succeeds() {
    let mut command = cargo_bin_cmd!("easel");
    command.arg("--help");
    command.assert().success().stdout(contains("resolve"));
}

#[test]
fn unknown_command_exits_with_failure() {
    let mut command = cargo_bin_cmd!("easel");
    command.arg("frobnicate");
    command
        .assert()
        .code(1)
        .stderr(contains("unrecognized subcommand"));
}
