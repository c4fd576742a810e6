//! CLI tests for `relay init`, `relay validate` and `relay run`.
//!
//! Spawns the relay binary in a temp directory and checks stdout, exit codes
//! and the files each command leaves behind.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use relay::core::chain::{ChainConfig, StageSpec};
use relay::exit_codes;
use relay::io::command::CommandSpec;
use relay::io::config::{RelayFileConfig, load_config, write_config};
use relay::io::snapshot::load_snapshot;

fn relay(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_relay"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn relay")
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new(["sh", "-c", script])
}

fn write_failing_config(dir: &Path) {
    let mut agents = BTreeMap::new();
    agents.insert("ok".to_string(), CommandSpec::new(["cat"]));
    agents.insert("bad".to_string(), sh("echo broken >&2; exit 3"));
    let cfg = RelayFileConfig {
        relay: ChainConfig {
            max_loops: 2,
            pacing_ms: 0,
            ..ChainConfig::new(vec![StageSpec::new("ok"), StageSpec::new("bad")])
        },
        event_log: None,
        agents,
        middleware: BTreeMap::new(),
        evaluator: None,
    };
    write_config(&dir.join("relay.toml"), &cfg).expect("write config");
}

#[test]
fn init_then_run_echoes_input() {
    let temp = tempfile::tempdir().expect("tempdir");

    let init = relay(temp.path(), &["init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("relay.toml")).expect("starter config");
    assert_eq!(cfg, RelayFileConfig::starter());

    let validate = relay(temp.path(), &["validate"]);
    assert_eq!(validate.status.code(), Some(exit_codes::OK));

    let run = relay(
        temp.path(),
        &["run", "--input", "hello relay", "--summary", "--history-out", "history.json"],
    );
    assert_eq!(run.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&run.stdout), "hello relay\n");
    assert!(String::from_utf8_lossy(&run.stderr).contains("echo_output_0: hello relay"));

    let snapshot = load_snapshot(&temp.path().join("history.json")).expect("snapshot");
    assert_eq!(snapshot.state, "exhausted");

    let log = std::fs::read_to_string(temp.path().join("logs/session_log.txt"))
        .expect("session log");
    assert!(log.contains("[SESSION STARTED]"));
    assert!(log.contains("[ROUNDS EXHAUSTED] 1"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(relay(temp.path(), &["init"]).status.code(), Some(exit_codes::OK));

    let again = relay(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let forced = relay(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn run_reads_input_from_stdin() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(relay(temp.path(), &["init"]).status.code(), Some(exit_codes::OK));

    let mut child = Command::new(env!("CARGO_BIN_EXE_relay"))
        .current_dir(temp.path())
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn relay");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"from stdin\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait relay");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "from stdin\n");
}

#[test]
fn missing_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = relay(temp.path(), &["run", "--input", "x"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("relay init"));
}

#[test]
fn failing_agent_exits_with_failed_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_failing_config(temp.path());

    let output = relay(
        temp.path(),
        &["run", "--input", "x", "--history-out", "history.json"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("agent \"bad\" failed in round 0"));

    let snapshot = load_snapshot(&temp.path().join("history.json")).expect("snapshot");
    assert_eq!(snapshot.state, "failed");
    assert_eq!(snapshot.history.get_latest(), Some("x"));
}
