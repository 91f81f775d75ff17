//! Integration tests for the command line (-c/--command and worksheet mode)

use std::io::Write;
use std::process::{Command, Stdio};

fn mathsheet() -> Command {
    let mut cmd = Command::new("cargo");
    cmd.arg("run")
        .arg("-q")
        .arg("--")
        // Tests must be deterministic and not depend on a user's ~/.config/mathsheet/settings.toml.
        .arg("--no-config")
        .arg("--today")
        .arg("2024-01-31");
    cmd
}

fn run_command(args: &[&str]) -> (String, String, i32) {
    let output = mathsheet()
        .args(args)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn run_sheet(input: &str, args: &[&str]) -> (String, String, i32) {
    let mut child = mathsheet()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute command");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");
    let output = child.wait_with_output().expect("Failed to wait for command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

#[test]
fn test_basic_arithmetic() {
    let (stdout, _, code) = run_command(&["-c", "5 + 3"]);
    assert_eq!(stdout.trim(), "8");
    assert_eq!(code, 0);
}

#[test]
fn test_percent_step() {
    let (stdout, _, code) = run_command(&["-c", "100 + 10%"]);
    assert_eq!(stdout.trim(), "110");
    assert_eq!(code, 0);
}

#[test]
fn test_commands_share_state() {
    let (stdout, _, code) = run_command(&["-c", "f(x) = x * x", "-c", "f(12)", "-c", "ans + 1"]);
    assert_eq!(stdout.trim(), "Function: f(x) = x * x\n144\n145");
    assert_eq!(code, 0);
}

#[test]
fn test_calendar_arithmetic() {
    let (stdout, _, code) = run_command(&["-c", "today + 1 month"]);
    assert_eq!(stdout.trim(), "2024-02-29");
    assert_eq!(code, 0);
}

#[test]
fn test_error_exit_code() {
    let (stdout, _, code) = run_command(&["-c", "undefined_thing * 2"]);
    assert!(stdout.starts_with("#ERR"));
    assert_eq!(code, 1);
}

#[test]
fn test_division_by_zero() {
    let (stdout, _, code) = run_command(&["-c", "1 / 0"]);
    assert!(stdout.starts_with("#ERR"));
    assert_eq!(code, 1);
}

#[test]
fn test_format_template() {
    let (stdout, _, code) = run_command(&["-c", "2 / 3 ; ratio {:.3f}"]);
    assert_eq!(stdout.trim(), "0.667");
    assert_eq!(code, 0);
}

#[test]
fn test_worksheet_from_stdin() {
    let (stdout, stderr, code) = run_sheet("a = 2\na * 21\n", &[]);
    assert_eq!(stdout, "a = 2\n\t\t\tAnswer = 2\na * 21\n\t\t\tAnswer = 42\n");
    assert!(stderr.is_empty());
    assert_eq!(code, 0);
}

#[test]
fn test_worksheet_errors_go_to_stderr() {
    let (stdout, stderr, code) = run_sheet("x = nope\n\t\t\tAnswer = 1\ny = 3\n", &[]);
    assert_eq!(stdout, "x = nope\ny = 3\n\t\t\tAnswer = 3\n");
    assert!(stderr.contains("line 1: Name error"));
    assert_eq!(code, 1);
}

#[test]
fn test_worksheet_table() {
    let (stdout, _, code) = run_sheet("@totals\n10\n20\n30\n!sum:totals\n", &[]);
    assert!(stdout.contains("| sum | 60    |        |"));
    assert_eq!(code, 0);
}

#[test]
fn test_variables_report() {
    let (stdout, _, code) = run_sheet("rent = 900\n", &["--vars"]);
    assert!(stdout.ends_with("VARIABLES\n----------\nrent : 900\nans  : 900\n"));
    assert_eq!(code, 0);
}
