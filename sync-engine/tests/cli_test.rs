//! Command-line surface tests, run against the built binary.

use std::process::{Command, Output};

const BAD_INTERVAL: (&str, &str) = ("SCREENPLAY_POLL_INTERVAL_MS", "soon");

fn run_with_bad_env(args: &[&str]) -> Output {
    // Run outside the workspace so no stray .env is picked up.
    let dir = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_screenplay-sync"))
        .args(args)
        .current_dir(dir.path())
        .env(BAD_INTERVAL.0, BAD_INTERVAL.1)
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

#[test]
fn test_help_works_with_unparseable_environment() {
    let out = run_with_bad_env(&["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Usage:"), "{stdout}");
    assert!(stdout.contains("versions"));

    let out = run_with_bad_env(&["versions", "--help"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("--project"));
}

#[test]
fn test_usage_error_reported_before_configuration() {
    let out = run_with_bad_env(&[]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Usage:"), "{stderr}");
    assert!(!stderr.contains(BAD_INTERVAL.0));
}

#[test]
fn test_bad_environment_fails_a_real_command() {
    let out = run_with_bad_env(&["versions", "--project", "p-1"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains(BAD_INTERVAL.0), "{stderr}");
}
