use assert_cmd::Command;
use predicates::prelude::*;

fn runwatch() -> Command {
    let mut cmd = Command::cargo_bin("runwatch").unwrap();
    cmd.env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_child_output_is_mirrored_and_exit_code_passed_through() {
    runwatch()
        .args(["--log-level", "error", "--", "sh", "-c", "echo mirrored; exit 4"])
        .assert()
        .code(4)
        .stdout(predicate::str::contains("mirrored"));
}

#[test]
fn test_no_tty_output_silences_the_mirror() {
    runwatch()
        .args(["--log-level", "error", "--no-tty-output", "--command", "echo hidden"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_missing_command_fails() {
    runwatch()
        .assert()
        .failure()
        .stderr(predicate::str::contains("No command given"));
}

#[test]
fn test_missing_credentials_fail() {
    runwatch()
        .args(["--callbacks", "discord", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("discord.webhook_url"));
}

#[test]
fn test_output_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    runwatch()
        .args(["--log-level", "error", "--no-tty-output", "--output-mode", "sort-dedup", "-o"])
        .arg(&out)
        .args(["--", "sh", "-c", "echo z; echo y; echo z"])
        .assert()
        .success();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), "y\nz\n");
}
