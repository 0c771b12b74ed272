//! Drives `SshUpgrader` end to end against a local stand-in for `ssh`.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use ceph_rolling_upgrade::error::UpgradeError;
use ceph_rolling_upgrade::remote::{RemoteUpgradeAction, SshUpgrader};

fn fake_ssh() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake-ssh");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("fake ssh should be executable");
    path.to_string_lossy().into_owned()
}

fn upgrader(command: &str) -> SshUpgrader {
    SshUpgrader::new("root", 10, command, false).with_binary(fake_ssh())
}

#[tokio::test]
async fn test_clean_exit_counts_stdout_and_stderr() {
    let command = "echo 'Updating packages'; echo 'warning: rpmdb altered' >&2; echo 'Complete!'";
    let result = upgrader(command).run("osd-01").await.unwrap();

    assert_eq!(result.host, "osd-01");
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output_lines, 3);
    assert!(!result.closed_by_remote);
}

#[tokio::test]
async fn test_session_dropped_after_output_is_success() {
    let result = upgrader("echo 'Complete!'; echo 'Rebooting'; exit 255")
        .run("osd-01")
        .await
        .unwrap();

    assert_eq!(result.exit_code, Some(255));
    assert_eq!(result.output_lines, 2);
    assert!(result.closed_by_remote);
}

#[tokio::test]
async fn test_exit_255_without_output_is_connection_error() {
    let command = "echo 'ssh: connect to host osd-01 port 22: Connection refused' >&2; exit 255";
    let err = upgrader(command).run("osd-01").await.unwrap_err();

    assert!(matches!(err, UpgradeError::Connection { .. }));
    assert_eq!(
        err.to_string(),
        "[osd-01] connection failed: ssh: connect to host osd-01 port 22: Connection refused"
    );
}

#[tokio::test]
async fn test_failing_upgrade_command_is_command_error() {
    let err = upgrader("echo 'Error: Nothing to do'; exit 1")
        .run("osd-01")
        .await
        .unwrap_err();

    assert!(matches!(err, UpgradeError::Command { code: 1, .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_invalid_utf8_output_is_fully_drained() {
    // More than a pipe buffer of output after the bad line.
    let command = "printf 'caf\\377 package\\n'; \
                   i=0; while [ $i -lt 4000 ]; do \
                   echo \"Updating package $i of 4000 ....................\"; \
                   i=$((i + 1)); done";

    let result = tokio::time::timeout(Duration::from_secs(30), upgrader(command).run("osd-01"))
        .await
        .expect("upgrade should finish once the output is drained")
        .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output_lines, 4001);
    assert!(!result.closed_by_remote);
}
