use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ExecutionResult, RemoteUpgradeAction};
use crate::error::{Result, UpgradeError};

pub const DEFAULT_UPGRADE_COMMAND: &str = "yum -y upgrade; shutdown -r now";
pub const DEFAULT_SSH_USER: &str = "root";

/// Exit status ssh uses for its own failures (connect, auth, dropped session).
const SSH_ERROR_EXIT: i32 = 255;

/// Remote upgrade over the system `ssh` client.
///
/// Uses key-based batch mode and accepts unknown host keys on first use.
#[derive(Debug, Clone)]
pub struct SshUpgrader {
    binary: String,
    user: String,
    connect_timeout_seconds: u64,
    command: String,
    dry_run: bool,
}

impl SshUpgrader {
    pub fn new(
        user: impl Into<String>,
        connect_timeout_seconds: u64,
        command: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            binary: "ssh".to_string(),
            user: user.into(),
            connect_timeout_seconds,
            command: command.into(),
            dry_run,
        }
    }

    /// Override the ssh executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn ssh_args(&self, host: &str) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_seconds),
            "-l".to_string(),
            self.user.clone(),
            host.to_string(),
            self.command.clone(),
        ]
    }

    /// Map the ssh exit status to an outcome.
    ///
    /// Returns whether the remote side closed the session. Exit 255 (or a
    /// signal) before any stdout means we never got a working session;
    /// after stdout has flowed it is the reboot tearing the session down.
    pub fn classify_exit(
        host: &str,
        exit_code: Option<i32>,
        stdout_lines: usize,
        last_stderr: Option<&str>,
    ) -> Result<bool> {
        match exit_code {
            Some(0) => Ok(false),
            Some(SSH_ERROR_EXIT) | None if stdout_lines == 0 => Err(UpgradeError::Connection {
                host: host.to_string(),
                details: last_stderr
                    .map(str::to_string)
                    .unwrap_or_else(|| match exit_code {
                        Some(code) => format!("ssh exited with status {code}"),
                        None => "ssh terminated by signal".to_string(),
                    }),
            }),
            Some(SSH_ERROR_EXIT) | None => Ok(true),
            Some(code) => Err(UpgradeError::Command {
                host: host.to_string(),
                code,
            }),
        }
    }

    async fn execute(&self, host: &str) -> Result<ExecutionResult> {
        let connection_error = |details: String| UpgradeError::Connection {
            host: host.to_string(),
            details,
        };

        let mut child = Command::new(&self.binary)
            .args(self.ssh_args(host))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| connection_error(format!("failed to spawn {}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection_error("stdout of ssh was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| connection_error("stderr of ssh was not captured".to_string()))?;

        let (stdout, stderr) = tokio::join!(
            drain_lines(stdout, host, OutputStream::Stdout),
            drain_lines(stderr, host, OutputStream::Stderr),
        );

        let status = child
            .wait()
            .await
            .map_err(|e| connection_error(format!("failed to wait for ssh: {e}")))?;

        let closed_by_remote =
            Self::classify_exit(host, status.code(), stdout.lines, stderr.last_line.as_deref())?;

        if closed_by_remote {
            warn!(
                host = %host,
                exit_status = %status,
                "Session closed by remote host, assuming reboot is in progress"
            );
        }

        Ok(ExecutionResult {
            host: host.to_string(),
            exit_code: status.code(),
            output_lines: stdout.lines + stderr.lines,
            closed_by_remote,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct StreamSummary {
    lines: usize,
    last_line: Option<String>,
}

/// Log every line of a child stream until EOF.
///
/// Lines are read as raw bytes and decoded lossily so that badly encoded
/// output never stops the pipe from being drained.
async fn drain_lines<R>(reader: R, host: &str, stream: OutputStream) -> StreamSummary
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut summary = StreamSummary::default();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end_matches(['\n', '\r']);
                summary.lines += 1;
                match stream {
                    OutputStream::Stdout => info!(host = %host, stream = "stdout", "{}", line),
                    OutputStream::Stderr => warn!(host = %host, stream = "stderr", "{}", line),
                }
                summary.last_line = Some(line.to_string());
            }
            Err(e) => {
                debug!(host = %host, stream = ?stream, error = %e, "Stopped reading output");
                break;
            }
        }
    }

    summary
}

#[async_trait]
impl RemoteUpgradeAction for SshUpgrader {
    async fn run(&self, host: &str) -> Result<ExecutionResult> {
        if self.dry_run {
            warn!(
                host = %host,
                user = %self.user,
                command = %self.command,
                action = "upgrade",
                "DRY RUN: Would run upgrade command (no action taken)"
            );
            return Ok(ExecutionResult {
                host: host.to_string(),
                exit_code: None,
                output_lines: 0,
                closed_by_remote: false,
            });
        }

        info!(
            host = %host,
            user = %self.user,
            command = %self.command,
            action = "upgrade",
            "Running upgrade command"
        );

        let start_time = Instant::now();
        let result = self.execute(host).await?;

        info!(
            host = %host,
            exit_code = ?result.exit_code,
            output_lines = result.output_lines,
            duration_seconds = format!("{:.1}", start_time.elapsed().as_secs_f64()),
            action = "upgrade",
            result = "success",
            "Upgrade command finished, host is rebooting"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrader() -> SshUpgrader {
        SshUpgrader::new(DEFAULT_SSH_USER, 10, DEFAULT_UPGRADE_COMMAND, false)
    }

    #[test]
    fn test_ssh_args() {
        assert_eq!(
            upgrader().ssh_args("osd-01.example.net"),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ConnectTimeout=10",
                "-l",
                "root",
                "osd-01.example.net",
                "yum -y upgrade; shutdown -r now",
            ]
        );
    }

    #[test]
    fn test_ssh_args_custom_user_and_command() {
        let args = SshUpgrader::new("ops", 5, "dnf -y upgrade && reboot", false).ssh_args("h1");
        assert_eq!(args[5], "ConnectTimeout=5");
        assert_eq!(args[7], "ops");
        assert_eq!(args[9], "dnf -y upgrade && reboot");
    }

    #[test]
    fn test_classify_clean_exit() {
        assert_eq!(SshUpgrader::classify_exit("h", Some(0), 12, None).unwrap(), false);
    }

    #[test]
    fn test_classify_connection_refused() {
        let err = SshUpgrader::classify_exit(
            "h",
            Some(255),
            0,
            Some("ssh: connect to host h port 22: Connection refused"),
        )
        .unwrap_err();
        assert!(matches!(err, UpgradeError::Connection { .. }));
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_classify_connection_failure_without_stderr() {
        let err = SshUpgrader::classify_exit("h", Some(255), 0, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[h] connection failed: ssh exited with status 255"
        );
    }

    #[test]
    fn test_classify_session_dropped_by_reboot() {
        assert!(SshUpgrader::classify_exit("h", Some(255), 40, None).unwrap());
        assert!(SshUpgrader::classify_exit("h", None, 40, None).unwrap());
    }

    #[test]
    fn test_classify_remote_command_failure() {
        let err = SshUpgrader::classify_exit("h", Some(1), 3, None).unwrap_err();
        assert!(matches!(err, UpgradeError::Command { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_drain_lines_decodes_invalid_utf8_and_keeps_reading() {
        let output: &[u8] = b"caf\xff package\r\nComplete!\nno trailing newline";
        let summary = drain_lines(output, "h", OutputStream::Stderr).await;
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.last_line.as_deref(), Some("no trailing newline"));
    }

    #[tokio::test]
    async fn test_drain_lines_empty_stream() {
        let summary = drain_lines(&b""[..], "h", OutputStream::Stdout).await;
        assert_eq!(summary.lines, 0);
        assert!(summary.last_line.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_skips_ssh() {
        let upgrader = SshUpgrader::new("root", 10, DEFAULT_UPGRADE_COMMAND, true)
            .with_binary("/nonexistent/ssh");
        let result = upgrader.run("osd-01").await.unwrap();
        assert_eq!(result.host, "osd-01");
        assert_eq!(result.output_lines, 0);
    }

    #[tokio::test]
    async fn test_missing_ssh_binary_is_connection_error() {
        let upgrader = upgrader().with_binary("/nonexistent/ssh");
        let err = upgrader.run("osd-01").await.unwrap_err();
        assert!(matches!(err, UpgradeError::Connection { .. }));
        assert!(err.is_fatal());
    }
}
