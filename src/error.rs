//! Custom error types for ceph-rolling-upgrade.

use thiserror::Error;

/// Errors that can occur during a rolling upgrade.
///
/// Health gate blocking reasons are not errors; they only delay the run.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// Cluster query could not run or its output could not be understood.
    #[error("[ceph {command}] {details}")]
    Probe { command: String, details: String },

    /// The remote shell could not reach or authenticate to the host.
    #[error("[{host}] connection failed: {details}")]
    Connection { host: String, details: String },

    /// The upgrade command ran but exited unsuccessfully.
    #[error("[{host}] upgrade command exited with status {code}")]
    Command { host: String, code: i32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl UpgradeError {
    /// Create a probe error for the given `ceph` subcommand.
    pub fn probe(command: &str, details: impl Into<String>) -> Self {
        Self::Probe {
            command: command.to_string(),
            details: details.into(),
        }
    }

    /// Returns true if this error must abort the whole run.
    ///
    /// Probe failures are treated like an unhealthy cluster and retried.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Probe { .. })
    }
}

pub type Result<T> = std::result::Result<T, UpgradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_probe() {
        let err = UpgradeError::probe("osd stat", "missing field `num_osds`");
        assert_eq!(err.to_string(), "[ceph osd stat] missing field `num_osds`");
    }

    #[test]
    fn test_error_display_connection() {
        let err = UpgradeError::Connection {
            host: "osd-01".to_string(),
            details: "Permission denied (publickey)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[osd-01] connection failed: Permission denied (publickey)"
        );
    }

    #[test]
    fn test_error_display_command() {
        let err = UpgradeError::Command {
            host: "osd-02".to_string(),
            code: 1,
        };
        assert_eq!(
            err.to_string(),
            "[osd-02] upgrade command exited with status 1"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = UpgradeError::Config("host list is empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: host list is empty");
    }

    #[test]
    fn test_probe_error_is_not_fatal() {
        assert!(!UpgradeError::probe("pg stat", "timeout").is_fatal());
    }

    #[test]
    fn test_remote_and_config_errors_are_fatal() {
        let connection = UpgradeError::Connection {
            host: "h".to_string(),
            details: "unreachable".to_string(),
        };
        let command = UpgradeError::Command {
            host: "h".to_string(),
            code: 2,
        };
        let config = UpgradeError::Config("missing id".to_string());
        assert!(connection.is_fatal());
        assert!(command.is_fatal());
        assert!(config.is_fatal());
    }
}
