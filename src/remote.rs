//! Remote upgrade-and-reboot execution.

pub mod ssh;

use async_trait::async_trait;

use crate::error::Result;

pub use ssh::SshUpgrader;

/// Summary of one finished remote upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub host: String,
    /// Exit status reported by the channel, if any.
    pub exit_code: Option<i32>,
    /// Output lines streamed from the host (stdout and stderr).
    pub output_lines: usize,
    /// The host dropped the session, normally because the reboot started.
    pub closed_by_remote: bool,
}

/// Runs the upgrade-and-reboot command on a single host.
///
/// Once started, an action runs to completion or failure; it is never
/// interrupted by cancellation.
#[async_trait]
pub trait RemoteUpgradeAction: Send + Sync {
    async fn run(&self, host: &str) -> Result<ExecutionResult>;
}
