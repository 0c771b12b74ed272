use async_trait::async_trait;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use super::status::{self, OSD_STAT, PG_STAT, STATUS};
use super::{ClusterIdentity, HealthProbe, HealthSnapshot};
use crate::error::{Result, UpgradeError};

/// Health probe backed by the `ceph` admin CLI.
pub struct CephClient {
    binary: String,
}

impl CephClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for a read-only JSON query, e.g. `osd stat`.
    pub fn command_args(identity: &ClusterIdentity, subcommand: &str) -> Vec<String> {
        let mut args = vec![
            "--cluster".to_string(),
            identity.cluster.clone(),
            "--id".to_string(),
            identity.id.clone(),
            "-c".to_string(),
            identity.conf.display().to_string(),
            "--keyring".to_string(),
            identity.keyring.display().to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        args.extend(subcommand.split_whitespace().map(str::to_string));
        args
    }

    async fn query(&self, identity: &ClusterIdentity, subcommand: &str) -> Result<String> {
        let args = Self::command_args(identity, subcommand);
        debug!(
            binary = %self.binary,
            cluster = %identity.cluster,
            subcommand = subcommand,
            "Querying cluster"
        );

        let start_time = Instant::now();
        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                UpgradeError::probe(subcommand, format!("failed to invoke {}: {e}", self.binary))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UpgradeError::probe(
                subcommand,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        debug!(
            subcommand = subcommand,
            response_time_ms = start_time.elapsed().as_millis(),
            "Cluster query completed"
        );

        String::from_utf8(output.stdout)
            .map_err(|e| UpgradeError::probe(subcommand, format!("output is not UTF-8: {e}")))
    }
}

#[async_trait]
impl HealthProbe for CephClient {
    async fn fetch(&self, identity: &ClusterIdentity) -> Result<HealthSnapshot> {
        let pg_stat = self.query(identity, PG_STAT).await?;
        let cluster_status = self.query(identity, STATUS).await?;
        let osd_stat = self.query(identity, OSD_STAT).await?;

        status::build_snapshot(&pg_stat, &cluster_status, &osd_stat)
    }
}
