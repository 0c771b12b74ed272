//! CLI configuration and argument parsing.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::ceph::ClusterIdentity;
use crate::error::{Result, UpgradeError};
use crate::gate::HealthGate;
use crate::remote::ssh::{DEFAULT_SSH_USER, DEFAULT_UPGRADE_COMMAND};
use crate::upgrader::UpgradeSettings;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("GIT_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

pub const DEFAULT_CLUSTER: &str = "ceph";
const CEPH_ETC_DIR: &str = "/etc/ceph";

/// Serial, health-gated rolling upgrade of Ceph cluster hosts.
///
/// Upgrades one host at a time and only while PGs are clean, `noout` is
/// set and no more than the allowed number of OSDs are down or out.
#[derive(Parser, Debug, Clone)]
#[command(name = "ceph-rolling-upgrade")]
#[command(about = "Serial, health-gated rolling upgrade of Ceph cluster hosts")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// Ceph cluster name
    #[arg(long, env = "CEPH_CLUSTER", default_value = DEFAULT_CLUSTER)]
    pub cluster: String,

    /// Ceph authx user (without the `client.` prefix)
    #[arg(short, long, env = "CEPH_ID")]
    pub id: String,

    /// Keyring path [default: /etc/ceph/<cluster>.client.<id>.keyring]
    #[arg(short, long, env = "CEPH_KEYRING")]
    pub keyring: Option<PathBuf>,

    /// ceph.conf path [default: /etc/ceph/<cluster>.conf]
    #[arg(short = 'c', long, env = "CEPH_CONF")]
    pub conf: Option<PathBuf>,

    /// File containing hosts to upgrade, one host per line
    #[arg(short = 'f', long, env = "HOSTS_FILE")]
    pub hosts_file: PathBuf,

    /// Seconds to wait before re-checking an unhealthy cluster
    #[arg(long, env = "RETRY_INTERVAL_SECONDS", default_value = "300")]
    pub retry_interval_seconds: u64,

    /// Seconds to wait after rebooting a host before checking the next one
    #[arg(long, env = "SETTLE_SECONDS", default_value = "120")]
    pub settle_seconds: u64,

    /// Maximum number of OSDs allowed to be down or out
    #[arg(long, env = "MAX_DOWN_OSDS", default_value = "3")]
    pub max_down_osds: u32,

    /// Remote user for ssh
    #[arg(long, env = "SSH_USER", default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,

    /// ssh connect timeout in seconds
    #[arg(long, env = "SSH_CONNECT_TIMEOUT_SECONDS", default_value = "10")]
    pub ssh_connect_timeout_seconds: u64,

    /// Command run on each host to upgrade and reboot it
    #[arg(long, env = "UPGRADE_COMMAND", default_value = DEFAULT_UPGRADE_COMMAND)]
    pub upgrade_command: String,

    /// Path to the ceph CLI
    #[arg(long, env = "CEPH_BIN", default_value = "ceph")]
    pub ceph_bin: String,

    /// Check health but only log the upgrade command instead of running it
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Log format: pretty or json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub identity: ClusterIdentity,
    pub hosts_file: PathBuf,
    pub settings: UpgradeSettings,
    pub ssh_user: String,
    pub ssh_connect_timeout_seconds: u64,
    pub upgrade_command: String,
    pub ceph_bin: String,
    pub dry_run: bool,
    pub log_format: String,
    pub log_level: String,
}

impl Config {
    /// Resolve defaults and validate. Runs before any host is touched.
    pub fn from_args(args: Args) -> Result<Self> {
        let cluster = args.cluster.trim().to_string();
        let id = args.id.trim().to_string();

        if cluster.is_empty() {
            return Err(UpgradeError::Config("cluster name must not be empty".into()));
        }
        if id.is_empty() {
            return Err(UpgradeError::Config("ceph id must not be empty".into()));
        }
        if args.upgrade_command.trim().is_empty() {
            return Err(UpgradeError::Config(
                "upgrade command must not be empty".into(),
            ));
        }

        let keyring = args.keyring.unwrap_or_else(|| default_keyring(&cluster, &id));
        let conf = args.conf.unwrap_or_else(|| default_conf(&cluster));

        Ok(Self {
            identity: ClusterIdentity {
                cluster,
                id,
                keyring,
                conf,
            },
            hosts_file: args.hosts_file,
            settings: UpgradeSettings {
                gate: HealthGate::new(args.max_down_osds),
                retry_interval: Duration::from_secs(args.retry_interval_seconds),
                settle_interval: Duration::from_secs(args.settle_seconds),
            },
            ssh_user: args.ssh_user,
            ssh_connect_timeout_seconds: args.ssh_connect_timeout_seconds,
            upgrade_command: args.upgrade_command,
            ceph_bin: args.ceph_bin,
            dry_run: args.dry_run,
            log_format: args.log_format,
            log_level: args.log_level,
        })
    }

    pub fn display(&self, host_count: usize) {
        tracing::info!(
            cluster = %self.identity.cluster,
            id = %self.identity.id,
            keyring = %self.identity.keyring.display(),
            conf = %self.identity.conf.display(),
            hosts_file = %self.hosts_file.display(),
            host_count = host_count,
            max_down_osds = self.settings.gate.max_down_osds(),
            retry_interval_seconds = self.settings.retry_interval.as_secs(),
            settle_interval_seconds = self.settings.settle_interval.as_secs(),
            ssh_user = %self.ssh_user,
            upgrade_command = %self.upgrade_command,
            dry_run = self.dry_run,
            log_format = %self.log_format,
            log_level = %self.log_level,
            "Configuration initialized"
        );

        if self.dry_run {
            tracing::warn!("DRY RUN MODE ENABLED - No hosts will be upgraded, only logged");
        }
    }
}

fn default_keyring(cluster: &str, id: &str) -> PathBuf {
    PathBuf::from(CEPH_ETC_DIR).join(format!("{cluster}.client.{id}.keyring"))
}

fn default_conf(cluster: &str) -> PathBuf {
    PathBuf::from(CEPH_ETC_DIR).join(format!("{cluster}.conf"))
}
