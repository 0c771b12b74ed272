//! Serial rolling upgrade driver.
//!
//! Per host: `Polling -> (Blocked -> Waiting -> Polling)* -> Cleared ->
//! Upgrading -> Settling`, then advance to the next host. Only one host is
//! ever between `Upgrading` and the end of `Settling` at a time.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ceph::{ClusterIdentity, HealthProbe, HealthSnapshot};
use crate::delay::Delay;
use crate::error::{Result, UpgradeError};
use crate::gate::{HealthGate, HealthVerdict};
use crate::remote::RemoteUpgradeAction;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeSettings {
    pub gate: HealthGate,
    /// Pause between health polls while the gate is blocking.
    pub retry_interval: Duration,
    /// Pause after a host reboots before the next host is evaluated.
    pub settle_interval: Duration,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            gate: HealthGate::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }
}

/// Progress of the current run. Lives in memory only.
#[derive(Debug, Clone, Default)]
pub struct UpgradeRunState {
    pub host_index: usize,
    pub hosts_upgraded: usize,
    pub last_snapshot: Option<HealthSnapshot>,
    /// Waiting cycles spent on the current host.
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        hosts_upgraded: usize,
    },
    /// Stopped at a suspension boundary; `next_host` has not been touched.
    Interrupted {
        hosts_upgraded: usize,
        next_host: Option<String>,
    },
}

#[derive(Debug)]
enum Blocked {
    Unhealthy(HealthVerdict),
    ProbeFailed(UpgradeError),
}

#[derive(Debug)]
enum Phase {
    Polling,
    Blocked(Blocked),
    Waiting,
    Cleared,
    Upgrading,
    Settling,
}

pub struct RollingUpgrader {
    identity: ClusterIdentity,
    hosts: Vec<String>,
    settings: UpgradeSettings,
    probe: Box<dyn HealthProbe>,
    action: Box<dyn RemoteUpgradeAction>,
    delay: Box<dyn Delay>,
    cancel: CancellationToken,
    state: UpgradeRunState,
}

impl RollingUpgrader {
    pub fn new(
        identity: ClusterIdentity,
        hosts: Vec<String>,
        settings: UpgradeSettings,
        probe: Box<dyn HealthProbe>,
        action: Box<dyn RemoteUpgradeAction>,
        delay: Box<dyn Delay>,
    ) -> Self {
        Self {
            identity,
            hosts,
            settings,
            probe,
            action,
            delay,
            cancel: CancellationToken::new(),
            state: UpgradeRunState::default(),
        }
    }

    /// Stop the run at the next suspension boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &UpgradeRunState {
        &self.state
    }

    pub async fn run(&mut self) -> Result<RunOutcome> {
        let total_hosts = self.hosts.len();
        info!(
            cluster = %self.identity.cluster,
            total_hosts = total_hosts,
            max_down_osds = self.settings.gate.max_down_osds(),
            retry_interval_seconds = self.settings.retry_interval.as_secs(),
            settle_interval_seconds = self.settings.settle_interval.as_secs(),
            "Starting rolling upgrade"
        );

        while self.state.host_index < total_hosts {
            let host = self.hosts[self.state.host_index].clone();
            self.state.retries = 0;

            info!(
                host = %host,
                position = self.state.host_index + 1,
                total_hosts = total_hosts,
                "Checking cluster health before upgrading host"
            );

            if self.upgrade_host(&host).await?.is_break() {
                let next_host = self.pending_host();
                warn!(
                    hosts_upgraded = self.state.hosts_upgraded,
                    next_host = ?next_host,
                    "Rolling upgrade interrupted"
                );
                return Ok(RunOutcome::Interrupted {
                    hosts_upgraded: self.state.hosts_upgraded,
                    next_host,
                });
            }

            self.state.host_index += 1;
        }

        info!(
            hosts_upgraded = self.state.hosts_upgraded,
            "Rolling upgrade completed for all hosts"
        );
        Ok(RunOutcome::Completed {
            hosts_upgraded: self.state.hosts_upgraded,
        })
    }

    /// First host not yet handed to the remote action.
    fn pending_host(&self) -> Option<String> {
        self.hosts.get(self.state.hosts_upgraded).cloned()
    }

    async fn upgrade_host(&mut self, host: &str) -> Result<ControlFlow<()>> {
        let mut phase = Phase::Polling;

        loop {
            debug!(host = %host, phase = ?phase, "Entering phase");

            phase = match phase {
                Phase::Polling => match self.poll(host).await {
                    Ok(verdict) if verdict.proceed_allowed => Phase::Cleared,
                    Ok(verdict) => Phase::Blocked(Blocked::Unhealthy(verdict)),
                    Err(e) => Phase::Blocked(Blocked::ProbeFailed(e)),
                },
                Phase::Blocked(blocked) => {
                    self.log_blocked(host, &blocked);
                    Phase::Waiting
                }
                Phase::Waiting => {
                    self.state.retries += 1;
                    warn!(
                        host = %host,
                        retry = self.state.retries,
                        retry_interval_seconds = self.settings.retry_interval.as_secs(),
                        "Cluster not ready to continue, waiting to see if health improves"
                    );
                    if !self.suspend(self.settings.retry_interval).await {
                        return Ok(ControlFlow::Break(()));
                    }
                    Phase::Polling
                }
                Phase::Cleared => match self.poll(host).await {
                    Ok(verdict) if verdict.proceed_allowed => {
                        if self.cancel.is_cancelled() {
                            return Ok(ControlFlow::Break(()));
                        }
                        Phase::Upgrading
                    }
                    Ok(verdict) => {
                        warn!(
                            host = %host,
                            reasons = ?verdict.messages(),
                            "Cluster health changed on final re-check, polling again"
                        );
                        Phase::Polling
                    }
                    Err(e) => {
                        warn!(
                            host = %host,
                            error = %e,
                            "Final health re-check failed, polling again"
                        );
                        Phase::Polling
                    }
                },
                Phase::Upgrading => {
                    info!(
                        host = %host,
                        waited_cycles = self.state.retries,
                        "Cluster healthy, upgrading host"
                    );
                    if let Err(e) = self.action.run(host).await {
                        error!(
                            host = %host,
                            error = %e,
                            hosts_upgraded = self.state.hosts_upgraded,
                            hosts_not_upgraded = self.hosts.len() - self.state.hosts_upgraded,
                            "Upgrade failed, aborting run without touching remaining hosts"
                        );
                        return Err(e);
                    }
                    self.state.hosts_upgraded += 1;
                    Phase::Settling
                }
                Phase::Settling => {
                    info!(
                        host = %host,
                        settle_interval_seconds = self.settings.settle_interval.as_secs(),
                        "Host rebooting, waiting for it to rejoin the cluster"
                    );
                    if !self.suspend(self.settings.settle_interval).await {
                        return Ok(ControlFlow::Break(()));
                    }
                    return Ok(ControlFlow::Continue(()));
                }
            };
        }
    }

    async fn poll(&mut self, host: &str) -> Result<HealthVerdict> {
        let snapshot = self.probe.fetch(&self.identity).await?;
        let verdict = self.settings.gate.evaluate(&snapshot);

        debug!(
            host = %host,
            pg_states = ?snapshot.pg_state_counts,
            noout = snapshot.safety_flag_set,
            total_osds = snapshot.total_daemons,
            up_osds = snapshot.up_daemons,
            in_osds = snapshot.in_daemons,
            proceed_allowed = verdict.proceed_allowed,
            "Evaluated cluster health"
        );

        self.state.last_snapshot = Some(snapshot);
        Ok(verdict)
    }

    fn log_blocked(&self, host: &str, blocked: &Blocked) {
        match blocked {
            Blocked::Unhealthy(verdict) => {
                if let Some(snapshot) = &self.state.last_snapshot {
                    warn!(
                        host = %host,
                        degraded_pgs = snapshot.pgs_in_state("degraded"),
                        undersized_pgs = snapshot.pgs_in_state("undersized"),
                        noout = snapshot.safety_flag_set,
                        down_osds = snapshot.down_daemons(),
                        out_osds = snapshot.out_daemons(),
                        max_down_osds = self.settings.gate.max_down_osds(),
                        "Upgrade blocked by cluster health"
                    );
                }
                for reason in &verdict.reasons {
                    warn!(
                        host = %host,
                        reason = %reason,
                        hint = reason.hint(),
                        "Blocking reason"
                    );
                }
            }
            Blocked::ProbeFailed(e) => {
                warn!(
                    host = %host,
                    error = %e,
                    "Could not query cluster health, treating cluster as not ready"
                );
            }
        }
    }

    /// Returns false if the run was cancelled instead of waiting out `duration`.
    async fn suspend(&self, duration: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        tokio::select! {
            _ = self.delay.sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}
