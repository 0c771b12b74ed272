//! Ceph cluster health probing.
//!
//! Queries the `ceph` admin CLI and normalizes its JSON into a [`HealthSnapshot`].

pub mod client;
pub mod status;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;

pub use client::CephClient;

/// Credentials and locations used for every cluster query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub cluster: String,
    pub id: String,
    pub keyring: PathBuf,
    pub conf: PathBuf,
}

/// Point-in-time view of cluster health, produced fresh on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Placement group count keyed by state name (e.g. `active+clean`).
    pub pg_state_counts: BTreeMap<String, u64>,
    /// Whether the `noout` flag is set.
    pub safety_flag_set: bool,
    pub total_daemons: u32,
    pub up_daemons: u32,
    pub in_daemons: u32,
}

impl HealthSnapshot {
    pub fn down_daemons(&self) -> u32 {
        self.total_daemons.saturating_sub(self.up_daemons)
    }

    pub fn out_daemons(&self) -> u32 {
        self.total_daemons.saturating_sub(self.in_daemons)
    }

    /// Sum of PG counts whose state name contains `needle`.
    pub fn pgs_in_state(&self, needle: &str) -> u64 {
        self.pg_state_counts
            .iter()
            .filter(|(name, _)| name.contains(needle))
            .map(|(_, count)| *count)
            .sum()
    }
}

/// Source of cluster health snapshots.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn fetch(&self, identity: &ClusterIdentity) -> Result<HealthSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(states: &[(&str, u64)]) -> HealthSnapshot {
        HealthSnapshot {
            pg_state_counts: states
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            safety_flag_set: true,
            total_daemons: 12,
            up_daemons: 10,
            in_daemons: 11,
        }
    }

    #[test]
    fn test_down_and_out_counts() {
        let s = snapshot(&[]);
        assert_eq!(s.down_daemons(), 2);
        assert_eq!(s.out_daemons(), 1);
    }

    #[test]
    fn test_down_count_never_underflows() {
        let s = HealthSnapshot {
            total_daemons: 3,
            up_daemons: 5,
            in_daemons: 5,
            ..Default::default()
        };
        assert_eq!(s.down_daemons(), 0);
        assert_eq!(s.out_daemons(), 0);
    }

    #[test]
    fn test_pgs_in_state_matches_substrings() {
        let s = snapshot(&[
            ("active+clean", 100),
            ("active+undersized+degraded", 4),
            ("active+recovery_wait+degraded", 3),
        ]);
        assert_eq!(s.pgs_in_state("degraded"), 7);
        assert_eq!(s.pgs_in_state("undersized"), 4);
        assert_eq!(s.pgs_in_state("peering"), 0);
    }
}
