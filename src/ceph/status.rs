//! JSON response shapes of the `ceph` CLI and their normalization.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::HealthSnapshot;
use crate::error::{Result, UpgradeError};

pub const PG_STAT: &str = "pg stat";
pub const STATUS: &str = "status";
pub const OSD_STAT: &str = "osd stat";

const OSDMAP_FLAGS_CHECK: &str = "OSDMAP_FLAGS";
const NOOUT_FLAG: &str = "noout";

#[derive(Debug, Deserialize)]
struct PgStatResponse {
    pg_summary: PgSummary,
}

#[derive(Debug, Deserialize)]
struct PgSummary {
    #[serde(default)]
    num_pg_by_state: Vec<PgStateCount>,
}

#[derive(Debug, Deserialize)]
struct PgStateCount {
    name: String,
    num: u64,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    health: Health,
}

#[derive(Debug, Deserialize)]
struct Health {
    #[serde(default)]
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Deserialize)]
struct HealthCheck {
    #[serde(default)]
    summary: Option<CheckSummary>,
}

#[derive(Debug, Deserialize)]
struct CheckSummary {
    #[serde(default)]
    message: String,
}

/// OSD counts in either of the two layouts `ceph osd stat` has used.
///
/// Nautilus 14.2.8 and later nest the counts under `osdmap`; earlier
/// releases (and later ones again) put them at the top level.
#[derive(Debug, Deserialize)]
struct OsdStatResponse {
    #[serde(default)]
    osdmap: Option<OsdCounts>,
    #[serde(default)]
    num_osds: Option<u32>,
    #[serde(default)]
    num_up_osds: Option<u32>,
    #[serde(default)]
    num_in_osds: Option<u32>,
}

/// Normalized storage daemon counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OsdCounts {
    pub num_osds: u32,
    pub num_up_osds: u32,
    pub num_in_osds: u32,
}

impl OsdStatResponse {
    /// Nested `osdmap` wins when present, otherwise the flat keys are used.
    fn normalize(self) -> Result<OsdCounts> {
        if let Some(nested) = self.osdmap {
            debug!("Using nested osdmap layout for OSD counts");
            return Ok(nested);
        }

        match (self.num_osds, self.num_up_osds, self.num_in_osds) {
            (Some(num_osds), Some(num_up_osds), Some(num_in_osds)) => {
                debug!("Using flat layout for OSD counts");
                Ok(OsdCounts {
                    num_osds,
                    num_up_osds,
                    num_in_osds,
                })
            }
            _ => Err(UpgradeError::probe(
                OSD_STAT,
                "response has neither an `osdmap` object nor flat num_osds/num_up_osds/num_in_osds keys",
            )),
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(command: &str, raw: &'a str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| UpgradeError::probe(command, format!("unexpected JSON output: {e}")))
}

/// Parse `ceph pg stat --format json` into counts per state name.
pub fn parse_pg_stat(raw: &str) -> Result<BTreeMap<String, u64>> {
    let response: PgStatResponse = decode(PG_STAT, raw)?;

    let mut counts = BTreeMap::new();
    for state in response.pg_summary.num_pg_by_state {
        *counts.entry(state.name).or_insert(0) += state.num;
    }
    Ok(counts)
}

/// Parse `ceph status --format json` and report whether `noout` is set.
pub fn parse_noout(raw: &str) -> Result<bool> {
    let response: StatusResponse = decode(STATUS, raw)?;

    Ok(response
        .health
        .checks
        .get(OSDMAP_FLAGS_CHECK)
        .and_then(|check| check.summary.as_ref())
        .is_some_and(|summary| summary.message.contains(NOOUT_FLAG)))
}

/// Parse `ceph osd stat --format json` in either layout.
pub fn parse_osd_stat(raw: &str) -> Result<OsdCounts> {
    let response: OsdStatResponse = decode(OSD_STAT, raw)?;
    let counts = response.normalize()?;

    if counts.num_up_osds > counts.num_osds || counts.num_in_osds > counts.num_osds {
        return Err(UpgradeError::probe(
            OSD_STAT,
            format!(
                "inconsistent OSD counts: total={} up={} in={}",
                counts.num_osds, counts.num_up_osds, counts.num_in_osds
            ),
        ));
    }

    Ok(counts)
}

/// Combine the three query outputs into one snapshot.
pub fn build_snapshot(pg_stat: &str, status: &str, osd_stat: &str) -> Result<HealthSnapshot> {
    let pg_state_counts = parse_pg_stat(pg_stat)?;
    let safety_flag_set = parse_noout(status)?;
    let osds = parse_osd_stat(osd_stat)?;

    Ok(HealthSnapshot {
        pg_state_counts,
        safety_flag_set,
        total_daemons: osds.num_osds,
        up_daemons: osds.num_up_osds,
        in_daemons: osds.num_in_osds,
    })
}
