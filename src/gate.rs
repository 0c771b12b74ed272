//! Health gate: turns a [`HealthSnapshot`] into a go/no-go verdict.
//!
//! Every rule is evaluated on every call so that operators see all
//! blocking reasons at once instead of fixing them one poll at a time.

use std::fmt;

use crate::ceph::HealthSnapshot;

/// Default number of OSDs allowed to be down (or out) before the gate blocks.
pub const DEFAULT_MAX_DOWN_OSDS: u32 = 3;

const DEGRADED: &str = "degraded";
const UNDERSIZED: &str = "undersized";

/// Why the gate refused to let the upgrade proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    DegradedPgs,
    UndersizedPgs,
    SafetyFlagNotSet,
    TooManyDaemonsDown,
}

impl BlockReason {
    pub const fn message(self) -> &'static str {
        match self {
            Self::DegradedPgs => "degraded placement groups present",
            Self::UndersizedPgs => "undersized placement groups present",
            Self::SafetyFlagNotSet => "safety flag not set",
            Self::TooManyDaemonsDown => "too many storage daemons down/out",
        }
    }

    /// Operator hint logged alongside the reason.
    pub const fn hint(self) -> &'static str {
        match self {
            Self::DegradedPgs | Self::UndersizedPgs => {
                "Waiting for recovery to finish before continuing"
            }
            Self::SafetyFlagNotSet => "Set it with `ceph osd set noout` to continue",
            Self::TooManyDaemonsDown => "Bring OSDs back up and in before continuing",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of a gate evaluation. `reasons` is empty iff `proceed_allowed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthVerdict {
    pub proceed_allowed: bool,
    pub reasons: Vec<BlockReason>,
}

impl HealthVerdict {
    fn from_reasons(reasons: Vec<BlockReason>) -> Self {
        Self {
            proceed_allowed: reasons.is_empty(),
            reasons,
        }
    }

    pub fn messages(&self) -> Vec<&'static str> {
        self.reasons.iter().map(|r| r.message()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthGate {
    max_down_osds: u32,
}

impl Default for HealthGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOWN_OSDS)
    }
}

impl HealthGate {
    pub const fn new(max_down_osds: u32) -> Self {
        Self { max_down_osds }
    }

    pub const fn max_down_osds(&self) -> u32 {
        self.max_down_osds
    }

    pub fn evaluate(&self, snapshot: &HealthSnapshot) -> HealthVerdict {
        let mut reasons = Vec::new();

        if snapshot.pgs_in_state(DEGRADED) > 0 {
            reasons.push(BlockReason::DegradedPgs);
        }
        if snapshot.pgs_in_state(UNDERSIZED) > 0 {
            reasons.push(BlockReason::UndersizedPgs);
        }
        if !snapshot.safety_flag_set {
            reasons.push(BlockReason::SafetyFlagNotSet);
        }
        if snapshot.down_daemons() > self.max_down_osds
            || snapshot.out_daemons() > self.max_down_osds
        {
            reasons.push(BlockReason::TooManyDaemonsDown);
        }

        HealthVerdict::from_reasons(reasons)
    }
}
