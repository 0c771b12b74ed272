//! Serial, health-gated rolling upgrade of Ceph cluster hosts.
//!
//! One host at a time: wait until PGs are clean, `noout` is set and enough
//! OSDs are up and in, run the upgrade-and-reboot command over ssh, let the
//! host settle, move on.

pub mod ceph;
pub mod config;
pub mod delay;
pub mod error;
pub mod gate;
pub mod hosts;
pub mod logging;
pub mod remote;
pub mod upgrader;
