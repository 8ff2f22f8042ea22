use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A confirmed camera signature match for one address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub camera_type: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub url: String,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`.
    pub detected_at: String,
}

/// One (address, port) pair waiting to be probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub ip: Ipv4Addr,
    pub port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Expanding,
    Draining,
    Stopped,
}

impl ScanPhase {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => ScanPhase::Expanding,
            2 => ScanPhase::Draining,
            3 => ScanPhase::Stopped,
            _ => ScanPhase::Idle,
        }
    }
}

/// Point-in-time view of a running scan, for periodic display.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub phase: ScanPhase,
    pub paused: bool,
    pub range_index: u64,
    pub range_total: u64,
    pub addresses_queued: u64,
    pub probes_done: u64,
    pub findings: u64,
}

/// Final counters for a finished run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanSummary {
    pub ranges_total: u64,
    pub addresses_queued: u64,
    pub probes_done: u64,
    pub findings: Vec<Finding>,
    pub elapsed_ms: u64,
    pub stopped_early: bool,
}
