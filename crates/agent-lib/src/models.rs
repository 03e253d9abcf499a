//! Core data models for the monitoring agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable per-process identity, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub server_name: String,
    pub server_token: String,
}

/// Memory usage sample
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

/// Disk usage sample for the root filesystem
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

/// Network counters and derived rates for the representative interface
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NetworkUsage {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    /// Bytes per second since the previous sample (0 on first call)
    pub rx_rate_bps: u64,
    pub tx_rate_bps: u64,
}

/// Point-in-time view of the host, ready for transmission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory: MemoryUsage,
    pub disk: DiskUsage,
    pub network: NetworkUsage,
    pub uptime_secs: i64,
    /// Number of long-lived agent tasks currently running
    pub tasks: usize,
    pub status: String,
}

/// Per-container resource figures from the container engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStat {
    pub id: String,
    pub name: String,
    pub status: String,
    pub uptime: String,
    pub running: bool,
    pub cpu_percent: f64,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    /// Cumulative bytes averaged over an hour, not a measured inter-sample
    /// rate. See `container::hourly_avg_rate`.
    pub net_rx_rate_bps: u64,
    pub net_tx_rate_bps: u64,
}
