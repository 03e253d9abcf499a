//! Host snapshot assembly
//!
//! One `SnapshotBuilder` owns all the stateful samplers so that delta
//! baselines (CPU ticks, network counters) survive between ticks. The
//! free functions below turn a snapshot into the outbound record shapes;
//! operator-owned fields are echoed from the cached remote record, never
//! derived locally.

use chrono::Utc;

use crate::models::{AgentIdentity, HostSnapshot};
use crate::sampler::{CpuSampler, DiskSampler, MemorySampler, NetworkSampler};
use crate::store::{MetricsRecord, ServerRecord};
use crate::sysinfo::{format_uptime, SystemInfo, SystemProbe};

pub struct SnapshotBuilder {
    agent_id: String,
    cpu: CpuSampler,
    memory: MemorySampler,
    disk: DiskSampler,
    network: NetworkSampler,
    probe: SystemProbe,
}

impl SnapshotBuilder {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            cpu: CpuSampler::new(),
            memory: MemorySampler::new(),
            disk: DiskSampler::new(),
            network: NetworkSampler::new(),
            probe: SystemProbe::new(),
        }
    }

    /// Sample everything and assemble a snapshot. Individual sampler
    /// failures surface as their documented fallback values, so this
    /// always yields a complete snapshot.
    pub async fn build(&mut self, status: &str, tasks: usize) -> HostSnapshot {
        HostSnapshot {
            agent_id: self.agent_id.clone(),
            timestamp: Utc::now(),
            cpu_percent: self.cpu.sample().await,
            memory: self.memory.sample().await,
            disk: self.disk.sample(),
            network: self.network.sample().await,
            uptime_secs: self.probe.uptime_secs().await,
            tasks,
            status: status.to_string(),
        }
    }
}

/// Server record carrying this snapshot, with `check_interval` and the
/// container flag echoed from the cached remote record
pub fn server_record_from(
    snapshot: &HostSnapshot,
    info: &SystemInfo,
    identity: &AgentIdentity,
    cached: &ServerRecord,
) -> ServerRecord {
    ServerRecord {
        id: cached.id.clone(),
        agent_id: identity.agent_id.clone(),
        name: identity.server_name.clone(),
        hostname: info.hostname.clone(),
        ip_address: info.ip_address.clone(),
        os_type: info.os_type.clone(),
        status: "up".to_string(),
        uptime: format_uptime(snapshot.uptime_secs),
        ram_total: snapshot.memory.total_bytes as i64,
        ram_used: snapshot.memory.used_bytes as i64,
        cpu_cores: info.cpu_cores as i64,
        cpu_usage: snapshot.cpu_percent,
        disk_total: snapshot.disk.total_bytes as i64,
        disk_used: snapshot.disk.used_bytes as i64,
        last_checked: snapshot.timestamp.to_rfc3339(),
        server_token: identity.server_token.clone(),
        system_info: info.summary(),
        agent_status: snapshot.status.clone(),
        check_interval: cached.check_interval,
        containers_enabled: cached.containers_enabled,
    }
}

/// Per-tick history record for this snapshot
pub fn metrics_record_from(snapshot: &HostSnapshot, info: &SystemInfo) -> MetricsRecord {
    MetricsRecord {
        agent_id: snapshot.agent_id.clone(),
        timestamp: snapshot.timestamp.to_rfc3339(),
        ram_total: snapshot.memory.total_bytes.to_string(),
        ram_used: snapshot.memory.used_bytes.to_string(),
        ram_free: snapshot
            .memory
            .total_bytes
            .saturating_sub(snapshot.memory.used_bytes)
            .to_string(),
        cpu_cores: info.cpu_cores.to_string(),
        cpu_usage: format!("{:.2}", snapshot.cpu_percent),
        cpu_free: format!("{:.2}", 100.0 - snapshot.cpu_percent),
        disk_total: snapshot.disk.total_bytes.to_string(),
        disk_used: snapshot.disk.used_bytes.to_string(),
        disk_free: snapshot
            .disk
            .total_bytes
            .saturating_sub(snapshot.disk.used_bytes)
            .to_string(),
        status: snapshot.status.clone(),
        network_rx_bytes: snapshot.network.bytes_received as i64,
        network_tx_bytes: snapshot.network.bytes_sent as i64,
        network_rx_speed: snapshot.network.rx_rate_bps as i64,
        network_tx_speed: snapshot.network.tx_rate_bps as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiskUsage, MemoryUsage, NetworkUsage};

    fn snapshot() -> HostSnapshot {
        HostSnapshot {
            agent_id: "agent-1".to_string(),
            timestamp: Utc::now(),
            cpu_percent: 42.5,
            memory: MemoryUsage {
                used_bytes: 4_000,
                total_bytes: 16_000,
                percent: 25.0,
            },
            disk: DiskUsage {
                used_bytes: 50,
                total_bytes: 200,
                percent: 25.0,
            },
            network: NetworkUsage::default(),
            uptime_secs: 90_061,
            tasks: 4,
            status: "active".to_string(),
        }
    }

    fn identity() -> AgentIdentity {
        AgentIdentity {
            agent_id: "agent-1".to_string(),
            server_name: "edge-1".to_string(),
            server_token: "tok".to_string(),
        }
    }

    #[test]
    fn test_server_record_echoes_operator_fields() {
        let cached = ServerRecord {
            id: "rec1".to_string(),
            check_interval: 45,
            containers_enabled: true,
            ..Default::default()
        };
        let record = server_record_from(&snapshot(), &SystemInfo::default(), &identity(), &cached);

        assert_eq!(record.id, "rec1");
        assert_eq!(record.check_interval, 45);
        assert!(record.containers_enabled);
        assert_eq!(record.status, "up");
        assert_eq!(record.uptime, "1d 1h 1m");
        assert_eq!(record.ram_used, 4_000);
    }

    #[test]
    fn test_metrics_record_derives_free_figures() {
        let info = SystemInfo {
            cpu_cores: 8,
            ..Default::default()
        };
        let record = metrics_record_from(&snapshot(), &info);

        assert_eq!(record.ram_free, "12000");
        assert_eq!(record.disk_free, "150");
        assert_eq!(record.cpu_usage, "42.50");
        assert_eq!(record.cpu_free, "57.50");
        assert_eq!(record.cpu_cores, "8");
    }

    #[tokio::test]
    async fn test_build_produces_complete_snapshot() {
        let mut builder = SnapshotBuilder::new("agent-1");
        let snap = builder.build("active", 4).await;

        assert_eq!(snap.agent_id, "agent-1");
        assert_eq!(snap.status, "active");
        assert_eq!(snap.tasks, 4);
        assert!((0.0..=100.0).contains(&snap.cpu_percent));
    }
}
