//! Container record reconciliation
//!
//! Keeps the store's `containers` collection matched to what the engine
//! reports, keyed by the engine's container id. Store record ids are
//! cached after the first lookup so steady-state ticks issue exactly
//! one PATCH per container, plus a metrics-history create.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::client::{StoreClient, StoreError};
use super::types::{ContainerMetricsRecord, ContainerRecord};
use crate::models::ContainerStat;

pub struct Reconciler {
    client: Arc<StoreClient>,
    hostname: String,
    /// engine container id -> store record id
    record_ids: DashMap<String, String>,
}

impl Reconciler {
    pub fn new(client: Arc<StoreClient>, hostname: String) -> Self {
        Self {
            client,
            hostname,
            record_ids: DashMap::new(),
        }
    }

    /// Push the current container stats to the store. Failures are
    /// logged per container and never abort the batch; returns how many
    /// containers synced fully.
    pub async fn reconcile(&self, stats: &[ContainerStat]) -> usize {
        let mut synced = 0;
        for stat in stats {
            match self.reconcile_one(stat).await {
                Ok(()) => synced += 1,
                Err(err) => {
                    warn!(container_id = %stat.id, error = %err, "Container sync failed");
                }
            }
        }
        synced
    }

    async fn reconcile_one(&self, stat: &ContainerStat) -> Result<(), StoreError> {
        let record = self.to_record(stat);

        match self.record_id(&stat.id).await? {
            Some(id) => self.client.update_container(&id, &record).await?,
            None => {
                let created = self.client.create_container(&record).await?;
                debug!(container_id = %stat.id, record_id = %created.id, "Created container record");
                self.record_ids.insert(stat.id.clone(), created.id);
            }
        }

        self.client
            .create_container_metrics(&self.to_metrics(stat))
            .await
    }

    /// Cached store record id for an engine container id, falling back
    /// to a remote query. A remote hit populates the cache.
    async fn record_id(&self, container_id: &str) -> Result<Option<String>, StoreError> {
        if let Some(id) = self.record_ids.get(container_id) {
            return Ok(Some(id.clone()));
        }
        match self.client.get_container_by_engine_id(container_id).await? {
            Some(existing) => {
                self.record_ids
                    .insert(container_id.to_string(), existing.id.clone());
                Ok(Some(existing.id))
            }
            None => Ok(None),
        }
    }

    fn to_record(&self, stat: &ContainerStat) -> ContainerRecord {
        ContainerRecord {
            id: String::new(),
            container_id: stat.id.clone(),
            name: stat.name.clone(),
            hostname: self.hostname.clone(),
            status: if stat.running { "running" } else { "stopped" }.to_string(),
            uptime: stat.uptime.clone(),
            ram_total: stat.mem_total_bytes as i64,
            ram_used: stat.mem_used_bytes as i64,
            cpu_usage: stat.cpu_percent,
            disk_total: stat.disk_total_bytes as i64,
            disk_used: stat.disk_used_bytes as i64,
            last_checked: Utc::now().to_rfc3339(),
        }
    }

    fn to_metrics(&self, stat: &ContainerStat) -> ContainerMetricsRecord {
        ContainerMetricsRecord {
            container_id: stat.id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            ram_total: stat.mem_total_bytes.to_string(),
            ram_used: stat.mem_used_bytes.to_string(),
            ram_free: stat.mem_total_bytes.saturating_sub(stat.mem_used_bytes).to_string(),
            cpu_usage: format!("{:.2}", stat.cpu_percent),
            disk_total: stat.disk_total_bytes.to_string(),
            disk_used: stat.disk_used_bytes.to_string(),
            disk_free: stat
                .disk_total_bytes
                .saturating_sub(stat.disk_used_bytes)
                .to_string(),
            status: if stat.running { "running" } else { "stopped" }.to_string(),
            network_rx_bytes: stat.net_rx_bytes as i64,
            network_tx_bytes: stat.net_tx_bytes as i64,
            network_rx_speed: stat.net_rx_rate_bps as i64,
            network_tx_speed: stat.net_tx_rate_bps as i64,
        }
    }
}
