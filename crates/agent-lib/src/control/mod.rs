//! Agent control loop
//!
//! Owns the fixed task set of the process: the sampling tick loop and
//! the remote command poller, both cancelled through one broadcast
//! shutdown channel. Remote state (pause, interval, container flag) is
//! read from the cached server record each tick; the cache is only
//! replaced on a successful refresh, so a flapping store never erases
//! what the agent last knew.

mod commands;
mod state;

pub use commands::{CommandKind, CommandPoller};
pub use state::ControlState;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::container::DockerCollector;
use crate::models::{AgentIdentity, HostSnapshot};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::snapshot::{metrics_record_from, server_record_from, SnapshotBuilder};
use crate::store::{Reconciler, ServerRecord, StoreClient};
use crate::sysinfo::{SystemInfo, SystemProbe};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub identity: AgentIdentity,
    /// Default sampling interval, used until the remote record says
    /// otherwise
    pub check_interval: Duration,
    pub command_check_interval: Duration,
    pub request_timeout: Duration,
    /// Delivery attempts per snapshot on the fallback HTTP path
    pub max_retries: u32,
    /// Record store base URL; `None` disables the store entirely
    pub store_url: Option<String>,
    pub fallback_server_url: Option<String>,
    pub fallback_api_key: Option<String>,
    pub remote_control_enabled: bool,
}

pub struct Agent {
    options: AgentOptions,
    state: Arc<ControlState>,
    client: Option<Arc<StoreClient>>,
    reconciler: Option<Reconciler>,
    builder: SnapshotBuilder,
    collector: DockerCollector,
    probe: SystemProbe,
    system_info: SystemInfo,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    http: reqwest::Client,
    shutdown: broadcast::Sender<()>,
}

impl Agent {
    pub fn new(options: AgentOptions) -> Result<Self> {
        let client = match &options.store_url {
            Some(url) => Some(Arc::new(
                StoreClient::new(url, options.request_timeout)
                    .context("failed to build store client")?,
            )),
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .context("failed to build fallback HTTP client")?;

        let (shutdown, _) = broadcast::channel(4);
        let state = Arc::new(ControlState::new(options.check_interval));
        let builder = SnapshotBuilder::new(options.identity.agent_id.clone());
        let logger = StructuredLogger::new(options.identity.agent_id.clone());

        Ok(Self {
            options,
            state,
            client,
            reconciler: None,
            builder,
            collector: DockerCollector::new(),
            probe: SystemProbe::new(),
            system_info: SystemInfo::default(),
            metrics: AgentMetrics::new(),
            logger,
            http,
            shutdown,
        })
    }

    pub fn state(&self) -> Arc<ControlState> {
        self.state.clone()
    }

    pub fn store_client(&self) -> Option<Arc<StoreClient>> {
        self.client.clone()
    }

    /// Sender half of the shutdown channel; one send stops every task
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// First contact with the store: find this agent's server record or
    /// create it. A record that already says "paused" leaves the agent
    /// sampling-idle from the start.
    pub async fn init(&mut self) -> Result<()> {
        self.system_info = self.probe.system_info().await;

        let Some(client) = self.client.clone() else {
            info!("Record store disabled, using fallback HTTP reporting");
            return Ok(());
        };

        client
            .health()
            .await
            .context("record store health check failed")?;

        match client
            .get_server_by_agent_id(&self.options.identity.agent_id)
            .await
            .context("failed to look up server record")?
        {
            Some(existing) => {
                info!(
                    record_id = %existing.id,
                    "Found existing server record"
                );
                if existing.status == "paused" {
                    self.state.pause().await;
                    self.logger.log_monitoring_paused("remote record");
                }
                self.apply_record(existing).await;
            }
            None => {
                let snapshot = self.builder.build("running", self.state.task_count()).await;
                let template = ServerRecord {
                    status: "up".to_string(),
                    check_interval: self.options.check_interval.as_secs() as i64,
                    ..Default::default()
                };
                let record = server_record_from(
                    &snapshot,
                    &self.system_info,
                    &self.options.identity,
                    &template,
                );
                let created = client
                    .create_server(&record)
                    .await
                    .context("failed to create server record")?;
                info!(record_id = %created.id, "Created server record");
                self.apply_record(created).await;
            }
        }

        self.reconciler = Some(Reconciler::new(
            client,
            self.system_info.hostname.clone(),
        ));
        Ok(())
    }

    /// Cache a refreshed record and derive the effective interval from
    /// it: the record's value when positive, the configured default
    /// otherwise
    async fn apply_record(&self, record: ServerRecord) {
        let effective = if record.check_interval > 0 {
            Duration::from_secs(record.check_interval as u64)
        } else {
            self.options.check_interval
        };
        self.state.set_interval(effective).await;
        self.state.set_record(record).await;
    }

    /// Run until shutdown. Spawns the command poller and drives the
    /// sampling tick loop on the current task.
    pub async fn run(mut self) -> Result<()> {
        self.logger
            .log_startup(AGENT_VERSION, self.client.is_some());

        let mut poller_handle = None;
        if self.options.remote_control_enabled {
            if let Some(client) = &self.client {
                let poller = CommandPoller::new(
                    client.clone(),
                    self.state.clone(),
                    self.options.identity.agent_id.clone(),
                    self.options.command_check_interval,
                );
                poller_handle = Some(tokio::spawn(poller.run(self.shutdown.subscribe())));
            } else {
                debug!("Remote control enabled but store disabled, no command poller");
            }
        }

        self.state.task_started();
        let mut shutdown = self.shutdown.subscribe();
        let mut current = self.state.current_interval().await;
        let mut ticker = interval_at(Instant::now() + current, current);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                    let effective = self.state.current_interval().await;
                    if effective != current {
                        self.logger
                            .log_interval_changed(current.as_secs(), effective.as_secs());
                        current = effective;
                        ticker = interval_at(Instant::now() + current, current);
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        if let Some(client) = &self.client {
            let record_id = self.state.record_id().await;
            if !record_id.is_empty() {
                if let Err(err) = client.update_agent_status(&record_id, "down").await {
                    warn!(error = %err, "Failed to report shutdown to store");
                }
            }
        }

        if let Some(handle) = poller_handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "Command poller task panicked");
            }
        }

        self.state.task_finished();
        self.logger.log_shutdown("shutdown signal");
        Ok(())
    }

    /// One sampling tick: refresh remote state, then sample and report
    /// unless paused. Always completes; every failure mode inside is
    /// logged and absorbed.
    async fn tick(&mut self) {
        self.metrics.inc_ticks();
        self.refresh_record().await;

        if !self.state.is_monitoring().await {
            debug!("Monitoring paused, skipping sample");
            return;
        }

        let start = Instant::now();
        let snapshot = self.builder.build("active", self.state.task_count()).await;
        self.metrics
            .observe_sample_latency(start.elapsed().as_secs_f64());
        self.state.set_snapshot(snapshot.clone()).await;

        if let Some(client) = self.client.clone() {
            self.report_to_store(&client, &snapshot).await;
        } else {
            self.report_fallback(&snapshot).await;
        }
    }

    /// Refresh the cached server record and drive the monitoring flag
    /// from it: a paused record pauses sampling, anything else resumes
    /// it. Any failure keeps both the cache and the flag as they are.
    async fn refresh_record(&self) {
        let Some(client) = &self.client else { return };
        match client
            .get_server_by_agent_id(&self.options.identity.agent_id)
            .await
        {
            Ok(Some(record)) => {
                if record.status == "paused" {
                    if self.state.pause().await {
                        self.logger.log_monitoring_paused("remote record");
                    }
                } else if self.state.resume().await {
                    self.logger.log_monitoring_resumed("remote record");
                }
                self.apply_record(record).await;
            }
            Ok(None) => debug!("Server record missing remotely, keeping cached copy"),
            Err(err) => {
                self.metrics.inc_store_errors();
                self.logger.log_store_unreachable(&err.to_string());
            }
        }
    }

    async fn report_to_store(&mut self, client: &Arc<StoreClient>, snapshot: &HostSnapshot) {
        let cached = self.state.cached_record().await;
        let record =
            server_record_from(snapshot, &self.system_info, &self.options.identity, &cached);

        if cached.id.is_empty() {
            // First contact failed at init; keep trying each tick
            match client.create_server(&record).await {
                Ok(created) => {
                    info!(record_id = %created.id, "Created server record");
                    self.apply_record(created).await;
                }
                Err(err) => {
                    self.metrics.inc_store_errors();
                    warn!(error = %err, "Failed to create server record");
                    return;
                }
            }
        } else if let Err(err) = client.update_server(&cached.id, &record).await {
            self.metrics.inc_store_errors();
            warn!(error = %err, "Failed to update server record");
        }

        if let Err(err) = client
            .create_metrics(&metrics_record_from(snapshot, &self.system_info))
            .await
        {
            self.metrics.inc_store_errors();
            warn!(error = %err, "Failed to create metrics record");
        }

        if cached.containers_enabled {
            self.reconcile_containers().await;
        }
    }

    async fn reconcile_containers(&self) {
        if !self.collector.available().await {
            debug!("Container engine unavailable, skipping container monitoring");
            return;
        }
        let stats = self.collector.collect().await;
        self.metrics.set_containers_monitored(stats.len() as i64);
        if let Some(reconciler) = &self.reconciler {
            let synced = reconciler.reconcile(&stats).await;
            debug!(containers = stats.len(), synced, "Container reconcile complete");
        }
    }

    /// Deliver a snapshot over plain HTTP when the store is disabled
    async fn report_fallback(&self, snapshot: &HostSnapshot) {
        let Some(base) = &self.options.fallback_server_url else {
            debug!("No fallback server URL configured, dropping snapshot");
            return;
        };
        let url = format!("{}/api/metrics", base.trim_end_matches('/'));
        let attempts = self.options.max_retries.max(1);

        for attempt in 1..=attempts {
            let mut request = self
                .http
                .post(&url)
                .json(snapshot)
                .header("X-Agent-ID", &self.options.identity.agent_id);
            if let Some(key) = &self.options.fallback_api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.metrics.inc_fallback_reports();
                    debug!(attempt, "Delivered snapshot over fallback HTTP");
                    return;
                }
                Ok(resp) => warn!(
                    status = resp.status().as_u16(),
                    attempt, "Fallback report rejected"
                ),
                Err(err) => warn!(error = %err, attempt, "Fallback report failed"),
            }

            if attempt < attempts {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        self.metrics.inc_store_errors();
    }
}
