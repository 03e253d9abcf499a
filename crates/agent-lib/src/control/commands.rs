//! Remote command polling and dispatch
//!
//! Operators queue commands as store records addressed to an agent id.
//! The poller picks up unexecuted rows on its own interval and marks a
//! row executed only after the whole dispatch succeeded; anything that
//! fails stays pending and is retried on the next poll, so delivery is
//! at-least-once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::state::ControlState;
use crate::observability::AgentMetrics;
use crate::store::{CommandRecord, StoreClient};

/// The commands the agent accepts. Anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    ConfigUpdate,
}

impl CommandKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "restart" => Some(Self::Restart),
            "config_update" => Some(Self::ConfigUpdate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::ConfigUpdate => "config_update",
        }
    }
}

pub struct CommandPoller {
    client: Arc<StoreClient>,
    state: Arc<ControlState>,
    agent_id: String,
    poll_interval: Duration,
    metrics: AgentMetrics,
}

impl CommandPoller {
    pub fn new(
        client: Arc<StoreClient>,
        state: Arc<ControlState>,
        agent_id: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            state,
            agent_id,
            poll_interval,
            metrics: AgentMetrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Starting command poller"
        );
        self.state.task_started();

        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                _ = shutdown.recv() => {
                    info!("Shutting down command poller");
                    break;
                }
            }
        }

        self.state.task_finished();
    }

    /// One poll pass. Command-channel failures are expected when the
    /// collection is absent or the store is briefly down; they are
    /// logged at debug and never propagate.
    pub async fn poll_once(&self) {
        let commands = match self.client.pending_commands(&self.agent_id).await {
            Ok(commands) => commands,
            Err(err) => {
                debug!(error = %err, "Command poll failed, will retry");
                return;
            }
        };

        for command in commands {
            self.handle(command).await;
        }
    }

    async fn handle(&self, command: CommandRecord) {
        let Some(kind) = CommandKind::parse(&command.command) else {
            warn!(
                command_id = %command.id,
                command = %command.command,
                "Rejecting unknown command"
            );
            return;
        };

        let parameters = match parse_parameters(&command.parameters) {
            Ok(parameters) => parameters,
            Err(err) => {
                warn!(
                    command_id = %command.id,
                    error = %err,
                    "Rejecting command with malformed parameters"
                );
                return;
            }
        };

        if let Err(err) = self.dispatch(kind, &parameters).await {
            warn!(
                command_id = %command.id,
                command = kind.name(),
                error = %err,
                "Command dispatch failed, leaving pending"
            );
            return;
        }

        match self.client.mark_command_executed(&command.id).await {
            Ok(()) => {
                self.metrics.inc_commands_executed();
                info!(command_id = %command.id, command = kind.name(), "Executed command");
            }
            Err(err) => {
                // The command ran; it will run again next poll.
                warn!(
                    command_id = %command.id,
                    error = %err,
                    "Failed to mark command executed"
                );
            }
        }
    }

    async fn dispatch(
        &self,
        kind: CommandKind,
        parameters: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        match kind {
            CommandKind::Start => self.start_monitoring().await,
            CommandKind::Stop => self.stop_monitoring().await,
            CommandKind::Restart => {
                self.stop_monitoring().await?;
                self.start_monitoring().await
            }
            CommandKind::ConfigUpdate => self.update_configuration(parameters).await,
        }
    }

    async fn start_monitoring(&self) -> anyhow::Result<()> {
        let transitioned = self.state.resume().await;
        info!(transitioned, "Monitoring started via remote command");
        self.write_agent_status("running").await
    }

    async fn stop_monitoring(&self) -> anyhow::Result<()> {
        let transitioned = self.state.pause().await;
        info!(transitioned, "Monitoring stopped via remote command");
        self.write_agent_status("paused").await
    }

    /// Sampling settings are owned by the server record, not by command
    /// payloads; the parameters are acknowledged and logged only.
    async fn update_configuration(
        &self,
        parameters: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        for (key, value) in parameters {
            debug!(parameter = %key, value = %value, "Received configuration parameter");
        }
        self.write_agent_status("running").await
    }

    async fn write_agent_status(&self, status: &str) -> anyhow::Result<()> {
        let record_id = self.state.record_id().await;
        if record_id.is_empty() {
            debug!("No server record yet, skipping remote status write");
            return Ok(());
        }
        self.client
            .update_agent_status(&record_id, status)
            .await
            .map_err(Into::into)
    }
}

/// Parameters arrive as a JSON object of string values serialized into
/// the record's `parameters` string field
fn parse_parameters(raw: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServerRecord;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(CommandKind::parse("start"), Some(CommandKind::Start));
        assert_eq!(CommandKind::parse(" Stop "), Some(CommandKind::Stop));
        assert_eq!(CommandKind::parse("RESTART"), Some(CommandKind::Restart));
        assert_eq!(
            CommandKind::parse("config_update"),
            Some(CommandKind::ConfigUpdate)
        );
    }

    #[test]
    fn test_unknown_commands_rejected() {
        assert_eq!(CommandKind::parse("reboot"), None);
        assert_eq!(CommandKind::parse(""), None);
        assert_eq!(CommandKind::parse("rm -rf /"), None);
    }

    #[test]
    fn test_parse_parameters() {
        let parameters = parse_parameters(r#"{"check_interval":"60"}"#).unwrap();
        assert_eq!(parameters.get("check_interval").unwrap(), "60");
        assert!(parse_parameters("").unwrap().is_empty());
        assert!(parse_parameters("not json").is_err());
    }

    fn poller(server: &mockito::ServerGuard, state: Arc<ControlState>) -> CommandPoller {
        let client = Arc::new(
            StoreClient::new(&server.url(), Duration::from_secs(2)).unwrap(),
        );
        CommandPoller::new(client, state, "agent-1".to_string(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_stop_command_pauses_and_marks_executed() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/collections/commands/records")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[{"id":"cmd1","agent_id":"agent-1","command":"stop","executed":false}]}"#)
            .create_async()
            .await;
        let status = server
            .mock("PATCH", "/api/collections/servers/records/rec1")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"agent_status": "paused"}),
            ))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let executed = server
            .mock("PATCH", "/api/collections/commands/records/cmd1")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let state = Arc::new(ControlState::new(Duration::from_secs(30)));
        state
            .set_record(ServerRecord {
                id: "rec1".to_string(),
                ..Default::default()
            })
            .await;

        poller(&server, state.clone()).poll_once().await;

        assert!(!state.is_monitoring().await);
        status.assert_async().await;
        executed.assert_async().await;
    }

    #[tokio::test]
    async fn test_start_while_active_stays_active() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/collections/commands/records")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[{"id":"cmd1","agent_id":"agent-1","command":"start","executed":false}]}"#)
            .create_async()
            .await;
        let _status = server
            .mock("PATCH", "/api/collections/servers/records/rec1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _executed = server
            .mock("PATCH", "/api/collections/commands/records/cmd1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let state = Arc::new(ControlState::new(Duration::from_secs(30)));
        state
            .set_record(ServerRecord {
                id: "rec1".to_string(),
                ..Default::default()
            })
            .await;
        assert!(state.is_monitoring().await);

        poller(&server, state.clone()).poll_once().await;
        assert!(state.is_monitoring().await);
    }

    #[tokio::test]
    async fn test_unknown_command_not_marked_executed() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/collections/commands/records")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[{"id":"cmd1","agent_id":"agent-1","command":"reboot","executed":false}]}"#)
            .create_async()
            .await;
        let executed = server
            .mock("PATCH", "/api/collections/commands/records/cmd1")
            .expect(0)
            .create_async()
            .await;

        let state = Arc::new(ControlState::new(Duration::from_secs(30)));
        poller(&server, state.clone()).poll_once().await;

        assert!(state.is_monitoring().await);
        executed.assert_async().await;
    }

    #[tokio::test]
    async fn test_config_update_pings_status_without_side_effects() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/collections/commands/records")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"items":[{"id":"cmd1","agent_id":"agent-1","command":"config_update","parameters":"{\"check_interval\":\"45\"}","executed":false}]}"#,
            )
            .create_async()
            .await;
        let status = server
            .mock("PATCH", "/api/collections/servers/records/rec1")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"agent_status": "running"}),
            ))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let executed = server
            .mock("PATCH", "/api/collections/commands/records/cmd1")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let state = Arc::new(ControlState::new(Duration::from_secs(30)));
        state
            .set_record(ServerRecord {
                id: "rec1".to_string(),
                ..Default::default()
            })
            .await;

        poller(&server, state.clone()).poll_once().await;

        // The interval stays with the server record's value
        assert_eq!(state.current_interval().await, Duration::from_secs(30));
        status.assert_async().await;
        executed.assert_async().await;
    }
}
