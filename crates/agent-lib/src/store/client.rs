//! HTTP client for the remote record store
//!
//! Thin wrapper over the store's collection-record REST surface: list
//! with a filter expression, create, and partial update by record id.
//! Typed helpers below the generic operations keep collection names and
//! filter syntax in one place.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::types::{
    CommandRecord, ContainerMetricsRecord, ContainerRecord, ListResponse, MetricsRecord,
    ServerRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {status} for {operation}")]
    Status { status: u16, operation: String },
    #[error("failed to decode store response for {operation}: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Client for one record store instance
pub struct StoreClient {
    base_url: String,
    http: reqwest::Client,
}

impl StoreClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let parsed = url::Url::parse(base_url).map_err(|e| StoreError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreError::InvalidUrl {
                url: base_url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connection test against the store's health endpoint
    pub async fn health(&self) -> Result<(), StoreError> {
        let resp = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StoreError::Status {
                status: resp.status().as_u16(),
                operation: "health".to_string(),
            });
        }
        Ok(())
    }

    /// List records matching a filter expression. A 404 means the
    /// collection does not exist yet, which callers treat as empty.
    async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: &str,
    ) -> Result<Vec<T>, StoreError> {
        let url = format!("{}/api/collections/{}/records", self.base_url, collection);
        let resp = self
            .http
            .get(&url)
            .query(&[("filter", filter)])
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(collection, "Collection not found, treating as empty");
            return Ok(Vec::new());
        }
        let operation = format!("list {collection}");
        if !resp.status().is_success() {
            return Err(StoreError::Status {
                status: resp.status().as_u16(),
                operation,
            });
        }

        let body = resp.text().await?;
        let parsed: ListResponse<T> =
            serde_json::from_str(&body).map_err(|source| StoreError::Decode { operation, source })?;
        Ok(parsed.items)
    }

    /// Create a record, returning the stored form (which carries the
    /// store-assigned record id)
    async fn create<T: Serialize, R: DeserializeOwned>(
        &self,
        collection: &str,
        record: &T,
    ) -> Result<R, StoreError> {
        let url = format!("{}/api/collections/{}/records", self.base_url, collection);
        let resp = self.http.post(&url).json(record).send().await?;

        let operation = format!("create {collection}");
        if !resp.status().is_success() {
            return Err(StoreError::Status {
                status: resp.status().as_u16(),
                operation,
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|source| StoreError::Decode { operation, source })
    }

    /// Partial update of one record by its store record id
    async fn update<T: Serialize>(
        &self,
        collection: &str,
        record_id: &str,
        body: &T,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}/api/collections/{}/records/{}",
            self.base_url, collection, record_id
        );
        let resp = self.http.patch(&url).json(body).send().await?;

        if !resp.status().is_success() {
            return Err(StoreError::Status {
                status: resp.status().as_u16(),
                operation: format!("update {collection}/{record_id}"),
            });
        }
        Ok(())
    }

    pub async fn get_server_by_agent_id(
        &self,
        agent_id: &str,
    ) -> Result<Option<ServerRecord>, StoreError> {
        let filter = format!("server_id='{agent_id}'");
        let mut items: Vec<ServerRecord> = self.list("servers", &filter).await?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        })
    }

    pub async fn create_server(&self, record: &ServerRecord) -> Result<ServerRecord, StoreError> {
        self.create("servers", record).await
    }

    pub async fn update_server(
        &self,
        record_id: &str,
        record: &ServerRecord,
    ) -> Result<(), StoreError> {
        self.update("servers", record_id, record).await
    }

    /// Update only the agent-lifecycle status field of a server record
    pub async fn update_agent_status(
        &self,
        record_id: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        self.update("servers", record_id, &serde_json::json!({ "agent_status": status }))
            .await
    }

    pub async fn create_metrics(&self, record: &MetricsRecord) -> Result<(), StoreError> {
        self.create::<_, serde_json::Value>("server_metrics", record)
            .await?;
        Ok(())
    }

    /// Commands addressed to this agent that have not been executed.
    /// Missing collection or no rows both mean "no pending work".
    pub async fn pending_commands(&self, agent_id: &str) -> Result<Vec<CommandRecord>, StoreError> {
        let filter = format!("agent_id='{agent_id}'&&executed=false");
        self.list("commands", &filter).await
    }

    pub async fn mark_command_executed(&self, command_id: &str) -> Result<(), StoreError> {
        self.update("commands", command_id, &serde_json::json!({ "executed": true }))
            .await
    }

    pub async fn get_container_by_engine_id(
        &self,
        container_id: &str,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        let filter = format!("container_id='{container_id}'");
        let mut items: Vec<ContainerRecord> = self.list("containers", &filter).await?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        })
    }

    pub async fn create_container(
        &self,
        record: &ContainerRecord,
    ) -> Result<ContainerRecord, StoreError> {
        self.create("containers", record).await
    }

    pub async fn update_container(
        &self,
        record_id: &str,
        record: &ContainerRecord,
    ) -> Result<(), StoreError> {
        self.update("containers", record_id, record).await
    }

    pub async fn create_container_metrics(
        &self,
        record: &ContainerMetricsRecord,
    ) -> Result<(), StoreError> {
        self.create::<_, serde_json::Value>("container_metrics", record)
            .await?;
        Ok(())
    }
}
