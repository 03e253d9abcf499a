//! Record shapes for the remote record store
//!
//! The store is schema-loose: numeric and boolean fields created through
//! its admin UI sometimes come back as strings ("60", "true") and
//! timestamps arrive in more than one layout. All of that tolerance
//! lives here, in `deserialize_with` helpers, so the rest of the agent
//! only ever sees normalized values.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Integer that may arrive as a JSON number, a string, or null
pub fn de_flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Str(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(v)) => v,
        Some(Raw::Float(v)) => v as i64,
        Some(Raw::Str(s)) => s.trim().parse().unwrap_or(0),
        None => 0,
    })
}

/// Float that may arrive as a JSON number, a string, or null
pub fn de_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(v)) => v,
        Some(Raw::Str(s)) => s.trim().parse().unwrap_or(0.0),
        None => 0.0,
    })
}

/// Boolean that may arrive as a JSON bool, a string, or null.
/// String forms "true", "1" and "yes" are true; everything else false.
pub fn de_flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Bool(v)) => v,
        Some(Raw::Str(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        None => false,
    })
}

/// Timestamp in any of the layouts the store emits; unparseable or
/// missing values default to now rather than failing the record.
pub fn de_flexible_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    Ok(parse_flexible_datetime(&raw).unwrap_or_else(Utc::now))
}

fn parse_flexible_datetime(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Some(t.with_timezone(&Utc));
    }
    // Space-separated variants the store's admin UI produces
    for fmt in ["%Y-%m-%d %H:%M:%S%.3fZ", "%Y-%m-%d %H:%M:%SZ", "%Y-%m-%d %H:%M:%S%.3f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(Utc.from_utc_datetime(&t));
        }
    }
    None
}

/// List query envelope
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// One row of the `servers` collection.
///
/// The agent writes most fields but `check_interval` and `containers`
/// belong to the operator: the agent reads them to steer its own
/// behavior and echoes them back unchanged on updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "server_id")]
    pub agent_id: String,
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    pub os_type: String,
    pub status: String,
    pub uptime: String,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub ram_total: i64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub ram_used: i64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub cpu_cores: i64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub cpu_usage: f64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub disk_total: i64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub disk_used: i64,
    pub last_checked: String,
    pub server_token: String,
    pub system_info: String,
    pub agent_status: String,
    /// Operator-requested sampling interval in seconds; 0 means "use
    /// the agent's configured default"
    #[serde(deserialize_with = "de_flexible_i64")]
    pub check_interval: i64,
    /// Operator switch for container monitoring
    #[serde(rename = "containers", deserialize_with = "de_flexible_bool")]
    pub containers_enabled: bool,
}

/// One row of the per-tick `server_metrics` history collection.
/// Capacity fields are strings by store schema, not by choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsRecord {
    #[serde(rename = "server_id")]
    pub agent_id: String,
    pub timestamp: String,
    pub ram_total: String,
    pub ram_used: String,
    pub ram_free: String,
    pub cpu_cores: String,
    pub cpu_usage: String,
    pub cpu_free: String,
    pub disk_total: String,
    pub disk_used: String,
    pub disk_free: String,
    pub status: String,
    pub network_rx_bytes: i64,
    pub network_tx_bytes: i64,
    pub network_rx_speed: i64,
    pub network_tx_speed: i64,
}

/// One row of the `containers` collection, keyed by the engine's
/// container id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub container_id: String,
    pub name: String,
    pub hostname: String,
    pub status: String,
    pub uptime: String,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub ram_total: i64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub ram_used: i64,
    #[serde(deserialize_with = "de_flexible_f64")]
    pub cpu_usage: f64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub disk_total: i64,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub disk_used: i64,
    pub last_checked: String,
}

/// One row of the per-tick `container_metrics` history collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMetricsRecord {
    pub container_id: String,
    pub timestamp: String,
    pub ram_total: String,
    pub ram_used: String,
    pub ram_free: String,
    pub cpu_usage: String,
    pub disk_total: String,
    pub disk_used: String,
    pub disk_free: String,
    pub status: String,
    pub network_rx_bytes: i64,
    pub network_tx_bytes: i64,
    pub network_rx_speed: i64,
    pub network_tx_speed: i64,
}

/// A remote command addressed to this agent
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub agent_id: String,
    pub command: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default, deserialize_with = "de_flexible_bool")]
    pub executed: bool,
    #[serde(
        default = "Utc::now",
        rename = "created",
        deserialize_with = "de_flexible_datetime"
    )]
    pub created_at: DateTime<Utc>,
}
