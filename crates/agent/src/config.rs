//! Agent configuration
//!
//! Everything comes from `AGENT_`-prefixed environment variables with
//! working defaults; host identity (hostname, IP, OS type) is detected
//! when not set. Validation runs once at startup and is the only fatal
//! configuration path.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::warn;

use agent_lib::{AgentIdentity, AgentOptions};

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Default sampling interval in seconds; the remote record can
    /// override it at runtime
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    #[serde(default = "default_command_check_interval")]
    pub command_check_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Port for the local health/status/control HTTP surface
    #[serde(default = "default_health_check_port")]
    pub health_check_port: u16,

    /// Whether to report through the record store; when false, the
    /// fallback HTTP path is used instead
    #[serde(default = "default_store_enabled")]
    pub store_enabled: bool,

    #[serde(default)]
    pub store_url: String,

    /// Fallback HTTP endpoint, used only when the store is disabled
    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_remote_control_enabled")]
    pub remote_control_enabled: bool,

    /// Display name for the server record; falls back to the hostname
    #[serde(default)]
    pub server_name: String,

    #[serde(default = "detect_hostname")]
    pub hostname: String,

    #[serde(default = "detect_ip_address")]
    pub ip_address: String,

    #[serde(default = "default_os_type")]
    pub os_type: String,

    #[serde(default)]
    pub server_token: String,
}

fn default_agent_id() -> String {
    "monitoring-agent-001".to_string()
}

fn default_check_interval() -> u64 {
    30
}

fn default_report_interval() -> u64 {
    300
}

fn default_command_check_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_health_check_port() -> u16 {
    8081
}

fn default_store_enabled() -> bool {
    true
}

fn default_remote_control_enabled() -> bool {
    true
}

fn default_os_type() -> String {
    // Service deployments are overwhelmingly Linux
    "linux".to_string()
}

fn detect_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Local IP as seen on the default route, found by opening a UDP socket
/// toward a public address. No packet is sent.
fn detect_ip_address() -> String {
    let detected = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());
    match detected {
        Ok(ip) => ip,
        Err(_) => String::new(),
    }
}

impl AgentConfig {
    /// Load configuration from AGENT_-prefixed environment variables
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()?;

        let mut cfg: AgentConfig = source.try_deserialize()?;
        if cfg.server_name.is_empty() {
            cfg.server_name = cfg.hostname.clone();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Fatal configuration checks; anything that can be worked around
    /// at runtime only warns
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.agent_id.is_empty() {
            errors.push("AGENT_AGENT_ID is required");
        }

        if self.store_enabled {
            if self.store_url.is_empty() {
                errors.push("AGENT_STORE_URL is required when the store is enabled");
            }
            if self.server_name.is_empty() {
                errors.push("AGENT_SERVER_NAME is required when the store is enabled");
            }
            if self.server_token.is_empty() {
                errors.push("AGENT_SERVER_TOKEN is required when the store is enabled");
            }
        } else {
            if self.server_url.is_empty() {
                errors.push("AGENT_SERVER_URL is required when the store is disabled");
            }
            if self.api_key.is_empty() {
                warn!("API key not set for HTTP fallback reporting");
            }
        }

        if !errors.is_empty() {
            bail!("configuration errors: {}", errors.join("; "));
        }
        Ok(())
    }

    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            agent_id: self.agent_id.clone(),
            server_name: self.server_name.clone(),
            server_token: self.server_token.clone(),
        }
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            identity: self.identity(),
            check_interval: Duration::from_secs(self.check_interval_secs),
            command_check_interval: Duration::from_secs(self.command_check_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            store_url: if self.store_enabled {
                Some(self.store_url.clone())
            } else {
                None
            },
            fallback_server_url: if self.server_url.is_empty() {
                None
            } else {
                Some(self.server_url.clone())
            },
            fallback_api_key: if self.api_key.is_empty() {
                None
            } else {
                Some(self.api_key.clone())
            },
            remote_control_enabled: self.remote_control_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AgentConfig {
        AgentConfig {
            agent_id: "agent-1".to_string(),
            check_interval_secs: default_check_interval(),
            report_interval_secs: default_report_interval(),
            command_check_interval_secs: default_command_check_interval(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            health_check_port: default_health_check_port(),
            store_enabled: true,
            store_url: "http://store:8090".to_string(),
            server_url: String::new(),
            api_key: String::new(),
            remote_control_enabled: true,
            server_name: "edge-1".to_string(),
            hostname: "edge-1".to_string(),
            ip_address: "10.0.0.5".to_string(),
            os_type: "linux".to_string(),
            server_token: "tok".to_string(),
        }
    }

    #[test]
    fn test_valid_store_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_store_enabled_requires_url_and_token() {
        let mut cfg = base_config();
        cfg.store_url = String::new();
        cfg.server_token = String::new();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("AGENT_STORE_URL"));
        assert!(err.contains("AGENT_SERVER_TOKEN"));
    }

    #[test]
    fn test_store_disabled_requires_fallback_url() {
        let mut cfg = base_config();
        cfg.store_enabled = false;
        assert!(cfg.validate().is_err());

        cfg.server_url = "http://collector:9000".to_string();
        // Missing API key only warns
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_agent_options_mapping() {
        let opts = base_config().agent_options();
        assert_eq!(opts.check_interval, Duration::from_secs(30));
        assert_eq!(opts.store_url.as_deref(), Some("http://store:8090"));
        assert!(opts.fallback_server_url.is_none());

        let mut cfg = base_config();
        cfg.store_enabled = false;
        cfg.server_url = "http://collector:9000".to_string();
        let opts = cfg.agent_options();
        assert!(opts.store_url.is_none());
        assert_eq!(
            opts.fallback_server_url.as_deref(),
            Some("http://collector:9000")
        );
    }
}
