//! Host monitoring agent library
//!
//! This crate provides the core functionality for:
//! - Host resource sampling (CPU, memory, disk, network)
//! - Container stats collection through the Docker CLI
//! - Record store synchronization and reconciliation
//! - Remote pause/resume/reconfigure commands
//! - Observability (Prometheus metrics, structured logging)

pub mod container;
pub mod control;
pub mod models;
pub mod observability;
pub mod sampler;
pub mod snapshot;
pub mod store;
pub mod sysinfo;

pub use control::{Agent, AgentOptions, ControlState, AGENT_VERSION};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
