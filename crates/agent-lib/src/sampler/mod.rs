//! Delta-based statistical samplers
//!
//! Each metric kind gets its own stateful sampler that converts two
//! time-separated raw counter snapshots into a rate or percentage. The
//! samplers are plain owned values: the control loop holds one of each
//! and they never share implicit global state.

mod cpu;
mod disk;
mod memory;
mod network;

pub use cpu::{cpu_percent, parse_proc_stat, CpuSampler, CpuTicks};
pub use disk::DiskSampler;
pub use memory::MemorySampler;
pub use network::{select_interface, InterfaceInfo, NetworkSampler};
