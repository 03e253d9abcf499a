//! Network throughput sampling for the representative interface
//!
//! Aggregating every interface double-counts bridges and virtual
//! devices, so the sampler picks one physical interface: the default
//! route's interface when one exists, else the best-named up interface
//! holding a real IPv4 address. Rates come from the byte-counter delta
//! against the previous call.

use std::collections::HashMap;
use std::path::PathBuf;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tokio::fs;
use tokio::time::Instant;

use crate::models::NetworkUsage;

/// Name prefixes of common physical interfaces, in preference order
const PREFIX_PRIORITY: &[&str] = &["eth", "ens", "enp", "eno", "em", "bond", "br"];

/// What interface selection needs to know about one interface
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
    /// Holds a non-loopback IPv4 address
    pub has_ipv4: bool,
    /// Holds any address at all
    pub has_addr: bool,
}

/// Pick the representative interface.
///
/// Preference order: the default-route interface; then the first up,
/// non-loopback interface matching a priority name prefix with a valid
/// IPv4 address; then any up, non-loopback interface with an address.
/// `None` means the caller should fall back to aggregating counters.
pub fn select_interface(
    interfaces: &[InterfaceInfo],
    default_route: Option<&str>,
) -> Option<String> {
    if let Some(route_iface) = default_route {
        return Some(route_iface.to_string());
    }

    for prefix in PREFIX_PRIORITY {
        for iface in interfaces {
            if iface.is_up && !iface.is_loopback && iface.name.starts_with(prefix) && iface.has_ipv4
            {
                return Some(iface.name.clone());
            }
        }
    }

    interfaces
        .iter()
        .find(|i| i.is_up && !i.is_loopback && i.has_addr)
        .map(|i| i.name.clone())
}

/// Cumulative counters for one interface (or an aggregate)
#[derive(Debug, Clone, Copy, Default)]
struct InterfaceCounters {
    rx_bytes: u64,
    rx_packets: u64,
    tx_bytes: u64,
    tx_packets: u64,
}

/// Parse /proc/net/dev, returning counters per interface name
fn parse_net_dev(content: &str) -> HashMap<String, InterfaceCounters> {
    let mut counters = HashMap::new();
    // First two lines are headers
    for line in content.lines().skip(2) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            continue;
        }
        let name = fields[0].trim_end_matches(':').to_string();
        let parse = |s: &str| s.parse::<u64>().unwrap_or(0);
        counters.insert(
            name,
            InterfaceCounters {
                rx_bytes: parse(fields[1]),
                rx_packets: parse(fields[2]),
                tx_bytes: parse(fields[9]),
                tx_packets: parse(fields[10]),
            },
        );
    }
    counters
}

/// Interface name carrying the default route, from /proc/net/route
fn parse_default_route(content: &str) -> Option<String> {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[1] == "00000000" {
            return Some(fields[0].to_string());
        }
    }
    None
}

/// Enumerate interfaces with the facts selection cares about
fn enumerate_interfaces() -> Vec<InterfaceInfo> {
    let mut by_name: HashMap<String, InterfaceInfo> = HashMap::new();
    let mut order = Vec::new();

    let Ok(addrs) = getifaddrs() else {
        return Vec::new();
    };

    for ifaddr in addrs {
        let entry = by_name
            .entry(ifaddr.interface_name.clone())
            .or_insert_with(|| {
                order.push(ifaddr.interface_name.clone());
                InterfaceInfo {
                    name: ifaddr.interface_name.clone(),
                    is_up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                    is_loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                    has_ipv4: false,
                    has_addr: false,
                }
            });

        if let Some(addr) = ifaddr.address {
            entry.has_addr = true;
            if let Some(v4) = addr.as_sockaddr_in() {
                if !v4.ip().is_loopback() {
                    entry.has_ipv4 = true;
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Stateful network delta sampler
pub struct NetworkSampler {
    proc_root: PathBuf,
    last: Option<(InterfaceCounters, Instant)>,
}

impl Default for NetworkSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSampler {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            last: None,
        }
    }

    /// Sampler with a custom proc root (for testing)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            last: None,
        }
    }

    /// Current counters and the rate since the previous call.
    ///
    /// The first call establishes the baseline and reports zero rates.
    /// Unreadable counter files produce an all-zero reading rather than
    /// failing the snapshot.
    pub async fn sample(&mut self) -> NetworkUsage {
        let Some(curr) = self.read_counters().await else {
            return NetworkUsage::default();
        };
        let now = Instant::now();

        let (rx_rate, tx_rate) = match self.last {
            Some((prev, prev_at)) => {
                let elapsed = now.duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    (
                        (curr.rx_bytes.saturating_sub(prev.rx_bytes) as f64 / elapsed) as u64,
                        (curr.tx_bytes.saturating_sub(prev.tx_bytes) as f64 / elapsed) as u64,
                    )
                } else {
                    (0, 0)
                }
            }
            None => (0, 0),
        };

        self.last = Some((curr, now));

        NetworkUsage {
            bytes_received: curr.rx_bytes,
            bytes_sent: curr.tx_bytes,
            packets_received: curr.rx_packets,
            packets_sent: curr.tx_packets,
            rx_rate_bps: rx_rate,
            tx_rate_bps: tx_rate,
        }
    }

    async fn read_counters(&self) -> Option<InterfaceCounters> {
        let content = fs::read_to_string(self.proc_root.join("net/dev"))
            .await
            .ok()?;
        let counters = parse_net_dev(&content);

        let route_content = fs::read_to_string(self.proc_root.join("net/route"))
            .await
            .unwrap_or_default();
        let default_route = parse_default_route(&route_content);

        let selected = select_interface(&enumerate_interfaces(), default_route.as_deref());
        if let Some(name) = selected {
            if let Some(c) = counters.get(&name) {
                return Some(*c);
            }
        }

        // No representative interface resolvable: aggregate everything
        // except loopback.
        let mut total = InterfaceCounters::default();
        for (name, c) in &counters {
            if name == "lo" {
                continue;
            }
            total.rx_bytes += c.rx_bytes;
            total.rx_packets += c.rx_packets;
            total.tx_bytes += c.tx_bytes;
            total.tx_packets += c.tx_packets;
        }
        Some(total)
    }
}
