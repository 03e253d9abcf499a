//! Host identity and system information
//!
//! Reads the static facts about the host that get reported alongside
//! metrics: OS name/version, kernel, CPU model, total RAM, primary IPv4
//! address, uptime. Everything degrades to a placeholder rather than
//! erroring so record assembly never blocks on a missing /proc entry.

use std::path::{Path, PathBuf};

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tokio::fs;

/// Static description of the host
#[derive(Debug, Clone, Default)]
pub struct SystemInfo {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub architecture: String,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub total_ram_bytes: u64,
    pub ip_address: String,
    pub os_type: String,
}

impl SystemInfo {
    /// One-line summary carried in the server record's system_info field
    pub fn summary(&self) -> String {
        format!(
            "{} {} | {} | Kernel: {} | CPU: {} ({} cores) | RAM: {:.1} GB | IP: {}",
            self.os_name,
            self.os_version,
            self.architecture,
            self.kernel_version,
            self.cpu_model,
            self.cpu_cores,
            self.total_ram_bytes as f64 / 1024.0 / 1024.0 / 1024.0,
            self.ip_address,
        )
    }
}

/// Probes host identity from /proc, /etc/os-release and the interface list
pub struct SystemProbe {
    proc_root: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Probe with a custom proc root (for testing)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub async fn system_info(&self) -> SystemInfo {
        let mut info = SystemInfo {
            hostname: self.hostname().await,
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            ip_address: primary_ipv4().unwrap_or_else(|| "unknown".to_string()),
            os_type: os_type().to_string(),
            ..SystemInfo::default()
        };

        if let Some((name, version)) = read_os_release().await {
            info.os_name = name;
            info.os_version = version;
        }

        if let Ok(content) = fs::read_to_string(self.proc_root.join("version")).await {
            info.kernel_version = parse_kernel_version(&content).unwrap_or_default();
        }

        if let Ok(content) = fs::read_to_string(self.proc_root.join("cpuinfo")).await {
            info.cpu_model = parse_cpu_model(&content).unwrap_or_default();
        }

        if let Ok(content) = fs::read_to_string(self.proc_root.join("meminfo")).await {
            info.total_ram_bytes = parse_meminfo_field(&content, "MemTotal").unwrap_or(0);
        }

        info
    }

    pub async fn hostname(&self) -> String {
        match fs::read_to_string(self.proc_root.join("sys/kernel/hostname")).await {
            Ok(name) => name.trim().to_string(),
            Err(_) => std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        }
    }

    /// System uptime in whole seconds, from /proc/uptime
    pub async fn uptime_secs(&self) -> i64 {
        match fs::read_to_string(self.proc_root.join("uptime")).await {
            Ok(content) => parse_uptime(&content).unwrap_or(0),
            Err(_) => 0,
        }
    }
}

/// Format an uptime as the "NdNhNm" string the server record carries
pub fn format_uptime(uptime_secs: i64) -> String {
    let days = uptime_secs / 86_400;
    let hours = (uptime_secs % 86_400) / 3_600;
    let minutes = (uptime_secs % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

/// First non-loopback IPv4 address on an up interface
pub fn primary_ipv4() -> Option<String> {
    let addrs = getifaddrs().ok()?;
    for ifaddr in addrs {
        if ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK)
            || !ifaddr.flags.contains(InterfaceFlags::IFF_UP)
        {
            continue;
        }
        if let Some(addr) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) {
            let ip = addr.ip();
            if !ip.is_loopback() {
                return Some(ip.to_string());
            }
        }
    }
    None
}

fn os_type() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        _ => "unknown",
    }
}

async fn read_os_release() -> Option<(String, String)> {
    let content = match fs::read_to_string("/etc/os-release").await {
        Ok(c) => c,
        Err(_) => fs::read_to_string("/usr/lib/os-release").await.ok()?,
    };
    parse_os_release(&content)
}

/// Parse NAME and VERSION out of os-release key=value lines
pub fn parse_os_release(content: &str) -> Option<(String, String)> {
    let mut name = None;
    let mut version = None;
    for line in content.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "NAME" => name = Some(value),
                "VERSION" => version = Some(value),
                _ => {}
            }
        }
    }
    Some((name?, version.unwrap_or_default()))
}

/// Extract the release from a "Linux version x.y.z ..." banner
pub fn parse_kernel_version(content: &str) -> Option<String> {
    let line = content.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next() == Some("Linux") && fields.next() == Some("version") {
        return fields.next().map(|s| s.to_string());
    }
    None
}

/// First "model name" entry from /proc/cpuinfo
pub fn parse_cpu_model(content: &str) -> Option<String> {
    for line in content.lines() {
        if line.starts_with("model name") {
            if let Some((_, value)) = line.split_once(':') {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Read a kB-denominated field from /proc/meminfo, returned in bytes
pub fn parse_meminfo_field(content: &str, field: &str) -> Option<u64> {
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if parts.next()?.trim_end_matches(':') == field {
            let kb: u64 = parts.next()?.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Whole-second uptime from the first column of /proc/uptime
pub fn parse_uptime(content: &str) -> Option<i64> {
    let first = content.split_whitespace().next()?;
    first.parse::<f64>().ok().map(|secs| secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let content = "NAME=\"Debian GNU/Linux\"\nVERSION=\"12 (bookworm)\"\nID=debian\n";
        let (name, version) = parse_os_release(content).unwrap();
        assert_eq!(name, "Debian GNU/Linux");
        assert_eq!(version, "12 (bookworm)");
    }

    #[test]
    fn test_parse_kernel_version() {
        let content = "Linux version 6.1.0-18-amd64 (debian-kernel@lists.debian.org) ...";
        assert_eq!(parse_kernel_version(content).unwrap(), "6.1.0-18-amd64");
        assert!(parse_kernel_version("garbage").is_none());
    }

    #[test]
    fn test_parse_cpu_model() {
        let content = "processor\t: 0\nmodel name\t: AMD EPYC 7543 32-Core Processor\n";
        assert_eq!(
            parse_cpu_model(content).unwrap(),
            "AMD EPYC 7543 32-Core Processor"
        );
    }

    #[test]
    fn test_parse_meminfo_field() {
        let content = "MemTotal:       16384000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(
            parse_meminfo_field(content, "MemTotal").unwrap(),
            16_384_000 * 1024
        );
        assert!(parse_meminfo_field(content, "SwapTotal").is_none());
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("12345.67 98765.43\n").unwrap(), 12345);
        assert!(parse_uptime("not-a-number").is_none());
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0d 0h 0m");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
    }
}
