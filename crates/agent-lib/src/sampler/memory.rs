//! Memory usage sampling from /proc/meminfo
//!
//! Used memory is MemTotal - MemAvailable: subtracting MemFree instead
//! would count reclaimable page cache as used. If meminfo is unreadable
//! the sampler degrades to the agent's own process accounting rather
//! than failing the snapshot.

use std::path::PathBuf;

use tokio::fs;

use crate::models::MemoryUsage;

const PAGE_SIZE: u64 = 4096;

/// Memory usage sampler
pub struct MemorySampler {
    proc_root: PathBuf,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Sampler with a custom proc root (for testing)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub async fn sample(&self) -> MemoryUsage {
        match fs::read_to_string(self.proc_root.join("meminfo")).await {
            Ok(content) => match parse_memory_usage(&content) {
                Some(usage) => usage,
                None => self.process_fallback().await,
            },
            Err(_) => self.process_fallback().await,
        }
    }

    /// Degraded estimate from the agent's own statm when host accounting
    /// is unavailable: resident set against total mapped size.
    async fn process_fallback(&self) -> MemoryUsage {
        match fs::read_to_string(self.proc_root.join("self/statm")).await {
            Ok(content) => parse_statm(&content).unwrap_or_default(),
            Err(_) => MemoryUsage::default(),
        }
    }
}

/// Compute used/total/percent from meminfo contents
pub fn parse_memory_usage(content: &str) -> Option<MemoryUsage> {
    let total = crate::sysinfo::parse_meminfo_field(content, "MemTotal")?;
    let available = crate::sysinfo::parse_meminfo_field(content, "MemAvailable")?;
    let used = total.saturating_sub(available);
    let percent = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Some(MemoryUsage {
        used_bytes: used,
        total_bytes: total,
        percent,
    })
}

fn parse_statm(content: &str) -> Option<MemoryUsage> {
    let mut fields = content.split_whitespace();
    let size_pages: u64 = fields.next()?.parse().ok()?;
    let resident_pages: u64 = fields.next()?.parse().ok()?;
    let total = size_pages * PAGE_SIZE;
    let used = resident_pages * PAGE_SIZE;
    let percent = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Some(MemoryUsage {
        used_bytes: used,
        total_bytes: total,
        percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_usage() {
        let content = "MemTotal:       16000000 kB\nMemFree:         2000000 kB\nMemAvailable:    8000000 kB\n";
        let usage = parse_memory_usage(content).unwrap();
        assert_eq!(usage.total_bytes, 16_000_000 * 1024);
        // Used is total minus available, not total minus free
        assert_eq!(usage.used_bytes, 8_000_000 * 1024);
        assert!((usage.percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_memory_usage_missing_available() {
        let content = "MemTotal:       16000000 kB\nMemFree:         2000000 kB\n";
        assert!(parse_memory_usage(content).is_none());
    }

    #[test]
    fn test_parse_statm() {
        let usage = parse_statm("10000 2500 300 10 0 5000 0\n").unwrap();
        assert_eq!(usage.total_bytes, 10_000 * PAGE_SIZE);
        assert_eq!(usage.used_bytes, 2_500 * PAGE_SIZE);
        assert!((usage.percent - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_from_fixture() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("meminfo"),
            "MemTotal:       8000000 kB\nMemAvailable:    6000000 kB\n",
        )
        .unwrap();

        let sampler = MemorySampler::with_proc_root(dir.path());
        let usage = sampler.sample().await;
        assert_eq!(usage.used_bytes, 2_000_000 * 1024);
        assert!((usage.percent - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_degrades_to_process_stats() {
        // No meminfo in the fixture tree, only the process statm
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("self")).unwrap();
        std::fs::write(dir.path().join("self/statm"), "10000 2500 300 10 0 5000 0\n").unwrap();

        let sampler = MemorySampler::with_proc_root(dir.path());
        let usage = sampler.sample().await;
        assert_eq!(usage.total_bytes, 10_000 * PAGE_SIZE);
        assert_eq!(usage.used_bytes, 2_500 * PAGE_SIZE);
    }
}
