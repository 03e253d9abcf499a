//! CPU usage sampling from /proc/stat tick counters
//!
//! Usage is derived from the delta between two categorized tick
//! snapshots: `idle' = idle + iowait`, everything else is busy time.
//! A single delta is noisy at short horizons, so the public entry point
//! averages three samples taken ~100ms apart.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::time::Instant;

/// Spacing between the averaged samples
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
/// Samples averaged per public reading
const SAMPLE_COUNT: usize = 3;
/// Minimum elapsed time before a delta is trusted
const MIN_DELTA: Duration = Duration::from_millis(50);
/// Warm-up wait when no prior baseline exists
const WARMUP: Duration = Duration::from_millis(200);

/// Categorized cumulative CPU tick counters from the `cpu` line of /proc/stat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
}

impl CpuTicks {
    /// Idle time including I/O wait
    fn idle_all(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Busy time across all non-idle categories
    fn busy(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }

    pub fn total(&self) -> u64 {
        self.idle_all() + self.busy()
    }
}

/// Parse the aggregate `cpu ` line out of /proc/stat contents
pub fn parse_proc_stat(content: &str) -> Result<CpuTicks> {
    for line in content.lines() {
        let Some(rest) = line.strip_prefix("cpu ") else {
            continue;
        };
        let fields: Vec<u64> = rest
            .split_whitespace()
            .map(|f| f.parse().unwrap_or(0))
            .collect();
        if fields.len() < 7 {
            continue;
        }
        return Ok(CpuTicks {
            user: fields[0],
            nice: fields[1],
            system: fields[2],
            idle: fields[3],
            iowait: fields[4],
            irq: fields[5],
            softirq: fields[6],
            steal: fields.get(7).copied().unwrap_or(0),
            guest: fields.get(8).copied().unwrap_or(0),
        });
    }
    anyhow::bail!("no aggregate cpu line in /proc/stat")
}

/// Usage percentage between two tick snapshots, clamped to [0, 100].
///
/// Returns `None` when the later snapshot's total is below the earlier
/// one's. That is a counter reset (reboot), not a negative delta, and
/// the caller must re-baseline instead of reporting a value.
pub fn cpu_percent(prev: &CpuTicks, curr: &CpuTicks) -> Option<f64> {
    let prev_total = prev.total();
    let curr_total = curr.total();
    if curr_total < prev_total {
        return None;
    }

    let total_diff = curr_total - prev_total;
    if total_diff == 0 {
        return Some(0.0);
    }
    let idle_diff = curr.idle_all().saturating_sub(prev.idle_all());

    let usage = (total_diff.saturating_sub(idle_diff)) as f64 / total_diff as f64 * 100.0;
    Some(usage.clamp(0.0, 100.0))
}

/// Stateful CPU delta sampler
pub struct CpuSampler {
    proc_root: PathBuf,
    last: Option<(CpuTicks, Instant)>,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler {
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

    /// Average CPU usage percentage over three closely-spaced samples.
    ///
    /// Invalid samples (unreadable counters, reset baselines) are
    /// dropped from the average; if nothing valid remains the reading
    /// is 0 rather than an error.
    pub async fn sample(&mut self) -> f64 {
        let mut total = 0.0;
        let mut valid = 0usize;

        for i in 0..SAMPLE_COUNT {
            if let Some(usage) = self.single_sample().await {
                if (0.0..=100.0).contains(&usage) {
                    total += usage;
                    valid += 1;
                }
            }
            if i < SAMPLE_COUNT - 1 {
                tokio::time::sleep(SAMPLE_INTERVAL).await;
            }
        }

        if valid == 0 {
            return 0.0;
        }
        // Two decimal places
        (total / valid as f64 * 100.0).trunc() / 100.0
    }

    async fn single_sample(&mut self) -> Option<f64> {
        let curr = self.read_ticks().await.ok()?;
        let now = Instant::now();

        let Some((prev, prev_at)) = self.last else {
            // No baseline yet: prime with this snapshot, wait, and
            // compute the first delta from a second one.
            self.last = Some((curr, now));
            tokio::time::sleep(WARMUP).await;
            let next = self.read_ticks().await.ok()?;
            self.last = Some((next, Instant::now()));
            return cpu_percent(&curr, &next);
        };

        if now.duration_since(prev_at) < MIN_DELTA {
            // Too little time has passed for a trustworthy delta
            return None;
        }

        let usage = cpu_percent(&prev, &curr);
        self.last = Some((curr, now));
        usage
    }

    async fn read_ticks(&self) -> Result<CpuTicks> {
        let path = self.proc_root.join("stat");
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_proc_stat(&content)
    }
}
