use std::ffi::CString;
use std::fs;

/// Filesystem usage for one mount point, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskStats {
    pub mount_point: String,
    pub device: String,
    pub filesystem: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
}

impl DiskStats {
    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    pub fn used_gb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

pub struct DiskCollector;

impl DiskCollector {
    pub fn new() -> Self {
        Self
    }

    /// Usage of the root filesystem. Zeroed stats when `statvfs` fails.
    pub fn root_stats(&self) -> DiskStats {
        let mut stats = DiskStats {
            mount_point: "/".to_string(),
            device: "rootfs".to_string(),
            ..DiskStats::default()
        };
        if let Some((total, available, used)) = statvfs("/") {
            stats.total_bytes = total;
            stats.available_bytes = available;
            stats.used_bytes = used;
        }
        stats
    }

    /// Usage of every real filesystem in `/proc/mounts`, skipping virtual
    /// filesystems and loop devices.
    pub fn all_mounts(&self) -> Vec<DiskStats> {
        let content = match fs::read_to_string("/proc/mounts") {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read /proc/mounts");
                return Vec::new();
            }
        };

        let mut all = Vec::new();
        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let (Some(device), Some(mount_point), Some(filesystem)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };

            if is_virtual_filesystem(filesystem) || device.starts_with("/dev/loop") {
                continue;
            }

            if let Some((total, available, used)) = statvfs(mount_point) {
                if total == 0 {
                    continue;
                }
                all.push(DiskStats {
                    mount_point: mount_point.to_string(),
                    device: device.to_string(),
                    filesystem: filesystem.to_string(),
                    total_bytes: total,
                    available_bytes: available,
                    used_bytes: used,
                });
            }
        }
        all
    }

    pub fn usage_percent(&self) -> f64 {
        self.root_stats().usage_percent()
    }
}

impl Default for DiskCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// (total, available, used) in bytes, or None on failure.
fn statvfs(path: &str) -> Option<(u64, u64, u64)> {
    let c_path = CString::new(path).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        tracing::error!(path, "statvfs failed");
        return None;
    }

    let block_size = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * block_size;
    let available = stat.f_bavail as u64 * block_size;
    let used = total.saturating_sub(stat.f_bfree as u64 * block_size);
    Some((total, available, used))
}

fn is_virtual_filesystem(filesystem: &str) -> bool {
    matches!(
        filesystem,
        "proc"
            | "sysfs"
            | "devtmpfs"
            | "devpts"
            | "tmpfs"
            | "cgroup"
            | "cgroup2"
            | "securityfs"
            | "pstore"
            | "debugfs"
            | "tracefs"
            | "configfs"
            | "fusectl"
            | "hugetlbfs"
            | "mqueue"
            | "binfmt_misc"
            | "autofs"
            | "overlay"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_stats_reports_nonzero_totals() {
        let stats = DiskCollector::new().root_stats();
        assert_eq!(stats.mount_point, "/");
        assert!(stats.total_bytes > 0);
        assert!(stats.used_bytes <= stats.total_bytes);
        let pct = stats.usage_percent();
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn zero_total_yields_zero_percent() {
        let stats = DiskStats::default();
        assert_eq!(stats.usage_percent(), 0.0);
    }

    #[test]
    fn all_mounts_skips_zero_sized_filesystems() {
        for stats in DiskCollector::new().all_mounts() {
            assert!(stats.total_bytes > 0);
            assert!(!stats.mount_point.is_empty());
            assert!(!is_virtual_filesystem(&stats.filesystem));
        }
    }

    #[test]
    fn collector_usage_percent_is_in_range() {
        let pct = DiskCollector::new().usage_percent();
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn virtual_filesystems_are_recognized() {
        assert!(is_virtual_filesystem("tmpfs"));
        assert!(is_virtual_filesystem("cgroup2"));
        assert!(!is_virtual_filesystem("ext4"));
        assert!(!is_virtual_filesystem("xfs"));
    }
}
