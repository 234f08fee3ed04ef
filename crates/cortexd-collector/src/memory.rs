use std::fs;

/// Point-in-time memory statistics in bytes, derived from `/proc/meminfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub buffers_bytes: u64,
    pub cached_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

impl MemoryStats {
    pub fn usage_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub struct MemoryCollector;

impl MemoryCollector {
    pub fn new() -> Self {
        Self
    }

    /// Read current stats. An unreadable or empty `/proc/meminfo` yields
    /// all-zero stats rather than an error.
    pub fn stats(&self) -> MemoryStats {
        match fs::read_to_string("/proc/meminfo") {
            Ok(content) => parse_meminfo(&content),
            Err(e) => {
                tracing::error!(error = %e, "Cannot read /proc/meminfo");
                MemoryStats::default()
            }
        }
    }

    pub fn usage_percent(&self) -> f64 {
        self.stats().usage_percent()
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `/proc/meminfo`. Values are reported in kB; used memory is
/// total minus available.
pub fn parse_meminfo(content: &str) -> MemoryStats {
    let mut stats = MemoryStats::default();
    let mut swap_free = 0u64;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(kb) = value.parse::<u64>() else {
            continue;
        };
        let bytes = kb * 1024;

        match key {
            "MemTotal:" => stats.total_bytes = bytes,
            "MemAvailable:" => stats.available_bytes = bytes,
            "Buffers:" => stats.buffers_bytes = bytes,
            "Cached:" => stats.cached_bytes = bytes,
            "SwapTotal:" => stats.swap_total_bytes = bytes,
            "SwapFree:" => swap_free = bytes,
            _ => {}
        }
    }

    stats.used_bytes = stats.total_bytes.saturating_sub(stats.available_bytes);
    stats.swap_used_bytes = stats.swap_total_bytes.saturating_sub(swap_free);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:       16384000 kB
MemFree:         2048000 kB
MemAvailable:    8192000 kB
Buffers:          512000 kB
Cached:          4096000 kB
SwapTotal:       2097152 kB
SwapFree:        1048576 kB
";

    #[test]
    fn parses_meminfo_fields() {
        let stats = parse_meminfo(MEMINFO);
        assert_eq!(stats.total_bytes, 16_384_000 * 1024);
        assert_eq!(stats.available_bytes, 8_192_000 * 1024);
        assert_eq!(stats.used_bytes, (16_384_000 - 8_192_000) * 1024);
        assert_eq!(stats.buffers_bytes, 512_000 * 1024);
        assert_eq!(stats.cached_bytes, 4_096_000 * 1024);
        assert_eq!(stats.swap_used_bytes, 1_048_576 * 1024);
        assert!((stats.usage_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_meminfo_yields_zero_stats() {
        let stats = parse_meminfo("");
        assert_eq!(stats, MemoryStats::default());
        assert_eq!(stats.usage_percent(), 0.0);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let stats = parse_meminfo("MemTotal: garbage kB\nnot a line\n");
        assert_eq!(stats.total_bytes, 0);
    }

    #[test]
    fn collector_reads_live_meminfo() {
        let collector = MemoryCollector::new();
        let stats = collector.stats();
        assert!(stats.total_bytes > 0);
        assert!((0.0..=100.0).contains(&collector.usage_percent()));
    }
}
