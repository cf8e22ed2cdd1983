use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One timestamped snapshot of every monitored subsystem.
///
/// A `None` subsystem means the source could not read it during this tick.
/// It is never substituted with zeroes, which would look healthy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp_ms: i64,
    pub cpu: Option<CpuStats>,
    pub memory: Option<MemoryStats>,
    pub disks: Option<Vec<DiskStats>>,
    pub network: Option<Vec<NetStats>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuStats {
    pub total_percent: f64,
    pub per_core_percent: Vec<f64>,
    pub frequency_mhz: Option<u64>,
    pub load_average: Option<LoadAverage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub ram: RamStats,
    pub swap: SwapStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RamStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub cached_bytes: Option<u64>,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    /// `None` when the host has no swap configured.
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStats {
    pub device: String,
    pub mount: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetStats {
    pub iface: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub link_speed_bytes_per_sec: Option<u64>,
    pub sent_bytes_per_sec: Option<f64>,
    pub recv_bytes_per_sec: Option<f64>,
}

impl NetStats {
    pub fn new(iface: impl Into<String>, bytes_sent: u64, bytes_recv: u64) -> Self {
        Self {
            iface: iface.into(),
            bytes_sent,
            bytes_recv,
            packets_sent: 0,
            packets_recv: 0,
            link_speed_bytes_per_sec: None,
            sent_bytes_per_sec: None,
            recv_bytes_per_sec: None,
        }
    }
}

/// Static facts about the monitored host, used in reports and notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostInfo {
    pub host_name: Option<String>,
    pub platform: Option<String>,
}

impl HostInfo {
    pub fn display_name(&self) -> &str {
        self.host_name.as_deref().unwrap_or("unknown-host")
    }
}

pub fn percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some((used as f64 / total as f64) * 100.0)
    }
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn format_timestamp(ms: i64) -> String {
    let st = UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64);
    humantime::format_rfc3339_millis(st).to_string()
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    (bytes as f64) / 1024.0 / 1024.0 / 1024.0
}

pub fn bytes_per_sec_human(v: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    if v >= GB {
        format!("{:.2} GB/s", v / GB)
    } else if v >= MB {
        format!("{:.2} MB/s", v / MB)
    } else if v >= KB {
        format!("{:.2} KB/s", v / KB)
    } else {
        format!("{:.0} B/s", v)
    }
}
