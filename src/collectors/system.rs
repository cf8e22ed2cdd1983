use crate::collectors::{MetricSource, SourceError, Subsystem};
use crate::reading::{
    percent, CpuStats, DiskStats, HostInfo, LoadAverage, MemoryStats, NetStats, RamStats,
    SwapStats,
};
#[cfg(target_os = "linux")]
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

/// `MetricSource` backed by `sysinfo`, with procfs/sysfs reads on Linux for
/// the values sysinfo does not expose (page cache size, link speed).
pub struct SysinfoSource {
    system: System,
    last_cpu_refresh: Instant,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // cpu usage is a delta between two refreshes; prime the first one
        system.refresh_cpu();
        system.refresh_networks_list();
        Self {
            system,
            last_cpu_refresh: Instant::now(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn host(&mut self) -> HostInfo {
        let platform = [
            self.system.name(),
            self.system.os_version(),
            self.system.kernel_version().map(|k| format!("kernel {k}")),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        HostInfo {
            host_name: self.system.host_name(),
            platform: if platform.is_empty() {
                None
            } else {
                Some(platform.join(" "))
            },
        }
    }

    fn refresh(&mut self) -> Result<(), SourceError> {
        if !System::IS_SUPPORTED {
            return Err(SourceError::Unsupported(Subsystem::Host));
        }
        // usage read before the minimum interval comes back as 0%
        let wait = cpu_settle_delay(
            self.last_cpu_refresh.elapsed(),
            System::MINIMUM_CPU_UPDATE_INTERVAL,
        );
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "waiting for cpu counters to settle");
            thread::sleep(wait);
        }
        self.system.refresh_cpu();
        self.last_cpu_refresh = Instant::now();
        self.system.refresh_memory();
        self.system.refresh_disks_list();
        self.system.refresh_disks();
        self.system.refresh_networks_list();
        self.system.refresh_networks();
        Ok(())
    }

    fn cpu(&mut self) -> Result<CpuStats, SourceError> {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(SourceError::unavailable(Subsystem::Cpu, "no cpus reported"));
        }

        let per_core_percent: Vec<f64> = cpus.iter().map(|c| c.cpu_usage() as f64).collect();
        let total_percent = per_core_percent.iter().sum::<f64>() / per_core_percent.len() as f64;
        let frequency_mhz = cpus.first().map(|c| c.frequency()).filter(|f| *f > 0);

        Ok(CpuStats {
            total_percent,
            per_core_percent,
            frequency_mhz,
            load_average: load_average(&self.system),
        })
    }

    fn memory(&mut self) -> Result<MemoryStats, SourceError> {
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SourceError::unavailable(
                Subsystem::Memory,
                "total memory reported as zero",
            ));
        }
        let available = self.system.available_memory();
        let used = self.system.used_memory();
        let ram = RamStats {
            total_bytes: total,
            available_bytes: available,
            used_bytes: used,
            cached_bytes: read_cached_bytes(),
            percent: percent(total.saturating_sub(available), total).unwrap_or(0.0),
        };

        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();
        let swap = SwapStats {
            total_bytes: swap_total,
            used_bytes: swap_used,
            percent: percent(swap_used, swap_total),
        };

        Ok(MemoryStats { ram, swap })
    }

    fn disks(&mut self) -> Result<Vec<DiskStats>, SourceError> {
        let disks: Vec<DiskStats> = self
            .system
            .disks()
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| {
                let total = d.total_space();
                let used = total.saturating_sub(d.available_space());
                DiskStats {
                    device: d.name().to_string_lossy().to_string(),
                    mount: d.mount_point().to_string_lossy().to_string(),
                    total_bytes: total,
                    used_bytes: used,
                    percent: percent(used, total).unwrap_or(0.0),
                }
            })
            .collect();

        if disks.is_empty() {
            return Err(SourceError::unavailable(Subsystem::Disk, "no partitions reported"));
        }
        Ok(disks)
    }

    fn network(&mut self) -> Result<Vec<NetStats>, SourceError> {
        let net: Vec<NetStats> = self
            .system
            .networks()
            .iter()
            .map(|(iface, data)| NetStats {
                iface: iface.to_string(),
                bytes_sent: data.total_transmitted(),
                bytes_recv: data.total_received(),
                packets_sent: data.total_packets_transmitted(),
                packets_recv: data.total_packets_received(),
                link_speed_bytes_per_sec: read_link_speed(iface),
                sent_bytes_per_sec: None,
                recv_bytes_per_sec: None,
            })
            .collect();

        if net.is_empty() {
            return Err(SourceError::unavailable(
                Subsystem::Network,
                "no interfaces reported",
            ));
        }
        Ok(net)
    }
}

#[cfg(not(target_os = "windows"))]
fn load_average(system: &System) -> Option<LoadAverage> {
    let load = system.load_average();
    Some(LoadAverage {
        one: load.one,
        five: load.five,
        fifteen: load.fifteen,
    })
}

#[cfg(target_os = "windows")]
fn load_average(_system: &System) -> Option<LoadAverage> {
    None
}

#[cfg(target_os = "linux")]
fn read_cached_bytes() -> Option<u64> {
    let text = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_kb(&text, "Cached").map(|kb| kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn read_cached_bytes() -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn read_link_speed(iface: &str) -> Option<u64> {
    let raw = fs::read_to_string(format!("/sys/class/net/{iface}/speed")).ok()?;
    let speed = parse_link_speed_mbps(&raw);
    if speed.is_none() {
        debug!(iface, raw = raw.trim(), "link speed unknown");
    }
    speed
}

#[cfg(not(target_os = "linux"))]
fn read_link_speed(iface: &str) -> Option<u64> {
    debug!(iface, "link speed not available on this platform");
    None
}

fn cpu_settle_delay(since_last_refresh: Duration, minimum: Duration) -> Duration {
    minimum.saturating_sub(since_last_refresh)
}

/// sysfs reports Mbit/s, `-1` for virtual or disconnected links.
fn parse_link_speed_mbps(raw: &str) -> Option<u64> {
    let mbps = raw.trim().parse::<i64>().ok()?;
    if mbps <= 0 {
        return None;
    }
    Some(mbps as u64 * 1_000_000 / 8)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo_kb(text: &str, key: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        rest.split_whitespace().next()?.parse::<u64>().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_speed_is_converted_to_bytes() {
        assert_eq!(parse_link_speed_mbps("1000\n"), Some(125_000_000));
        assert_eq!(parse_link_speed_mbps("-1\n"), None);
        assert_eq!(parse_link_speed_mbps("0"), None);
        assert_eq!(parse_link_speed_mbps("garbage"), None);
    }

    #[test]
    fn settle_delay_covers_the_rest_of_the_interval() {
        let minimum = Duration::from_millis(200);
        assert_eq!(
            cpu_settle_delay(Duration::from_millis(5), minimum),
            Duration::from_millis(195)
        );
        assert_eq!(cpu_settle_delay(minimum, minimum), Duration::ZERO);
        assert_eq!(cpu_settle_delay(Duration::from_secs(5), minimum), Duration::ZERO);
    }

    #[test]
    fn refresh_right_after_new_waits_for_valid_cpu_usage() {
        if !System::IS_SUPPORTED {
            return;
        }
        let started = Instant::now();
        let mut source = SysinfoSource::new();
        source.refresh().expect("refresh");
        assert!(started.elapsed() >= System::MINIMUM_CPU_UPDATE_INTERVAL);

        let cpu = source.cpu().expect("cpu");
        assert!(!cpu.per_core_percent.is_empty());
        assert!(cpu.total_percent.is_finite());

        // a second refresh inside the interval waits again
        let previous = source.last_cpu_refresh;
        source.refresh().expect("refresh");
        assert!(
            source.last_cpu_refresh.duration_since(previous)
                >= System::MINIMUM_CPU_UPDATE_INTERVAL
        );
    }

    #[test]
    fn meminfo_lookup_matches_exact_key() {
        let text = "MemTotal:       16314464 kB\nSwapCached:        1024 kB\nCached:          2048 kB\n";
        assert_eq!(parse_meminfo_kb(text, "Cached"), Some(2048));
        assert_eq!(parse_meminfo_kb(text, "MemTotal"), Some(16_314_464));
        assert_eq!(parse_meminfo_kb(text, "Buffers"), None);
    }
}
