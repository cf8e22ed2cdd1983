use crate::collectors::{MetricSource, SourceError, Subsystem};
use crate::reading::{
    CpuStats, DiskStats, HostInfo, MemoryStats, NetStats, RamStats, SwapStats,
};
use std::collections::HashSet;
use std::time::Duration;

/// Scriptable source for tests. Every call returns the configured values;
/// network byte counters advance by `net_step` per collection.
#[derive(Clone)]
pub struct FakeSource {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disks: Vec<DiskStats>,
    pub net: Vec<NetStats>,
    pub net_step: u64,
    pub failing: HashSet<Subsystem>,
    pub refresh_fails: bool,
    pub delay: Option<Duration>,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            cpu_percent: 10.0,
            ram_percent: 20.0,
            disks: vec![disk("/", 30.0)],
            net: vec![NetStats::new("eth0", 0, 0)],
            net_step: 0,
            failing: HashSet::new(),
            refresh_fails: false,
            delay: None,
        }
    }
}

impl FakeSource {
    pub fn failing(mut self, subsystem: Subsystem) -> Self {
        self.failing.insert(subsystem);
        self
    }

    fn check(&self, subsystem: Subsystem) -> Result<(), SourceError> {
        if self.failing.contains(&subsystem) {
            return Err(SourceError::unavailable(subsystem, "scripted failure"));
        }
        Ok(())
    }
}

impl MetricSource for FakeSource {
    fn host(&mut self) -> HostInfo {
        HostInfo {
            host_name: Some("test-host".to_string()),
            platform: Some("TestOS 1.0".to_string()),
        }
    }

    fn refresh(&mut self) -> Result<(), SourceError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.refresh_fails {
            return Err(SourceError::Unsupported(Subsystem::Host));
        }
        Ok(())
    }

    fn cpu(&mut self) -> Result<CpuStats, SourceError> {
        self.check(Subsystem::Cpu)?;
        Ok(cpu(self.cpu_percent))
    }

    fn memory(&mut self) -> Result<MemoryStats, SourceError> {
        self.check(Subsystem::Memory)?;
        Ok(memory(self.ram_percent, None))
    }

    fn disks(&mut self) -> Result<Vec<DiskStats>, SourceError> {
        self.check(Subsystem::Disk)?;
        Ok(self.disks.clone())
    }

    fn network(&mut self) -> Result<Vec<NetStats>, SourceError> {
        self.check(Subsystem::Network)?;
        let current = self.net.clone();
        for iface in &mut self.net {
            iface.bytes_sent += self.net_step;
            iface.bytes_recv += self.net_step;
        }
        Ok(current)
    }
}

pub fn cpu(total_percent: f64) -> CpuStats {
    CpuStats {
        total_percent,
        per_core_percent: vec![total_percent, total_percent],
        frequency_mhz: Some(2400),
        load_average: None,
    }
}

pub fn memory(ram_percent: f64, swap_percent: Option<f64>) -> MemoryStats {
    const GB: u64 = 1024 * 1024 * 1024;
    let total = 16 * GB;
    let used = (total as f64 * ram_percent / 100.0) as u64;
    let swap_total = if swap_percent.is_some() { 4 * GB } else { 0 };
    MemoryStats {
        ram: RamStats {
            total_bytes: total,
            available_bytes: total - used,
            used_bytes: used,
            cached_bytes: Some(GB),
            percent: ram_percent,
        },
        swap: SwapStats {
            total_bytes: swap_total,
            used_bytes: (swap_total as f64 * swap_percent.unwrap_or(0.0) / 100.0) as u64,
            percent: swap_percent,
        },
    }
}

pub fn disk(mount: &str, used_percent: f64) -> DiskStats {
    const TOTAL: u64 = 100 * 1024 * 1024 * 1024;
    let used = (TOTAL as f64 * used_percent / 100.0) as u64;
    DiskStats {
        device: format!("/dev/fake{}", mount.len()),
        mount: mount.to_string(),
        total_bytes: TOTAL,
        used_bytes: used,
        percent: used_percent,
    }
}
