use crate::collectors::{MetricSource, SourceError, Subsystem};
use crate::history::HistoryBuffer;
use crate::reading::{now_unix_ms, CpuStats, DiskStats, HostInfo, MemoryStats, NetStats, Reading};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::{task, time};
use tracing::warn;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("metric source failed: {0}")]
    Source(#[from] SourceError),
    #[error("no subsystem produced any data")]
    NoData,
    #[error("metric source did not answer within {0:?}")]
    Timeout(Duration),
    #[error("metric source is still busy with an abandoned collection")]
    Busy,
    #[error("metric collection task failed: {0}")]
    Task(String),
}

impl SampleError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SampleError::Source(_) => "source",
            SampleError::NoData => "no_data",
            SampleError::Timeout(_) => "timeout",
            SampleError::Busy => "busy",
            SampleError::Task(_) => "task",
        }
    }
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Collects one reading per tick and appends it to the shared history.
pub struct Sampler {
    source: Arc<Mutex<Box<dyn MetricSource>>>,
    history: Arc<RwLock<HistoryBuffer>>,
    source_timeout: Duration,
    clock: Clock,
}

struct Collected {
    timestamp_ms: i64,
    cpu: Option<CpuStats>,
    memory: Option<MemoryStats>,
    disks: Option<Vec<DiskStats>>,
    network: Option<Vec<NetStats>>,
}

impl Sampler {
    pub fn new(
        source: impl MetricSource,
        history: Arc<RwLock<HistoryBuffer>>,
        source_timeout: Duration,
    ) -> Self {
        Self {
            source: Arc::new(Mutex::new(Box::new(source))),
            history,
            source_timeout,
            clock: Arc::new(now_unix_ms),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn history(&self) -> Arc<RwLock<HistoryBuffer>> {
        Arc::clone(&self.history)
    }

    pub async fn host_info(&self) -> HostInfo {
        match self.with_source(|source| Ok(source.host())).await {
            Ok(host) => host,
            Err(err) => {
                warn!(error = %err, "host information unavailable");
                HostInfo::default()
            }
        }
    }

    /// Takes one reading. Subsystem failures leave that field unknown; an
    /// error is returned only when nothing could be read at all, in which
    /// case the history is left untouched.
    pub async fn tick(&self) -> Result<Reading, SampleError> {
        let clock = Arc::clone(&self.clock);
        let collected = self
            .with_source(move |source| collect(source, clock.as_ref()))
            .await?;

        let mut history = self.history.write().await;
        let timestamp_ms = collected.timestamp_ms;
        let mut network = collected.network;
        if let (Some(net), Some(previous)) = (network.as_mut(), history.latest()) {
            derive_rates(net, previous, timestamp_ms);
        }

        let reading = Reading {
            timestamp_ms,
            cpu: collected.cpu,
            memory: collected.memory,
            disks: collected.disks,
            network,
        };
        history.push(reading.clone());
        Ok(reading)
    }

    async fn with_source<T, F>(&self, f: F) -> Result<T, SampleError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn MetricSource) -> Result<T, SampleError> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let handle = task::spawn_blocking(move || {
            let mut guard = match source.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return Err(SampleError::Busy),
            };
            f(&mut **guard)
        });

        match time::timeout(self.source_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SampleError::Task(join_err.to_string())),
            Err(_elapsed) => Err(SampleError::Timeout(self.source_timeout)),
        }
    }
}

fn collect(
    source: &mut dyn MetricSource,
    clock: &(dyn Fn() -> i64 + Send + Sync),
) -> Result<Collected, SampleError> {
    source.refresh()?;

    // counters are sampled by refresh, so the reading is stamped here
    let collected = Collected {
        timestamp_ms: clock(),
        cpu: capture(Subsystem::Cpu, source.cpu()),
        memory: capture(Subsystem::Memory, source.memory()),
        disks: capture(Subsystem::Disk, source.disks()),
        network: capture(Subsystem::Network, source.network()),
    };

    if collected.cpu.is_none()
        && collected.memory.is_none()
        && collected.disks.is_none()
        && collected.network.is_none()
    {
        return Err(SampleError::NoData);
    }
    Ok(collected)
}

fn capture<T>(subsystem: Subsystem, result: Result<T, SourceError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(subsystem = %subsystem, error = %err, "metric subsystem unavailable, recording as unknown");
            None
        }
    }
}

/// Fills per-interface byte rates from the previous reading. Rates stay
/// unset when the clock did not move forward, when the interface is new, or
/// when its counter went backwards.
pub fn derive_rates(network: &mut [NetStats], previous: &Reading, now_ms: i64) {
    let Some(prev_net) = previous.network.as_ref() else {
        return;
    };
    let elapsed_secs = now_ms.saturating_sub(previous.timestamp_ms) as f64 / 1000.0;
    if elapsed_secs <= 0.0 {
        return;
    }

    let prev: HashMap<&str, (u64, u64)> = prev_net
        .iter()
        .map(|n| (n.iface.as_str(), (n.bytes_sent, n.bytes_recv)))
        .collect();

    for iface in network {
        if let Some((prev_sent, prev_recv)) = prev.get(iface.iface.as_str()) {
            iface.sent_bytes_per_sec = rate(iface.bytes_sent, *prev_sent, elapsed_secs);
            iface.recv_bytes_per_sec = rate(iface.bytes_recv, *prev_recv, elapsed_secs);
        }
    }
}

fn rate(current: u64, previous: u64, elapsed_secs: f64) -> Option<f64> {
    current
        .checked_sub(previous)
        .map(|delta| delta as f64 / elapsed_secs)
}

/// Subsystems the source failed to read for this reading.
pub fn missing_subsystems(reading: &Reading) -> Vec<Subsystem> {
    let mut missing = Vec::new();
    if reading.cpu.is_none() {
        missing.push(Subsystem::Cpu);
    }
    if reading.memory.is_none() {
        missing.push(Subsystem::Memory);
    }
    if reading.disks.is_none() {
        missing.push(Subsystem::Disk);
    }
    if reading.network.is_none() {
        missing.push(Subsystem::Network);
    }
    missing
}
