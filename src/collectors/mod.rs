#[cfg(test)]
pub mod fake;
pub mod system;

use crate::reading::{CpuStats, DiskStats, HostInfo, MemoryStats, NetStats};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("{0} metrics are not supported on this platform")]
    Unsupported(Subsystem),
    #[error("{subsystem} metrics unavailable: {reason}")]
    Unavailable { subsystem: Subsystem, reason: String },
}

impl SourceError {
    pub fn unavailable(subsystem: Subsystem, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            subsystem,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Host,
    Cpu,
    Memory,
    Disk,
    Network,
}

impl Subsystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Host => "host",
            Subsystem::Cpu => "cpu",
            Subsystem::Memory => "memory",
            Subsystem::Disk => "disk",
            Subsystem::Network => "network",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time access to host metrics.
///
/// Calls may block. The sampler runs them on a blocking thread and bounds the
/// whole collection with a timeout.
pub trait MetricSource: Send + 'static {
    fn host(&mut self) -> HostInfo;

    /// Prepares a new collection round. An error here skips the whole tick.
    fn refresh(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn cpu(&mut self) -> Result<CpuStats, SourceError>;
    fn memory(&mut self) -> Result<MemoryStats, SourceError>;
    fn disks(&mut self) -> Result<Vec<DiskStats>, SourceError>;
    fn network(&mut self) -> Result<Vec<NetStats>, SourceError>;
}
