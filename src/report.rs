use crate::evaluator::{evaluate, Issue, Severity};
use crate::history::HistoryBuffer;
use crate::reading::{format_timestamp, HostInfo};
use crate::thresholds::Thresholds;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write report to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub analysis: Vec<AnalysisEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub host_name: String,
    pub platform: Option<String>,
    pub started_at: String,
    pub ended_at: String,
    pub duration_secs: u64,
    /// Human readable form of `duration_secs`, e.g. `5m 3s`.
    pub duration: String,
    pub interval_secs: u64,
    pub sample_count: usize,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub samples_with_issues: usize,
    pub total_issues: usize,
    pub critical_issues: usize,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisEntry {
    pub timestamp: String,
    pub issues: Vec<Issue>,
}

/// Wall-clock bounds of a monitoring run, in unix milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RunInfo {
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub interval: Duration,
}

pub struct ReportBuilder {
    host: HostInfo,
    run: RunInfo,
}

impl ReportBuilder {
    pub fn new(host: HostInfo, run: RunInfo) -> Self {
        Self { host, run }
    }

    /// Re-evaluates every retained reading, oldest first. The output depends
    /// only on the arguments.
    pub fn build(&self, history: &HistoryBuffer, thresholds: &Thresholds) -> Report {
        let mut summary = ReportSummary::default();
        let analysis: Vec<AnalysisEntry> = history
            .iter()
            .map(|reading| {
                let issues = evaluate(reading, thresholds);
                if !issues.is_empty() {
                    summary.samples_with_issues += 1;
                }
                for issue in &issues {
                    summary.total_issues += 1;
                    if issue.severity == Severity::Critical {
                        summary.critical_issues += 1;
                    }
                    *summary
                        .by_category
                        .entry(issue.category.to_string())
                        .or_insert(0) += 1;
                }
                AnalysisEntry {
                    timestamp: format_timestamp(reading.timestamp_ms),
                    issues,
                }
            })
            .collect();

        let elapsed_ms = self.run.ended_at_ms.saturating_sub(self.run.started_at_ms).max(0);
        let duration_secs = (elapsed_ms / 1000) as u64;

        Report {
            metadata: ReportMetadata {
                host_name: self.host.display_name().to_string(),
                platform: self.host.platform.clone(),
                started_at: format_timestamp(self.run.started_at_ms),
                ended_at: format_timestamp(self.run.ended_at_ms),
                duration_secs,
                duration: humantime::format_duration(Duration::from_secs(duration_secs))
                    .to_string(),
                interval_secs: self.run.interval.as_secs(),
                sample_count: analysis.len(),
                thresholds: *thresholds,
            },
            summary,
            analysis,
        }
    }
}

pub fn write_report(report: &Report, path: impl AsRef<Path>) -> Result<(), ReportError> {
    let path = path.as_ref();
    let mut body = serde_json::to_vec_pretty(report)?;
    body.push(b'\n');
    fs::write(path, body).map_err(|source| ReportError::Write {
        path: path.display().to_string(),
        source,
    })
}
