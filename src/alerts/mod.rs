pub mod webhook;

use crate::evaluator::Issue;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram delivery failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Out-of-band receiver of a tick's issues. Deliveries are best effort and
/// never retried.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn deliver(&self, issues: &[Issue]) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
    delivery_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            delivery_timeout,
        }
    }

    pub fn register(&mut self, sink: impl AlertSink) {
        self.sinks.push(Arc::new(sink));
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Hands `issues` to every sink in registration order. Each delivery runs
    /// in its own task, so an error or panic in one sink is logged and the
    /// remaining sinks still run.
    pub async fn dispatch(&self, issues: &[Issue]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if issues.is_empty() {
            return summary;
        }
        let issues: Arc<[Issue]> = issues.into();

        for sink in &self.sinks {
            let name = sink.name().to_string();
            let task_sink = Arc::clone(sink);
            let task_issues = Arc::clone(&issues);
            let handle = tokio::spawn(async move { task_sink.deliver(&task_issues).await });

            match time::timeout(self.delivery_timeout, handle).await {
                Ok(Ok(Ok(()))) => summary.delivered.push(name),
                Ok(Ok(Err(err))) => {
                    warn!(sink = %name, error = %err, "alert delivery failed");
                    summary.failed.push(name);
                }
                Ok(Err(join_err)) => {
                    warn!(sink = %name, error = %join_err, "alert sink panicked");
                    summary.failed.push(name);
                }
                Err(_elapsed) => {
                    warn!(
                        sink = %name,
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "alert delivery timed out, leaving it detached"
                    );
                    summary.failed.push(name);
                }
            }
        }
        summary
    }
}

/// Writes every issue to the log at warn level.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, issues: &[Issue]) -> Result<(), SinkError> {
        info!(count = issues.len(), "detected potential bottlenecks");
        for issue in issues {
            warn!(
                category = %issue.category,
                severity = %issue.severity,
                details = %issue.details,
                "{}",
                issue.message
            );
        }
        Ok(())
    }
}
