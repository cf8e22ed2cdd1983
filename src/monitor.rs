use crate::alerts::AlertDispatcher;
use crate::config::ConfigError;
use crate::evaluator::{evaluate, Issue};
use crate::history::HistoryBuffer;
use crate::metrics::Metrics;
use crate::reading::{now_unix_ms, HostInfo, Reading};
use crate::sampler::{missing_subsystems, SampleError, Sampler};
use crate::thresholds::Thresholds;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The loop did not finish its tick in time and was left to wind down
    /// on its own.
    Abandoned,
    NotRunning,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub interval: Duration,
    pub failure_backoff: Duration,
    pub stop_timeout: Duration,
}

struct TickContext {
    sampler: Sampler,
    thresholds: Arc<RwLock<Thresholds>>,
    dispatcher: AlertDispatcher,
    metrics: Arc<Metrics>,
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Control {
    phase: Phase,
    run: Option<RunHandle>,
    started_at_ms: Option<i64>,
}

/// Owns the periodic sample → evaluate → alert loop.
pub struct Monitor {
    ctx: Arc<TickContext>,
    settings: LoopSettings,
    control: Mutex<Control>,
}

impl Monitor {
    pub fn new(
        sampler: Sampler,
        thresholds: Thresholds,
        dispatcher: AlertDispatcher,
        metrics: Arc<Metrics>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(TickContext {
                sampler,
                thresholds: Arc::new(RwLock::new(thresholds)),
                dispatcher,
                metrics,
            }),
            settings,
            control: Mutex::new(Control {
                phase: Phase::Idle,
                run: None,
                started_at_ms: None,
            }),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.control().phase
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.control().started_at_ms
    }

    pub fn history(&self) -> Arc<RwLock<HistoryBuffer>> {
        self.ctx.sampler.history()
    }

    pub async fn latest_reading(&self) -> Option<Reading> {
        self.history().read().await.latest().cloned()
    }

    pub async fn host_info(&self) -> HostInfo {
        self.ctx.sampler.host_info().await
    }

    pub async fn thresholds(&self) -> Thresholds {
        *self.ctx.thresholds.read().await
    }

    /// Applies validated overrides; they are picked up by the next tick.
    /// Nothing changes when any entry is rejected.
    pub async fn update_thresholds(
        &self,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<Thresholds, ConfigError> {
        let mut guard = self.ctx.thresholds.write().await;
        let mut updated = *guard;
        updated.apply_overrides(overrides)?;
        *guard = updated;
        info!(?updated, "thresholds updated");
        Ok(updated)
    }

    /// Launches the loop. Returns `false` without doing anything unless the
    /// monitor is idle.
    pub fn start(&self) -> bool {
        let mut control = self.control();
        if control.phase != Phase::Idle {
            debug!(phase = ?control.phase, "start ignored, monitor is not idle");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&self.ctx), self.settings, shutdown_rx));
        control.phase = Phase::Running;
        control.run = Some(RunHandle { shutdown, task });
        control.started_at_ms = Some(now_unix_ms());
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            "monitoring started"
        );
        true
    }

    /// Signals the loop and waits up to the stop timeout for the current tick
    /// to finish. Always ends in `Phase::Idle`.
    pub async fn stop(&self) -> StopOutcome {
        let run = {
            let mut control = self.control();
            if control.phase != Phase::Running {
                return StopOutcome::NotRunning;
            }
            control.phase = Phase::Stopping;
            control.run.take()
        };

        let outcome = match run {
            None => StopOutcome::NotRunning,
            Some(mut run) => {
                let _ = run.shutdown.send(true);
                match time::timeout(self.settings.stop_timeout, &mut run.task).await {
                    Ok(Ok(())) => StopOutcome::Stopped,
                    Ok(Err(join_err)) => {
                        warn!(error = %join_err, "monitoring loop ended abnormally");
                        StopOutcome::Stopped
                    }
                    Err(_elapsed) => {
                        warn!(
                            timeout_ms = self.settings.stop_timeout.as_millis() as u64,
                            "monitoring loop did not finish in time, abandoning it"
                        );
                        StopOutcome::Abandoned
                    }
                }
            }
        };

        self.control().phase = Phase::Idle;
        info!(?outcome, "monitoring stopped");
        outcome
    }
}

async fn run_loop(
    ctx: Arc<TickContext>,
    settings: LoopSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("stop signal received, leaving monitoring loop");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = ctx.run_tick().await {
                    error!(error = %err, reason = err.kind(), "tick skipped, no reading produced");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = time::sleep(settings.failure_backoff) => {}
                    }
                }
            }
        }
    }
}

impl TickContext {
    async fn run_tick(&self) -> Result<Vec<Issue>, SampleError> {
        let thresholds = *self.thresholds.read().await;
        let reading = match self.sampler.tick().await {
            Ok(reading) => reading,
            Err(err) => {
                self.metrics.inc_tick_failure(err.kind());
                return Err(err);
            }
        };

        let history_len = self.sampler.history().read().await.len();
        self.metrics
            .record_reading(&reading, &missing_subsystems(&reading), history_len);

        let issues = evaluate(&reading, &thresholds);
        self.metrics.record_issues(&issues);
        if !issues.is_empty() {
            let summary = self.dispatcher.dispatch(&issues).await;
            self.metrics.record_dispatch(&summary);
        }
        Ok(issues)
    }
}
