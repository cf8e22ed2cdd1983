mod alerts;
mod collectors;
mod config;
mod evaluator;
mod history;
mod http;
mod metrics;
mod monitor;
mod reading;
mod report;
mod sampler;
mod telegram;
mod thresholds;

use alerts::webhook::WebhookSink;
use alerts::{AlertDispatcher, LogSink};
use axum::serve;
use clap::Parser;
use collectors::system::SysinfoSource;
use config::Config;
use history::HistoryBuffer;
use metrics::Metrics;
use monitor::{LoopSettings, Monitor};
use reading::now_unix_ms;
use report::{write_report, ReportBuilder, RunInfo};
use sampler::Sampler;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramSink;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "resmon")]
#[command(version, about = "Host resource monitor with threshold alerts and JSON reports")]
struct Cli {
    /// YAML config file. Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Time between samples, e.g. `5s`.
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Stop after this long, e.g. `5m`. Runs until Ctrl+C otherwise.
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,
    /// Write the JSON report here on shutdown.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Override one threshold, e.g. `--threshold cpu=90`. Repeatable.
    #[arg(long = "threshold", value_name = "CATEGORY=PERCENT")]
    thresholds: Vec<String>,
    /// Serve /healthz, /metrics and /api/status on this address.
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => fail("failed to load configuration", &err),
        },
        None => Config::default(),
    };
    if let Some(listen) = cli.listen.clone() {
        cfg.listen = Some(listen);
    }
    if let Some(report) = cli.report.clone() {
        cfg.report_path = Some(report);
    }
    if let Err(err) = cfg.validate() {
        fail("invalid configuration", &err);
    }

    let interval = cli
        .interval
        .unwrap_or_else(|| Duration::from_secs(cfg.interval_secs));
    if interval.is_zero() {
        error!("--interval must be greater than zero");
        std::process::exit(1);
    }
    let duration = cli.duration.or(cfg.duration_secs.map(Duration::from_secs));

    let mut overrides = BTreeMap::new();
    for raw in &cli.thresholds {
        match thresholds::parse_override(raw) {
            Ok((key, value)) => {
                overrides.insert(key, value);
            }
            Err(err) => fail("invalid --threshold", &err),
        }
    }
    let initial_thresholds = match cfg.initial_thresholds() {
        Ok(t) => t,
        Err(err) => fail("invalid thresholds", &err),
    };

    let telegram_token = if cfg.telegram.enabled {
        match telegram::resolve_token(&cfg.telegram) {
            Ok(token) => Some(token),
            Err(err) => {
                error!(error = %err, "failed to prepare Telegram settings");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => fail("failed to initialise metrics", &err),
    };

    let history = Arc::new(RwLock::new(HistoryBuffer::new(cfg.history_capacity)));
    let sampler = Sampler::new(
        SysinfoSource::new(),
        history,
        Duration::from_millis(cfg.source_timeout_ms),
    );
    let host = sampler.host_info().await;

    let mut dispatcher = AlertDispatcher::new(Duration::from_millis(cfg.sink_timeout_ms));
    dispatcher.register(LogSink);
    if let Some(webhook) = &cfg.webhook {
        dispatcher.register(WebhookSink::new(webhook, host.clone()));
    }
    if let Some(token) = telegram_token {
        dispatcher.register(TelegramSink::new(token, &cfg.telegram, host.clone()));
    }
    info!(sinks = ?dispatcher.sink_names(), "alert sinks registered");

    let monitor = Arc::new(Monitor::new(
        sampler,
        initial_thresholds,
        dispatcher,
        metrics.clone(),
        LoopSettings {
            interval,
            failure_backoff: Duration::from_millis(cfg.failure_backoff_ms),
            stop_timeout: Duration::from_millis(cfg.stop_timeout_ms),
        },
    ));
    if !overrides.is_empty() {
        if let Err(err) = monitor.update_thresholds(&overrides).await {
            fail("invalid --threshold", &err);
        }
    }

    info!(
        host = host.display_name(),
        interval_ms = interval.as_millis() as u64,
        duration_secs = duration.map(|d| d.as_secs()),
        "starting resmon"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let http_task = cfg.listen.clone().map(|listen| {
        let app = http::build_router(metrics.clone(), monitor.clone());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    return;
                }
            };
            info!(%addr, "status server listening");

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    });

    monitor.start();
    match duration {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => info!("monitoring duration elapsed"),
                res = tokio::signal::ctrl_c() => log_ctrl_c(res),
            }
        }
        None => log_ctrl_c(tokio::signal::ctrl_c().await),
    }

    monitor.stop().await;
    let _ = shutdown_tx.send(true);
    if let Some(task) = http_task {
        let _ = task.await;
    }

    if let Some(path) = &cfg.report_path {
        let run = RunInfo {
            started_at_ms: monitor.started_at_ms().unwrap_or_else(now_unix_ms),
            ended_at_ms: now_unix_ms(),
            interval,
        };
        let thresholds = monitor.thresholds().await;
        let report = {
            let history = monitor.history();
            let guard = history.read().await;
            ReportBuilder::new(host, run).build(&guard, &thresholds)
        };
        if let Err(err) = write_report(&report, path) {
            fail("failed to write report", &err);
        }
        info!(
            path = %path.display(),
            samples = report.metadata.sample_count,
            issues = report.summary.total_issues,
            "report written"
        );
    } else {
        warn!("no report path configured, skipping report");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_ctrl_c(res: std::io::Result<()>) {
    match res {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(err) => error!(error = %err, "failed to wait for Ctrl+C"),
    }
}

fn fail(context: &str, err: &dyn std::error::Error) -> ! {
    error!(error = %err, "{context}");
    std::process::exit(1);
}
