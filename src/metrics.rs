use crate::alerts::DispatchSummary;
use crate::collectors::Subsystem;
use crate::evaluator::Issue;
use crate::reading::Reading;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus view of the monitor itself and of the latest reading.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub resmon_ticks_total: Counter,
    pub resmon_tick_failures_total: CounterVec,
    pub resmon_subsystem_unavailable_total: CounterVec,
    pub resmon_issues_total: CounterVec,
    pub resmon_alert_deliveries_total: CounterVec,
    pub resmon_history_len: Gauge,
    pub resmon_last_tick_timestamp_seconds: Gauge,
    pub resmon_cpu_usage_percent: Gauge,
    pub resmon_ram_usage_percent: Gauge,
    pub resmon_swap_usage_percent: Gauge,
    pub resmon_disk_usage_percent: GaugeVec,
    pub resmon_net_bytes_per_sec: GaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let resmon_ticks_total = Counter::with_opts(opts!(
            "resmon_ticks_total",
            "Ticks that produced a reading"
        ))?;
        let resmon_tick_failures_total = CounterVec::new(
            opts!(
                "resmon_tick_failures_total",
                "Ticks skipped because no reading could be produced"
            ),
            &["reason"],
        )?;
        let resmon_subsystem_unavailable_total = CounterVec::new(
            opts!(
                "resmon_subsystem_unavailable_total",
                "Readings in which a subsystem could not be read"
            ),
            &["subsystem"],
        )?;
        let resmon_issues_total = CounterVec::new(
            opts!("resmon_issues_total", "Issues raised by live evaluation"),
            &["category", "severity"],
        )?;
        let resmon_alert_deliveries_total = CounterVec::new(
            opts!(
                "resmon_alert_deliveries_total",
                "Alert deliveries by sink and outcome"
            ),
            &["sink", "outcome"],
        )?;
        let resmon_history_len = Gauge::with_opts(opts!(
            "resmon_history_len",
            "Readings currently retained in the history buffer"
        ))?;
        let resmon_last_tick_timestamp_seconds = Gauge::with_opts(opts!(
            "resmon_last_tick_timestamp_seconds",
            "Unix time of the latest reading"
        ))?;
        let resmon_cpu_usage_percent = Gauge::with_opts(opts!(
            "resmon_cpu_usage_percent",
            "Average CPU usage across cores in percent (0..100)"
        ))?;
        let resmon_ram_usage_percent =
            Gauge::with_opts(opts!("resmon_ram_usage_percent", "RAM usage in percent"))?;
        let resmon_swap_usage_percent =
            Gauge::with_opts(opts!("resmon_swap_usage_percent", "Swap usage in percent"))?;
        let resmon_disk_usage_percent = GaugeVec::new(
            opts!("resmon_disk_usage_percent", "Disk usage in percent by mount"),
            &["mount"],
        )?;
        let resmon_net_bytes_per_sec = GaugeVec::new(
            opts!(
                "resmon_net_bytes_per_sec",
                "Network throughput in bytes per second by interface and direction"
            ),
            &["iface", "direction"],
        )?;

        register(&registry, &resmon_ticks_total)?;
        register(&registry, &resmon_tick_failures_total)?;
        register(&registry, &resmon_subsystem_unavailable_total)?;
        register(&registry, &resmon_issues_total)?;
        register(&registry, &resmon_alert_deliveries_total)?;
        register(&registry, &resmon_history_len)?;
        register(&registry, &resmon_last_tick_timestamp_seconds)?;
        register(&registry, &resmon_cpu_usage_percent)?;
        register(&registry, &resmon_ram_usage_percent)?;
        register(&registry, &resmon_swap_usage_percent)?;
        register(&registry, &resmon_disk_usage_percent)?;
        register(&registry, &resmon_net_bytes_per_sec)?;

        Ok(Arc::new(Self {
            registry,
            resmon_ticks_total,
            resmon_tick_failures_total,
            resmon_subsystem_unavailable_total,
            resmon_issues_total,
            resmon_alert_deliveries_total,
            resmon_history_len,
            resmon_last_tick_timestamp_seconds,
            resmon_cpu_usage_percent,
            resmon_ram_usage_percent,
            resmon_swap_usage_percent,
            resmon_disk_usage_percent,
            resmon_net_bytes_per_sec,
        }))
    }

    pub fn record_reading(&self, reading: &Reading, missing: &[Subsystem], history_len: usize) {
        self.resmon_ticks_total.inc();
        self.resmon_history_len.set(history_len as f64);
        self.resmon_last_tick_timestamp_seconds
            .set(reading.timestamp_ms as f64 / 1000.0);
        for subsystem in missing {
            self.resmon_subsystem_unavailable_total
                .with_label_values(&[subsystem.as_str()])
                .inc();
        }

        // unknown subsystems must not keep reporting the previous value
        match &reading.cpu {
            Some(cpu) => self.resmon_cpu_usage_percent.set(cpu.total_percent),
            None => self.resmon_cpu_usage_percent.set(f64::NAN),
        }
        match &reading.memory {
            Some(memory) => {
                self.resmon_ram_usage_percent.set(memory.ram.percent);
                self.resmon_swap_usage_percent
                    .set(memory.swap.percent.unwrap_or(f64::NAN));
            }
            None => {
                self.resmon_ram_usage_percent.set(f64::NAN);
                self.resmon_swap_usage_percent.set(f64::NAN);
            }
        }

        self.resmon_disk_usage_percent.reset();
        for d in reading.disks.iter().flatten() {
            self.resmon_disk_usage_percent
                .with_label_values(&[&d.mount])
                .set(d.percent);
        }

        self.resmon_net_bytes_per_sec.reset();
        for n in reading.network.iter().flatten() {
            if let Some(v) = n.sent_bytes_per_sec {
                self.resmon_net_bytes_per_sec
                    .with_label_values(&[&n.iface, "sent"])
                    .set(v);
            }
            if let Some(v) = n.recv_bytes_per_sec {
                self.resmon_net_bytes_per_sec
                    .with_label_values(&[&n.iface, "recv"])
                    .set(v);
            }
        }
    }

    pub fn record_issues(&self, issues: &[Issue]) {
        for issue in issues {
            self.resmon_issues_total
                .with_label_values(&[&issue.category.to_string(), issue.severity.as_str()])
                .inc();
        }
    }

    pub fn record_dispatch(&self, summary: &DispatchSummary) {
        for sink in &summary.delivered {
            self.resmon_alert_deliveries_total
                .with_label_values(&[sink, "delivered"])
                .inc();
        }
        for sink in &summary.failed {
            self.resmon_alert_deliveries_total
                .with_label_values(&[sink, "failed"])
                .inc();
        }
    }

    pub fn inc_tick_failure(&self, reason: &str) {
        self.resmon_tick_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(buf)
    }
}

fn register<C>(registry: &Registry, collector: &C) -> Result<(), prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))
}
