use crate::reading::{bytes_per_sec_human, bytes_to_gb, Reading};
use crate::thresholds::{Category, Thresholds};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Normal,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Normal => "Normal",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One threshold breach found in a single reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    pub details: String,
    pub suggestion: String,
}

fn escalate(value: f64, critical_above: f64) -> Severity {
    if value > critical_above {
        Severity::Critical
    } else {
        Severity::High
    }
}

fn human_rate(rate: Option<f64>) -> String {
    rate.map(bytes_per_sec_human)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Compares one reading against the thresholds. Pure: the same inputs always
/// produce the same issues in the same order (CPU, memory, disks, swap,
/// network). Unknown subsystems produce nothing.
pub fn evaluate(reading: &Reading, thresholds: &Thresholds) -> Vec<Issue> {
    let escalation = &thresholds.escalation;
    let mut issues = Vec::new();

    if let Some(cpu) = &reading.cpu {
        if cpu.total_percent > thresholds.cpu {
            let core_loads = cpu
                .per_core_percent
                .iter()
                .map(|load| format!("{load:.1}%"))
                .collect::<Vec<_>>()
                .join(", ");
            issues.push(Issue {
                category: Category::Cpu,
                severity: escalate(cpu.total_percent, escalation.cpu_critical),
                message: format!("High CPU usage: {:.1}%", cpu.total_percent),
                details: format!("Core loads: {core_loads}"),
                suggestion: "Check CPU-intensive processes with 'top'\nConsider process optimization or load balancing".to_string(),
            });
        }
    }

    if let Some(memory) = &reading.memory {
        let ram = &memory.ram;
        if ram.percent > thresholds.memory {
            let cached = ram
                .cached_bytes
                .map(|c| format!("{:.2} GB", bytes_to_gb(c)))
                .unwrap_or_else(|| "unknown".to_string());
            issues.push(Issue {
                category: Category::Memory,
                severity: escalate(ram.percent, escalation.memory_critical),
                message: format!("High RAM usage: {:.1}%", ram.percent),
                details: format!(
                    "Available: {:.2} GB, used: {:.2} GB, cached: {cached}",
                    bytes_to_gb(ram.available_bytes),
                    bytes_to_gb(ram.used_bytes),
                ),
                suggestion: "Identify memory-hogging processes with 'ps aux --sort=-%mem'\nConsider adding more RAM or optimizing applications".to_string(),
            });
        }
    }

    if let Some(disks) = &reading.disks {
        for disk in disks.iter().filter(|d| d.percent > thresholds.disk) {
            issues.push(Issue {
                category: Category::Disk,
                severity: escalate(disk.percent, escalation.disk_critical),
                message: format!("Disk space low: {} ({:.1}%)", disk.mount, disk.percent),
                details: format!(
                    "Used: {:.2} GB of {:.2} GB on {}",
                    bytes_to_gb(disk.used_bytes),
                    bytes_to_gb(disk.total_bytes),
                    disk.device
                ),
                suggestion: format!(
                    "Clean up disk space on {mount}\nUse 'du -sh {mount}/* | sort -rh' to find large files",
                    mount = disk.mount
                ),
            });
        }
    }

    if let Some(swap_percent) = reading.memory.as_ref().and_then(|m| m.swap.percent) {
        if swap_percent > thresholds.swap {
            let used = reading
                .memory
                .as_ref()
                .map(|m| m.swap.used_bytes)
                .unwrap_or(0);
            issues.push(Issue {
                category: Category::Swap,
                severity: Severity::High,
                message: format!("High swap usage: {swap_percent:.1}%"),
                details: format!("Swap used: {:.2} GB", bytes_to_gb(used)),
                suggestion: "Reduce memory pressure or increase swap space\nCheck for memory leaks in applications".to_string(),
            });
        }
    }

    if let Some(network) = &reading.network {
        for iface in network {
            let Some(link) = iface.link_speed_bytes_per_sec.filter(|l| *l > 0) else {
                continue;
            };
            // a reset counter leaves one direction without a rate
            let Some(peak) = [iface.sent_bytes_per_sec, iface.recv_bytes_per_sec]
                .into_iter()
                .flatten()
                .reduce(f64::max)
            else {
                continue;
            };
            let utilization = peak / link as f64 * 100.0;
            if utilization > thresholds.network {
                issues.push(Issue {
                    category: Category::Network,
                    severity: escalate(utilization, escalation.network_critical),
                    message: format!(
                        "High network utilization: {} ({utilization:.1}%)",
                        iface.iface
                    ),
                    details: format!(
                        "Send: {}, receive: {}, link: {}",
                        human_rate(iface.sent_bytes_per_sec),
                        human_rate(iface.recv_bytes_per_sec),
                        bytes_per_sec_human(link as f64)
                    ),
                    suggestion: "Find the heaviest talkers with 'iftop' or 'nethogs'\nConsider traffic shaping or a faster link".to_string(),
                });
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::{cpu, disk, memory};
    use crate::reading::NetStats;

    fn empty_reading() -> Reading {
        Reading {
            timestamp_ms: 0,
            cpu: None,
            memory: None,
            disks: None,
            network: None,
        }
    }

    fn healthy_reading() -> Reading {
        Reading {
            timestamp_ms: 0,
            cpu: Some(cpu(20.0)),
            memory: Some(memory(40.0, Some(10.0))),
            disks: Some(vec![disk("/", 50.0), disk("/home", 60.0)]),
            network: Some(vec![NetStats {
                link_speed_bytes_per_sec: Some(125_000_000),
                sent_bytes_per_sec: Some(1_000.0),
                recv_bytes_per_sec: Some(2_000.0),
                ..NetStats::new("eth0", 0, 0)
            }]),
        }
    }

    #[test]
    fn healthy_reading_has_no_issues() {
        assert!(evaluate(&healthy_reading(), &Thresholds::default()).is_empty());
        assert!(evaluate(&empty_reading(), &Thresholds::default()).is_empty());
    }

    #[test]
    fn cpu_severity_follows_escalation_cutoff() {
        let thresholds = Thresholds {
            cpu: 80.0,
            ..Thresholds::default()
        };
        let mut reading = healthy_reading();

        reading.cpu = Some(cpu(92.0));
        let issues = evaluate(&reading, &thresholds);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, Category::Cpu);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].message, "High CPU usage: 92.0%");
        assert_eq!(issues[0].details, "Core loads: 92.0%, 92.0%");

        reading.cpu = Some(cpu(97.0));
        let issues = evaluate(&reading, &thresholds);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);

        reading.cpu = Some(cpu(95.0));
        assert_eq!(evaluate(&reading, &thresholds)[0].severity, Severity::High);

        reading.cpu = Some(cpu(80.0));
        assert!(evaluate(&reading, &thresholds).is_empty());
    }

    #[test]
    fn issues_follow_category_order() {
        let mut reading = healthy_reading();
        reading.cpu = Some(cpu(85.0));
        reading.memory = Some(memory(93.0, Some(70.0)));
        reading.disks = Some(vec![disk("/", 99.0), disk("/boot", 10.0), disk("/data", 88.0)]);
        if let Some(net) = reading.network.as_mut() {
            net[0].sent_bytes_per_sec = Some(120_000_000.0);
        }

        let issues = evaluate(&reading, &Thresholds::default());
        let kinds: Vec<(Category, Severity)> =
            issues.iter().map(|i| (i.category, i.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (Category::Cpu, Severity::High),
                (Category::Memory, Severity::Critical),
                (Category::Disk, Severity::Critical),
                (Category::Disk, Severity::High),
                (Category::Swap, Severity::High),
                (Category::Network, Severity::Critical),
            ]
        );
        assert!(issues[2].message.contains("/ (99.0%)"));
        assert!(issues[3].message.contains("/data"));
        assert!(issues[1].details.contains("cached: 1.00 GB"));
    }

    #[test]
    fn network_requires_known_link_speed() {
        let mut reading = empty_reading();
        reading.network = Some(vec![
            NetStats {
                sent_bytes_per_sec: Some(10_000_000_000.0),
                recv_bytes_per_sec: Some(10_000_000_000.0),
                ..NetStats::new("tun0", u64::MAX / 2, u64::MAX / 2)
            },
            NetStats {
                link_speed_bytes_per_sec: Some(0),
                sent_bytes_per_sec: Some(10_000_000_000.0),
                recv_bytes_per_sec: Some(0.0),
                ..NetStats::new("veth0", 0, 0)
            },
            NetStats {
                link_speed_bytes_per_sec: Some(125_000_000),
                ..NetStats::new("eth0", u64::MAX / 2, u64::MAX / 2)
            },
        ]);
        assert!(evaluate(&reading, &Thresholds::default()).is_empty());
    }

    #[test]
    fn network_utilization_uses_faster_direction() {
        let mut reading = empty_reading();
        reading.network = Some(vec![NetStats {
            link_speed_bytes_per_sec: Some(1_000_000),
            sent_bytes_per_sec: Some(100_000.0),
            recv_bytes_per_sec: Some(850_000.0),
            ..NetStats::new("eth0", 0, 0)
        }]);
        let issues = evaluate(&reading, &Thresholds::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].message, "High network utilization: eth0 (85.0%)");
    }

    #[test]
    fn one_sided_rate_is_still_checked() {
        let mut reading = empty_reading();
        reading.network = Some(vec![
            NetStats {
                link_speed_bytes_per_sec: Some(1_000_000),
                sent_bytes_per_sec: None,
                recv_bytes_per_sec: Some(970_000.0),
                ..NetStats::new("eth0", 0, 0)
            },
            NetStats {
                link_speed_bytes_per_sec: Some(1_000_000),
                ..NetStats::new("eth1", 0, 0)
            },
        ]);
        let issues = evaluate(&reading, &Thresholds::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].message, "High network utilization: eth0 (97.0%)");
        assert!(issues[0].details.starts_with("Send: unknown, receive: "));
    }

    #[test]
    fn swap_never_escalates_and_missing_swap_is_ignored() {
        let mut reading = empty_reading();
        reading.memory = Some(memory(10.0, Some(99.0)));
        let issues = evaluate(&reading, &Thresholds::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, Category::Swap);
        assert_eq!(issues[0].severity, Severity::High);

        reading.memory = Some(memory(10.0, None));
        assert!(evaluate(&reading, &Thresholds::default()).is_empty());
    }

    #[test]
    fn unknown_disk_emits_no_disk_issue() {
        let mut reading = healthy_reading();
        reading.disks = None;
        reading.cpu = Some(cpu(90.0));
        let issues = evaluate(&reading, &Thresholds::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, Category::Cpu);
        assert!(issues.iter().all(|i| i.category != Category::Disk));
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Normal < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn issue_serializes_with_display_names() {
        let mut reading = empty_reading();
        reading.cpu = Some(cpu(99.0));
        let issues = evaluate(&reading, &Thresholds::default());
        let json = serde_json::to_value(&issues[0]).expect("serialize issue");
        assert_eq!(json["type"], "CPU");
        assert_eq!(json["severity"], "Critical");
    }
}
