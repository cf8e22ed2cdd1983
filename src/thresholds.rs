use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "CPU")]
    Cpu,
    Memory,
    Disk,
    Swap,
    Network,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Cpu,
        Category::Memory,
        Category::Disk,
        Category::Swap,
        Category::Network,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Disk => "disk",
            Category::Swap => "swap",
            Category::Network => "network",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Cpu => "CPU",
            Category::Memory => "Memory",
            Category::Disk => "Disk",
            Category::Swap => "Swap",
            Category::Network => "Network",
        };
        f.write_str(label)
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.key() == normalized)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

/// Second, stricter cutoffs that upgrade a High issue to Critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    #[serde(default = "default_cpu_critical")]
    pub cpu_critical: f64,
    #[serde(default = "default_memory_critical")]
    pub memory_critical: f64,
    #[serde(default = "default_disk_critical")]
    pub disk_critical: f64,
    #[serde(default = "default_network_critical")]
    pub network_critical: f64,
}

impl Default for Escalation {
    fn default() -> Self {
        Self {
            cpu_critical: default_cpu_critical(),
            memory_critical: default_memory_critical(),
            disk_critical: default_disk_critical(),
            network_critical: default_network_critical(),
        }
    }
}

impl Escalation {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("cpu_critical", self.cpu_critical),
            ("memory_critical", self.memory_critical),
            ("disk_critical", self.disk_critical),
            ("network_critical", self.network_critical),
        ] {
            check_percent(&format!("escalation.{name}"), value)?;
        }
        Ok(())
    }
}

/// Per-category percentage limits read by every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub swap: f64,
    pub network: f64,
    pub escalation: Escalation,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 80.0,
            memory: 75.0,
            disk: 85.0,
            swap: 50.0,
            network: 80.0,
            escalation: Escalation::default(),
        }
    }
}

impl Thresholds {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Cpu => self.cpu,
            Category::Memory => self.memory,
            Category::Disk => self.disk,
            Category::Swap => self.swap,
            Category::Network => self.network,
        }
    }

    fn set(&mut self, category: Category, value: f64) {
        match category {
            Category::Cpu => self.cpu = value,
            Category::Memory => self.memory = value,
            Category::Disk => self.disk = value,
            Category::Swap => self.swap = value,
            Category::Network => self.network = value,
        }
    }

    /// Applies `category -> percent` overrides. Every entry is validated before
    /// any of them is written, so a rejected map leaves `self` untouched.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, f64>) -> Result<(), ConfigError> {
        let mut parsed = Vec::with_capacity(overrides.len());
        for (key, value) in overrides {
            let category = key.parse::<Category>()?;
            check_percent(&format!("thresholds.{}", category.key()), *value)?;
            parsed.push((category, *value));
        }
        for (category, value) in parsed {
            self.set(category, value);
        }
        Ok(())
    }
}

/// Parses a single `category=value` pair as given on the command line.
pub fn parse_override(raw: &str) -> Result<(String, f64), ConfigError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::Validation(format!("threshold '{raw}' must look like category=value")))?;
    let category = key.parse::<Category>()?;
    let value = value.trim().parse::<f64>().map_err(|_| {
        ConfigError::Validation(format!("threshold '{raw}' has a non-numeric value"))
    })?;
    Ok((category.key().to_string(), value))
}

fn check_percent(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{field} must be within 0..100, got {value}"
        )));
    }
    Ok(())
}

const fn default_cpu_critical() -> f64 {
    95.0
}

const fn default_memory_critical() -> f64 {
    90.0
}

const fn default_disk_critical() -> f64 {
    95.0
}

const fn default_network_critical() -> f64 {
    95.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_applied_case_insensitively() {
        let mut thresholds = Thresholds::default();
        let overrides: BTreeMap<String, f64> =
            [("CPU".to_string(), 90.0), ("network".to_string(), 60.0)]
                .into_iter()
                .collect();
        thresholds.apply_overrides(&overrides).expect("valid overrides");
        assert_eq!(thresholds.cpu, 90.0);
        assert_eq!(thresholds.network, 60.0);
        assert_eq!(thresholds.memory, 75.0);
    }

    #[test]
    fn unknown_category_rejects_whole_map() {
        let mut thresholds = Thresholds::default();
        let overrides: BTreeMap<String, f64> =
            [("cpu".to_string(), 10.0), ("gpu".to_string(), 50.0)]
                .into_iter()
                .collect();
        let err = thresholds.apply_overrides(&overrides).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCategory(ref k) if k == "gpu"));
        assert_eq!(thresholds, Thresholds::default());
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let mut thresholds = Thresholds::default();
        let overrides: BTreeMap<String, f64> =
            [("disk".to_string(), 120.0)].into_iter().collect();
        assert!(matches!(
            thresholds.apply_overrides(&overrides),
            Err(ConfigError::Validation(_))
        ));

        let overrides: BTreeMap<String, f64> =
            [("swap".to_string(), f64::NAN)].into_iter().collect();
        assert!(thresholds.apply_overrides(&overrides).is_err());
        assert_eq!(thresholds, Thresholds::default());
    }

    #[test]
    fn parse_override_accepts_pairs() {
        assert_eq!(parse_override("Memory=66.5").unwrap(), ("memory".to_string(), 66.5));
        assert!(parse_override("memory").is_err());
        assert!(parse_override("memory=lots").is_err());
        assert!(matches!(
            parse_override("temp=80"),
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[test]
    fn escalation_validation() {
        let mut escalation = Escalation::default();
        assert!(escalation.validate().is_ok());
        escalation.memory_critical = -1.0;
        assert!(escalation.validate().is_err());
    }
}
