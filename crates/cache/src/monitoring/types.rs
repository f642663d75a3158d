//! Shared types for the monitoring module

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Memory pressure level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Normal,
    Warning,
    Critical,
}

impl PressureLevel {
    /// Classify a usage fraction against the thresholds
    pub fn classify(usage: f64, warning: f64, critical: f64) -> Self {
        if usage >= critical {
            Self::Critical
        } else if usage >= warning {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One memory reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Resident set size of the process, bytes
    pub rss: u64,
    pub virtual_memory: u64,
    pub system_total: u64,
    pub system_available: u64,
    /// Bytes held by the cache's own memory tier
    pub tracked_bytes: u64,
    /// Epoch milliseconds
    pub timestamp: u64,
    /// `rss / max_memory`, clamped to `[0, 1]`
    pub usage_percentage: f64,
}

#[derive(Debug, Clone)]
pub struct MemoryPressureConfig {
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub monitoring_interval: Duration,
    /// Run eviction strategies automatically on warning and critical ticks
    pub auto_eviction: bool,
    /// Keep a history of samples
    pub detailed_tracking: bool,
    pub max_history_size: usize,
    /// Budget that usage is measured against; system total when unset
    pub max_memory: Option<u64>,
}

impl Default for MemoryPressureConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            monitoring_interval: Duration::from_secs(5),
            auto_eviction: true,
            detailed_tracking: true,
            max_history_size: 100,
            max_memory: None,
        }
    }
}

/// Aggregated result of one eviction round
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionResult {
    /// Strategies invoked, including those that failed
    pub strategies_executed: usize,
    pub total_items_evicted: u64,
    pub total_memory_freed: u64,
    /// Names of strategies that returned an error or panicked
    pub failed_strategies: Vec<String>,
}

/// Events published by the detector
#[derive(Debug, Clone)]
pub enum PressureEvent {
    /// Published on every sample
    MemoryUpdate(MemoryStats),
    /// Usage entered the warning band
    Warning(MemoryStats),
    /// Usage entered the critical band
    Critical(MemoryStats),
    /// Usage dropped back below the warning threshold
    Recovered(MemoryStats),
    Eviction {
        level: PressureLevel,
        result: EvictionResult,
    },
}
