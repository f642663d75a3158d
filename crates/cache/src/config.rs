//! Cache configuration with precedence and validation
//!
//! Durations are expressed in milliseconds in configuration files and as
//! [`Duration`] in the API. Every field has a default, so a partial file or
//! an empty object is a valid configuration.

use crate::errors::{Error, RecoveryHint, Result};
use crate::monitoring::MemoryPressureConfig;
use crate::storage::compression::{CompressionAlgorithm, CompressionConfig};
use crate::workers::WorkerPoolConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_utils::CircuitBreakerConfig;

/// Configuration of a single cache instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Default time-to-live of entries
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
    /// Byte budget of the in-memory tier; also the largest accepted payload
    pub max_size: u64,
    pub max_memory_entries: usize,
    pub enabled: bool,
    pub compression: CompressionSetting,
    /// Payloads at least this large are compressed
    pub compression_threshold: usize,
    pub enable_checksum: bool,
    /// Secret for HMAC-SHA256 checksums
    pub checksum_secret: Option<String>,
    pub enable_secondary_checksum: bool,
    /// Write entries with temp-then-rename semantics
    pub enable_atomic_ops: bool,
    pub circuit_breaker: CircuitBreakerSetting,
    pub enable_partitioning: bool,
    pub partition_count: usize,
    pub enable_background_workers: bool,
    pub max_background_workers: usize,
    pub worker_queue_size: usize,
    pub worker_batch_size: usize,
    #[serde(with = "duration_ms")]
    pub worker_flush_interval: Duration,
    pub enable_memory_pressure_detection: bool,
    pub memory_warning_threshold: f64,
    pub memory_critical_threshold: f64,
    #[serde(with = "duration_ms")]
    pub memory_monitoring_interval: Duration,
    /// Memory budget in bytes; defaults to total system memory
    pub max_memory: Option<u64>,
    /// Period of the background cleanup timer; zero disables it
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Default deadline applied to storage operations
    #[serde(with = "duration_ms::option")]
    pub operation_timeout: Option<Duration>,
    /// Buffer of the operation event channel
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_size: 100 * 1024 * 1024,
            max_memory_entries: 1000,
            enabled: true,
            compression: CompressionSetting::default(),
            compression_threshold: 1024,
            enable_checksum: true,
            checksum_secret: None,
            enable_secondary_checksum: true,
            enable_atomic_ops: true,
            circuit_breaker: CircuitBreakerSetting::default(),
            enable_partitioning: false,
            partition_count: 16,
            enable_background_workers: false,
            max_background_workers: 4,
            worker_queue_size: 1024,
            worker_batch_size: 100,
            worker_flush_interval: Duration::from_secs(1),
            enable_memory_pressure_detection: false,
            memory_warning_threshold: 0.8,
            memory_critical_threshold: 0.95,
            memory_monitoring_interval: Duration::from_secs(5),
            max_memory: None,
            cleanup_interval: Duration::from_secs(300),
            operation_timeout: None,
            event_capacity: 256,
        }
    }
}

/// `compression: true | false | { ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompressionSetting {
    Enabled(bool),
    Options(CompressionConfig),
}

impl Default for CompressionSetting {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

/// `circuitBreaker: true | false | { ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CircuitBreakerSetting {
    Enabled(bool),
    Options(CircuitBreakerOptions),
}

impl Default for CircuitBreakerSetting {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

/// Serializable form of [`CircuitBreakerConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerOptions {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    #[serde(with = "duration_ms")]
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        let storage = CircuitBreakerConfig::for_storage();
        Self {
            failure_threshold: storage.failure_threshold,
            success_threshold: storage.success_threshold,
            timeout: storage.timeout,
            monitoring_window: storage.monitoring_window,
        }
    }
}

impl From<CircuitBreakerOptions> for CircuitBreakerConfig {
    fn from(options: CircuitBreakerOptions) -> Self {
        CircuitBreakerConfig {
            failure_threshold: options.failure_threshold,
            success_threshold: options.success_threshold,
            timeout: options.timeout,
            monitoring_window: options.monitoring_window,
        }
    }
}

impl CacheConfig {
    /// Compression settings, or `None` when compression is off
    pub fn compression_config(&self) -> Option<CompressionConfig> {
        match &self.compression {
            CompressionSetting::Enabled(false) => None,
            CompressionSetting::Enabled(true) => Some(CompressionConfig::default()),
            CompressionSetting::Options(options) => Some(options.clone()),
        }
    }

    /// Breaker settings, or `None` when the breaker is off
    pub fn circuit_breaker_config(&self) -> Option<CircuitBreakerConfig> {
        match &self.circuit_breaker {
            CircuitBreakerSetting::Enabled(false) => None,
            CircuitBreakerSetting::Enabled(true) => Some(CircuitBreakerConfig::for_storage()),
            CircuitBreakerSetting::Options(options) => Some(options.clone().into()),
        }
    }

    pub fn memory_pressure_config(&self) -> MemoryPressureConfig {
        MemoryPressureConfig {
            warning_threshold: self.memory_warning_threshold,
            critical_threshold: self.memory_critical_threshold,
            monitoring_interval: self.memory_monitoring_interval,
            max_memory: self.max_memory,
            ..MemoryPressureConfig::default()
        }
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            max_workers: self.max_background_workers,
            queue_size: self.worker_queue_size,
            batch_size: self.worker_batch_size,
            flush_interval: self.worker_flush_interval,
        }
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::configuration("ttl must be greater than zero"));
        }
        if self.max_memory_entries == 0 {
            return Err(Error::configuration(
                "maxMemoryEntries must be greater than zero",
            ));
        }
        if self.max_size == 0 {
            return Err(Error::configuration("maxSize must be greater than zero"));
        }

        for (name, value) in [
            ("memoryWarningThreshold", self.memory_warning_threshold),
            ("memoryCriticalThreshold", self.memory_critical_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::configuration(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.memory_warning_threshold >= self.memory_critical_threshold {
            return Err(Error::configuration(format!(
                "memoryWarningThreshold ({}) must be below memoryCriticalThreshold ({})",
                self.memory_warning_threshold, self.memory_critical_threshold
            )));
        }
        if self.enable_memory_pressure_detection && self.memory_monitoring_interval.is_zero() {
            return Err(Error::configuration(
                "memoryMonitoringInterval must be greater than zero",
            ));
        }

        if self.enable_partitioning && self.partition_count == 0 {
            return Err(Error::configuration(
                "partitionCount must be greater than zero when partitioning is enabled",
            ));
        }

        if self.enable_background_workers {
            if self.max_background_workers == 0 {
                return Err(Error::configuration(
                    "maxBackgroundWorkers must be greater than zero",
                ));
            }
            if self.worker_queue_size == 0 || self.worker_batch_size == 0 {
                return Err(Error::configuration(
                    "workerQueueSize and workerBatchSize must be greater than zero",
                ));
            }
        }

        if let Some(compression) = self.compression_config() {
            compression.validate()?;
        }

        if self.event_capacity == 0 {
            return Err(Error::configuration("eventCapacity must be greater than zero"));
        }

        Ok(())
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    Default,
    ConfigFile(PathBuf),
    EnvironmentVariable(String),
}

/// Configuration together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CacheConfig,
    pub source: ConfigSource,
}

const ENV_PREFIX: &str = "WARDEN_CACHE";

/// Configuration loader that handles precedence: defaults, then the
/// configuration file, then environment variables
pub struct CacheConfigLoader;

impl CacheConfigLoader {
    /// Load from the default configuration file location and the environment
    pub fn load() -> Result<LoadedConfig> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load using an explicit configuration file path
    pub fn load_from(path: &Path) -> Result<LoadedConfig> {
        let mut loaded = LoadedConfig {
            config: CacheConfig::default(),
            source: ConfigSource::Default,
        };

        if let Some(file_config) = Self::load_from_file(path)? {
            loaded.config = file_config;
            loaded.source = ConfigSource::ConfigFile(path.to_path_buf());
        }

        if Self::apply_env(&mut loaded.config) {
            loaded.source = ConfigSource::EnvironmentVariable(format!("{ENV_PREFIX}_*"));
        }

        loaded.config.validate()?;
        Ok(loaded)
    }

    /// Parse a JSON configuration file; a missing file is not an error
    pub fn load_from_file(path: &Path) -> Result<Option<CacheConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            operation: "read config file",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions {
                path: path.to_path_buf(),
            },
        })?;

        let config = serde_json::from_str(&content).map_err(|e| Error::Configuration {
            message: format!("invalid config file {}: {e}", path.display()),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check config file syntax".to_string(),
            },
        })?;

        Ok(Some(config))
    }

    /// Apply `WARDEN_CACHE_*` overrides. Returns true if any variable was used.
    pub fn apply_env(config: &mut CacheConfig) -> bool {
        let mut applied = false;

        if let Some(enabled) = env_var("ENABLED").and_then(|v| parse_bool(&v)) {
            config.enabled = enabled;
            applied = true;
        }

        if let Some(ttl) = env_parse::<u64>("TTL_MS") {
            config.ttl = Duration::from_millis(ttl);
            applied = true;
        }

        if let Some(max_size) = env_parse::<u64>("MAX_SIZE") {
            config.max_size = max_size;
            applied = true;
        }

        if let Some(entries) = env_parse::<usize>("MAX_MEMORY_ENTRIES") {
            config.max_memory_entries = entries;
            applied = true;
        }

        if let Some(value) = env_var("COMPRESSION") {
            let setting = match value.to_lowercase().as_str() {
                "gzip" => Some(CompressionSetting::Options(CompressionConfig {
                    algorithm: CompressionAlgorithm::Gzip,
                    ..CompressionConfig::default()
                })),
                "zstd" => Some(CompressionSetting::Options(CompressionConfig {
                    algorithm: CompressionAlgorithm::Zstd,
                    level: 3,
                    ..CompressionConfig::default()
                })),
                other => parse_bool(other).map(CompressionSetting::Enabled),
            };
            match setting {
                Some(setting) => {
                    config.compression = setting;
                    applied = true;
                }
                None => tracing::warn!(%value, "Ignoring invalid {ENV_PREFIX}_COMPRESSION"),
            }
        }

        if let Some(partitions) = env_parse::<usize>("PARTITIONS") {
            config.enable_partitioning = partitions > 0;
            if partitions > 0 {
                config.partition_count = partitions;
            }
            applied = true;
        }

        applied
    }

    /// `$XDG_CONFIG_HOME/warden/cache.json`, falling back to the platform config dir
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = match std::env::var_os("XDG_CONFIG_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir().ok_or_else(|| Error::Configuration {
                message: "Could not determine config directory".to_string(),
                recovery_hint: RecoveryHint::Manual {
                    instructions: "Set XDG_CONFIG_HOME or HOME environment variable".to_string(),
                },
            })?,
        };

        Ok(config_dir.join("warden").join("cache.json"))
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{suffix}")).ok()
}

fn env_parse<T: std::str::FromStr>(suffix: &str) -> Option<T> {
    let value = env_var(suffix)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(%value, "Ignoring invalid {ENV_PREFIX}_{suffix}");
            None
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serde helpers for durations stored as milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
        }
    }
}
