use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Sink settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkConfig {
    /// Appended after every record.
    pub terminator: String,
    pub flush_each_record: bool,
    /// Upper bound on how long `write` waits for the lock. `None` blocks
    /// until the lock is free.
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            terminator: "\n".to_string(),
            flush_each_record: true,
            acquire_timeout_ms: None,
        }
    }
}

impl SinkConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terminator.is_empty() {
            return Err(ConfigError::invalid("sink.terminator", "must not be empty"));
        }
        if self.acquire_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "sink.acquire_timeout_ms",
                "must be positive; omit it to block without a bound",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Demo settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub writers: usize,
    pub records_per_writer: usize,
    pub counter_threads: usize,
    pub increments_per_thread: usize,
    /// Upper bound for the random pause between two records of one writer.
    pub max_jitter_us: u64,
    /// How long the demo waits on a leaked lock before calling it deadlocked.
    pub deadlock_probe_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            writers: 3,
            records_per_writer: 100,
            counter_threads: 3,
            increments_per_thread: 100_000,
            max_jitter_us: 50,
            deadlock_probe_ms: 200,
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.writers == 0 {
            return Err(ConfigError::invalid("demo.writers", "need at least one writer"));
        }
        if self.counter_threads == 0 {
            return Err(ConfigError::invalid(
                "demo.counter_threads",
                "need at least one thread",
            ));
        }
        if self.deadlock_probe_ms == 0 {
            return Err(ConfigError::invalid("demo.deadlock_probe_ms", "must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// Top level
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sink: SinkConfig,
    pub demo: DemoConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        crate::log_info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sink.validate()?;
        self.demo.validate()
    }
}
