//! Configuration loading and typed config structures.
//!
//! The canonical configuration is a YAML file owned by the embedding
//! process. This module defines strongly-typed structs mirroring that
//! structure, a loader that reads and validates the file, and defaults
//! for every knob so a missing file or section still yields a working
//! setup.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of its valid range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of live connections.
    pub max_connections: u32,
    /// Hard total timeout for one acquisition, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Initial backoff interval between acquisition retries, in
    /// milliseconds.
    pub backoff_start_ms: u64,
    /// Maximum per-attempt backoff interval, in milliseconds.
    pub backoff_cap_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 10_000,
            backoff_start_ms: 50,
            backoff_cap_ms: 1_000,
        }
    }
}

impl PoolConfig {
    /// Hard total acquisition timeout.
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Initial retry backoff.
    pub const fn backoff_start(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Backoff cap.
    pub const fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

/// Entity cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum resident entries.
    pub capacity: usize,
    /// Time-to-live since last access, in milliseconds.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_ms: 300_000,
        }
    }
}

impl CacheConfig {
    /// Entry time-to-live.
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Staged import and catalog build settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Catalog entries processed per tick, for builds and imports alike.
    pub batch_size: usize,
    /// Hard ceiling on processed catalog entries before a build or
    /// import is aborted as runaway.
    pub max_catalog_entries: usize,
    /// Completions applied to the live entity per owner-thread step
    /// during a large load.
    pub apply_batch_size: usize,
    /// Ticks between those apply steps.
    pub apply_batch_delay_ticks: u64,
    /// Completion-set size above which a load applies in batches rather
    /// than one call.
    pub large_set_threshold: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 250,
            max_catalog_entries: 100_000,
            apply_batch_size: 250,
            apply_batch_delay_ticks: 1,
            large_set_threshold: 500,
        }
    }
}

/// Persistence engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Save latency above which a warning is logged, in milliseconds.
    pub slow_save_threshold_ms: u64,
    /// Ticks between autosave sweeps; 0 disables autosave.
    pub autosave_interval_ticks: u64,
    /// Identifier of this process, written with every save.
    pub server_id: String,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            slow_save_threshold_ms: 1_000,
            autosave_interval_ticks: 6_000,
            server_id: "playervault".to_owned(),
        }
    }
}

impl PersistConfig {
    /// Slow-save warning threshold.
    pub const fn slow_save_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_save_threshold_ms)
    }
}

/// Top-level Playervault configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Connection pool settings.
    pub pool: PoolConfig,
    /// Entity cache settings.
    pub cache: CacheConfig,
    /// Staged import settings.
    pub import: ImportConfig,
    /// Persistence engine settings.
    pub persist: PersistConfig,
}

impl VaultConfig {
    /// Parse a configuration from YAML text and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check every knob is in its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid {
                reason: "pool.max_connections must be at least 1".to_owned(),
            });
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "cache.capacity must be at least 1".to_owned(),
            });
        }
        if self.import.batch_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "import.batch_size must be at least 1".to_owned(),
            });
        }
        if self.import.apply_batch_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "import.apply_batch_size must be at least 1".to_owned(),
            });
        }
        if self.import.max_catalog_entries == 0 {
            return Err(ConfigError::Invalid {
                reason: "import.max_catalog_entries must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
