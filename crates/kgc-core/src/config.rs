//! Clone service configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default staleness horizon (24h)
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Default number of rows per duplication batch
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default number of records per store create/delete call
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 10;

/// What `clone_before_modify` does when the active clone is stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Reject the stale clone (with cleanup) and create a fresh one
    #[default]
    Replace,
    /// Fail with `CloneError::StaleClone`
    Error,
}

/// Store collection names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    /// Where cloned entities are persisted
    pub cloned_entities: String,
    /// Where cloned edges are persisted
    pub cloned_edges: String,
    /// Parent-graph entities, read by the default graph source
    pub source_entities: String,
    /// Parent-graph edges, read by the default graph source
    pub source_edges: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            cloned_entities: "cloned_entities".to_string(),
            cloned_edges: "cloned_edges".to_string(),
            source_entities: "entities".to_string(),
            source_edges: "edges".to_string(),
        }
    }
}

/// Clone service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneConfig {
    /// Seconds after creation at which a clone is stale
    pub ttl_seconds: u64,
    /// Rows per duplication batch (one transaction step each)
    pub batch_size: usize,
    /// Records per store create/delete call
    pub write_chunk_size: usize,
    /// Stale handling on the reuse path
    pub stale_policy: StalePolicy,
    /// Background stale sweep interval; `None` keeps staleness advisory
    pub sweep_interval_secs: Option<u64>,
    /// Collection names
    pub collections: Collections,
}

impl CloneConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With TTL
    #[inline]
    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// With duplication batch size
    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// With store write chunk size
    #[inline]
    #[must_use]
    pub fn with_write_chunk_size(mut self, chunk: usize) -> Self {
        self.write_chunk_size = chunk;
        self
    }

    /// With stale policy
    #[inline]
    #[must_use]
    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    /// With background sweep interval
    #[inline]
    #[must_use]
    pub fn with_sweep_interval(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = Some(secs);
        self
    }

    /// With collection names
    #[inline]
    #[must_use]
    pub fn with_collections(mut self, collections: Collections) -> Self {
        self.collections = collections;
        self
    }

    /// Sweep interval as a `Duration`
    #[inline]
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` for zero sizes, a zero sweep interval, or
    /// clone and source collections that collide
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.write_chunk_size == 0 {
            return Err(ConfigError::Invalid("write_chunk_size must be > 0".into()));
        }
        if self.sweep_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be > 0 when set".into(),
            ));
        }
        let c = &self.collections;
        if c.cloned_entities == c.cloned_edges {
            return Err(ConfigError::Invalid(
                "cloned entity and edge collections must differ".into(),
            ));
        }
        if [&c.source_entities, &c.source_edges].contains(&&c.cloned_entities)
            || [&c.source_entities, &c.source_edges].contains(&&c.cloned_edges)
        {
            return Err(ConfigError::Invalid(
                "clone collections must not alias source collections".into(),
            ));
        }
        Ok(())
    }

    /// Parse from TOML; missing keys take defaults
    ///
    /// # Errors
    /// Parse or validation failure
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// I/O, parse or validation failure
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Encoding failure
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            batch_size: DEFAULT_BATCH_SIZE,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            stale_policy: StalePolicy::Replace,
            sweep_interval_secs: None,
            collections: Collections::default(),
        }
    }
}
