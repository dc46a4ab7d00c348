use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Pool settings, deserialized from TOML such as:
///
/// ```toml
/// workers = 3
/// queue_capacity = 16
/// timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Cancel the pool this many milliseconds after it starts.
    pub timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timeout_ms: None,
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("`workers` must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_config("`queue_capacity` must be at least 1"));
        }
        Ok(())
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&source)
    }
}
