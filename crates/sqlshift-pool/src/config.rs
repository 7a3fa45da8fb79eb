//! Pool configuration and statistics.

use serde::{Deserialize, Serialize};
use sqlshift_core::{DatabaseConfig, Error, Result};
use std::time::Duration;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections (idle + checked out)
    pub size: usize,
    /// Maximum time to wait for a connection in milliseconds
    pub checkout_timeout_ms: u64,
    /// Idle connections older than this are closed by the reaper
    pub idle_timeout_ms: Option<u64>,
    /// How often the reaper runs; `None` disables it
    pub reaping_frequency_ms: Option<u64>,
    /// Test connections before giving them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 5,
            checkout_timeout_ms: 5_000,       // 5 seconds
            idle_timeout_ms: Some(300_000),   // 5 minutes
            reaping_frequency_ms: Some(60_000), // 1 minute
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given size.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Set checkout timeout.
    pub fn checkout_timeout(mut self, ms: u64) -> Self {
        self.checkout_timeout_ms = ms;
        self
    }

    /// Set idle timeout.
    pub fn idle_timeout(mut self, ms: Option<u64>) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    /// Set reaping frequency.
    pub fn reaping_frequency(mut self, ms: Option<u64>) -> Self {
        self.reaping_frequency_ms = ms;
        self
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    pub fn checkout_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    pub fn idle_timeout_duration(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn reaping_frequency_duration(&self) -> Option<Duration> {
        self.reaping_frequency_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Reject configurations a pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Pool(sqlshift_core::PoolError {
                kind: sqlshift_core::PoolErrorKind::Config,
                message: "pool size must be at least 1".to_string(),
                source: None,
            }));
        }
        Ok(())
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            size: config.pool,
            checkout_timeout_ms: millis(config.checkout_timeout_duration()),
            idle_timeout_ms: config.idle_timeout_duration().map(millis),
            reaping_frequency_ms: config.reaping_frequency_duration().map(millis),
            test_on_checkout: true,
        }
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of connections checked out to a thread
    pub active_connections: usize,
    /// Number of threads blocked in checkout
    pub waiting: usize,
}
