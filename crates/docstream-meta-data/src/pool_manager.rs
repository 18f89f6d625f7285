//! Connection pool management with read/write separation
//!
//! This module provides separated connection pools for different operation
//! types, improving database performance and preventing resource contention.

use anyhow::{Context, Result};
use docstream_config::DatabaseConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Configuration for connection pools
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections for write pool
    pub write_pool_size: u32,
    /// Maximum connections for read pool
    pub read_pool_size: u32,
    /// Maximum connections for analytics pool
    pub analytics_pool_size: u32,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Idle timeout in seconds
    pub idle_timeout: u64,
    /// Maximum lifetime in seconds
    pub max_lifetime: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            write_pool_size: 10,
            read_pool_size: 20,
            analytics_pool_size: 5,
            connect_timeout: 30,
            idle_timeout: 600,
            max_lifetime: 1800,
        }
    }
}

/// Manages multiple connection pools for different operation types
#[derive(Clone)]
#[allow(clippy::struct_field_names)]
pub struct PoolManager {
    /// Pool for write operations (job transitions, inserts)
    write_pool: PgPool,
    /// Pool for read operations (status, lookups)
    read_pool: PgPool,
    /// Pool for metrics and aggregation queries
    analytics_pool: PgPool,
}

impl PoolManager {
    /// Create a new pool manager with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database URL is malformed or contains invalid parameters
    /// - Database server is unreachable or refuses connections
    /// - Authentication fails due to invalid credentials
    /// - Any of the three connection pools fail to connect
    pub async fn new(db_config: &DatabaseConfig, config: PoolConfig) -> Result<Self> {
        let base_options = db_config.connect_options().application_name("docstream");

        // Write pool - smaller, for transactional operations
        let write_pool = PgPoolOptions::new()
            .max_connections(config.write_pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .max_lifetime(Duration::from_secs(config.max_lifetime))
            .connect_with(base_options.clone())
            .await
            .context("Failed to create write pool")?;

        // Read pool - larger, for concurrent queries
        let read_pool = PgPoolOptions::new()
            .max_connections(config.read_pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .max_lifetime(Duration::from_secs(config.max_lifetime))
            .connect_with(base_options.clone())
            .await
            .context("Failed to create read pool")?;

        // Analytics pool - separate pool for heavy aggregation queries
        let analytics_pool = PgPoolOptions::new()
            .max_connections(config.analytics_pool_size)
            .acquire_timeout(Duration::from_secs(
                config.connect_timeout.saturating_mul(2),
            ))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .max_lifetime(Duration::from_secs(config.max_lifetime))
            .connect_with(base_options)
            .await
            .context("Failed to create analytics pool")?;

        Ok(Self {
            write_pool,
            read_pool,
            analytics_pool,
        })
    }

    /// Get the write pool for state transitions and inserts
    pub const fn write_pool(&self) -> &PgPool {
        &self.write_pool
    }

    /// Get the read pool for lookups
    pub const fn read_pool(&self) -> &PgPool {
        &self.read_pool
    }

    /// Get the analytics pool for metrics and aggregation queries
    pub const fn analytics_pool(&self) -> &PgPool {
        &self.analytics_pool
    }

    /// Close all pools
    pub async fn close(&self) {
        self.write_pool.close().await;
        self.read_pool.close().await;
        self.analytics_pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.write_pool_size, 10);
        assert_eq!(config.read_pool_size, 20);
        assert_eq!(config.analytics_pool_size, 5);
    }
}
