//! Connection pooling for database connections
//!
//! This module provides the bounded pool, its configuration, and the
//! statistics snapshot it reports.
//!
//! # Example
//!
//! ```ignore
//! use codecheck_pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10).with_acquire_timeout_ms(5000);
//! let pool = ConnectionPool::new(config, connection_factory);
//! let conn = pool.acquire(AccessMode::ReadOnly).await?;
//! // Use connection...
//! pool.release(conn, true).await;
//! ```

mod config;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectionPool, PooledConnection};
pub use stats::PoolStats;
