//! CodeCheck Pool - bounded database connection pooling
//!
//! This crate owns the connection pool shared by request handlers:
//!
//! - `ConnectionPool` - bounded set of connections with FIFO checkout
//! - `Session` - scoped transaction handed to `with_connection` callers
//! - `PoolStats` - snapshot of sizing and cumulative counters
//! - `HealthReport` - answer to a liveness probe, never an error

pub mod health;
pub mod pool;
mod session;

#[cfg(test)]
mod test_support;

pub use health::{DatabaseInfo, HealthReport, HealthStatus};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use session::{Operation, OperationOutput, Session};
