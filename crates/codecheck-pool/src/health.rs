//! Health checking for the pooled database
//!
//! `ConnectionPool::health_check` answers even when the database is down:
//! every failure is folded into an `Unhealthy` report.
//!
//! # Example
//!
//! ```ignore
//! let report = pool.health_check().await;
//! if !report.status.is_healthy() {
//!     tracing::error!(error = ?report.error, "database unavailable");
//! }
//! ```

mod checker;
mod monitor;
mod report;

#[cfg(test)]
mod tests;

pub(crate) use monitor::HealthMonitor;
pub use report::{DatabaseInfo, HealthReport, HealthStatus};
