//! The health probe itself

use codecheck_core::AccessMode;
use tokio::time::Instant;

use super::report::{DatabaseInfo, HealthReport};
use crate::pool::ConnectionPool;

const HEALTH_QUERY: &str =
    "SELECT version() AS version, pg_is_in_recovery() AS is_replica, NOW() AS database_time";

impl ConnectionPool {
    /// Probe the database through a short-lived read-only scope
    ///
    /// Never fails: an unreachable database, an exhausted or closed pool and
    /// a probe that outlives `health_check_timeout` all produce an
    /// `Unhealthy` report carrying the error message.
    pub async fn health_check(&self) -> HealthReport {
        let timeout = self.config().health_check_timeout();
        let start = Instant::now();

        let probe = tokio::time::timeout(
            timeout,
            self.with_connection(AccessMode::ReadOnly, |session| {
                Box::pin(async move {
                    let result = session.query(HEALTH_QUERY, &[]).await?;
                    Ok(DatabaseInfo::from_result(&result))
                })
            }),
        )
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        let outcome = match probe {
            Ok(Ok(info)) => Ok(info),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("health check timed out after {:?}", timeout)),
        };

        let monitor = self.shared().health();
        match outcome {
            Ok(info) => {
                monitor.record_success();
                tracing::debug!(latency_ms, "database healthy");
                HealthReport::healthy(info, latency_ms, self.stats())
            }
            Err(error) => {
                let consecutive_failures = monitor.record_failure(&error);
                HealthReport::unhealthy(error, latency_ms, consecutive_failures, self.stats())
            }
        }
    }
}
