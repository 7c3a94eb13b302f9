//! Health state carried between checks

use parking_lot::Mutex;

use super::report::HealthStatus;

#[derive(Debug, Default)]
struct MonitorState {
    consecutive_failures: u32,
    last_status: Option<HealthStatus>,
}

/// Tracks consecutive failures and logs status transitions
#[derive(Debug, Default)]
pub(crate) struct HealthMonitor {
    state: Mutex<MonitorState>,
}

impl HealthMonitor {
    /// Record a successful check
    pub(crate) fn record_success(&self) {
        let mut state = self.state.lock();
        if state.last_status == Some(HealthStatus::Unhealthy) {
            tracing::info!(
                after_failures = state.consecutive_failures,
                "database health recovered"
            );
        }
        state.consecutive_failures = 0;
        state.last_status = Some(HealthStatus::Healthy);
    }

    /// Record a failed check, returning the failure streak including it
    pub(crate) fn record_failure(&self, error: &str) -> u32 {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_status = Some(HealthStatus::Unhealthy);
        tracing::error!(
            consecutive_failures = state.consecutive_failures,
            error,
            "database health check failed"
        );
        state.consecutive_failures
    }
}
