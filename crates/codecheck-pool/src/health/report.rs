//! Health report types

use chrono::{DateTime, Utc};
use codecheck_core::QueryResult;
use serde::{Deserialize, Serialize};

use crate::pool::PoolStats;

/// Health status of the database behind the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server metadata collected by a successful probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub version: Option<String>,
    pub time: Option<DateTime<Utc>>,
    /// True when the server is a hot standby
    pub is_replica: Option<bool>,
}

impl DatabaseInfo {
    /// Read the probe's single row; missing columns are left empty
    pub fn from_result(result: &QueryResult) -> Self {
        let Some(row) = result.rows.first() else {
            return Self::default();
        };

        Self {
            version: row
                .get_by_name("version")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            time: row
                .get_by_name("database_time")
                .and_then(|v| v.as_datetime_utc()),
            is_replica: row.get_by_name("is_replica").and_then(|v| v.as_bool()),
        }
    }
}

/// Result of one health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database_version: Option<String>,
    pub database_time: Option<DateTime<Utc>>,
    pub is_replica: Option<bool>,
    /// Round-trip time of the probe, acquire included
    pub latency_ms: u64,
    /// Error message if the check failed
    pub error: Option<String>,
    /// Failed checks in a row, 0 when healthy
    pub consecutive_failures: u32,
    pub checked_at: DateTime<Utc>,
    pub pool_stats: PoolStats,
}

impl HealthReport {
    pub(crate) fn healthy(info: DatabaseInfo, latency_ms: u64, pool_stats: PoolStats) -> Self {
        Self {
            status: HealthStatus::Healthy,
            database_version: info.version,
            database_time: info.time,
            is_replica: info.is_replica,
            latency_ms,
            error: None,
            consecutive_failures: 0,
            checked_at: Utc::now(),
            pool_stats,
        }
    }

    pub(crate) fn unhealthy(
        error: String,
        latency_ms: u64,
        consecutive_failures: u32,
        pool_stats: PoolStats,
    ) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            database_version: None,
            database_time: None,
            is_replica: None,
            latency_ms,
            error: Some(error),
            consecutive_failures,
            checked_at: Utc::now(),
            pool_stats,
        }
    }
}
