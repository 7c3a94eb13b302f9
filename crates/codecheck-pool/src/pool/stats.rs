//! Pool statistics types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cumulative counters kept under the pool lock
#[derive(Debug, Clone, Default)]
pub(crate) struct Counters {
    pub(crate) total_created: u64,
    pub(crate) queries_executed: u64,
    pub(crate) transactions_executed: u64,
    pub(crate) errors: u64,
    pub(crate) pool_exhausted_count: u64,
    pub(crate) last_error: Option<String>,
    pub(crate) last_error_at: Option<DateTime<Utc>>,
}

/// Snapshot of a connection pool's state
///
/// Copied out under the pool lock, so `available + active == pool_size`
/// always holds for a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Open connections (available + active)
    pool_size: usize,
    /// Idle connections ready for checkout
    available: usize,
    /// Connections lent to callers
    active: usize,
    /// Callers queued for a free slot
    waiting: usize,
    min_size: usize,
    max_size: usize,
    /// Connections opened over the pool's lifetime
    total_created: u64,
    queries_executed: u64,
    transactions_executed: u64,
    errors: u64,
    pool_exhausted_count: u64,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
}

impl PoolStats {
    pub(crate) fn new(
        available: usize,
        active: usize,
        waiting: usize,
        min_size: usize,
        max_size: usize,
        counters: &Counters,
    ) -> Self {
        Self {
            pool_size: available + active,
            available,
            active,
            waiting,
            min_size,
            max_size,
            total_created: counters.total_created,
            queries_executed: counters.queries_executed,
            transactions_executed: counters.transactions_executed,
            errors: counters.errors,
            pool_exhausted_count: counters.pool_exhausted_count,
            last_error: counters.last_error.clone(),
            last_error_at: counters.last_error_at,
        }
    }

    /// Get the number of open connections
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get the number of idle connections
    pub fn available(&self) -> usize {
        self.available
    }

    /// Get the number of active (in-use) connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of waiting requests
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn total_created(&self) -> u64 {
        self.total_created
    }

    pub fn queries_executed(&self) -> u64 {
        self.queries_executed
    }

    pub fn transactions_executed(&self) -> u64 {
        self.transactions_executed
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn pool_exhausted_count(&self) -> u64 {
        self.pool_exhausted_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_error_at(&self) -> Option<DateTime<Utc>> {
        self.last_error_at
    }

    /// Calculate pool utilization against `max_size` (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Check if every allowed connection is checked out
    pub fn is_full(&self) -> bool {
        self.active >= self.max_size && self.max_size > 0
    }
}
