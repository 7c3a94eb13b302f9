//! Error types for the CodeCheck database layer

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a [`DbError`]
///
/// Callers translate these into their own response codes; pool exhaustion
/// and a closed pool are both `Connection` failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Query,
    Transaction,
    Configuration,
}

/// Core error type for database operations
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection pool exhausted: no connection available within {timeout:?} (max {max_size})")]
    PoolExhausted { timeout: Duration, max_size: usize },

    #[error("Connection pool is shut down")]
    PoolClosed,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction failed at operation {index}: {message}")]
    Transaction { index: usize, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Connection(_)
            | DbError::PoolExhausted { .. }
            | DbError::PoolClosed
            | DbError::Tls(_)
            | DbError::Io(_) => ErrorKind::Connection,
            DbError::Query(_) => ErrorKind::Query,
            DbError::Transaction { .. } => ErrorKind::Transaction,
            DbError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the caller could not obtain or keep a working connection
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Whether the pool had no free connection within the acquire timeout
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, DbError::PoolExhausted { .. })
    }

    /// Whether the pool has been shut down
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, DbError::PoolClosed)
    }
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DbError>;
