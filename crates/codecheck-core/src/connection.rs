//! Connection and connection-factory traits

use std::sync::Arc;

use async_trait::async_trait;

use crate::{AccessMode, QueryResult, Result, StatementResult, Value};

/// A live database connection
///
/// Implementations are lent to exactly one caller at a time by the pool, so
/// they need not serialize concurrent use beyond what `Send + Sync` demands.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a statement and return every row it produces
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Open a transaction in the given access mode
    async fn begin(&self, mode: AccessMode) -> Result<()> {
        let sql = match mode {
            AccessMode::ReadOnly => "BEGIN READ ONLY",
            AccessMode::ReadWrite => "BEGIN",
        };
        self.execute(sql, &[]).await.map(|_| ())
    }

    /// Commit the open transaction
    async fn commit(&self) -> Result<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    /// Roll back the open transaction, if any
    async fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Factory for opening new connections
///
/// A factory opens exactly one connection per call and never retries;
/// retrying is left to the pool's caller.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation runs `SELECT 1`.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        if conn.is_closed() {
            return false;
        }
        match conn.query("SELECT 1", &[]).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "connection validation failed");
                false
            }
        }
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}
