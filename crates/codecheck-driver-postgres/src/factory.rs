//! Connection factory bound to one database configuration

use std::sync::Arc;

use async_trait::async_trait;
use codecheck_core::{Connection, ConnectionFactory, DatabaseConfig, Result};

use crate::PostgresConnection;

/// Opens PostgreSQL connections for the pool
///
/// Each `create` call performs exactly one connection attempt. The session
/// settings (statement timeout, idle-in-transaction timeout, application
/// name) are applied during the startup handshake.
#[derive(Debug, Clone)]
pub struct PostgresConnectionFactory {
    config: DatabaseConfig,
}

impl PostgresConnectionFactory {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tracing::debug!(target_db = %self.config.target(), "opening PostgreSQL connection");
        match PostgresConnection::connect(&self.config).await {
            Ok(conn) => Ok(Arc::new(conn)),
            Err(e) => {
                tracing::warn!(target_db = %self.config.target(), error = %e, "PostgreSQL connection attempt failed");
                Err(e)
            }
        }
    }
}
