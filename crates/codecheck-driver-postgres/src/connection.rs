//! PostgreSQL connection implementation

use async_trait::async_trait;
use codecheck_core::{
    AccessMode, ColumnMeta, Connection, DatabaseConfig, DbError, QueryResult, Result, Row,
    StatementResult, TlsMode, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Socket, Statement};

use crate::convert::{PgValue, postgres_to_value, statement_error};
use crate::tls::{PostgresTlsConnector, negotiation_mode};

/// PostgreSQL connection wrapper
///
/// The client is taken out on `close`; the background task driving the
/// socket flips `closed` when it ends for any reason.
pub struct PostgresConnection {
    client: Mutex<Option<Client>>,
    closed: Arc<AtomicBool>,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database with the session settings from `config`
    #[tracing::instrument(skip(config), fields(db = %config.target(), ssl_mode = %config.ssl_mode()))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pg_config = build_pg_config(config);
        let closed = Arc::new(AtomicBool::new(false));

        let client = if config.ssl_mode() == TlsMode::Disable {
            establish(&pg_config, NoTls, config.connect_timeout(), closed.clone()).await?
        } else {
            let tls = PostgresTlsConnector::build(config.tls())?;
            establish(&pg_config, tls, config.connect_timeout(), closed.clone()).await?
        };

        tracing::info!("PostgreSQL connection established");
        Ok(Self {
            client: Mutex::new(Some(client)),
            closed,
        })
    }

    async fn prepare(&self, client: &Client, sql: &str) -> Result<Statement> {
        client
            .prepare(sql)
            .await
            .map_err(|e| self.classify("Failed to prepare statement", &e))
    }

    fn classify(&self, context: &str, error: &tokio_postgres::Error) -> DbError {
        if error.is_closed() {
            self.closed.store(true, Ordering::SeqCst);
        }
        statement_error(context, error)
    }

    async fn batch(&self, sql: &str) -> Result<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| self.classify(&format!("Failed to run {}", sql), &e))
    }
}

fn closed_error() -> DbError {
    DbError::Connection("connection is closed".to_string())
}

fn build_pg_config(config: &DatabaseConfig) -> tokio_postgres::Config {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(config.host())
        .port(config.port())
        .dbname(config.database())
        .user(config.user())
        .application_name(config.application_name())
        .connect_timeout(config.connect_timeout())
        .ssl_mode(negotiation_mode(config.ssl_mode()))
        .options(&format!(
            "-c statement_timeout={} -c idle_in_transaction_session_timeout={}",
            config.statement_timeout().as_millis(),
            config.idle_in_transaction_timeout().as_millis()
        ));

    if !config.password().is_empty() {
        pg_config.password(config.password());
    }

    pg_config
}

/// Run the startup handshake and spawn the task that drives the socket
async fn establish<T>(
    pg_config: &tokio_postgres::Config,
    tls: T,
    timeout: Duration,
    closed: Arc<AtomicBool>,
) -> Result<Client>
where
    T: MakeTlsConnect<Socket> + Send + 'static,
    T::Stream: Send + 'static,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, connection) = tokio::time::timeout(timeout, pg_config.connect(tls))
        .await
        .map_err(|_| DbError::Connection(format!("connect timed out after {:?}", timeout)))?
        .map_err(|e| {
            DbError::Connection(format!(
                "Failed to connect to PostgreSQL: {}",
                crate::convert::format_postgres_error(&e)
            ))
        })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection error");
        }
        closed.store(true, Ordering::SeqCst);
    });

    Ok(client)
}

fn bind_params(statement: &Statement, params: &[Value]) -> Result<Vec<PgValue>> {
    let param_types = statement.params();
    params
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let target_type = param_types
                .get(i)
                .unwrap_or(&tokio_postgres::types::Type::UNKNOWN);
            PgValue::for_type(value, target_type).map_err(|e| match e {
                DbError::Query(message) => DbError::Query(format!("parameter ${}: {}", i + 1, message)),
                other => other,
            })
        })
        .collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let start_time = Instant::now();
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;

        let statement = self.prepare(client, sql).await?;
        let pg_params = bind_params(&statement, params)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let affected_rows = client
            .execute(&statement, &param_refs)
            .await
            .map_err(|e| self.classify("Failed to execute statement", &e))?;

        tracing::debug!(affected_rows, "statement executed");
        Ok(StatementResult {
            affected_rows,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = Instant::now();
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;

        let statement = self.prepare(client, sql).await?;
        let pg_params = bind_params(&statement, params)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| self.classify("Failed to execute query", &e))?;

        // Column metadata comes from the prepared statement so empty results keep their columns
        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(ordinal, col)| ColumnMeta {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                ordinal,
            })
            .collect();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let rows = pg_rows
            .iter()
            .map(|pg_row| {
                let values = (0..columns.len())
                    .map(|idx| postgres_to_value(pg_row, idx))
                    .collect();
                Row::new(column_names.clone(), values)
            })
            .collect::<Vec<_>>();

        let mut result = QueryResult::from_rows(columns, rows);
        result.execution_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::debug!(
            row_count = result.row_count(),
            execution_time_ms = result.execution_time_ms,
            "query executed successfully"
        );
        Ok(result)
    }

    async fn begin(&self, mode: AccessMode) -> Result<()> {
        match mode {
            AccessMode::ReadOnly => self.batch("BEGIN READ ONLY").await,
            AccessMode::ReadWrite => self.batch("BEGIN").await,
        }
    }

    async fn commit(&self) -> Result<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.batch("ROLLBACK").await
    }

    async fn close(&self) -> Result<()> {
        // Dropping the client ends the background connection task
        let client = self.client.lock().await.take();
        self.closed.store(true, Ordering::SeqCst);
        if client.is_some() {
            tracing::debug!("closing PostgreSQL connection");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
