//! Scoped acquisition: every statement runs inside a pooled transaction
//!
//! [`ConnectionPool::with_connection`] is the one entry point for running
//! statements. It checks a connection out, opens a transaction in the
//! requested mode, hands the caller a [`Session`], and ends the transaction
//! and returns the connection however the caller's future finishes.

use codecheck_core::{AccessMode, DbError, QueryResult, Result, Row, StatementResult, Value};
use futures::future::BoxFuture;

use crate::pool::{ConnectionPool, PooledConnection};

/// A transaction-scoped view of a pooled connection
///
/// Only reachable through `with_connection`, so a session never outlives
/// its checkout.
#[derive(Debug)]
pub struct Session {
    conn: PooledConnection,
}

impl Session {
    /// The access mode of the enclosing transaction
    pub fn mode(&self) -> AccessMode {
        self.conn.mode()
    }

    /// Run a statement and return its rows
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let outcome = self.conn.query(sql, params).await;
        self.account(&outcome);
        outcome
    }

    /// Run a data-modifying statement and return the affected row count
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let outcome = self.conn.execute(sql, params).await;
        self.account(&outcome);
        outcome
    }

    /// Run one operation, fetching rows only when the statement yields them
    pub async fn run(&self, operation: &Operation) -> Result<OperationOutput> {
        if operation.returns_rows() {
            let result = self.query(&operation.sql, &operation.params).await?;
            Ok(OperationOutput::Rows(result.rows))
        } else {
            let result = self.execute(&operation.sql, &operation.params).await?;
            Ok(OperationOutput::Affected(result.affected_rows))
        }
    }

    fn account<T>(&self, outcome: &Result<T>) {
        match outcome {
            Ok(_) => self.conn.pool().record_queries(1),
            Err(e) => self.conn.pool().record_error(e),
        }
    }
}

/// One statement of a multi-statement transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Operation {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Whether the statement produces a row set worth fetching
    pub fn returns_rows(&self) -> bool {
        let leading: String = self
            .sql
            .trim_start()
            .trim_start_matches('(')
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();

        matches!(
            leading.to_ascii_uppercase().as_str(),
            "SELECT" | "WITH" | "VALUES" | "SHOW" | "EXPLAIN" | "TABLE"
        ) || self
            .sql
            .split_whitespace()
            .any(|word| word.eq_ignore_ascii_case("RETURNING"))
    }
}

/// Result of one [`Operation`]
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Rows(Vec<Row>),
    Affected(u64),
}

impl OperationOutput {
    pub fn rows(&self) -> &[Row] {
        match self {
            OperationOutput::Rows(rows) => rows,
            OperationOutput::Affected(_) => &[],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OperationOutput::Rows(rows) => {
                serde_json::Value::Array(rows.iter().map(Row::to_json).collect())
            }
            OperationOutput::Affected(count) => serde_json::json!({ "affected_rows": count }),
        }
    }
}

impl ConnectionPool {
    /// Run `body` inside a transaction on a pooled connection
    ///
    /// Read-write scopes commit when `body` succeeds; read-only scopes end
    /// with a rollback since there is nothing to commit. When `body` fails
    /// the transaction is rolled back and the error is returned unchanged.
    /// If the returned future is dropped midway the connection still goes
    /// back to the pool and is reset before its next use.
    pub async fn with_connection<T, F>(&self, mode: AccessMode, body: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s Session) -> BoxFuture<'s, Result<T>>,
    {
        let conn = self.acquire(mode).await?;

        if let Err(e) = conn.begin(mode).await {
            self.shared().record_error(&e);
            conn.release(false).await;
            return Err(e);
        }

        let session = Session { conn };
        let outcome = body(&session).await;
        let Session { conn } = session;

        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, mode = ?mode, "rolling back failed scope");
                conn.release(false).await;
                return Err(e);
            }
        };

        let finish = match mode {
            AccessMode::ReadOnly => conn.rollback().await,
            AccessMode::ReadWrite => conn.commit().await,
        };

        match finish {
            Ok(()) => {
                if mode == AccessMode::ReadWrite {
                    self.shared().record_transaction();
                }
                conn.release(true).await;
                Ok(value)
            }
            Err(e) => {
                self.shared().record_error(&e);
                conn.release(false).await;
                Err(e)
            }
        }
    }

    /// Run one statement in its own scope and return all of its rows
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[Value],
        mode: AccessMode,
    ) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_connection(mode, move |session| {
            Box::pin(async move { Ok(session.query(&sql, &params).await?.rows) })
        })
        .await
    }

    /// Run every operation in one read-write transaction, all or nothing
    ///
    /// A failing statement aborts the unit with `DbError::Transaction`
    /// carrying its zero-based position; nothing before it is kept.
    pub async fn execute_transaction(
        &self,
        operations: Vec<Operation>,
    ) -> Result<Vec<OperationOutput>> {
        let count = operations.len();
        let outputs = self
            .with_connection(AccessMode::ReadWrite, move |session| {
                Box::pin(async move {
                    let mut outputs = Vec::with_capacity(operations.len());
                    for (index, operation) in operations.iter().enumerate() {
                        let output = session.run(operation).await.map_err(|e| {
                            DbError::Transaction {
                                index,
                                message: e.to_string(),
                            }
                        })?;
                        outputs.push(output);
                    }
                    Ok(outputs)
                })
            })
            .await;

        match &outputs {
            Ok(_) => tracing::debug!(operations = count, "transaction committed"),
            Err(e) => tracing::warn!(operations = count, error = %e, "transaction rolled back"),
        }
        outputs
    }
}
