//! In-memory connection and factory shared by the pool tests
//!
//! `MockDatabase` keeps a committed statement log plus one pending log per
//! open transaction, which is enough to observe commit/rollback behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codecheck_core::{
    ColumnMeta, Connection, ConnectionFactory, DbError, QueryResult, Result, Row,
    StatementResult, Value,
};
use parking_lot::Mutex;

/// Statements containing this marker fail with a query error
pub(crate) const FAIL_MARKER: &str = "FAIL";

#[derive(Default)]
pub(crate) struct MockDatabase {
    /// Statements that survived a commit (or ran outside a transaction)
    committed: Mutex<Vec<String>>,
    /// Every statement seen, tagged with the connection id
    log: Mutex<Vec<(usize, String)>>,
    down: AtomicBool,
    fail_rollback: AtomicBool,
    fail_validation: AtomicBool,
}

impl MockDatabase {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn committed(&self) -> Vec<String> {
        self.committed.lock().clone()
    }

    pub(crate) fn statements_for(&self, id: usize) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|(conn, _)| *conn == id)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.lock().iter().map(|(_, sql)| sql.clone()).collect()
    }

    pub(crate) fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_validation(&self, fail: bool) {
        self.fail_validation.store(fail, Ordering::SeqCst);
    }
}

pub(crate) struct MockConnection {
    id: usize,
    db: Arc<MockDatabase>,
    closed: AtomicBool,
    pending: Mutex<Option<Vec<String>>>,
}

impl MockConnection {
    fn new(id: usize, db: Arc<MockDatabase>) -> Self {
        Self {
            id,
            db,
            closed: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    fn run(&self, sql: &str) -> Result<u64> {
        if self.is_closed() {
            return Err(DbError::Connection("connection is closed".into()));
        }
        if self.db.down.load(Ordering::SeqCst) {
            return Err(DbError::Connection("server closed the connection unexpectedly".into()));
        }
        self.db.log.lock().push((self.id, sql.to_string()));

        let keyword = sql.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
        match keyword.as_str() {
            "BEGIN" => {
                *self.pending.lock() = Some(Vec::new());
                Ok(0)
            }
            "COMMIT" => {
                if let Some(pending) = self.pending.lock().take() {
                    self.db.committed.lock().extend(pending);
                }
                Ok(0)
            }
            "ROLLBACK" => {
                if self.db.fail_rollback.load(Ordering::SeqCst) {
                    return Err(DbError::Connection("rollback failed".into()));
                }
                self.pending.lock().take();
                Ok(0)
            }
            _ if sql.contains(FAIL_MARKER) => Err(DbError::Query(format!("statement failed: {}", sql))),
            "SELECT" => Ok(0),
            _ => {
                match self.pending.lock().as_mut() {
                    Some(pending) => pending.push(sql.to_string()),
                    None => self.db.committed.lock().push(sql.to_string()),
                }
                Ok(1)
            }
        }
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.pending.lock().is_some()
    }
}

fn single_row(columns: &[(&str, &str)], values: Vec<Value>) -> QueryResult {
    let meta: Vec<ColumnMeta> = columns
        .iter()
        .enumerate()
        .map(|(ordinal, (name, data_type))| ColumnMeta {
            name: name.to_string(),
            data_type: data_type.to_string(),
            ordinal,
        })
        .collect();
    let names = meta.iter().map(|c| c.name.clone()).collect();
    QueryResult::from_rows(meta, vec![Row::new(names, values)])
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        let affected_rows = self.run(sql)?;
        Ok(StatementResult {
            affected_rows,
            execution_time_ms: 0,
        })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if sql == "SELECT 1" && self.db.fail_validation.load(Ordering::SeqCst) {
            return Err(DbError::Connection("stale connection".into()));
        }
        self.run(sql)?;

        if sql.contains("version()") {
            return Ok(single_row(
                &[("version", "text"), ("is_replica", "bool"), ("database_time", "timestamptz")],
                vec![
                    Value::String("PostgreSQL 16.2 (mock)".into()),
                    Value::Bool(false),
                    Value::DateTimeUtc(chrono::Utc::now()),
                ],
            ));
        }
        if sql.starts_with("SELECT $1") {
            return Ok(single_row(&[("value", "int4")], params.to_vec()));
        }
        if sql.starts_with("SELECT") {
            return Ok(single_row(&[("?column?", "int4")], vec![Value::Int32(1)]));
        }
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory that hands out `MockConnection`s and keeps them for inspection
pub(crate) struct MockConnectionFactory {
    db: Arc<MockDatabase>,
    counter: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    fail_create: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
}

impl MockConnectionFactory {
    pub(crate) fn new(db: Arc<MockDatabase>) -> Arc<Self> {
        Arc::new(Self {
            db,
            counter: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            create_delay: Mutex::new(None),
        })
    }

    /// Number of connections opened so far
    pub(crate) fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub(crate) fn connection(&self, id: usize) -> Arc<MockConnection> {
        self.connections
            .lock()
            .iter()
            .find(|conn| conn.id == id)
            .cloned()
            .expect("no connection with that id")
    }

    pub(crate) fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) || self.db.down.load(Ordering::SeqCst) {
            return Err(DbError::Connection("could not connect to server".into()));
        }

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(MockConnection::new(id, Arc::clone(&self.db)));
        self.connections.lock().push(Arc::clone(&connection));
        Ok(connection as Arc<dyn Connection>)
    }
}
