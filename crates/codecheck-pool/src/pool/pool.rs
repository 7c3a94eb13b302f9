//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use codecheck_core::{AccessMode, Connection, ConnectionFactory, DbError, Result};
use parking_lot::Mutex;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::stats::{Counters, PoolStats};
use crate::health::HealthMonitor;

/// Internal wrapper for idle connections with metadata
struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
    /// Returned without an explicit release; roll back before reuse
    needs_reset: bool,
}

/// Everything guarded by the pool lock
struct PoolState {
    idle: VecDeque<IdleConnection>,
    active: usize,
    counters: Counters,
}

pub(crate) struct PoolInner {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// One permit per checkout; tokio's semaphore queues waiters FIFO
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    initialized: OnceCell<()>,
    closed: AtomicBool,
    waiting: AtomicUsize,
    health: HealthMonitor,
}

impl PoolInner {
    pub(crate) fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let waiting = self.waiting.load(Ordering::SeqCst);
        let state = self.state.lock();
        PoolStats::new(
            state.idle.len(),
            state.active,
            waiting,
            self.config.min_size(),
            self.config.max_size(),
            &state.counters,
        )
    }

    pub(crate) fn record_error(&self, error: &DbError) {
        let mut state = self.state.lock();
        state.counters.errors += 1;
        state.counters.last_error = Some(error.to_string());
        state.counters.last_error_at = Some(Utc::now());
    }

    pub(crate) fn record_queries(&self, count: u64) {
        self.state.lock().counters.queries_executed += count;
    }

    pub(crate) fn record_transaction(&self) {
        self.state.lock().counters.transactions_executed += 1;
    }

    /// Put a connection back into the idle set
    ///
    /// Returns the connection instead when it must be closed: the pool is
    /// shut down or the connection is already dead.
    fn check_in(
        &self,
        connection: Arc<dyn Connection>,
        created_at: Instant,
        needs_reset: bool,
    ) -> Option<Arc<dyn Connection>> {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);

        if self.is_closed() || connection.is_closed() {
            return Some(connection);
        }

        state.idle.push_back(IdleConnection {
            connection,
            created_at,
            last_used_at: Instant::now(),
            needs_reset,
        });
        None
    }

    /// Drop a checked-out connection from the books without re-pooling it
    fn forget(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
    }

    async fn warm_up(&self) -> Result<()> {
        let min_size = self.config.min_size();
        tracing::info!(
            min_size,
            max_size = self.config.max_size(),
            "initializing connection pool"
        );

        let mut opened = Vec::with_capacity(min_size);
        for _ in 0..min_size {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            match self.factory.create().await {
                Ok(connection) => opened.push((connection, permit)),
                Err(e) => {
                    self.record_error(&e);
                    if opened.is_empty() {
                        tracing::error!(error = %e, "failed to open initial connection");
                        return Err(e);
                    }
                    tracing::warn!(
                        error = %e,
                        opened = opened.len(),
                        "could not open every initial connection, the pool will grow on demand"
                    );
                    break;
                }
            }
        }

        if let Some((first, _)) = opened.first()
            && !self.factory.validate(first.as_ref()).await
        {
            for (connection, _) in &opened {
                let _ = connection.close().await;
            }
            let error = DbError::Connection("initial connection failed validation".into());
            self.record_error(&error);
            tracing::error!("initial connection failed validation");
            return Err(error);
        }

        let count = opened.len();
        let now = Instant::now();
        let mut orphaned = Vec::new();
        {
            let mut state = self.state.lock();
            state.counters.total_created += count as u64;
            for (connection, _permit) in opened {
                if self.is_closed() {
                    orphaned.push(connection);
                } else {
                    state.idle.push_back(IdleConnection {
                        connection,
                        created_at: now,
                        last_used_at: now,
                        needs_reset: false,
                    });
                }
            }
        }

        // shutdown raced with warm-up
        for connection in orphaned {
            let _ = connection.close().await;
        }

        tracing::info!(connections = count, "connection pool initialized");
        Ok(())
    }

    /// Vet an idle connection before lending it out
    ///
    /// Expired, un-resettable and invalid connections are closed and `None`
    /// is returned; the caller then tries the next one.
    async fn revive(&self, idle: IdleConnection) -> Option<(Arc<dyn Connection>, Instant)> {
        let IdleConnection {
            connection,
            created_at,
            last_used_at,
            needs_reset,
        } = idle;

        let too_old = self
            .config
            .max_lifetime()
            .is_some_and(|max_lifetime| created_at.elapsed() > max_lifetime);
        if too_old || last_used_at.elapsed() > self.config.idle_timeout() {
            tracing::debug!(too_old, "discarding expired idle connection");
            let _ = connection.close().await;
            return None;
        }

        if needs_reset
            && let Err(e) = connection.rollback().await
        {
            tracing::warn!(error = %e, "could not reset abandoned connection, discarding it");
            let _ = connection.close().await;
            return None;
        }

        if !self.factory.validate(connection.as_ref()).await {
            tracing::warn!("idle connection failed validation, discarding it");
            let _ = connection.close().await;
            return None;
        }

        Some((connection, created_at))
    }
}

/// Active-count reservation, given back unless handed to a checkout
///
/// Covers the window where a connection is validated or opened for a
/// caller whose `acquire` future may be dropped at any await point.
struct Reservation<'a> {
    pool: &'a PoolInner,
    armed: bool,
}

impl<'a> Reservation<'a> {
    /// Count a new connection as active
    fn open(pool: &'a PoolInner) -> Self {
        pool.state.lock().active += 1;
        Self { pool, armed: true }
    }

    /// Pop an idle connection and count it as active in one critical section
    fn pop_idle(pool: &'a PoolInner) -> Option<(Self, IdleConnection)> {
        let mut state = pool.state.lock();
        let idle = state.idle.pop_front()?;
        state.active += 1;
        Some((Self { pool, armed: true }, idle))
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.forget();
        }
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A bounded pool of database connections
///
/// The pool is a cheap, cloneable handle; clones share the same
/// connections. It does no I/O until `initialize` or the first `acquire`.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            inner: Arc::new(PoolInner {
                config,
                factory: Arc::new(factory),
                semaphore,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    active: 0,
                    counters: Counters::default(),
                }),
                initialized: OnceCell::new(),
                closed: AtomicBool::new(false),
                waiting: AtomicUsize::new(0),
                health: HealthMonitor::default(),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &PoolInner {
        &self.inner
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Open the `min_size` warm connections and validate one of them
    ///
    /// Idempotent: only the first successful call does any work. A failed
    /// initialization is retried by the next call.
    pub async fn initialize(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(DbError::PoolClosed);
        }
        self.inner
            .initialized
            .get_or_try_init(|| self.inner.warm_up())
            .await?;
        Ok(())
    }

    /// Check out a connection for exclusive use
    ///
    /// This will:
    /// 1. Wait (bounded by the acquire timeout) for a free slot
    /// 2. Hand out the oldest idle connection that passes validation
    /// 3. Otherwise open a new connection
    ///
    /// Fails with `PoolExhausted` when no slot frees up in time and with
    /// `PoolClosed` once the pool has been shut down.
    pub async fn acquire(&self, mode: AccessMode) -> Result<PooledConnection> {
        if self.inner.is_closed() {
            return Err(DbError::PoolClosed);
        }
        self.initialize().await?;

        let permit = self.wait_for_slot().await?;
        if self.inner.is_closed() {
            return Err(DbError::PoolClosed);
        }

        while let Some((reservation, idle)) = Reservation::pop_idle(&self.inner) {
            if let Some((connection, created_at)) = self.inner.revive(idle).await {
                reservation.keep();
                return Ok(PooledConnection::new(
                    Arc::clone(&self.inner),
                    connection,
                    created_at,
                    mode,
                    permit,
                ));
            }
        }

        let reservation = Reservation::open(&self.inner);
        match self.inner.factory.create().await {
            Ok(connection) if self.inner.is_closed() => {
                // shutdown ran while the connection was being opened
                drop(reservation);
                let _ = connection.close().await;
                Err(DbError::PoolClosed)
            }
            Ok(connection) => {
                reservation.keep();
                self.inner.state.lock().counters.total_created += 1;
                tracing::debug!(mode = ?mode, "opened new pooled connection");
                Ok(PooledConnection::new(
                    Arc::clone(&self.inner),
                    connection,
                    Instant::now(),
                    mode,
                    permit,
                ))
            }
            Err(e) => {
                self.inner.record_error(&e);
                Err(e)
            }
        }
    }

    async fn wait_for_slot(&self) -> Result<OwnedSemaphorePermit> {
        let _waiting = WaitingGuard::enter(&self.inner.waiting);
        let timeout = self.inner.config.acquire_timeout();

        match tokio::time::timeout(timeout, self.inner.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DbError::PoolClosed),
            Err(_) => {
                let error = DbError::PoolExhausted {
                    timeout,
                    max_size: self.inner.config.max_size(),
                };
                self.inner.state.lock().counters.pool_exhausted_count += 1;
                self.inner.record_error(&error);
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    max_size = self.inner.config.max_size(),
                    "connection pool exhausted"
                );
                Err(error)
            }
        }
    }

    /// Return a connection to the pool
    ///
    /// When `succeeded` is false the connection is rolled back first. A
    /// connection that cannot be rolled back, or is already closed, is
    /// discarded; its slot is refilled lazily by a later `acquire`.
    pub async fn release(&self, conn: PooledConnection, succeeded: bool) {
        conn.release(succeeded).await;
    }

    /// Cheap liveness probe
    pub async fn validate(&self, conn: &dyn Connection) -> bool {
        self.inner.factory.validate(conn).await
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close the pool
    ///
    /// Idle connections are closed now; connections checked out at this
    /// point are closed as they come back. Every later `acquire` fails with
    /// `PoolClosed`. Calling this again, or before the pool was ever
    /// initialized, does nothing.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("connection pool already shut down");
            return;
        }

        tracing::info!("shutting down connection pool");
        self.inner.semaphore.close();

        let (idle, still_active) = {
            let mut state = self.inner.state.lock();
            let idle: Vec<_> = state.idle.drain(..).collect();
            (idle, state.active)
        };

        for entry in &idle {
            if let Err(e) = entry.connection.close().await {
                tracing::warn!(error = %e, "error closing pooled connection");
            }
        }

        tracing::info!(
            closed = idle.len(),
            still_active,
            "connection pool shut down"
        );
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

/// A connection checked out of the pool
///
/// Return it with [`PooledConnection::release`]. If it is dropped instead
/// (early return, panic, cancelled task) it still goes back to the pool,
/// flagged so the next checkout rolls it back before use.
pub struct PooledConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    mode: AccessMode,
    released: bool,
    pool: Arc<PoolInner>,
    // Dropped after `Drop::drop` has checked the connection back in
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(
        pool: Arc<PoolInner>,
        connection: Arc<dyn Connection>,
        created_at: Instant,
        mode: AccessMode,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            connection,
            created_at,
            mode,
            released: false,
            pool,
            _permit: permit,
        }
    }

    /// The access mode this connection was checked out with
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_valid(&self) -> bool {
        !self.connection.is_closed()
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub(crate) fn pool(&self) -> &PoolInner {
        &self.pool
    }

    /// Give the connection back to the pool
    pub async fn release(mut self, succeeded: bool) {
        let mut discard = self.pool.is_closed() || self.connection.is_closed();

        if !succeeded
            && !discard
            && let Err(e) = self.connection.rollback().await
        {
            tracing::warn!(error = %e, "rollback on release failed, discarding connection");
            discard = true;
        }

        self.released = true;
        let to_close = if discard {
            self.pool.forget();
            Some(Arc::clone(&self.connection))
        } else {
            self.pool
                .check_in(Arc::clone(&self.connection), self.created_at, false)
        };

        if let Some(connection) = to_close {
            if let Err(e) = connection.close().await {
                tracing::debug!(error = %e, "error closing discarded connection");
            }
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        tracing::debug!("connection dropped without release, it will be reset before reuse");
        let to_close = self
            .pool
            .check_in(Arc::clone(&self.connection), self.created_at, true);

        if let Some(connection) = to_close
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(async move {
                let _ = connection.close().await;
            });
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("driver", &self.connection.driver_name())
            .field("mode", &self.mode)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}
