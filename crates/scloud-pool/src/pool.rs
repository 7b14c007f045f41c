use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::database::Database;
use crate::error::{PoolError, PoolResult};
use crate::transaction::Transaction;

/// A storage handle. Runs at most one [`Transaction`] at a time, which the
/// `&mut self` borrow in [`begin`](Self::begin) enforces.
pub struct Connection {
    id: u64,
    database: Database,
    tx_counter: Arc<AtomicU64>,
    created_at: Instant,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Start a unit of work.
    pub fn begin(&mut self) -> Transaction<'_> {
        let tx_id = self.tx_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Transaction::begin(tx_id, &self.database)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}

/// Snapshot of pool occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
    pub closed: bool,
}

struct IdleConnection {
    conn: Connection,
    idle_since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    total: usize,
    closed: bool,
    next_conn_id: u64,
}

struct PoolInner {
    database: Database,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    tx_counter: Arc<AtomicU64>,
}

/// Size-bounded pool of [`Connection`]s over one [`Database`].
///
/// Create it once at startup, pass it to whatever needs storage, and call
/// [`close`](Self::close) once at shutdown. Cloning shares the same pool.
///
/// [`acquire`](Self::acquire) blocks the calling thread while every
/// connection is in use, up to the configured connection timeout, then
/// fails with [`PoolError::Exhausted`].
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Build a pool and open `min_idle` connections eagerly.
    pub fn new(database: Database, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let inner = Arc::new(PoolInner {
            database,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.max_size),
                total: 0,
                closed: false,
                next_conn_id: 0,
            }),
            available: Condvar::new(),
            tx_counter: Arc::new(AtomicU64::new(0)),
            config,
        });
        {
            let mut state = inner.state.lock().expect("pool lock poisoned");
            for _ in 0..inner.config.min_idle {
                let conn = inner.open(&mut state);
                state.idle.push_back(IdleConnection {
                    conn,
                    idle_since: Instant::now(),
                });
            }
        }
        info!(
            max_size = inner.config.max_size,
            min_idle = inner.config.min_idle,
            "connection pool initialized"
        );
        Ok(Self { inner })
    }

    /// Borrow a connection, waiting up to the connection timeout.
    pub fn acquire(&self) -> PoolResult<PooledConnection> {
        let started = Instant::now();
        let deadline = started + self.inner.config.connection_timeout();
        let mut state = self.inner.state.lock().expect("pool lock poisoned");
        loop {
            if state.closed {
                return Err(PoolError::Unavailable);
            }
            self.inner.reap(&mut state);
            if let Some(idle) = state.idle.pop_back() {
                return Ok(PooledConnection::new(Arc::clone(&self.inner), idle.conn));
            }
            if state.total < self.inner.config.max_size {
                let conn = self.inner.open(&mut state);
                return Ok(PooledConnection::new(Arc::clone(&self.inner), conn));
            }
            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(started).as_millis() as u64;
                warn!(waited_ms, in_use = state.total, "connection pool exhausted");
                return Err(PoolError::Exhausted { waited_ms });
            }
            let (guard, _) = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .expect("pool lock poisoned");
            state = guard;
        }
    }

    /// Stop handing out connections. Connections still in use are discarded
    /// when their guards drop.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().expect("pool lock poisoned");
        if state.closed {
            debug!("connection pool already closed");
            return;
        }
        state.closed = true;
        let idle = state.idle.len();
        state.idle.clear();
        state.total -= idle;
        self.inner.available.notify_all();
        info!(discarded = idle, in_use = state.total, "connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().expect("pool lock poisoned").closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock().expect("pool lock poisoned");
        PoolStatus {
            total: state.total,
            idle: state.idle.len(),
            in_use: state.total - state.idle.len(),
            max_size: self.inner.config.max_size,
            closed: state.closed,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("status", &self.status()).finish()
    }
}

impl PoolInner {
    fn open(&self, state: &mut PoolState) -> Connection {
        state.total += 1;
        state.next_conn_id += 1;
        debug!(conn = state.next_conn_id, total = state.total, "connection opened");
        Connection {
            id: state.next_conn_id,
            database: self.database.clone(),
            tx_counter: Arc::clone(&self.tx_counter),
            created_at: Instant::now(),
        }
    }

    /// Retire idle connections past their lifetime, and idle ones beyond
    /// `min_idle` that sat unused longer than the idle timeout.
    fn reap(&self, state: &mut PoolState) {
        let max_lifetime = self.config.max_lifetime();
        let idle_timeout = self.config.idle_timeout();
        let min_idle = self.config.min_idle;
        let before = state.idle.len();
        let mut kept = VecDeque::with_capacity(before);
        while let Some(idle) = state.idle.pop_front() {
            let expired = idle.conn.created_at.elapsed() >= max_lifetime;
            let stale = idle.idle_since.elapsed() >= idle_timeout
                && kept.len() + state.idle.len() >= min_idle;
            if expired || stale {
                debug!(conn = idle.conn.id, expired, "idle connection retired");
            } else {
                kept.push_back(idle);
            }
        }
        state.total -= before - kept.len();
        state.idle = kept;
    }

    fn release(&self, conn: Connection, checked_out: Instant) {
        let held = checked_out.elapsed();
        if let Some(threshold) = self.config.leak_detection_threshold() {
            if held > threshold {
                warn!(
                    conn = conn.id,
                    held_ms = held.as_millis() as u64,
                    "connection held past leak detection threshold"
                );
            }
        }
        let mut state = self.state.lock().expect("pool lock poisoned");
        if state.closed || conn.created_at.elapsed() >= self.config.max_lifetime() {
            state.total -= 1;
            debug!(conn = conn.id, "connection discarded on release");
        } else {
            state.idle.push_back(IdleConnection {
                conn,
                idle_since: Instant::now(),
            });
        }
        self.available.notify_one();
    }
}

/// RAII guard over a borrowed [`Connection`]. Dropping it returns the
/// connection to the pool, on every exit path.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    checked_out: Instant,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            checked_out: Instant::now(),
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection already released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.checked_out);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("held", &self.checked_out.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn small_pool(max_size: usize, timeout_ms: u64) -> Pool {
        let config = PoolConfig {
            max_size,
            min_idle: 0,
            connection_timeout_ms: timeout_ms,
            ..Default::default()
        };
        Pool::new(Database::in_memory(), config).unwrap()
    }

    #[test]
    fn prewarms_min_idle() {
        let config = PoolConfig {
            max_size: 4,
            min_idle: 2,
            ..Default::default()
        };
        let pool = Pool::new(Database::in_memory(), config).unwrap();
        let status = pool.status();
        assert_eq!(status.total, 2);
        assert_eq!(status.idle, 2);
        assert_eq!(status.in_use, 0);
    }

    #[test]
    fn guard_returns_connection_on_drop() {
        let pool = small_pool(1, 50);
        {
            let _conn = pool.acquire().unwrap();
            assert_eq!(pool.status().in_use, 1);
        }
        assert_eq!(pool.status().in_use, 0);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn exhausted_after_timeout() {
        let pool = small_pool(1, 30);
        let _held = pool.acquire().unwrap();
        let started = Instant::now();
        match pool.acquire() {
            Err(PoolError::Exhausted { waited_ms }) => assert!(waited_ms >= 30),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn waiter_wakes_when_connection_released() {
        let pool = small_pool(1, 5_000);
        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|c| c.id()))
        };
        thread::sleep(Duration::from_millis(20));
        let held_id = held.id();
        drop(held);
        assert_eq!(waiter.join().unwrap().unwrap(), held_id);
    }

    #[test]
    fn closed_pool_is_unavailable() {
        let pool = small_pool(2, 50);
        let in_flight = pool.acquire().unwrap();
        pool.close();
        assert!(matches!(pool.acquire(), Err(PoolError::Unavailable)));
        drop(in_flight);
        assert_eq!(pool.status().total, 0);
        pool.close();
        assert!(pool.is_closed());
    }

    #[test]
    fn never_exceeds_max_size() {
        let pool = small_pool(3, 2_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let _conn = pool.acquire().unwrap();
                    assert!(pool.status().total <= 3);
                    thread::sleep(Duration::from_millis(5));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.status().in_use, 0);
    }

    #[test]
    fn expired_connections_are_retired() {
        let config = PoolConfig {
            max_size: 2,
            min_idle: 0,
            max_lifetime_ms: 0,
            ..Default::default()
        };
        let pool = Pool::new(Database::in_memory(), config).unwrap();
        let first = pool.acquire().unwrap().id();
        let second = pool.acquire().unwrap().id();
        assert_ne!(first, second);
        assert_eq!(pool.status().total, 0);
    }

    #[test]
    fn idle_connections_beyond_min_idle_are_retired() {
        let config = PoolConfig {
            max_size: 2,
            min_idle: 0,
            idle_timeout_ms: 0,
            ..Default::default()
        };
        let pool = Pool::new(Database::in_memory(), config).unwrap();
        let first = pool.acquire().unwrap().id();
        let second = pool.acquire().unwrap();
        assert_ne!(first, second.id());
        assert_eq!(pool.status().total, 1);
        drop(second);
        assert_eq!(pool.status().idle, 1);
    }

    #[test]
    fn min_idle_connections_survive_idle_timeout() {
        let config = PoolConfig {
            max_size: 4,
            min_idle: 2,
            idle_timeout_ms: 0,
            ..Default::default()
        };
        let pool = Pool::new(Database::in_memory(), config).unwrap();
        {
            let conn = pool.acquire().unwrap();
            assert!(conn.id() <= 2);
            assert_eq!(pool.status().total, 2);
        }
        assert_eq!(pool.status().idle, 2);

        // Grow to three, then let the surplus one go stale.
        {
            let _a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            let _c = pool.acquire().unwrap();
            assert_eq!(pool.status().total, 3);
        }
        let _held = pool.acquire().unwrap();
        let status = pool.status();
        assert_eq!(status.total, 2);
        assert_eq!(status.in_use, 1);
    }

    #[test]
    fn connection_runs_transactions() {
        let pool = small_pool(1, 50);
        let mut conn = pool.acquire().unwrap();
        let tx = conn.begin();
        let first = tx.id();
        tx.rollback();
        let tx = conn.begin();
        assert!(tx.id() > first);
        tx.commit().unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PoolConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Pool::new(Database::in_memory(), config),
            Err(PoolError::InvalidConfig(_))
        ));
    }
}
