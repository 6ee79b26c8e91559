//! Session/Pool manager for the spatial store.
//!
//! A bounded r2d2 pool of `query_only` SQLite connections. Callers get a scoped
//! [`Session`] that goes back to the pool on every exit path (drop), with the
//! connection's cached statements discarded first when `expire_on_release`
//! is set.
//!
//! Each session carries a statement deadline of `statement_timeout` from the
//! moment it is checked out. SQLite's progress handler interrupts any
//! statement still running past it, which surfaces as `StoreUnavailable`.
//!
//! ```text
//! ProximityEngine / health endpoint
//!         │
//!         └──→ SessionPool (r2d2)
//!                 ├──→ pool_size steady connections (min_idle)
//!                 └──→ max_overflow burst connections (reaped when idle)
//! ```

use crate::config::StoreConfig;
use crate::error::{NearbyError, Result};
use r2d2::{HandleError, Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// COUNTERS
// ============================================================================

#[derive(Debug, Default)]
struct PoolCounters {
    checked_out: AtomicU64,
    total_checkouts: AtomicU64,
    exhausted: AtomicU64,
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections (idle + checked out)
    pub connections: u32,
    pub idle_connections: u32,
    pub checked_out: u64,
    pub total_checkouts: u64,
    /// Acquisitions that failed with `PoolExhausted`
    pub exhausted: u64,
    pub max_connections: u32,
}

/// Routes r2d2's background connection errors into tracing
#[derive(Debug)]
struct TracingErrorHandler;

impl HandleError<rusqlite::Error> for TracingErrorHandler {
    fn handle_error(&self, error: rusqlite::Error) {
        tracing::warn!(error = %error, "store connection attempt failed");
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// VM instructions between deadline checks
const DEADLINE_CHECK_OPS: i32 = 1_000;

/// A checked-out store connection, returned to the pool on drop
pub struct Session {
    conn: PooledConnection<SqliteConnectionManager>,
    counters: Arc<PoolCounters>,
    expire_on_release: bool,
}

impl Deref for Session {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
        if self.expire_on_release {
            self.conn.flush_prepared_statement_cache();
        }
        self.counters.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// LIVENESS
// ============================================================================

/// Outcome of a liveness probe. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Liveness {
    Ok,
    Degraded { detail: String },
}

impl Liveness {
    pub fn is_ok(&self) -> bool {
        matches!(self, Liveness::Ok)
    }
}

// ============================================================================
// POOL
// ============================================================================

/// Process-scoped connection pool, cheap to clone and share between handlers
#[derive(Clone)]
pub struct SessionPool {
    inner: Pool<SqliteConnectionManager>,
    counters: Arc<PoolCounters>,
    acquire_timeout: Duration,
    statement_timeout: Duration,
    expire_on_release: bool,
    max_connections: u32,
}

impl SessionPool {
    /// Build the pool. Connections are opened lazily in the background, so an
    /// unreachable store does not fail construction; it shows up on acquire
    /// and in [`SessionPool::probe_liveness`].
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let busy_timeout = config.statement_timeout;
        let manager = SqliteConnectionManager::file(&config.database_path)
            .with_flags(
                // No SQLITE_OPEN_CREATE: a missing store is an error, not an empty file
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                conn.pragma_update(None, "query_only", true)
            });

        let max_connections = config.max_connections();
        let inner = Pool::builder()
            .max_size(max_connections)
            .min_idle(Some(config.pool_size))
            .idle_timeout(Some(config.overflow_idle_timeout))
            .connection_timeout(config.acquire_timeout)
            .error_handler(Box::new(TracingErrorHandler))
            .build_unchecked(manager);

        tracing::info!(
            path = %config.database_path.display(),
            pool_size = config.pool_size,
            max_overflow = config.max_overflow,
            "session pool created"
        );

        Ok(Self {
            inner,
            counters: Arc::new(PoolCounters::default()),
            acquire_timeout: config.acquire_timeout,
            statement_timeout: config.statement_timeout,
            expire_on_release: config.expire_on_release,
            max_connections,
        })
    }

    /// Check out a session, blocking up to the acquisition timeout.
    ///
    /// A timeout is `StoreUnavailable` when r2d2 recorded a failed connection
    /// attempt while we waited, and `PoolExhausted` otherwise.
    pub fn acquire(&self) -> Result<Session> {
        let started = Instant::now();

        match self.inner.get_timeout(self.acquire_timeout) {
            Ok(conn) => {
                if let Some(deadline) = Instant::now().checked_add(self.statement_timeout) {
                    conn.progress_handler(
                        DEADLINE_CHECK_OPS,
                        Some(move || Instant::now() >= deadline),
                    );
                }

                self.counters.checked_out.fetch_add(1, Ordering::SeqCst);
                self.counters.total_checkouts.fetch_add(1, Ordering::Relaxed);
                Ok(Session {
                    conn,
                    counters: Arc::clone(&self.counters),
                    expire_on_release: self.expire_on_release,
                })
            }
            Err(err) => {
                let waited_ms = started.elapsed().as_millis() as u64;

                match connect_failure(&err) {
                    Some(cause) => {
                        tracing::warn!(error = %cause, waited_ms, "store unavailable on acquire");
                        Err(NearbyError::StoreUnavailable(err.to_string()))
                    }
                    None => {
                        self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(waited_ms, "session pool exhausted");
                        Err(NearbyError::PoolExhausted { waited_ms })
                    }
                }
            }
        }
    }

    /// Cheap round trip to the store. Holds a connection only for the
    /// duration of `SELECT 1` and reports failure as a status.
    pub fn probe_liveness(&self) -> Liveness {
        let outcome = self.acquire().and_then(|session| {
            session
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(NearbyError::from)
        });

        match outcome {
            Ok(_) => Liveness::Ok,
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "liveness probe degraded");
                Liveness::Degraded {
                    detail: err.to_string(),
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state();
        PoolStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
            checked_out: self.counters.checked_out.load(Ordering::SeqCst),
            total_checkouts: self.counters.total_checkouts.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
            max_connections: self.max_connections,
        }
    }
}

/// The connection error r2d2 attached to a checkout timeout, if any.
/// Its message is "timed out waiting for connection[: <last error>]".
fn connect_failure(err: &r2d2::Error) -> Option<String> {
    err.to_string()
        .split_once(": ")
        .map(|(_, cause)| cause.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::setup_database;
    use std::path::PathBuf;

    fn seeded_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        setup_database(&conn).unwrap();
        file
    }

    fn small_config(path: impl Into<PathBuf>) -> StoreConfig {
        StoreConfig {
            pool_size: 1,
            max_overflow: 0,
            acquire_timeout: Duration::from_millis(200),
            ..StoreConfig::for_path(path)
        }
    }

    #[test]
    fn test_session_released_on_drop() {
        let file = seeded_file();
        let pool = SessionPool::new(&small_config(file.path())).unwrap();

        {
            let session = pool.acquire().unwrap();
            let one: i64 = session.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
            assert_eq!(one, 1);
            assert_eq!(pool.stats().checked_out, 1);
        }

        assert_eq!(pool.stats().checked_out, 0);
        // Released connection is reusable
        assert!(pool.acquire().is_ok());
        assert_eq!(pool.stats().total_checkouts, 2);
    }

    #[test]
    fn test_exhausted_when_all_connections_busy() {
        let file = seeded_file();
        let pool = SessionPool::new(&small_config(file.path())).unwrap();

        let _held = pool.acquire().unwrap();
        let err = pool.acquire().err().unwrap();

        assert!(matches!(err, NearbyError::PoolExhausted { .. }), "{:?}", err);
        assert_eq!(pool.stats().exhausted, 1);
    }

    #[test]
    fn test_overflow_allows_burst() {
        let file = seeded_file();
        let config = StoreConfig {
            max_overflow: 1,
            ..small_config(file.path())
        };
        let pool = SessionPool::new(&config).unwrap();

        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(matches!(
            pool.acquire(),
            Err(NearbyError::PoolExhausted { .. })
        ));
        assert!(pool.stats().connections <= 2);
    }

    #[test]
    fn test_unreachable_store() {
        let dir = tempfile::tempdir().unwrap();
        let pool = SessionPool::new(&small_config(dir.path().join("missing.db"))).unwrap();

        assert!(matches!(
            pool.acquire(),
            Err(NearbyError::StoreUnavailable(_))
        ));
        match pool.probe_liveness() {
            Liveness::Degraded { detail } => assert!(!detail.is_empty()),
            Liveness::Ok => panic!("probe should be degraded"),
        }
    }

    #[test]
    fn test_long_statement_interrupted_at_deadline() {
        let file = seeded_file();
        let config = StoreConfig {
            statement_timeout: Duration::from_millis(100),
            ..small_config(file.path())
        };
        let pool = SessionPool::new(&config).unwrap();

        let started = Instant::now();
        let outcome = {
            let session = pool.acquire().unwrap();
            session
                .query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 30000000)
                     SELECT count(*) FROM c",
                    [],
                    |r| r.get::<_, i64>(0),
                )
                .map_err(NearbyError::from)
        };
        let elapsed = started.elapsed();

        assert!(
            matches!(outcome, Err(NearbyError::StoreUnavailable(_))),
            "{:?}",
            outcome
        );
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);

        // The next session gets a fresh deadline
        let session = pool.acquire().unwrap();
        let one: i64 = session.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_cached_statements_flushed_between_sessions() {
        let file = seeded_file();
        let pool = SessionPool::new(&small_config(file.path())).unwrap();
        let sql = "SELECT count(*) FROM points_of_interest";

        for _ in 0..3 {
            let session = pool.acquire().unwrap();
            let count: i64 = {
                let mut stmt = session.prepare_cached(sql).unwrap();
                stmt.query_row([], |r| r.get(0)).unwrap()
            };
            assert_eq!(count, 0);
        }

        // Single connection reused after each flush
        let stats = pool.stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.total_checkouts, 3);
    }

    #[test]
    fn test_probe_ok_and_releases() {
        let file = seeded_file();
        let pool = SessionPool::new(&small_config(file.path())).unwrap();

        assert_eq!(pool.probe_liveness(), Liveness::Ok);
        assert_eq!(pool.stats().checked_out, 0);
    }

    #[test]
    fn test_liveness_serializes_with_status_tag() {
        let ok = serde_json::to_value(Liveness::Ok).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok"}));

        let degraded = serde_json::to_value(Liveness::Degraded {
            detail: "down".to_string(),
        })
        .unwrap();
        assert_eq!(
            degraded,
            serde_json::json!({"status": "degraded", "detail": "down"})
        );
    }
}
