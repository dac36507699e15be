//! SQLite engine: a small connection pool and the [`Session`] guard.
//!
//! An [`Engine`] owns the database location and a stack of idle, configured
//! connections. A [`Session`] checks one connection out and is the unit of
//! work: writes open a transaction lazily, `commit`/`rollback` end it, and
//! dropping the session rolls back whatever is still pending and returns the
//! connection to the pool. Release therefore happens on every exit path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::StorageError;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle connections kept around for reuse.
const DEFAULT_MAX_IDLE: usize = 4;

/// Shared handle to a SQLite database. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
}

impl Engine {
    /// Opens (or creates) the database at `path`.
    ///
    /// One connection is opened and configured eagerly so an unreachable
    /// database fails here rather than on first use.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let conn = connect(&path)?;
        debug!(path = %path.display(), "opened database");
        Ok(Engine {
            inner: Arc::new(EngineInner {
                path,
                idle: Mutex::new(vec![conn]),
                max_idle: DEFAULT_MAX_IDLE,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Starts a new unit of work on a pooled connection.
    pub fn session(&self) -> Result<Session, StorageError> {
        let conn = self.checkout()?;
        Ok(Session {
            conn: Some(conn),
            engine: self.clone(),
        })
    }

    /// Number of connections currently parked in the pool.
    pub fn idle_connections(&self) -> usize {
        self.idle().len()
    }

    /// Runs `f` on a pooled connection outside any session, in autocommit
    /// mode. Used for DDL.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.checkout()?;
        let result = f(&conn);
        self.checkin(conn);
        result
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self) -> Result<Connection, StorageError> {
        if let Some(conn) = self.idle().pop() {
            return Ok(conn);
        }
        connect(&self.inner.path)
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle();
        if idle.len() < self.inner.max_idle {
            idle.push(conn);
        }
    }
}

/// Opens and configures one connection.
fn connect(path: &Path) -> Result<Connection, StorageError> {
    let into_error = |source| StorageError::Connection {
        path: path.to_path_buf(),
        source,
    };
    let conn = Connection::open(path).map_err(into_error)?;
    configure(&conn).map_err(into_error)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    // WAL lets other sessions read while one holds the write lock.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// One unit of work bound to a pooled connection.
///
/// Reads run against whatever the connection sees: committed rows plus this
/// session's own staged writes. Not shared between threads; give each
/// execution context its own session.
pub struct Session {
    conn: Option<Connection>,
    engine: Engine,
}

impl Session {
    /// The session's connection for reads.
    pub(crate) fn connection(&self) -> Result<&Connection, StorageError> {
        self.conn.as_ref().ok_or(StorageError::SessionClosed)
    }

    /// The session's connection for writes, inside an open transaction.
    pub(crate) fn begin(&mut self) -> Result<&Connection, StorageError> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(conn)
    }

    /// True while staged writes are waiting for `commit`.
    pub fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit())
    }

    /// Commits staged writes. A no-op when nothing is staged.
    ///
    /// On failure the transaction is rolled back before the error is
    /// returned, so the session is immediately usable again.
    pub fn commit(&mut self) -> Result<(), StorageError> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        if let Err(source) = conn.execute_batch("COMMIT") {
            if !conn.is_autocommit() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!(error = %e, "rollback after failed commit also failed");
                }
            }
            warn!(error = %source, "commit failed; unit of work rolled back");
            return Err(StorageError::Transaction { source });
        }
        debug!("committed unit of work");
        Ok(())
    }

    /// Discards staged writes. A no-op when nothing is staged.
    pub fn rollback(&mut self) -> Result<(), StorageError> {
        let conn = self.connection()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
            debug!("rolled back unit of work");
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                // Never pool a connection stuck in a transaction.
                warn!(error = %e, "failed to roll back released session; dropping connection");
                return;
            }
            debug!("released session with uncommitted work; rolled back");
        }
        self.engine.checkin(conn);
    }
}
