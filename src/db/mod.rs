//! Database layer for the task hierarchy engine.
//!
//! Each component lives in its own module as free functions over a
//! `&Connection`, so several operations can share one unit of work
//! (a `rusqlite::Transaction` derefs to `Connection`). The `Database`
//! methods are thin wrappers that run one operation per transaction and
//! publish change notices after commit.

pub mod deps;
pub mod hierarchy;
pub mod lookups;
pub mod search;
pub mod stats;
pub mod tasks;
pub mod tree;

use crate::config::Config;
use crate::error::Result;
use crate::notify::{ChangeNotice, ChangeSink, NoopSink};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_RANGE_DAYS: i64 = 366;

/// Database handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    sink: Arc<dyn ChangeSink>,
    max_range_days: i64,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_file(path.as_ref(), DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open the database described by a loaded configuration.
    pub fn open_with(config: &Config) -> Result<Self> {
        let db = Self::open_file(&config.store.db_path, config.store.busy_timeout_ms)?;
        Ok(db.with_max_range_days(config.stats.max_range_days))
    }

    fn open_file(path: &Path, busy_timeout_ms: u64) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets request-scoped readers proceed while one writer commits
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;

        debug!(path = %path.display(), "opened task database");
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        embedded::migrations::runner().run(&mut conn)?;
        search::register_functions(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sink: Arc::new(NoopSink),
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
        })
    }

    /// Install the receiver of change notices.
    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Longest date range accepted by statistics queries.
    pub fn with_max_range_days(mut self, days: i64) -> Self {
        self.max_range_days = days;
        self
    }

    pub fn max_range_days(&self) -> i64 {
        self.max_range_days
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder leaves no open transaction behind: dropping it rolled back.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` as one unit of work.
    ///
    /// The transaction is IMMEDIATE, so the write lock is taken up front and
    /// concurrent writers are serialized by SQLite. It commits when `f` returns
    /// `Ok` and rolls back on `Err` (or when `f` panics and the handle drops).
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Hand a committed change to the installed sink.
    pub(crate) fn publish(&self, notice: ChangeNotice) {
        debug!(
            event = notice.kind.event_name(),
            user_id = notice.user_id,
            task_id = ?notice.task_id,
            "publishing change notice"
        );
        self.sink.publish(notice);
    }
}

/// Current local wall-clock time, without timezone.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Today's local calendar date.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
