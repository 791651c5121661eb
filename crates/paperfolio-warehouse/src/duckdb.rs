//! `DuckDB` connection pooling.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::duckdb::Connection;

struct PoolInner {
    db_path: PathBuf,
    max_idle: usize,
    /// First connection opened against the file; every other connection is cloned from it
    /// so they share one database instance.
    root: Mutex<Option<Connection>>,
    idle: Mutex<Vec<Connection>>,
}

/// Small connection pool over a single `DuckDB` database file.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Create a pool that keeps at most `max_idle` connections around between calls.
    ///
    /// The database file is opened lazily on first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path: path.into(),
                max_idle: max_idle.max(1),
                root: Mutex::new(None),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Run `work` with a pooled connection and return the connection afterwards.
    ///
    /// # Errors
    /// Returns the error produced by `work`, or a `DuckDB` error when no connection
    /// could be opened.
    pub fn with_connection<T, E>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<::duckdb::Error>,
    {
        let connection = self.checkout()?;
        let result = work(&connection);
        self.check_in(connection);
        result
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    fn checkout(&self) -> Result<Connection, ::duckdb::Error> {
        if let Some(connection) = lock(&self.inner.idle).pop() {
            return Ok(connection);
        }

        let mut root = lock(&self.inner.root);
        match root.as_ref() {
            Some(connection) => connection.try_clone(),
            None => {
                let connection = Connection::open(self.inner.db_path.as_path())?;
                connection.execute_batch("PRAGMA disable_progress_bar;")?;
                let clone = connection.try_clone()?;
                *root = Some(connection);
                Ok(clone)
            }
        }
    }

    fn check_in(&self, connection: Connection) {
        let mut idle = lock(&self.inner.idle);
        if idle.len() < self.inner.max_idle {
            idle.push(connection);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
