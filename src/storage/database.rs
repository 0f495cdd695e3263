//! Database Driver Seam
//!
//! The relational driver is supplied from outside the resilience layer through
//! two small traits: `Connector` opens connections from a descriptor and
//! `DbConnection` exposes the handful of operations the layer itself needs
//! (transactions, liveness, text-parameter statements).
//!
//! The shipped driver is SQLite via rusqlite. `server` names a directory
//! (local disk or network share) and the database lives at
//! `<server>/<database>.db`.

use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::models::descriptor::ConnectionDescriptor;
use crate::models::settings::RetryPolicy;
use crate::utils::error::{AppError, AppResult};

/// An open database connection owned by one session.
///
/// Implementations are driven from the blocking thread pool, so every method
/// may block.
pub trait DbConnection: Send + 'static {
    /// Start a transaction
    fn begin(&mut self) -> AppResult<()>;

    /// Commit the open transaction
    fn commit(&mut self) -> AppResult<()>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> AppResult<()>;

    /// Cheap round-trip proving the connection is usable
    fn ping(&mut self) -> AppResult<()>;

    /// Execute a statement with positional text parameters, returning the
    /// number of affected rows.
    fn execute_text(&mut self, sql: &str, params: &[&str]) -> AppResult<usize>;

    /// Run a query returning at most one text value
    fn query_text(&mut self, sql: &str, params: &[&str]) -> AppResult<Option<String>>;
}

/// Opens connections for a descriptor
pub trait Connector: Send + Sync + 'static {
    type Connection: DbConnection;

    /// Open a new connection. Blocking.
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        policy: &RetryPolicy,
    ) -> AppResult<Self::Connection>;
}

/// SQLite connector backed by rusqlite
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        Self
    }

    /// File backing `descriptor`: `<server>/<database>.db`
    pub fn database_path(descriptor: &ConnectionDescriptor) -> PathBuf {
        Path::new(&descriptor.server).join(format!("{}.db", descriptor.database))
    }
}

impl Connector for SqliteConnector {
    type Connection = Connection;

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        policy: &RetryPolicy,
    ) -> AppResult<Connection> {
        let server = Path::new(&descriptor.server);
        if !server.is_dir() {
            return Err(AppError::connectivity(format!(
                "network path not found: {}",
                descriptor.server
            )));
        }

        let path = Self::database_path(descriptor);
        debug!(
            "[SqliteConnector] Opening {} (integrated_security={})",
            path.display(),
            descriptor.integrated_security
        );

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(policy.command_timeout())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

impl DbConnection for Connection {
    fn begin(&mut self) -> AppResult<()> {
        self.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> AppResult<()> {
        self.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> AppResult<()> {
        if !self.is_autocommit() {
            self.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn ping(&mut self) -> AppResult<()> {
        self.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn execute_text(&mut self, sql: &str, params: &[&str]) -> AppResult<usize> {
        Ok(self.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query_text(&mut self, sql: &str, params: &[&str]) -> AppResult<Option<String>> {
        Ok(self
            .query_row(sql, params_from_iter(params.iter()), |row| row.get::<_, String>(0))
            .optional()?)
    }
}
