//! Embedded SQLite store.

use super::Store;
use crate::decompose::{FieldRow, RecordRow, SubfieldRow};
use crate::error::Result;
use crate::schema::Engine;
use rusqlite::{Connection, ToSql};
use std::path::Path;
use tracing::debug;

/// SQLite database file opened for bulk loading.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the pragmas fail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite database");
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Applies the bulk-load pragmas. Durability comes from committed batches
    /// plus resumption, not from synchronous writes.
    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "cache_size", 10000)?;
        conn.pragma_update(None, "synchronous", "OFF")?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "MEMORY", |row| row.get(0))?;
        debug!(journal_mode = %mode, "sqlite pragmas applied");
        Ok(SqliteStore { conn })
    }

    /// Underlying connection, for inspection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for SqliteStore {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(Engine::Sqlite.table_exists_sql(), [name], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn max_id(&mut self, sql: &str) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn insert_records(&mut self, sql: &str, rows: &[RecordRow]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        for row in rows {
            let mut values: Vec<&dyn ToSql> = Vec::with_capacity(2 + row.controls.len());
            values.push(&row.id);
            values.push(&row.leader);
            values.extend(row.controls.iter().map(|c| c as &dyn ToSql));
            stmt.execute(values.as_slice())?;
        }
        Ok(())
    }

    fn insert_fields(&mut self, sql: &str, rows: &[FieldRow]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        for row in rows {
            stmt.execute(rusqlite::params![
                row.id,
                row.record_id,
                row.tag,
                row.indicator1.to_string(),
                row.indicator2.to_string(),
            ])?;
        }
        Ok(())
    }

    fn insert_subfields(&mut self, sql: &str, rows: &[SubfieldRow]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        for row in rows {
            stmt.execute(rusqlite::params![
                row.id,
                row.field_id,
                row.code.to_string(),
                row.data,
            ])?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        // Some errors (SQLITE_FULL, SQLITE_IOERR) already rolled back.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
