//! Target stores.
//!
//! [`Store`] is the one interface the loader talks to. Each supported engine
//! has one implementation; dialect differences (placeholders, existence
//! checks, drop semantics) live in [`crate::schema::Engine`] and the statements
//! are passed in ready-made.
//!
//! Transactions are explicit: the batch writer calls [`Store::begin`], the
//! three insert methods in parent-before-child order, then [`Store::commit`]
//! or [`Store::rollback`].

use crate::config::ConnectionParams;
use crate::decompose::{FieldRow, RecordRow, SubfieldRow};
use crate::error::Result;
use crate::schema::Engine;

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

/// Connection to a target relational store.
pub trait Store {
    /// Engine behind this store.
    fn engine(&self) -> Engine;

    /// Whether a table named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    fn table_exists(&mut self, name: &str) -> Result<bool>;

    /// Execute a statement that returns no rows (DDL).
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run a `SELECT max(id)` style query; an empty table yields zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn max_id(&mut self, sql: &str) -> Result<i64>;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses to start a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Insert header rows with the given `INSERT` template.
    ///
    /// # Errors
    ///
    /// Returns the first insertion failure; earlier rows stay in the open
    /// transaction.
    fn insert_records(&mut self, sql: &str, rows: &[RecordRow]) -> Result<()>;

    /// Insert field rows with the given `INSERT` template.
    ///
    /// # Errors
    ///
    /// Returns the first insertion failure.
    fn insert_fields(&mut self, sql: &str, rows: &[FieldRow]) -> Result<()>;

    /// Insert subfield rows with the given `INSERT` template.
    ///
    /// # Errors
    ///
    /// Returns the first insertion failure.
    fn insert_subfields(&mut self, sql: &str, rows: &[SubfieldRow]) -> Result<()>;

    /// Commit the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(&mut self) -> Result<()>;

    /// Commit anything still open and close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the final commit or the close fails.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// A store chosen at runtime from configuration.
#[derive(Debug)]
pub enum AnyStore {
    /// SQLite file database
    Sqlite(SqliteStore),
    /// PostgreSQL server
    Postgres(PostgresStore),
}

impl AnyStore {
    /// Connect to the engine named in `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn connect(params: &ConnectionParams) -> Result<Self> {
        match params.engine {
            Engine::Sqlite => Ok(AnyStore::Sqlite(SqliteStore::open(&params.database)?)),
            Engine::Postgres => Ok(AnyStore::Postgres(PostgresStore::connect(params)?)),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::Sqlite($store) => $call,
            AnyStore::Postgres($store) => $call,
        }
    };
}

impl Store for AnyStore {
    fn engine(&self) -> Engine {
        dispatch!(self, s => s.engine())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        dispatch!(self, s => s.table_exists(name))
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        dispatch!(self, s => s.execute(sql))
    }

    fn max_id(&mut self, sql: &str) -> Result<i64> {
        dispatch!(self, s => s.max_id(sql))
    }

    fn begin(&mut self) -> Result<()> {
        dispatch!(self, s => s.begin())
    }

    fn insert_records(&mut self, sql: &str, rows: &[RecordRow]) -> Result<()> {
        dispatch!(self, s => s.insert_records(sql, rows))
    }

    fn insert_fields(&mut self, sql: &str, rows: &[FieldRow]) -> Result<()> {
        dispatch!(self, s => s.insert_fields(sql, rows))
    }

    fn insert_subfields(&mut self, sql: &str, rows: &[SubfieldRow]) -> Result<()> {
        dispatch!(self, s => s.insert_subfields(sql, rows))
    }

    fn commit(&mut self) -> Result<()> {
        dispatch!(self, s => s.commit())
    }

    fn rollback(&mut self) -> Result<()> {
        dispatch!(self, s => s.rollback())
    }

    fn close(self) -> Result<()> {
        dispatch!(self, s => s.close())
    }
}
