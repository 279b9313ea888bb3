//! Run configuration.
//!
//! [`ConnectionParams`] says where rows go; [`LoadOptions`] says how the load
//! behaves. Both are plain values: the binary fills them from command-line
//! flags and environment variables, tests build them directly.

use crate::error::{LoadError, Result};
use crate::schema::{Engine, TableNames};
use serde::Serialize;

/// Default number of records per committed batch.
pub const DEFAULT_BATCH_SIZE: u64 = 1000;
/// Default number of records between progress lines.
pub const DEFAULT_LOG_EVERY: u64 = 5000;

/// Where and how to connect to the target store.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Target engine
    pub engine: Engine,
    /// Database name; the database file path for SQLite
    pub database: String,
    /// Server host
    pub host: Option<String>,
    /// Server port
    pub port: Option<u16>,
    /// Login name
    pub user: Option<String>,
    /// Login password
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("engine", &self.engine)
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl ConnectionParams {
    /// Parameters for a SQLite database file.
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        ConnectionParams {
            engine: Engine::Sqlite,
            database: path.into(),
            host: None,
            port: None,
            user: None,
            password: None,
        }
    }

    /// Check that the parameters are usable for the selected engine.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Config`] when no database is named.
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(LoadError::Config(format!(
                "a database name is required for {}",
                self.engine
            )));
        }
        Ok(())
    }
}

/// Behavior of one load run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOptions {
    /// Names of the three target tables
    pub tables: TableNames,
    /// Drop and recreate existing tables instead of resuming
    pub overwrite: bool,
    /// Records per committed batch
    pub batch_size: u64,
    /// Records between progress lines
    pub log_every: u64,
    /// Stop after this many records in this run
    pub max_records: Option<u64>,
    /// Byte offset to skip at the start of each input
    pub start_offset: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            tables: TableNames::default(),
            overwrite: false,
            batch_size: DEFAULT_BATCH_SIZE,
            log_every: DEFAULT_LOG_EVERY,
            max_records: None,
            start_offset: 0,
        }
    }
}

impl LoadOptions {
    /// Check numeric settings.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Config`] for a zero batch size or log cadence.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoadError::Config("batch size must be at least 1".to_string()));
        }
        if self.log_every == 0 {
            return Err(LoadError::Config(
                "log batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
