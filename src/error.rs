//! Error types for decoding and loading.
//!
//! [`MarcError`] covers everything that can go wrong while decoding an ISO 2709
//! stream. [`LoadError`] covers the rest of the pipeline: target store access,
//! input handling, table preparation and configuration. Decode errors convert
//! into [`LoadError::Decode`] together with the position of the failing record.

use thiserror::Error;

/// Error type for ISO 2709 decoding.
#[derive(Error, Debug)]
pub enum MarcError {
    /// Error indicating an invalid or malformed MARC record.
    #[error("Invalid MARC record: {0}")]
    InvalidRecord(String),

    /// Error indicating an invalid leader (24-byte header).
    #[error("Invalid leader: {0}")]
    InvalidLeader(String),

    /// Error indicating a truncated or incomplete record.
    #[error("Truncated record: {0}")]
    TruncatedRecord(String),

    /// IO error from the underlying source.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error type for the load pipeline.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A record in the input stream could not be decoded.
    #[error("decode error at record {position}: {source}")]
    Decode {
        /// 1-based position of the record within its input stream.
        position: u64,
        /// Underlying decoder error.
        #[source]
        source: MarcError,
    },

    /// A decoded record could not be decomposed into rows.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Error reported by the embedded SQLite store.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Error reported by the PostgreSQL store.
    #[error("postgres: {0}")]
    Postgres(#[from] postgres::Error),

    /// An existing table could not be dropped while overwriting.
    #[error("failed to drop table {table}: {source}")]
    DropFailed {
        /// Name of the table that could not be dropped.
        table: String,
        /// Store error behind the failure.
        #[source]
        source: Box<LoadError>,
    },

    /// Input path does not exist.
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error while reading input or writing output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for [`std::result::Result`] with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;

/// Result type used by the decoder.
pub type MarcResult<T> = std::result::Result<T, MarcError>;
