#![doc = include_str!("../README.md")]

//! # marc2db: MARC bulk loader
//!
//! Streams ISO 2709 MARC records into three relational tables (records,
//! fields and subfields) in batched transactions, with surrogate keys that
//! carry across batches and input files and are recovered from the database
//! on restart.
//!
//! ## Loading a file
//!
//! ```ignore
//! use marc2db::{run, ConnectionParams, LoadOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = ConnectionParams::sqlite("catalog.db");
//! let stats = run(&params, LoadOptions::default(), &["records.mrc"])?;
//! println!("{} records committed", stats.records_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving the pieces by hand
//!
//! ```ignore
//! use marc2db::{decompose, IdCounters, MarcReader};
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reader = MarcReader::new(File::open("records.mrc")?);
//! let mut counters = IdCounters::default();
//! while let Some(record) = reader.read_record()? {
//!     let rows = decompose(&record, &mut counters)?;
//!     println!("record {} has {} fields", rows.record.id, rows.fields.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`leader`], [`reader`], [`record`]: ISO 2709 decoding
//! - [`decompose`]: records to rows, surrogate keys
//! - [`schema`]: table layout and SQL per engine
//! - [`store`]: database connections behind the [`Store`] trait
//! - [`resume`]: table preparation and id recovery
//! - [`batch`]: transactional flush of buffered rows
//! - [`input`]: opening plain and gzip inputs
//! - [`loader`]: the load driver
//! - [`config`], [`logging`], [`error`]: ambient setup

pub mod batch;
pub mod config;
pub mod decompose;
pub mod encoding;
pub mod error;
pub mod input;
pub mod leader;
pub mod loader;
pub mod logging;
pub mod reader;
pub mod record;
pub mod resume;
pub mod schema;
pub mod store;

pub use batch::{Batch, FlushOutcome};
pub use config::{ConnectionParams, LoadOptions};
pub use decompose::{
    decompose, Decomposition, FieldOutcome, FieldReport, FieldRow, IdCounters, RecordRow,
    SubfieldRow,
};
pub use encoding::{decode_text, MarcEncoding};
pub use error::{LoadError, MarcError, MarcResult, Result};
pub use input::{open_input, InputStream};
pub use leader::Leader;
pub use loader::{run, LoadStats, Loader, Progress, StreamEnd};
pub use reader::MarcReader;
pub use record::{Field, Record};
pub use resume::{prepare_tables, recover_counters, TableAction};
pub use schema::{Engine, Schema, Table, TableNames};
pub use store::{AnyStore, PostgresStore, SqliteStore, Store};
