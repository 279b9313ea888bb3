//! The load driver: decode, decompose, batch, flush.
//!
//! A [`Loader`] owns the store connection, the id counters and the current
//! batch for the whole run. Inputs are processed strictly one after another
//! and records strictly in stream order. A batch is flushed every
//! `batch_size` records and once more at the end of every input; a progress
//! line is logged every `log_every` records.
//!
//! Fatal conditions (decode errors, invalid records, store failures outside
//! a batch insert) stop the run. [`run`] closes the store on every path.

use crate::batch::{Batch, FlushOutcome};
use crate::config::{ConnectionParams, LoadOptions};
use crate::decompose::{decompose, FieldOutcome, IdCounters};
use crate::error::{LoadError, MarcResult, Result};
use crate::input::{open_input, ByteCounter, InputStream};
use crate::reader::MarcReader;
use crate::record::Record;
use crate::resume::prepare_tables;
use crate::schema::Schema;
use crate::store::{AnyStore, Store};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counts gathered over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Records decoded and decomposed in this run
    pub records_read: u64,
    /// Header rows committed
    pub records_written: u64,
    /// Field rows committed
    pub fields_written: u64,
    /// Subfield rows committed
    pub subfields_written: u64,
    /// Data fields skipped because of a known administrative tag
    pub fields_skipped_benign: u64,
    /// Data fields skipped because their shape could not be decomposed
    pub fields_skipped_malformed: u64,
    /// Batches committed
    pub batches_committed: u64,
    /// Batches rolled back and discarded
    pub batches_rolled_back: u64,
    /// Records lost with rolled back batches
    pub records_discarded: u64,
    /// Inputs fully or partially loaded
    pub inputs_loaded: u64,
    /// Inputs skipped because they were not found
    pub inputs_skipped: u64,
    /// Progress lines logged
    pub progress_reports: u64,
    /// Last id handed out per table
    pub last_ids: IdCounters,
}

/// Why loading of one input stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The input had no more records.
    Exhausted,
    /// The run's record ceiling was reached.
    Ceiling,
}

/// Throughput and ETA reporting for one input.
#[derive(Debug)]
pub struct Progress {
    started: Instant,
    counter: Option<ByteCounter>,
    size: Option<u64>,
    start_position: u64,
}

impl Progress {
    /// Progress over an opened input.
    #[must_use]
    pub fn for_input(input: &InputStream) -> Self {
        Progress {
            started: Instant::now(),
            counter: Some(input.counter()),
            size: input.size(),
            start_position: input.start_position(),
        }
    }

    /// Progress without byte accounting.
    #[must_use]
    pub fn untracked() -> Self {
        Progress {
            started: Instant::now(),
            counter: None,
            size: None,
            start_position: 0,
        }
    }

    /// Bytes read so far, including the skipped prefix.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.counter.as_ref().map_or(0, ByteCounter::get)
    }

    /// Estimated time left, from the byte rate since the start of this input.
    #[must_use]
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        let size = self.size?;
        let position = self.position();
        let consumed = position.checked_sub(self.start_position)?;
        if consumed == 0 {
            return None;
        }
        let left = size.saturating_sub(position);
        #[allow(clippy::cast_precision_loss)]
        let secs = elapsed.as_secs_f64() * left as f64 / consumed as f64;
        Some(Duration::from_secs_f64(secs))
    }

    /// Log one progress line; `in_input` is the number of records read from
    /// the current input.
    fn report(&self, in_input: u64, stats: &LoadStats, counters: &IdCounters) {
        let elapsed = self.started.elapsed();
        #[allow(clippy::cast_precision_loss)]
        let rate = in_input as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let eta = self
            .remaining(elapsed)
            .map_or_else(|| "unknown".to_string(), |d| format!("{:.0?}", round_secs(d)));
        info!(
            records = stats.records_read,
            record_id = counters.record,
            bytes = self.position(),
            size = ?self.size,
            elapsed = ?round_secs(elapsed),
            remaining = %eta,
            records_per_sec = %format!("{rate:.0}"),
            "progress"
        );
    }
}

fn round_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

/// Drives a load into one store.
#[derive(Debug)]
pub struct Loader<S: Store> {
    store: S,
    schema: Schema,
    options: LoadOptions,
    counters: IdCounters,
    batch: Batch,
    stats: LoadStats,
}

impl<S: Store> Loader<S> {
    /// Prepare the target tables and recover counters.
    ///
    /// On failure the store is closed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options, or when the tables cannot be
    /// created, dropped or inspected.
    pub fn new(mut store: S, options: LoadOptions) -> Result<Self> {
        let schema = Schema::new(store.engine(), options.tables.clone());
        let prepared = options
            .validate()
            .and_then(|()| prepare_tables(&mut store, &schema, options.overwrite));
        let counters = match prepared {
            Ok((counters, _)) => counters,
            Err(e) => {
                if let Err(close_err) = store.close() {
                    warn!(error = %close_err, "failed to close store");
                }
                return Err(e);
            },
        };
        info!(
            engine = %schema.engine(),
            record_id = counters.record,
            field_id = counters.field,
            subfield_id = counters.subfield,
            "starting ids recovered"
        );

        Ok(Loader {
            store,
            schema,
            options,
            counters,
            batch: Batch::new(),
            stats: LoadStats::default(),
        })
    }

    /// Current counters (last id handed out per table).
    #[must_use]
    pub fn counters(&self) -> IdCounters {
        self.counters
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Schema in use.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Borrow the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether the configured record ceiling has been hit.
    #[must_use]
    pub fn ceiling_reached(&self) -> bool {
        self.options
            .max_records
            .is_some_and(|max| self.stats.records_read >= max)
    }

    /// Load every path in order.
    ///
    /// Missing paths are logged and skipped. Loading stops early once the
    /// record ceiling is reached.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error.
    pub fn load_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        for path in paths {
            if self.ceiling_reached() {
                info!(path = %path.as_ref().display(), "record ceiling reached, input not opened");
                continue;
            }
            let input = match open_input(path, self.options.start_offset) {
                Ok(input) => input,
                Err(LoadError::InputNotFound(missing)) => {
                    warn!(path = %missing, "input not found, skipping");
                    self.stats.inputs_skipped += 1;
                    continue;
                },
                Err(e) => return Err(e),
            };
            if self.load_input(input)? == StreamEnd::Ceiling {
                info!("record ceiling reached");
            }
        }
        Ok(())
    }

    /// Decode and load one opened input.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error.
    pub fn load_input(&mut self, input: InputStream) -> Result<StreamEnd> {
        let path = input.path.display().to_string();
        info!(path = %path, size = ?input.size(), "loading input");
        let progress = Progress::for_input(&input);
        let mut reader = MarcReader::new(input.into_reader());
        let end = self.load_records(reader.records(), &progress)?;
        self.stats.inputs_loaded += 1;
        info!(
            path = %path,
            records = reader.records_read(),
            bytes = reader.bytes_read(),
            "input done"
        );
        Ok(end)
    }

    /// Load a stream of decoded records, then flush whatever is buffered.
    ///
    /// # Errors
    ///
    /// Returns the first decode error, invalid record or store failure.
    /// Rows buffered since the last flush are not written in that case.
    pub fn load_records<I>(&mut self, records: I, progress: &Progress) -> Result<StreamEnd>
    where
        I: IntoIterator<Item = MarcResult<Record>>,
    {
        let mut records = records.into_iter();
        let mut position = 0u64;
        let end = loop {
            if self.ceiling_reached() {
                break StreamEnd::Ceiling;
            }
            let Some(item) = records.next() else {
                break StreamEnd::Exhausted;
            };
            position += 1;
            let record = item.map_err(|source| LoadError::Decode { position, source })?;
            self.add(&record)?;

            if self.batch.len() as u64 >= self.options.batch_size {
                self.flush()?;
            }
            if self.stats.records_read % self.options.log_every == 0 {
                self.stats.progress_reports += 1;
                progress.report(position, &self.stats, &self.counters);
            }
        };
        self.flush()?;
        Ok(end)
    }

    fn add(&mut self, record: &Record) -> Result<()> {
        let rows = decompose(record, &mut self.counters)?;
        for report in &rows.reports {
            match &report.outcome {
                FieldOutcome::Decomposed => {},
                FieldOutcome::SkippedBenign => {
                    self.stats.fields_skipped_benign += 1;
                    debug!(record_id = rows.record.id, tag = %report.tag, "administrative field skipped");
                },
                FieldOutcome::SkippedMalformed { reason } => {
                    self.stats.fields_skipped_malformed += 1;
                    warn!(
                        record_id = rows.record.id,
                        field_id = report.field_id,
                        tag = %report.tag,
                        reason = %reason,
                        "field skipped"
                    );
                },
            }
        }
        self.stats.records_read += 1;
        self.batch.push(rows);
        Ok(())
    }

    /// Flush the current batch.
    ///
    /// # Errors
    ///
    /// Returns an error when the transaction itself cannot be managed.
    pub fn flush(&mut self) -> Result<()> {
        match self.batch.flush(&mut self.store, &self.schema)? {
            FlushOutcome::Empty => {},
            FlushOutcome::Committed {
                records,
                fields,
                subfields,
            } => {
                self.stats.batches_committed += 1;
                self.stats.records_written += records as u64;
                self.stats.fields_written += fields as u64;
                self.stats.subfields_written += subfields as u64;
            },
            FlushOutcome::RolledBack {
                discarded_records, ..
            } => {
                self.stats.batches_rolled_back += 1;
                self.stats.records_discarded += discarded_records as u64;
            },
        }
        Ok(())
    }

    /// Close the store and return the run statistics.
    ///
    /// Rows still buffered are discarded; callers flush first on the normal
    /// path.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be closed cleanly.
    pub fn close(self) -> Result<LoadStats> {
        let mut stats = self.stats;
        stats.last_ids = self.counters;
        if !self.batch.is_empty() {
            warn!(records = self.batch.len(), "closing with unflushed records");
        }
        self.store.close()?;
        Ok(stats)
    }
}

/// Connect, prepare tables, load every path and close the store.
///
/// The store is closed on every path, including fatal errors.
///
/// # Errors
///
/// Returns the first fatal error; a close failure is returned only when the
/// load itself succeeded.
pub fn run<P: AsRef<Path>>(
    params: &ConnectionParams,
    options: LoadOptions,
    paths: &[P],
) -> Result<LoadStats> {
    params.validate()?;
    let store = AnyStore::connect(params)?;
    let mut loader = Loader::new(store, options)?;

    let loaded = loader.load_paths(paths);
    let closed = loader.close();
    match (loaded, closed) {
        (Ok(()), closed) => closed,
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "failed to close store after fatal error");
            Err(e)
        },
    }
}
