//! In-memory batch of decomposed rows and its transactional flush.
//!
//! Rows are buffered in three ordered vectors. [`Batch::flush`] writes them in
//! one transaction, records before fields before subfields. A failed insert
//! rolls the whole transaction back and the buffered rows are dropped, not
//! retried; the caller sees a [`FlushOutcome::RolledBack`] and the run goes on.

use crate::decompose::{Decomposition, FieldRow, RecordRow, SubfieldRow};
use crate::error::{LoadError, Result};
use crate::schema::{Schema, Table};
use crate::store::Store;
use tracing::{debug, error};

/// Result of one [`Batch::flush`].
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was buffered; no transaction was opened.
    Empty,
    /// All buffered rows were committed.
    Committed {
        /// Header rows written
        records: usize,
        /// Field rows written
        fields: usize,
        /// Subfield rows written
        subfields: usize,
    },
    /// An insert failed and the transaction was rolled back.
    RolledBack {
        /// Records whose rows were discarded
        discarded_records: usize,
        /// The insert failure
        error: LoadError,
    },
}

/// Decomposed rows waiting to be written.
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<RecordRow>,
    fields: Vec<FieldRow>,
    subfields: Vec<SubfieldRow>,
}

impl Batch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the rows of one record.
    pub fn push(&mut self, rows: Decomposition) {
        self.records.push(rows.record);
        self.fields.extend(rows.fields);
        self.subfields.extend(rows.subfields);
    }

    /// Records buffered since the last flush.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the buffered rows in a single transaction and clear the buffers.
    ///
    /// The buffers are cleared whether the transaction commits or rolls back.
    ///
    /// # Errors
    ///
    /// Insert failures are reported as [`FlushOutcome::RolledBack`], not as
    /// errors. An error is returned only when the transaction cannot be
    /// opened, committed or rolled back, which leaves the connection in an
    /// unknown state.
    pub fn flush<S: Store>(&mut self, store: &mut S, schema: &Schema) -> Result<FlushOutcome> {
        if self.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        store.begin()?;
        let result = self.write(store, schema);
        let (records, fields, subfields) = (
            self.records.len(),
            self.fields.len(),
            self.subfields.len(),
        );
        let first_id = self.records.first().map_or(0, |r| r.id);
        let last_id = self.records.last().map_or(0, |r| r.id);
        self.clear();

        match result {
            Ok(()) => {
                store.commit()?;
                debug!(records, fields, subfields, first_id, last_id, "batch committed");
                Ok(FlushOutcome::Committed {
                    records,
                    fields,
                    subfields,
                })
            },
            Err(error) => {
                store.rollback()?;
                error!(
                    %error,
                    discarded_records = records,
                    first_id,
                    last_id,
                    "batch rolled back; its records are not loaded, re-run with resumption to recover them"
                );
                Ok(FlushOutcome::RolledBack {
                    discarded_records: records,
                    error,
                })
            },
        }
    }

    fn write<S: Store>(&self, store: &mut S, schema: &Schema) -> Result<()> {
        store.insert_records(&schema.insert_sql(Table::Records), &self.records)?;
        store.insert_fields(&schema.insert_sql(Table::Fields), &self.fields)?;
        store.insert_subfields(&schema.insert_sql(Table::Subfields), &self.subfields)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.records.clear();
        self.fields.clear();
        self.subfields.clear();
    }
}
