//! Decomposition of decoded records into normalized rows.
//!
//! Each [`Record`] becomes one [`RecordRow`], one [`FieldRow`] per data field
//! and one [`SubfieldRow`] per subfield pair. Surrogate keys come from an
//! [`IdCounters`] value owned by the caller, so numbering carries across
//! records, batches and input files.
//!
//! A data field that cannot be decomposed does not fail the record. It is
//! reported through its [`FieldOutcome`] and contributes no rows, but the field
//! id it consumed is not given back.

use crate::error::{LoadError, Result};
use crate::record::{Field, Record};
use crate::schema::CONTROL_TAGS;
use serde::Serialize;

/// Administrative tags (Aleph exports) that are skipped without a warning.
pub const BENIGN_TAGS: [&str; 2] = ["FMT", "SYS"];

/// Last surrogate key handed out per table.
///
/// The next row of a table gets `counter + 1`. Counters only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdCounters {
    /// Last records-table id
    pub record: i64,
    /// Last fields-table id
    pub field: i64,
    /// Last subfields-table id
    pub subfield: i64,
}

impl IdCounters {
    fn next_record(&mut self) -> i64 {
        self.record += 1;
        self.record
    }

    fn next_field(&mut self) -> i64 {
        self.field += 1;
        self.field
    }

    fn next_subfield(&mut self) -> i64 {
        self.subfield += 1;
        self.subfield
    }
}

/// Row of the records table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRow {
    /// Surrogate key
    pub id: i64,
    /// Leader text
    pub leader: String,
    /// Payloads of control fields `000`..`009`, empty when absent
    pub controls: [String; 10],
}

impl RecordRow {
    /// Payload stored under control tag `tag`, if `tag` is a control tag.
    #[must_use]
    pub fn control(&self, tag: &str) -> Option<&str> {
        CONTROL_TAGS
            .iter()
            .position(|t| *t == tag)
            .map(|i| self.controls[i].as_str())
    }
}

/// Row of the fields table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRow {
    /// Surrogate key
    pub id: i64,
    /// Owning record
    pub record_id: i64,
    /// Three-character tag
    pub tag: String,
    /// First indicator
    pub indicator1: char,
    /// Second indicator
    pub indicator2: char,
}

/// Row of the subfields table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubfieldRow {
    /// Surrogate key
    pub id: i64,
    /// Owning field
    pub field_id: i64,
    /// Subfield code
    pub code: char,
    /// Subfield value
    pub data: String,
}

/// What happened to one data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// Rows were emitted for the field.
    Decomposed,
    /// Field has a known administrative tag and no indicators; skipped quietly.
    SkippedBenign,
    /// Field shape could not be decomposed; skipped with a warning.
    SkippedMalformed {
        /// Why the field was rejected
        reason: String,
    },
}

/// Per-field report entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReport {
    /// Field tag
    pub tag: String,
    /// Field id consumed by this field
    pub field_id: i64,
    /// Outcome
    pub outcome: FieldOutcome,
}

/// Rows produced from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    /// Header row
    pub record: RecordRow,
    /// Data field rows, in record order
    pub fields: Vec<FieldRow>,
    /// Subfield rows, in record order
    pub subfields: Vec<SubfieldRow>,
    /// One entry per data field, decomposed or not
    pub reports: Vec<FieldReport>,
}

impl Decomposition {
    /// Number of data fields that were skipped, split as `(benign, malformed)`.
    #[must_use]
    pub fn skipped(&self) -> (usize, usize) {
        self.reports
            .iter()
            .fold((0, 0), |(benign, malformed), r| match r.outcome {
                FieldOutcome::Decomposed => (benign, malformed),
                FieldOutcome::SkippedBenign => (benign + 1, malformed),
                FieldOutcome::SkippedMalformed { .. } => (benign, malformed + 1),
            })
    }
}

/// Decompose `record` into rows, drawing surrogate keys from `counters`.
///
/// # Errors
///
/// Returns [`LoadError::InvalidRecord`] when the record has no leader. This is
/// the only record-level failure; field-level problems are reported in
/// [`Decomposition::reports`].
pub fn decompose(record: &Record, counters: &mut IdCounters) -> Result<Decomposition> {
    if record.leader.is_empty() {
        return Err(LoadError::InvalidRecord(
            "record has an empty leader".to_string(),
        ));
    }

    let record_id = counters.next_record();
    let mut controls: [String; 10] = Default::default();
    let mut data_fields = Vec::new();
    for field in &record.fields {
        match CONTROL_TAGS.iter().position(|t| *t == field.tag()) {
            Some(slot) => controls[slot] = field.value(),
            None => data_fields.push(field),
        }
    }

    let mut out = Decomposition {
        record: RecordRow {
            id: record_id,
            leader: record.leader.clone(),
            controls,
        },
        fields: Vec::with_capacity(data_fields.len()),
        subfields: Vec::new(),
        reports: Vec::with_capacity(data_fields.len()),
    };

    for field in data_fields {
        let field_id = counters.next_field();
        let outcome = match split_field(field) {
            Ok((indicator1, indicator2, pairs)) => {
                out.fields.push(FieldRow {
                    id: field_id,
                    record_id,
                    tag: field.tag().to_string(),
                    indicator1,
                    indicator2,
                });
                for (code, data) in pairs {
                    out.subfields.push(SubfieldRow {
                        id: counters.next_subfield(),
                        field_id,
                        code,
                        data: data.to_string(),
                    });
                }
                FieldOutcome::Decomposed
            },
            Err(_) if BENIGN_TAGS.contains(&field.tag()) => FieldOutcome::SkippedBenign,
            Err(reason) => FieldOutcome::SkippedMalformed { reason },
        };
        out.reports.push(FieldReport {
            tag: field.tag().to_string(),
            field_id,
            outcome,
        });
    }

    Ok(out)
}

/// Indicators and validated `(code, value)` pairs of a data field.
fn split_field(field: &Field) -> std::result::Result<(char, char, Vec<(char, &str)>), String> {
    let (indicator1, indicator2, subfields) = match field {
        Field::Data {
            indicator1,
            indicator2,
            subfields,
            ..
        } => (*indicator1, *indicator2, subfields),
        Field::Control { tag, data } => {
            return Err(format!("field {tag} has no indicators: {data:?}"));
        },
    };

    if subfields.len() % 2 != 0 {
        return Err(format!(
            "odd number of subfield entries ({})",
            subfields.len()
        ));
    }

    let mut pairs = Vec::with_capacity(subfields.len() / 2);
    for pair in subfields.chunks_exact(2) {
        let mut chars = pair[0].chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => pairs.push((code, pair[1].as_str())),
            _ => return Err(format!("invalid subfield code {:?}", pair[0])),
        }
    }
    Ok((indicator1, indicator2, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_a() -> Record {
        Record::new("L1")
            .with_control("008", "abc")
            .with_data("245", ('0', '0'), &[('a', "Title")])
    }

    fn record_b() -> Record {
        Record::new("L2").with_data("100", (' ', ' '), &[('a', "Name"), ('d', "1900")])
    }

    #[test]
    fn test_decompose_control_and_data() {
        let mut counters = IdCounters::default();
        let out = decompose(&record_a(), &mut counters).unwrap();

        assert_eq!(out.record.id, 1);
        assert_eq!(out.record.leader, "L1");
        assert_eq!(out.record.control("008"), Some("abc"));
        assert_eq!(out.record.control("001"), Some(""));
        assert_eq!(out.record.control("245"), None);

        assert_eq!(
            out.fields,
            vec![FieldRow {
                id: 1,
                record_id: 1,
                tag: "245".to_string(),
                indicator1: '0',
                indicator2: '0',
            }]
        );
        assert_eq!(
            out.subfields,
            vec![SubfieldRow {
                id: 1,
                field_id: 1,
                code: 'a',
                data: "Title".to_string(),
            }]
        );
        assert_eq!(
            counters,
            IdCounters {
                record: 1,
                field: 1,
                subfield: 1
            }
        );
    }

    #[test]
    fn test_counters_continue_across_records() {
        let mut counters = IdCounters::default();
        decompose(&record_a(), &mut counters).unwrap();
        let out = decompose(&record_b(), &mut counters).unwrap();

        assert_eq!(out.record.id, 2);
        assert!(out.record.controls.iter().all(String::is_empty));
        assert_eq!(out.fields[0].id, 2);
        assert_eq!(out.fields[0].record_id, 2);
        let ids: Vec<(i64, i64, char)> = out
            .subfields
            .iter()
            .map(|s| (s.id, s.field_id, s.code))
            .collect();
        assert_eq!(ids, vec![(2, 2, 'a'), (3, 2, 'd')]);
    }

    #[test]
    fn test_counters_start_from_recovered_base() {
        let mut counters = IdCounters {
            record: 10,
            field: 100,
            subfield: 1000,
        };
        let out = decompose(&record_b(), &mut counters).unwrap();
        assert_eq!(out.record.id, 11);
        assert_eq!(out.fields[0].id, 101);
        assert_eq!(out.subfields[0].id, 1001);
        assert_eq!(out.subfields[1].id, 1002);
    }

    #[test]
    fn test_benign_tag_skipped_silently_but_consumes_id() {
        let record = Record::new("L")
            .with_control("FMT", "BK")
            .with_data("245", ('1', '0'), &[('a', "T")]);
        let mut counters = IdCounters::default();
        let out = decompose(&record, &mut counters).unwrap();

        assert_eq!(out.reports[0].outcome, FieldOutcome::SkippedBenign);
        assert_eq!(out.reports[0].field_id, 1);
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.fields[0].id, 2);
        assert_eq!(out.skipped(), (1, 0));
    }

    #[test]
    fn test_malformed_field_skipped_with_reason() {
        let record = Record::new("L")
            .with_control("500", "no indicators here")
            .with_data("650", (' ', '0'), &[('a', "Subject")]);
        let mut counters = IdCounters::default();
        let out = decompose(&record, &mut counters).unwrap();

        assert!(matches!(
            out.reports[0].outcome,
            FieldOutcome::SkippedMalformed { .. }
        ));
        assert_eq!(out.reports[1].outcome, FieldOutcome::Decomposed);
        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.fields[0].tag, "650");
        assert_eq!(out.skipped(), (0, 1));
        assert_eq!(counters.field, 2);
    }

    #[test]
    fn test_odd_subfield_list_emits_no_partial_rows() {
        let mut record = Record::new("L");
        record.add_field(Field::Data {
            tag: "245".to_string(),
            indicator1: '0',
            indicator2: '0',
            subfields: vec!["a".to_string(), "Title".to_string(), "b".to_string()],
        });
        let mut counters = IdCounters::default();
        let out = decompose(&record, &mut counters).unwrap();

        assert!(out.fields.is_empty());
        assert!(out.subfields.is_empty());
        assert_eq!(counters.subfield, 0);
        match &out.reports[0].outcome {
            FieldOutcome::SkippedMalformed { reason } => assert!(reason.contains("odd")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_empty_subfield_code_is_malformed() {
        let mut record = Record::new("L");
        record.add_field(Field::Data {
            tag: "245".to_string(),
            indicator1: '0',
            indicator2: '0',
            subfields: vec![String::new(), String::new()],
        });
        let out = decompose(&record, &mut IdCounters::default()).unwrap();
        assert!(matches!(
            out.reports[0].outcome,
            FieldOutcome::SkippedMalformed { .. }
        ));
    }

    #[test]
    fn test_last_duplicate_control_wins() {
        let record = Record::new("L")
            .with_control("001", "first")
            .with_control("001", "second");
        let out = decompose(&record, &mut IdCounters::default()).unwrap();
        assert_eq!(out.record.control("001"), Some("second"));
        assert!(out.fields.is_empty());
    }

    #[test]
    fn test_subfield_order_preserved() {
        let record = Record::new("L").with_data(
            "650",
            (' ', '0'),
            &[('a', "Z"), ('x', "Y"), ('a', "X"), ('v', "W")],
        );
        let out = decompose(&record, &mut IdCounters::default()).unwrap();
        let seen: Vec<(char, &str)> = out
            .subfields
            .iter()
            .map(|s| (s.code, s.data.as_str()))
            .collect();
        assert_eq!(seen, vec![('a', "Z"), ('x', "Y"), ('a', "X"), ('v', "W")]);
    }

    #[test]
    fn test_empty_leader_is_fatal_and_consumes_nothing() {
        let mut counters = IdCounters::default();
        let err = decompose(&Record::new(""), &mut counters).unwrap_err();
        assert!(matches!(err, LoadError::InvalidRecord(_)));
        assert_eq!(counters, IdCounters::default());
    }
}
