//! Reading MARC records from ISO 2709 binary streams.
//!
//! [`MarcReader`] reads one record at a time from any [`std::io::Read`] source
//! and turns it into a [`Record`]. Decoding is strict: the first malformed
//! record ends the stream with an error.
//!
//! # Examples
//!
//! ```
//! use marc2db::MarcReader;
//! use std::io::Cursor;
//!
//! let mut reader = MarcReader::new(Cursor::new(Vec::new()));
//! assert!(reader.read_record().unwrap().is_none());
//! ```

use crate::decompose::BENIGN_TAGS;
use crate::encoding::{decode_text, MarcEncoding};
use crate::error::{MarcError, MarcResult};
use crate::leader::{Leader, LEADER_LEN};
use crate::record::{Field, Record};
use memchr::memchr;
use std::io::Read;

/// Ends every field, and the directory.
pub const FIELD_TERMINATOR: u8 = 0x1E;
/// Introduces every subfield.
pub const SUBFIELD_DELIMITER: u8 = 0x1F;
/// Ends every record.
pub const RECORD_TERMINATOR: u8 = 0x1D;

const DIRECTORY_ENTRY_LEN: usize = 12;

/// Reader for ISO 2709 binary MARC format.
#[derive(Debug)]
pub struct MarcReader<R: Read> {
    reader: R,
    records_read: u64,
    bytes_read: u64,
}

impl<R: Read> MarcReader<R> {
    /// Create a new MARC reader.
    pub fn new(reader: R) -> Self {
        MarcReader {
            reader,
            records_read: 0,
            bytes_read: 0,
        }
    }

    /// Number of records decoded so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Number of (decompressed) bytes consumed so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read a single MARC record.
    ///
    /// Returns `Ok(Some(record))` if a record was read, `Ok(None)` at a clean
    /// end of stream, or `Err` if the record is malformed or truncated.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The leader or directory is malformed
    /// - The stream ends in the middle of a record
    /// - A field points outside the data area
    /// - An I/O error occurs
    pub fn read_record(&mut self) -> MarcResult<Option<Record>> {
        let mut leader_bytes = [0u8; LEADER_LEN];
        let got = read_full(&mut self.reader, &mut leader_bytes)?;
        if got == 0 {
            return Ok(None);
        }
        if got < LEADER_LEN {
            return Err(MarcError::TruncatedRecord(format!(
                "Stream ended after {got} bytes of leader"
            )));
        }

        let leader = Leader::from_bytes(&leader_bytes)?;
        leader.validate_for_reading()?;

        let record_length = leader.record_length as usize;
        let base_address = leader.data_base_address as usize;

        let mut body = vec![0u8; record_length - LEADER_LEN];
        let got = read_full(&mut self.reader, &mut body)?;
        if got < body.len() {
            return Err(MarcError::TruncatedRecord(format!(
                "Expected {} bytes of record data, got {got}",
                body.len()
            )));
        }
        self.bytes_read += record_length as u64;

        let encoding = leader.encoding();
        let (directory, data) = body.split_at(base_address - LEADER_LEN);
        let mut record = Record::new(leader.text);

        for entry in directory.chunks(DIRECTORY_ENTRY_LEN) {
            if entry[0] == FIELD_TERMINATOR {
                break;
            }
            if entry.len() < DIRECTORY_ENTRY_LEN {
                return Err(MarcError::InvalidRecord(
                    "Incomplete directory entry".to_string(),
                ));
            }

            let tag = String::from_utf8_lossy(&entry[0..3]).into_owned();
            let field_length = parse_number(&entry[3..7])?;
            let start = parse_number(&entry[7..12])?;
            let end = start + field_length;
            if end > data.len() {
                return Err(MarcError::InvalidRecord(format!(
                    "Field {tag} exceeds data area"
                )));
            }

            let raw = strip_terminator(&data[start..end]);
            record.add_field(decode_field(tag, raw, encoding));
        }

        self.records_read += 1;
        Ok(Some(record))
    }

    /// Iterate over the remaining records.
    ///
    /// The iterator yields at most one error and then stops.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            done: false,
        }
    }
}

/// Iterator returned by [`MarcReader::records`].
#[derive(Debug)]
pub struct Records<'a, R: Read> {
    reader: &'a mut MarcReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = MarcResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}

/// True for the fixed control tags `000`-`009`.
#[must_use]
pub fn is_control_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    bytes.len() == 3 && bytes[0] == b'0' && bytes[1] == b'0' && bytes[2].is_ascii_digit()
}

/// Control tags, the local `FMT`/`SYS` tags and bodies that do not start with
/// two indicators and a delimiter are kept as unstructured text.
fn decode_field(tag: String, raw: &[u8], encoding: MarcEncoding) -> Field {
    let structured = raw.len() >= 2 && (raw.len() == 2 || raw[2] == SUBFIELD_DELIMITER);
    if is_control_tag(&tag) || BENIGN_TAGS.contains(&tag.as_str()) || !structured {
        return Field::Control {
            tag,
            data: decode_text(raw, encoding),
        };
    }

    Field::Data {
        tag,
        indicator1: raw[0] as char,
        indicator2: raw[1] as char,
        subfields: decode_subfields(&raw[2..], encoding),
    }
}

/// Split `\x1Fa...\x1Fb...` into a flat code/value list.
fn decode_subfields(mut rest: &[u8], encoding: MarcEncoding) -> Vec<String> {
    let mut flat = Vec::new();
    while let Some((&SUBFIELD_DELIMITER, tail)) = rest.split_first() {
        let end = memchr(SUBFIELD_DELIMITER, tail).unwrap_or(tail.len());
        let segment = &tail[..end];
        match segment.split_first() {
            Some((&code, value)) => {
                flat.push((code as char).to_string());
                flat.push(decode_text(value, encoding));
            },
            // Delimiter with no code: keep it visible so the field is rejected downstream.
            None => {
                flat.push(String::new());
                flat.push(String::new());
            },
        }
        rest = &tail[end..];
    }
    flat
}

fn strip_terminator(raw: &[u8]) -> &[u8] {
    match raw.split_last() {
        Some((&FIELD_TERMINATOR, head)) => head,
        _ => raw,
    }
}

/// Parse an ASCII number from a directory entry
fn parse_number(bytes: &[u8]) -> MarcResult<usize> {
    let mut result = 0usize;
    for &byte in bytes {
        if byte.is_ascii_digit() {
            result = result * 10 + (byte - b'0') as usize;
        } else {
            return Err(MarcError::InvalidRecord(format!(
                "Invalid numeric field: expected digits, got byte {}",
                byte as char
            )));
        }
    }
    Ok(result)
}

/// Like `read_exact`, but reports how many bytes arrived before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> MarcResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
            Err(e) => return Err(MarcError::IoError(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build one UTF-8 record from `(tag, raw field body)` pairs.
    fn build_record(fields: &[(&str, Vec<u8>)]) -> Vec<u8> {
        build_record_coded(b'a', fields)
    }

    fn build_record_coded(coding: u8, fields: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut directory = Vec::new();
        let mut data = Vec::new();
        for (tag, body) in fields {
            let mut body = body.clone();
            body.push(FIELD_TERMINATOR);
            directory.extend_from_slice(tag.as_bytes());
            directory.extend_from_slice(format!("{:04}", body.len()).as_bytes());
            directory.extend_from_slice(format!("{:05}", data.len()).as_bytes());
            data.extend_from_slice(&body);
        }
        directory.push(FIELD_TERMINATOR);

        let base_address = 24 + directory.len();
        let record_length = base_address + data.len() + 1;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(format!("{record_length:05}").as_bytes());
        bytes.extend_from_slice(b"nam ");
        bytes.push(coding);
        bytes.extend_from_slice(b"22");
        bytes.extend_from_slice(format!("{base_address:05}").as_bytes());
        bytes.extend_from_slice(b"   4500");
        bytes.extend_from_slice(&directory);
        bytes.extend_from_slice(&data);
        bytes.push(RECORD_TERMINATOR);
        bytes
    }

    fn data_body(indicators: &[u8; 2], subfields: &[(u8, &str)]) -> Vec<u8> {
        let raw: Vec<(u8, &[u8])> = subfields.iter().map(|(c, v)| (*c, v.as_bytes())).collect();
        data_body_raw(indicators, &raw)
    }

    fn data_body_raw(indicators: &[u8; 2], subfields: &[(u8, &[u8])]) -> Vec<u8> {
        let mut body = indicators.to_vec();
        for (code, value) in subfields {
            body.push(SUBFIELD_DELIMITER);
            body.push(*code);
            body.extend_from_slice(value);
        }
        body
    }

    #[test]
    fn test_read_simple_record() {
        let bytes = build_record(&[
            ("001", b"12345".to_vec()),
            ("245", data_body(b"10", &[(b'a', "Test title"), (b'c', "Someone")])),
        ]);
        let mut reader = MarcReader::new(Cursor::new(bytes.clone()));

        let record = reader.read_record().unwrap().unwrap();
        assert_eq!(record.leader.len(), 24);
        assert_eq!(record.fields[0], Field::control("001", "12345"));
        assert_eq!(
            record.fields[1],
            Field::data("245", ('1', '0'), &[('a', "Test title"), ('c', "Someone")])
        );
        assert_eq!(reader.records_read(), 1);
        assert_eq!(reader.bytes_read(), bytes.len() as u64);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_eof_returns_none() {
        let mut reader = MarcReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_records_iterator_yields_all() {
        let mut all = Vec::new();
        for _ in 0..3 {
            all.extend(build_record(&[("245", data_body(b"00", &[(b'a', "T")]))]));
        }
        let mut reader = MarcReader::new(Cursor::new(all));
        let count = reader.records().map(Result::unwrap).count();
        assert_eq!(count, 3);
        assert_eq!(reader.records_read(), 3);
    }

    #[test]
    fn test_unstructured_field_under_data_tag() {
        let bytes = build_record(&[("FMT", b"BKS".to_vec()), ("SYS", b"X".to_vec())]);
        let record = MarcReader::new(Cursor::new(bytes))
            .read_record()
            .unwrap()
            .unwrap();
        assert_eq!(record.fields[0], Field::control("FMT", "BKS"));
        assert_eq!(record.fields[1], Field::control("SYS", "X"));
    }

    #[test]
    fn test_two_byte_local_field_is_not_indicators() {
        let bytes = build_record(&[("FMT", b"BK".to_vec()), ("SYS", b"SE".to_vec())]);
        let record = MarcReader::new(Cursor::new(bytes))
            .read_record()
            .unwrap()
            .unwrap();
        assert_eq!(record.fields[0], Field::control("FMT", "BK"));
        assert_eq!(record.fields[1], Field::control("SYS", "SE"));
    }

    #[test]
    fn test_marc8_record_is_converted() {
        let bytes = build_record_coded(
            b' ',
            &[
                ("001", b"Caf\xE2e".to_vec()),
                ("245", data_body_raw(b"10", &[(b'a', &b"H\xE8andel"[..])])),
            ],
        );
        let record = MarcReader::new(Cursor::new(bytes))
            .read_record()
            .unwrap()
            .unwrap();
        assert_eq!(&record.leader[9..10], " ");
        assert_eq!(record.fields[0], Field::control("001", "Caf\u{00E9}"));
        assert_eq!(
            record.fields[1],
            Field::data("245", ('1', '0'), &[('a', "H\u{00E4}ndel")])
        );
    }

    #[test]
    fn test_utf8_record_is_not_converted() {
        let bytes = build_record(&[("245", data_body(b"10", &[(b'a', "Händel")]))]);
        let record = MarcReader::new(Cursor::new(bytes))
            .read_record()
            .unwrap()
            .unwrap();
        assert_eq!(
            record.fields[0],
            Field::data("245", ('1', '0'), &[('a', "Händel")])
        );
    }

    #[test]
    fn test_indicators_only_field() {
        let bytes = build_record(&[("500", b"  ".to_vec())]);
        let record = MarcReader::new(Cursor::new(bytes))
            .read_record()
            .unwrap()
            .unwrap();
        assert_eq!(record.fields[0], Field::data("500", (' ', ' '), &[]));
    }

    #[test]
    fn test_empty_subfield_code_is_kept() {
        let mut body = data_body(b"00", &[(b'a', "x")]);
        body.push(SUBFIELD_DELIMITER);
        let record = MarcReader::new(Cursor::new(build_record(&[("245", body)])))
            .read_record()
            .unwrap()
            .unwrap();
        match &record.fields[0] {
            Field::Data { subfields, .. } => assert_eq!(subfields, &["a", "x", "", ""]),
            Field::Control { .. } => panic!("expected data field"),
        }
    }

    #[test]
    fn test_truncated_record_is_error() {
        let mut bytes = build_record(&[("245", data_body(b"00", &[(b'a', "Title")]))]);
        bytes.truncate(bytes.len() - 5);
        let mut reader = MarcReader::new(Cursor::new(bytes));
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, MarcError::TruncatedRecord(_)), "got: {err}");
    }

    #[test]
    fn test_partial_leader_is_error() {
        let mut reader = MarcReader::new(Cursor::new(b"00714cam".to_vec()));
        assert!(matches!(
            reader.read_record(),
            Err(MarcError::TruncatedRecord(_))
        ));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut bytes = build_record(&[("245", data_body(b"00", &[(b'a', "T")]))]);
        bytes.extend_from_slice(b"garbage-garbage-garbage-garbage");
        let mut reader = MarcReader::new(Cursor::new(bytes));
        let results: Vec<_> = reader.records().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_control_tag_classification() {
        assert!(is_control_tag("000"));
        assert!(is_control_tag("008"));
        assert!(!is_control_tag("010"));
        assert!(!is_control_tag("FMT"));
        assert!(!is_control_tag("00"));
    }
}
