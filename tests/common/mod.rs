//! Common test helpers: an ISO 2709 encoder for fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A field to encode.
pub enum Fixture<'a> {
    /// Control field payload
    Control(&'a str, &'a str),
    /// Data field with indicators and `(code, value)` subfields
    Data(&'a str, [char; 2], Vec<(char, &'a str)>),
}

/// Encode one record. `status` fills leader position 5.
pub fn encode_record(status: char, fields: &[Fixture<'_>]) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut data = Vec::new();
    for field in fields {
        let start = data.len();
        let tag = match field {
            Fixture::Control(tag, value) => {
                data.extend_from_slice(value.as_bytes());
                tag
            },
            Fixture::Data(tag, [i1, i2], subfields) => {
                data.push(*i1 as u8);
                data.push(*i2 as u8);
                for (code, value) in subfields {
                    data.push(0x1F);
                    data.push(*code as u8);
                    data.extend_from_slice(value.as_bytes());
                }
                tag
            },
        };
        data.push(0x1E);
        directory.extend_from_slice(
            format!("{tag}{:04}{:05}", data.len() - start, start).as_bytes(),
        );
    }
    directory.push(0x1E);
    data.push(0x1D);

    let base = 24 + directory.len();
    let length = base + data.len();
    let leader = format!("{length:05}{status}am a22{base:05}   4500");
    let mut out = leader.into_bytes();
    out.extend(directory);
    out.extend(data);
    out
}

/// Record A: leader status `n`, `008` = "abc", `245 00 $a Title`.
pub fn record_a() -> Vec<u8> {
    encode_record(
        'n',
        &[
            Fixture::Control("008", "abc"),
            Fixture::Data("245", ['0', '0'], vec![('a', "Title")]),
        ],
    )
}

/// Record B: leader status `c`, `100 __ $a Name $d 1900`.
pub fn record_b() -> Vec<u8> {
    encode_record(
        'c',
        &[Fixture::Data(
            "100",
            [' ', ' '],
            vec![('a', "Name"), ('d', "1900")],
        )],
    )
}

/// A simple numbered record with one title field.
pub fn numbered(n: usize) -> Vec<u8> {
    let control = format!("{n}");
    let title = format!("Title {n}");
    encode_record(
        'n',
        &[
            Fixture::Control("001", &control),
            Fixture::Data("245", ['1', '0'], vec![('a', &title)]),
        ],
    )
}

/// Write concatenated records to `dir/name` and return the path.
pub fn write_input(dir: &Path, name: &str, records: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, records.concat()).unwrap();
    path
}

/// Count rows of `table` in a SQLite file.
pub fn count(db: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(db).unwrap();
    conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}
