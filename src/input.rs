//! Opening input files.
//!
//! Inputs are plain ISO 2709 files or gzip-compressed ones (`.gz`). Every
//! input is wrapped so the number of bytes read from disk can be observed while
//! the decoder pulls from it; progress and ETA are computed from that count
//! against the file size.

use crate::error::{LoadError, Result};
use flate2::read::MultiGzDecoder;
use std::cell::Cell;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Shared count of bytes read from an underlying file.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Rc<Cell<u64>>);

impl ByteCounter {
    /// Bytes counted so far.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    fn add(&self, n: u64) {
        self.0.set(self.0.get() + n);
    }
}

/// [`Read`] adapter that feeds a [`ByteCounter`].
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> CountingReader<R> {
    /// Wrap `inner`, counting into `counter`.
    pub fn new(inner: R, counter: ByteCounter) -> Self {
        CountingReader { inner, counter }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// An opened input ready for decoding.
pub struct InputStream {
    /// Path the stream was opened from
    pub path: PathBuf,
    reader: Box<dyn Read>,
    counter: ByteCounter,
    size: Option<u64>,
    start_position: u64,
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream")
            .field("path", &self.path)
            .field("position", &self.counter.get())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl InputStream {
    /// Wrap an arbitrary reader of unknown size.
    pub fn from_reader(name: impl Into<PathBuf>, reader: impl Read + 'static) -> Self {
        let counter = ByteCounter::default();
        InputStream {
            path: name.into(),
            reader: Box::new(CountingReader::new(reader, counter.clone())),
            counter,
            size: None,
            start_position: 0,
        }
    }

    /// Handle on the on-disk byte count.
    #[must_use]
    pub fn counter(&self) -> ByteCounter {
        self.counter.clone()
    }

    /// On-disk size, when known.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// On-disk position reached after skipping the start offset.
    #[must_use]
    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    /// Take the reader for decoding.
    #[must_use]
    pub fn into_reader(self) -> Box<dyn Read> {
        self.reader
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Open `path`, skipping `start_offset` bytes of (decompressed) content.
///
/// # Errors
///
/// Returns [`LoadError::InputNotFound`] when the path does not exist, and an
/// I/O error when it cannot be opened or the offset cannot be reached.
pub fn open_input(path: impl AsRef<Path>, start_offset: u64) -> Result<InputStream> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::InputNotFound(path.display().to_string()));
    }

    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let counter = ByteCounter::default();

    let reader: Box<dyn Read> = if is_gzip(path) {
        let raw = CountingReader::new(BufReader::new(file), counter.clone());
        let mut reader: Box<dyn Read> = Box::new(BufReader::new(MultiGzDecoder::new(raw)));
        if start_offset > 0 {
            let skipped = io::copy(&mut (&mut reader).take(start_offset), &mut io::sink())?;
            if skipped < start_offset {
                return Err(LoadError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("start offset {start_offset} is past the end of {}", path.display()),
                )));
            }
        }
        reader
    } else {
        if start_offset > size {
            return Err(LoadError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("start offset {start_offset} is past the end of {}", path.display()),
            )));
        }
        file.seek(SeekFrom::Start(start_offset))?;
        counter.add(start_offset);
        Box::new(CountingReader::new(BufReader::new(file), counter.clone()))
    };

    let start_position = counter.get();
    debug!(path = %path.display(), size, start_offset, "input opened");
    Ok(InputStream {
        path: path.to_path_buf(),
        reader,
        counter,
        size: Some(size),
        start_position,
    })
}
