//! Raw byte sources underlying the reader pipeline
//!
//! A [`RawSource`] delivers the bytes as stored on disk (or as produced by
//! an external stream), before any decompression. Files above
//! [`MMAP_THRESHOLD`] are memory-mapped; external streams are buffered and
//! not seekable.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};

/// File size above which input files are memory-mapped instead of read
/// through a `BufReader`.
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024; // 50 MB

/// A raw, possibly-seekable byte source.
pub enum RawSource {
    /// Buffered local file
    File(BufReader<File>),
    /// Memory-mapped local file
    Mmap(Cursor<Mmap>),
    /// External stream; not seekable
    Stream(BufReader<Box<dyn Read + Send>>),
}

impl RawSource {
    /// Open a local file, selecting standard or memory-mapped I/O by size.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len >= MMAP_THRESHOLD {
            // SAFETY: the mapping is read-only and lives as long as the
            // source; concurrent truncation of the input is outside the
            // supported contract
            let mmap = unsafe { Mmap::map(&file)? };
            Ok(RawSource::Mmap(Cursor::new(mmap)))
        } else {
            Ok(RawSource::File(BufReader::new(file)))
        }
    }

    /// Wrap an external readable stream.
    pub fn from_stream(stream: Box<dyn Read + Send>) -> Self {
        RawSource::Stream(BufReader::new(stream))
    }

    /// Reposition to an absolute byte offset in the raw data.
    ///
    /// Fails with [`Error::UnsupportedOperation`] for external streams.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        match self {
            RawSource::File(reader) => {
                reader.seek(SeekFrom::Start(offset))?;
                Ok(())
            }
            RawSource::Mmap(cursor) => {
                cursor.set_position(offset);
                Ok(())
            }
            RawSource::Stream(_) => Err(Error::UnsupportedOperation(
                "cannot seek a non-seekable input stream".to_string(),
            )),
        }
    }
}

impl Read for RawSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            RawSource::File(r) => r.read(buf),
            RawSource::Mmap(r) => r.read(buf),
            RawSource::Stream(r) => r.read(buf),
        }
    }
}

impl BufRead for RawSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            RawSource::File(r) => r.fill_buf(),
            RawSource::Mmap(r) => r.fill_buf(),
            RawSource::Stream(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            RawSource::File(r) => r.consume(amt),
            RawSource::Mmap(r) => r.consume(amt),
            RawSource::Stream(r) => r.consume(amt),
        }
    }
}

impl std::fmt::Debug for RawSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawSource::File(_) => f.write_str("RawSource::File"),
            RawSource::Mmap(_) => f.write_str("RawSource::Mmap"),
            RawSource::Stream(_) => f.write_str("RawSource::Stream"),
        }
    }
}
