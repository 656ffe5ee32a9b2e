//! The transparent stream layer of the reader pipeline
//!
//! A [`ByteStream`] presents decompressed bytes regardless of how the
//! source is stored. Detection is non-destructive: the magic bytes are
//! peeked through the buffer and replayed to whichever arm is installed.
//!
//! - `0x1F 0x8B` plus a `BC` extra subfield → seekable BGZF block reader
//! - `0x1F 0x8B` without it → sequential multi-member gzip
//! - anything else → the raw bytes as-is

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{Error, Result};
use crate::io::bgzf::BgzfReader;
use crate::io::source::RawSource;

enum StreamInner {
    Plain(RawSource),
    Gzip(BufReader<MultiGzDecoder<RawSource>>),
    Bgzf(BgzfReader),
}

/// A possibly-compressed byte stream with optional block-level seeking.
pub struct ByteStream {
    inner: StreamInner,
    path: Option<PathBuf>,
}

impl ByteStream {
    /// Open a local file and install the decompression layer if needed.
    pub fn open_path(path: &Path) -> Result<Self> {
        let source = RawSource::open(path).map_err(|e| {
            Error::file_open(path.display().to_string(), e.to_string())
        })?;
        Self::from_source(source, Some(path.to_path_buf()))
    }

    /// Wrap a raw source, sniffing the compression layer.
    pub fn from_source(mut source: RawSource, path: Option<PathBuf>) -> Result<Self> {
        let inner = match sniff_compression(&mut source)? {
            Compression::None => StreamInner::Plain(source),
            Compression::Gzip => StreamInner::Gzip(BufReader::new(MultiGzDecoder::new(source))),
            Compression::Bgzf => StreamInner::Bgzf(BgzfReader::new(source)),
        };
        Ok(ByteStream { inner, path })
    }

    /// The path this stream was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True if this stream supports `seek_primary`.
    pub fn is_seekable_bgzf(&self) -> bool {
        matches!(self.inner, StreamInner::Bgzf(_))
    }

    /// True if no further bytes can be read.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.fill_buf()?.is_empty())
    }

    /// Reposition the underlying file cursor to the start of the block (or
    /// raw byte) at `disk_offset`, invalidating decompression state.
    pub fn seek_primary(&mut self, disk_offset: u64) -> Result<()> {
        match &mut self.inner {
            StreamInner::Plain(source) => source.seek_to(disk_offset),
            StreamInner::Gzip(_) => Err(Error::UnsupportedOperation(
                "cannot seek a plain gzip stream; re-compress with bgzip to enable \
                 region queries"
                    .to_string(),
            )),
            StreamInner::Bgzf(bgzf) => bgzf.seek_primary(disk_offset),
        }
    }

    /// Advance the logical (decompressed) cursor by `count` bytes.
    pub fn skip_n(&mut self, count: u64) -> Result<()> {
        match &mut self.inner {
            StreamInner::Bgzf(bgzf) => bgzf.skip_n(count),
            _ => {
                let mut remaining = count;
                while remaining > 0 {
                    let available = self.fill_buf()?;
                    if available.is_empty() {
                        return Err(Error::format(
                            "stream",
                            "attempted to skip past the end of input",
                        ));
                    }
                    let take = (available.len() as u64).min(remaining) as usize;
                    self.consume(take);
                    remaining -= take as u64;
                }
                Ok(())
            }
        }
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            StreamInner::Plain(r) => r.read(buf),
            StreamInner::Gzip(r) => r.read(buf),
            StreamInner::Bgzf(r) => r.read(buf),
        }
    }
}

impl BufRead for ByteStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match &mut self.inner {
            StreamInner::Plain(r) => r.fill_buf(),
            StreamInner::Gzip(r) => r.fill_buf(),
            StreamInner::Bgzf(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match &mut self.inner {
            StreamInner::Plain(r) => r.consume(amt),
            StreamInner::Gzip(r) => r.consume(amt),
            StreamInner::Bgzf(r) => r.consume(amt),
        }
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arm = match self.inner {
            StreamInner::Plain(_) => "plain",
            StreamInner::Gzip(_) => "gzip",
            StreamInner::Bgzf(_) => "bgzf",
        };
        f.debug_struct("ByteStream")
            .field("compression", &arm)
            .field("path", &self.path)
            .finish()
    }
}

enum Compression {
    None,
    Gzip,
    Bgzf,
}

/// Peek the source's first bytes without consuming them and classify the
/// compression layer.
fn sniff_compression(source: &mut RawSource) -> Result<Compression> {
    let head = source.fill_buf().map_err(Error::Io)?;
    if head.len() < 2 || head[0] != 0x1F || head[1] != 0x8B {
        return Ok(Compression::None);
    }
    // gzip; BGZF additionally carries FEXTRA with a BC subfield
    if head.len() >= 12 && head[3] & 0x04 != 0 {
        let xlen = u16::from_le_bytes([head[10], head[11]]) as usize;
        if head.len() >= 12 + xlen {
            let extra = &head[12..12 + xlen];
            let mut pos = 0;
            while pos + 4 <= extra.len() {
                let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
                if extra[pos] == b'B' && extra[pos + 1] == b'C' && slen == 2 {
                    return Ok(Compression::Bgzf);
                }
                pos += 4 + slen;
            }
        }
    }
    Ok(Compression::Gzip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};

    fn plain_source(data: &[u8]) -> RawSource {
        RawSource::from_stream(Box::new(Cursor::new(data.to_vec())))
    }

    #[test]
    fn test_plain_stream_passthrough() {
        let mut stream = ByteStream::from_source(plain_source(b">seq1\nACGT\n"), None).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, ">seq1\nACGT\n");
    }

    #[test]
    fn test_sniff_does_not_consume() {
        let mut stream = ByteStream::from_source(plain_source(b"\x1E rest"), None).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"\x1E rest");
    }

    #[test]
    fn test_gzip_stream_inflates() {
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b">seq1\nACGT\n").unwrap();
        let gz = enc.finish().unwrap();

        let mut stream = ByteStream::from_source(plain_source(&gz), None).unwrap();
        assert!(!stream.is_seekable_bgzf());
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, ">seq1\nACGT\n");
    }

    #[test]
    fn test_gzip_stream_refuses_seek() {
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"data").unwrap();
        let gz = enc.finish().unwrap();

        let mut stream = ByteStream::from_source(plain_source(&gz), None).unwrap();
        assert!(matches!(
            stream.seek_primary(0),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_empty_stream_is_at_eof() {
        let mut stream = ByteStream::from_source(plain_source(b""), None).unwrap();
        assert!(stream.at_eof().unwrap());
    }
}
