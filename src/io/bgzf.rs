//! BGZF block decompression and virtual-offset arithmetic
//!
//! # Format
//!
//! BGZF is a sequence of independent gzip members, each inflating to at
//! most 64 KiB. Every member carries a `BC` extra subfield whose `BSIZE`
//! value is the total compressed block size minus one, which makes blocks
//! skippable without inflating them. A final empty block marks logical EOF.
//!
//! # Virtual offsets
//!
//! A position in the inflated data is addressed by a 64-bit composite:
//! the high 48 bits are the byte offset of the containing block in the raw
//! file, the low 16 bits the offset within the inflated block.

use std::io::{self, BufRead, Read};

use flate2::read::GzDecoder;

use crate::error::{Error, Result};
use crate::io::source::RawSource;

/// A 64-bit BGZF virtual offset: `compressed << 16 | uncompressed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Pack a compressed block offset (`< 2^48`) and an intra-block offset.
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        debug_assert!(compressed < (1 << 48), "block offset exceeds 48 bits");
        VirtualOffset(compressed << 16 | uncompressed as u64)
    }

    /// Wrap a raw 64-bit value.
    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    /// The raw 64-bit value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Byte offset of the BGZF block within the raw file.
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Byte offset within the inflated block.
    pub fn uncompressed(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

/// A half-open interval `[start, end)` of virtual offsets where records for
/// one index bin may reside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First virtual offset of the chunk
    pub start: VirtualOffset,
    /// Virtual offset one past the chunk
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Chunk { start, end }
    }
}

/// Streaming BGZF decompressor over a raw source.
///
/// Inflates one block at a time and supports repositioning to a block start
/// (`seek_primary`) plus skipping inside the inflated data (`skip_n`), which
/// together implement seeking to a virtual offset.
pub struct BgzfReader {
    raw: RawSource,
    /// Inflated bytes of the current block
    block: Vec<u8>,
    /// Read cursor within `block`
    pos: usize,
    /// Scratch buffer holding one compressed block
    scratch: Vec<u8>,
    eof: bool,
}

impl BgzfReader {
    /// Wrap a raw source positioned at the first BGZF block.
    pub fn new(raw: RawSource) -> Self {
        BgzfReader {
            raw,
            block: Vec::new(),
            pos: 0,
            scratch: Vec::with_capacity(1 << 16),
            eof: false,
        }
    }

    /// Reposition the raw source to the start of the BGZF block at
    /// `disk_offset` and invalidate the current inflated block.
    pub fn seek_primary(&mut self, disk_offset: u64) -> Result<()> {
        self.raw.seek_to(disk_offset)?;
        self.block.clear();
        self.pos = 0;
        self.eof = false;
        Ok(())
    }

    /// Advance the logical (post-inflation) cursor by `count` bytes.
    pub fn skip_n(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            let available = self.fill_buf().map_err(|e| Error::from_read(e, "bgzf"))?;
            if available.is_empty() {
                return Err(Error::format(
                    "bgzf",
                    "virtual offset points past the end of the stream",
                ));
            }
            let take = (available.len() as u64).min(count) as usize;
            self.consume(take);
            count -= take as u64;
        }
        Ok(())
    }

    /// Inflate blocks until one yields data or the raw source is exhausted.
    fn load_next_block(&mut self) -> io::Result<()> {
        self.block.clear();
        self.pos = 0;

        while !self.eof && self.block.is_empty() {
            // clean EOF is only legal at a block boundary
            if self.raw.fill_buf()?.is_empty() {
                self.eof = true;
                return Ok(());
            }

            let mut header = [0u8; 12];
            self.raw.read_exact(&mut header).map_err(truncated)?;
            if header[0] != 0x1F || header[1] != 0x8B {
                return Err(invalid(format!(
                    "invalid gzip magic [{:#04x}, {:#04x}] at block start",
                    header[0], header[1]
                )));
            }
            if header[3] & 0x04 == 0 {
                return Err(invalid("gzip member has no extra field, not BGZF"));
            }
            let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;

            self.scratch.clear();
            self.scratch.extend_from_slice(&header);
            self.scratch.resize(12 + xlen, 0);
            self.raw
                .read_exact(&mut self.scratch[12..])
                .map_err(truncated)?;

            let bsize = find_bsize(&self.scratch[12..12 + xlen])
                .ok_or_else(|| invalid("gzip member has no BC subfield, not BGZF"))?;
            let block_size = bsize as usize + 1;
            if block_size < 12 + xlen + 8 {
                return Err(invalid(format!("implausible BSIZE {}", bsize)));
            }

            self.scratch.resize(block_size, 0);
            self.raw
                .read_exact(&mut self.scratch[12 + xlen..])
                .map_err(truncated)?;

            // GzDecoder verifies the CRC32 and ISIZE trailer of the member
            let mut decoder = GzDecoder::new(&self.scratch[..]);
            decoder
                .read_to_end(&mut self.block)
                .map_err(|e| invalid(format!("failed to inflate BGZF block: {}", e)))?;

            // an empty block is the EOF marker; keep going in case data
            // follows (concatenated archives), stop when the source ends
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("bgzf: {}", msg.into()))
}

fn truncated(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        invalid("truncated BGZF block")
    } else {
        e
    }
}

/// Locate the `BC` subfield in a gzip extra field and return its BSIZE.
fn find_bsize(extra: &[u8]) -> Option<u16> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        if si1 == b'B' && si2 == b'C' && slen == 2 && pos + 6 <= extra.len() {
            return Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
        }
        pos += 4 + slen;
    }
    None
}

impl Read for BgzfReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for BgzfReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == self.block.len() && !self.eof {
            self.load_next_block()?;
        }
        Ok(&self.block[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.block.len());
    }
}
