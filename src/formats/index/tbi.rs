//! TBI (tabix) index reader
//!
//! # Format
//!
//! TBI files are little-endian binary, usually BGZF-compressed:
//!
//! - Magic `TBI\x01`
//! - n_ref, format, col_seq, col_beg, col_end, meta, skip, l_nm (int32 each)
//! - Concatenated null-terminated reference names
//! - Per reference: a binning index (bin id, chunks) and a linear index of
//!   virtual offsets for 16 kb windows
//!
//! # Binning scheme
//!
//! The standard 37,450-bin hierarchy over 512 Mbp: one 512 Mbp bin, then
//! 8 x 64 Mbp, 64 x 8 Mbp, 512 x 1 Mbp, 4096 x 128 Kbp and 32768 x 16 Kbp
//! bins.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::bgzf::{Chunk, VirtualOffset};
use crate::io::stream::ByteStream;

const TBI_MAGIC: &[u8; 4] = b"TBI\x01";

/// Maximum coordinate addressable by the binning scheme (512 Mbp)
const MAX_COORD: i64 = 1 << 29;

/// Index data of one reference sequence
#[derive(Debug, Clone)]
pub struct TbiReference {
    /// Reference sequence name
    pub name: String,
    /// Binning index: bin id to chunk list
    pub bins: HashMap<u32, Vec<Chunk>>,
    /// Linear index: lowest virtual offset per 16 kb window
    pub intervals: Vec<VirtualOffset>,
}

/// A parsed tabix index
#[derive(Debug, Clone)]
pub struct TbiIndex {
    /// Indexed file format code (0 generic, 1 SAM, 2 VCF)
    pub format: i32,
    /// Column of the sequence name (1-based, as stored)
    pub col_seq: i32,
    /// Column of the start position
    pub col_beg: i32,
    /// Column of the end position; 0 if absent
    pub col_end: i32,
    /// Comment character introducing header lines
    pub meta_char: char,
    /// Number of leading lines to skip
    pub skip_lines: i32,
    references: Vec<TbiReference>,
    ref_map: HashMap<String, usize>,
}

impl TbiIndex {
    /// Load a tabix index, transparently decompressing BGZF or gzip.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stream = ByteStream::open_path(path.as_ref())?;
        let mut data = Vec::new();
        stream
            .read_to_end(&mut data)
            .map_err(|e| Error::from_read(e, "tabix"))?;
        Self::parse(&data)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor { data, pos: 0 };

        let magic = cur.bytes(4)?;
        if magic != TBI_MAGIC {
            return Err(Error::format(
                "tabix",
                format!("invalid magic {:?}, expected {:?}", magic, TBI_MAGIC),
            ));
        }

        let n_ref = cur.i32()?;
        let format = cur.i32()?;
        let col_seq = cur.i32()?;
        let col_beg = cur.i32()?;
        let col_end = cur.i32()?;
        let meta = cur.i32()?;
        let skip = cur.i32()?;
        let l_nm = cur.i32()?;

        let names = parse_reference_names(cur.bytes(l_nm.max(0) as usize)?)?;
        if names.len() != n_ref.max(0) as usize {
            return Err(Error::format(
                "tabix",
                format!(
                    "header claims {} references but {} names are present",
                    n_ref,
                    names.len()
                ),
            ));
        }

        let mut references = Vec::with_capacity(names.len());
        let mut ref_map = HashMap::new();
        for (idx, name) in names.into_iter().enumerate() {
            let mut bins: HashMap<u32, Vec<Chunk>> = HashMap::new();
            let n_bin = cur.i32()?;
            for _ in 0..n_bin {
                let bin_id = cur.u32()?;
                let n_chunk = cur.i32()?;
                let chunks = bins.entry(bin_id).or_default();
                for _ in 0..n_chunk {
                    let beg = VirtualOffset::from_raw(cur.u64()?);
                    let end = VirtualOffset::from_raw(cur.u64()?);
                    chunks.push(Chunk::new(beg, end));
                }
            }

            let n_intv = cur.i32()?;
            let mut intervals = Vec::with_capacity(n_intv.max(0) as usize);
            for _ in 0..n_intv {
                intervals.push(VirtualOffset::from_raw(cur.u64()?));
            }

            ref_map.insert(name.clone(), idx);
            references.push(TbiReference {
                name,
                bins,
                intervals,
            });
        }

        Ok(TbiIndex {
            format,
            col_seq,
            col_beg,
            col_end,
            meta_char: (meta.max(0) as u8) as char,
            skip_lines: skip,
            references,
            ref_map,
        })
    }

    /// All indexed references
    pub fn references(&self) -> &[TbiReference] {
        &self.references
    }

    /// Reference entry by name
    pub fn get_reference(&self, name: &str) -> Option<&TbiReference> {
        self.ref_map.get(name).map(|&idx| &self.references[idx])
    }

    /// Chunks whose genomic span may overlap `[beg, end)` on `chrom`,
    /// coalesced and sorted by begin offset.
    ///
    /// An unknown contig or an empty interval yields an empty list.
    pub fn reg2chunks(&self, chrom: &str, beg: i64, end: i64) -> Vec<Chunk> {
        let beg = beg.max(0);
        let end = end.min(MAX_COORD);
        if beg >= end {
            return Vec::new();
        }
        let reference = match self.get_reference(chrom) {
            Some(r) => r,
            None => return Vec::new(),
        };

        let mut chunks = Vec::new();
        for bin_id in reg2bins(beg as u32, end as u32) {
            if let Some(bin_chunks) = reference.bins.get(&bin_id) {
                chunks.extend_from_slice(bin_chunks);
            }
        }

        // the linear index bounds the lowest useful offset for the window
        // containing beg
        let min_offset = linear_min_offset(&reference.intervals, beg as u32);
        chunks.retain(|chunk| chunk.end > min_offset);

        chunks.sort_by_key(|chunk| chunk.start);
        merge_chunks(&chunks)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| Error::format("tabix", "truncated index"))?;
        self.pos += n;
        Ok(slice)
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }
}

fn parse_reference_names(buf: &[u8]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for chunk in buf.split(|&b| b == 0) {
        if chunk.is_empty() {
            continue;
        }
        let name = std::str::from_utf8(chunk)
            .map_err(|_| Error::format("tabix", "reference name is not valid UTF-8"))?;
        names.push(name.to_string());
    }
    Ok(names)
}

/// Candidate bin ids overlapping `[beg, end)` in the standard hierarchy.
fn reg2bins(beg: u32, end: u32) -> Vec<u32> {
    let mut bins = vec![0u32];
    let end = end - 1;
    for level in 1..=5u32 {
        let offset = ((1u32 << (3 * level)) - 1) / 7;
        let shift = 29 - 3 * level;
        for bin in (offset + (beg >> shift))..=(offset + (end >> shift)) {
            bins.push(bin);
        }
    }
    bins
}

/// Lowest useful virtual offset for a query starting at `beg`.
fn linear_min_offset(intervals: &[VirtualOffset], beg: u32) -> VirtualOffset {
    if intervals.is_empty() {
        return VirtualOffset::from_raw(0);
    }
    let window = (beg >> 14) as usize;
    intervals[window.min(intervals.len() - 1)]
}

/// Coalesce a begin-sorted chunk list, merging overlapping and adjacent
/// chunks.
fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for &chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal index: one reference "chr1" with a single bin-0 chunk and
    /// a two-window linear index.
    fn minimal_tbi() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(TBI_MAGIC);
        data.extend_from_slice(&1i32.to_le_bytes()); // n_ref
        data.extend_from_slice(&2i32.to_le_bytes()); // format: VCF
        data.extend_from_slice(&1i32.to_le_bytes()); // col_seq
        data.extend_from_slice(&2i32.to_le_bytes()); // col_beg
        data.extend_from_slice(&0i32.to_le_bytes()); // col_end
        data.extend_from_slice(&(b'#' as i32).to_le_bytes()); // meta
        data.extend_from_slice(&0i32.to_le_bytes()); // skip
        data.extend_from_slice(&5i32.to_le_bytes()); // l_nm
        data.extend_from_slice(b"chr1\0");

        data.extend_from_slice(&1i32.to_le_bytes()); // n_bin
        data.extend_from_slice(&0u32.to_le_bytes()); // bin 0
        data.extend_from_slice(&1i32.to_le_bytes()); // n_chunk
        data.extend_from_slice(&0x1000u64.to_le_bytes()); // chunk beg
        data.extend_from_slice(&0x2000u64.to_le_bytes()); // chunk end

        data.extend_from_slice(&2i32.to_le_bytes()); // n_intv
        data.extend_from_slice(&0x1000u64.to_le_bytes());
        data.extend_from_slice(&0x1500u64.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_minimal_index() {
        let index = TbiIndex::parse(&minimal_tbi()).unwrap();
        assert_eq!(index.format, 2);
        assert_eq!(index.col_seq, 1);
        assert_eq!(index.meta_char, '#');
        assert_eq!(index.references().len(), 1);

        let chr1 = index.get_reference("chr1").unwrap();
        assert_eq!(chr1.name, "chr1");
        assert_eq!(chr1.bins.len(), 1);
        assert_eq!(chr1.intervals.len(), 2);
    }

    #[test]
    fn test_reg2chunks_finds_chunk() {
        let index = TbiIndex::parse(&minimal_tbi()).unwrap();
        let chunks = index.reg2chunks("chr1", 0, 100_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start.as_raw(), 0x1000);
        assert_eq!(chunks[0].end.as_raw(), 0x2000);
    }

    #[test]
    fn test_unknown_contig_is_empty() {
        let index = TbiIndex::parse(&minimal_tbi()).unwrap();
        assert!(index.reg2chunks("chr99", 0, 100_000).is_empty());
    }

    #[test]
    fn test_empty_region_is_empty() {
        let index = TbiIndex::parse(&minimal_tbi()).unwrap();
        assert!(index.reg2chunks("chr1", 500, 500).is_empty());
        assert!(index.reg2chunks("chr1", 700, 500).is_empty());
    }

    #[test]
    fn test_linear_index_prunes_early_chunks() {
        // querying past the first 16 kb window raises the minimum offset to
        // 0x1500, which still intersects the [0x1000, 0x2000) chunk
        let index = TbiIndex::parse(&minimal_tbi()).unwrap();
        let chunks = index.reg2chunks("chr1", 20_000, 30_000);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_invalid_magic_is_an_error() {
        let mut data = minimal_tbi();
        data[0] = b'X';
        assert!(matches!(
            TbiIndex::parse(&data).unwrap_err(),
            Error::Format { format: "tabix", .. }
        ));
    }

    #[test]
    fn test_truncated_index_is_an_error() {
        let mut data = minimal_tbi();
        data.truncate(data.len() - 4);
        assert!(TbiIndex::parse(&data).is_err());
    }

    #[test]
    fn test_merge_chunks_coalesces() {
        let c = |s: u64, e: u64| Chunk::new(VirtualOffset::from_raw(s), VirtualOffset::from_raw(e));
        let merged = merge_chunks(&[c(100, 200), c(150, 250), c(300, 400)]);
        assert_eq!(merged, vec![c(100, 250), c(300, 400)]);
    }

    #[test]
    fn test_reg2bins_contains_expected_levels() {
        let bins = reg2bins(1000, 2000);
        assert!(bins.contains(&0));
        // the 16 kb window of position 1000 is bin 4681 + 0
        assert!(bins.contains(&4681));
        for window in bins.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }
}
