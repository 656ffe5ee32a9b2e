//! The reader engine: lifecycle, format dispatch, region jump, record pump
//!
//! Both reader families share `ReaderCore`, a generic engine over the
//! per-family handler sum. Construction binds the source and detects the
//! format; the handler (and, for variant files, the header parse) is built
//! lazily on the first advance. The iteration surface is a pull cursor,
//! `advance()` + `current()`, with an owned-record iterator on top:
//!
//! ```no_run
//! use seqvar::SeqReader;
//!
//! # fn main() -> seqvar::Result<()> {
//! let mut reader = SeqReader::from_path("reads.fasta.gz")?;
//! while reader.advance()? {
//!     if let Some(record) = reader.current() {
//!         println!("{}: {} bp", record.id(), record.seq().len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A shallow record from `current()` borrows the reader and is invalidated
//! by the next advance; clone it (`to_record`) to retain it.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::alphabet::{SeqAlphabet, SymbolPolicy};
use crate::error::{Error, Result};
use crate::formats::index::TbiIndex;
use crate::formats::{FormatHandler, SeqFormat, SeqHandler, VarFormat, VarHandler};
use crate::header::VarHeader;
use crate::io::source::RawSource;
use crate::io::stream::ByteStream;
use crate::region::{GenomicRegion, RegionVerdict};
use crate::types::{SeqRecord, SeqRecordRef, VarRecord, VarRecordRef};

// ----------------------------------------------------------------------------
// options
// ----------------------------------------------------------------------------

/// Options of the sequence reader family
#[derive(Debug, Clone, Default)]
pub struct SeqReaderOptions {
    /// Alphabet for the `seq` field
    pub alphabet: SeqAlphabet,
    /// Behaviour on bytes outside the alphabet
    pub on_unknown_symbol: SymbolPolicy,
    /// Truncate the `id` field at the first whitespace byte
    pub truncate_ids_at_first_whitespace: bool,
}

/// Options of the variant reader family
#[derive(Debug, Clone, Default)]
pub struct VarReaderOptions {
    /// Restrict iteration to records overlapping this region
    pub region: Option<GenomicRegion>,
    /// Explicit tabix index location; defaults to `<source>.tbi`
    pub region_index_file: Option<PathBuf>,
    /// Permit linear-scan filtering when no index is found
    pub region_index_optional: bool,
}

impl VarReaderOptions {
    fn validate(&self) -> Result<()> {
        if self.region_index_file.is_some() && self.region.is_none() {
            return Err(Error::UnsupportedOperation(
                "region_index_file is set but no region was given".to_string(),
            ));
        }
        if let Some(region) = &self.region {
            if region.chrom.is_empty() {
                return Err(Error::UnsupportedOperation(
                    "region chrom must be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// generic engine core
// ----------------------------------------------------------------------------

enum CoreState<H: FormatHandler> {
    /// Source bound, handler not yet constructed
    Pending {
        stream: ByteStream,
        format: Option<H::Format>,
    },
    Active(H),
    /// Handler construction failed; the reader is terminal
    Failed,
}

struct ReaderCore<H: FormatHandler> {
    state: CoreState<H>,
    source_name: String,
    at_end: bool,
    initialized: bool,
}

impl<H: FormatHandler> ReaderCore<H> {
    fn from_path(path: &Path, explicit_format: Option<H::Format>) -> Result<Self> {
        let stream = ByteStream::open_path(path)?;
        let format = match explicit_format {
            Some(format) => Some(format),
            None => H::format_from_path(path)?,
        };
        Ok(ReaderCore {
            state: CoreState::Pending { stream, format },
            source_name: path.display().to_string(),
            at_end: false,
            initialized: false,
        })
    }

    fn from_raw(raw: RawSource, format: H::Format) -> Result<Self> {
        let stream = ByteStream::from_source(raw, None)?;
        Ok(ReaderCore {
            state: CoreState::Pending {
                stream,
                format: Some(format),
            },
            source_name: "<stream>".to_string(),
            at_end: false,
            initialized: false,
        })
    }

    /// Construct the format handler on first use. An empty source raises
    /// `FileOpen` once; afterwards the reader is terminal.
    fn ensure_init(&mut self, opts: &H::Options) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;

        let state = std::mem::replace(&mut self.state, CoreState::Failed);
        let CoreState::Pending { mut stream, format } = state else {
            return Ok(());
        };

        let opened = (|| {
            if stream.at_eof()? {
                return Err(Error::file_open(self.source_name.clone(), "input is empty"));
            }
            let format = match format {
                Some(format) => format,
                None => H::sniff_format(&mut stream)?,
            };
            H::open(stream, format, opts)
        })();

        match opened {
            Ok(handler) => {
                self.state = CoreState::Active(handler);
                Ok(())
            }
            Err(e) => {
                self.at_end = true;
                Err(e)
            }
        }
    }

    fn handler(&self) -> Option<&H> {
        match &self.state {
            CoreState::Active(handler) => Some(handler),
            _ => None,
        }
    }

    fn handler_mut(&mut self) -> Result<&mut H> {
        match &mut self.state {
            CoreState::Active(handler) => Ok(handler),
            _ => Err(Error::file_open(
                self.source_name.clone(),
                "reader is not initialised",
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// sequence reader
// ----------------------------------------------------------------------------

/// Reader for sequence files (FASTA, FASTQ), possibly compressed.
///
/// Single-pass and forward-only. Not shareable across threads.
pub struct SeqReader {
    core: ReaderCore<SeqHandler>,
    options: SeqReaderOptions,
    have_record: bool,
}

impl std::fmt::Debug for SeqReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqReader").finish_non_exhaustive()
    }
}

impl SeqReader {
    /// Open a file, inferring the format from the extension, then content.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), None, SeqReaderOptions::default())
    }

    /// Open a file with options.
    pub fn from_path_with<P: AsRef<Path>>(path: P, options: SeqReaderOptions) -> Result<Self> {
        Self::open(path.as_ref(), None, options)
    }

    /// Open a file with an explicit format, overriding detection.
    pub fn with_format<P: AsRef<Path>>(
        path: P,
        format: SeqFormat,
        options: SeqReaderOptions,
    ) -> Result<Self> {
        Self::open(path.as_ref(), Some(format), options)
    }

    /// Read from an arbitrary stream; the format must be given.
    pub fn from_stream<R: Read + Send + 'static>(
        stream: R,
        format: SeqFormat,
        options: SeqReaderOptions,
    ) -> Result<Self> {
        let core = ReaderCore::from_raw(RawSource::from_stream(Box::new(stream)), format)?;
        Ok(SeqReader {
            core,
            options,
            have_record: false,
        })
    }

    fn open(path: &Path, format: Option<SeqFormat>, options: SeqReaderOptions) -> Result<Self> {
        let core = ReaderCore::from_path(path, format)?;
        Ok(SeqReader {
            core,
            options,
            have_record: false,
        })
    }

    /// Advance to the next record. Returns `false` at the end of input.
    ///
    /// After a non-EOF error the reader is terminal: the error is surfaced
    /// once and further advances report the end of input.
    pub fn advance(&mut self) -> Result<bool> {
        if self.core.at_end {
            return Ok(false);
        }
        match self.advance_inner() {
            Err(e) => {
                self.core.at_end = true;
                self.have_record = false;
                Err(e)
            }
            ok => ok,
        }
    }

    fn advance_inner(&mut self) -> Result<bool> {
        self.core.ensure_init(&self.options)?;
        let handler = self.core.handler_mut()?;
        if handler.advance_record()? {
            self.have_record = true;
            Ok(true)
        } else {
            self.core.at_end = true;
            self.have_record = false;
            Ok(false)
        }
    }

    /// Shallow view of the current record; `None` before the first advance
    /// and after the end of input. Invalidated by the next advance.
    pub fn current(&self) -> Option<SeqRecordRef<'_>> {
        if !self.have_record {
            return None;
        }
        self.core.handler().map(|handler| handler.current())
    }

    /// Iterator over owned records.
    pub fn records(&mut self) -> SeqRecords<'_> {
        SeqRecords { reader: self }
    }
}

/// Owned-record iterator over a [`SeqReader`]
pub struct SeqRecords<'r> {
    reader: &'r mut SeqReader,
}

impl Iterator for SeqRecords<'_> {
    type Item = Result<SeqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.advance() {
            Ok(true) => self.reader.current().map(|r| Ok(r.to_record())),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// ----------------------------------------------------------------------------
// variant reader
// ----------------------------------------------------------------------------

/// Reader for variant files (VCF, BCF), possibly compressed, with optional
/// tabix-backed region filtering.
///
/// Single-pass and forward-only. Region filtering requires chrom-sorted
/// input: the scan terminates at the first record past the target region.
pub struct VarReader {
    core: ReaderCore<VarHandler>,
    options: VarReaderOptions,
    have_record: bool,
}

impl VarReader {
    /// Open a file, inferring the format from the extension, then content.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path.as_ref(), None, VarReaderOptions::default())
    }

    /// Open a file with options.
    pub fn from_path_with<P: AsRef<Path>>(path: P, options: VarReaderOptions) -> Result<Self> {
        Self::open(path.as_ref(), None, options)
    }

    /// Open a file with an explicit format, overriding detection.
    pub fn with_format<P: AsRef<Path>>(
        path: P,
        format: VarFormat,
        options: VarReaderOptions,
    ) -> Result<Self> {
        Self::open(path.as_ref(), Some(format), options)
    }

    /// Read from an arbitrary stream; the format must be given. Region
    /// filtering over a stream works in linear-scan mode only.
    pub fn from_stream<R: Read + Send + 'static>(
        stream: R,
        format: VarFormat,
        options: VarReaderOptions,
    ) -> Result<Self> {
        options.validate()?;
        let core = ReaderCore::from_raw(RawSource::from_stream(Box::new(stream)), format)?;
        Ok(VarReader {
            core,
            options,
            have_record: false,
        })
    }

    fn open(path: &Path, format: Option<VarFormat>, options: VarReaderOptions) -> Result<Self> {
        options.validate()?;
        let core = ReaderCore::from_path(path, format)?;
        Ok(VarReader {
            core,
            options,
            have_record: false,
        })
    }

    /// The parsed header. Forces handler construction on first use; the
    /// returned reference is stable across `reopen`.
    pub fn header(&mut self) -> Result<&VarHeader> {
        self.ensure_init()?;
        let source_name = self.core.source_name.clone();
        self.core
            .handler()
            .map(|handler| handler.header())
            .ok_or_else(|| Error::file_open(source_name, "reader is not initialised"))
    }

    /// Advance to the next (region-matching) record. Returns `false` at the
    /// end of input or once the scan has passed the target region.
    pub fn advance(&mut self) -> Result<bool> {
        if self.core.at_end {
            return Ok(false);
        }
        match self.advance_inner() {
            Err(e) => {
                self.core.at_end = true;
                self.have_record = false;
                Err(e)
            }
            ok => ok,
        }
    }

    fn advance_inner(&mut self) -> Result<bool> {
        self.ensure_init()?;
        self.read_next_record()
    }

    fn ensure_init(&mut self) -> Result<()> {
        if self.core.initialized {
            return Ok(());
        }
        self.core.ensure_init(&self.options)?;
        if self.options.region.is_some() {
            if let Err(e) = self.jump_to_region(false) {
                self.core.at_end = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Seek close to the target region using a tabix index, per the policy:
    /// explicit index file, else `<source>.tbi`, else (if permitted) a
    /// linear scan from the current position.
    ///
    /// The indexed jump is deliberately simplified: only the smallest begin
    /// offset across the overlapping chunks is used and the scan runs
    /// forward from there; the comparator's terminal verdict bounds the
    /// work.
    fn jump_to_region(&mut self, at_reopen: bool) -> Result<()> {
        let Some(region) = self.options.region.clone() else {
            return Ok(());
        };

        let index_path = match &self.options.region_index_file {
            Some(path) => Some(path.clone()),
            None => self
                .core
                .handler_mut()?
                .stream_mut()
                .path()
                .map(|path| {
                    let mut with_tbi = path.as_os_str().to_os_string();
                    with_tbi.push(".tbi");
                    PathBuf::from(with_tbi)
                })
                .filter(|path| path.exists()),
        };

        match index_path {
            Some(index_path) => {
                let index = TbiIndex::from_path(&index_path)?;
                let chunks = index.reg2chunks(&region.chrom, region.beg, region.end);
                // no chunk can contain the region: it is known to be
                // unreachable
                let first = chunks.first().ok_or_else(|| {
                    Error::file_open(
                        self.core.source_name.clone(),
                        format!(
                            "the index has no chunks for region {}:{}-{}; the region is \
                             unreachable",
                            region.chrom, region.beg, region.end
                        ),
                    )
                })?;
                let offset = first.start;
                let handler = self.core.handler_mut()?;
                handler.stream_mut().seek_primary(offset.compressed())?;
                handler.stream_mut().skip_n(offset.uncompressed() as u64)?;
                handler.reset_stream();
                Ok(())
            }
            None if !self.options.region_index_optional => {
                let msg = "no tabix index was found; set region_index_optional to true \
                           to allow linear-time filtering without an index"
                    .to_string();
                Err(if at_reopen {
                    Error::UnsupportedOperation(msg)
                } else {
                    Error::file_open(self.core.source_name.clone(), msg)
                })
            }
            // linear scan: the region filter starts from the current
            // position
            None => Ok(()),
        }
    }

    fn read_next_record(&mut self) -> Result<bool> {
        match self.options.region.clone() {
            None => {
                let handler = self.core.handler_mut()?;
                if handler.advance_record()? {
                    self.have_record = true;
                    Ok(true)
                } else {
                    self.core.at_end = true;
                    self.have_record = false;
                    Ok(false)
                }
            }
            Some(region) => loop {
                let handler = self.core.handler_mut()?;
                if !handler.advance_record()? {
                    self.core.at_end = true;
                    self.have_record = false;
                    return Ok(false);
                }
                match handler.probe_verdict(&region) {
                    // record lies before the target region: skip
                    RegionVerdict::Before => continue,
                    // record overlaps: take it
                    RegionVerdict::Overlap => {
                        self.have_record = true;
                        return Ok(true);
                    }
                    // record begins past the region in sorted input: done
                    RegionVerdict::After => {
                        self.core.at_end = true;
                        self.have_record = false;
                        return Ok(false);
                    }
                }
            },
        }
    }

    /// Shallow view of the current record; `None` before the first advance
    /// and after the end of input. Invalidated by the next advance.
    pub fn current(&self) -> Option<VarRecordRef<'_>> {
        if !self.have_record {
            return None;
        }
        let handler = self.core.handler()?;
        Some(VarRecordRef {
            inner: handler.current_inner(),
            header: handler.header(),
        })
    }

    /// Re-target this reader on a new region without re-parsing the header.
    ///
    /// Requires an index unless `region_index_optional` is set; without an
    /// index the scan continues from the current position, so regions must
    /// be queried in ascending order over chrom-sorted input.
    pub fn reopen(&mut self, region: GenomicRegion) -> Result<()> {
        if region.chrom.is_empty() {
            return Err(Error::UnsupportedOperation(
                "region chrom must be non-empty".to_string(),
            ));
        }
        if !self.core.initialized {
            self.options.region = Some(region);
            return Ok(());
        }
        self.core.at_end = false;
        self.have_record = false;
        self.options.region = Some(region);
        match self.jump_to_region(true) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.core.at_end = true;
                Err(e)
            }
        }
    }

    /// Iterator over owned, fully-materialised records.
    pub fn records(&mut self) -> VarRecords<'_> {
        VarRecords { reader: self }
    }
}

/// Owned-record iterator over a [`VarReader`]
pub struct VarRecords<'r> {
    reader: &'r mut VarReader,
}

impl Iterator for VarRecords<'_> {
    type Item = Result<VarRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.advance() {
            Ok(true) => self.reader.current().map(|r| r.to_record()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FASTA: &[u8] = b">ID1\nACGT\n>ID2\nGGGG\nTTTT\n>ID3\nAAAA\n";

    const VCF: &str = "##fileformat=VCFv4.3\n\
        ##contig=<ID=20,length=62435964>\n\
        ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
        20\t100\t.\tA\tT\t10\tPASS\tDP=5\n\
        20\t500\t.\tG\tC\t20\tPASS\tDP=6\n\
        20\t900\t.\tT\tA\t30\tPASS\tDP=7\n";

    fn seq_reader(data: &[u8], format: SeqFormat) -> SeqReader {
        SeqReader::from_stream(Cursor::new(data.to_vec()), format, SeqReaderOptions::default())
            .unwrap()
    }

    fn var_reader(data: &str, options: VarReaderOptions) -> VarReader {
        VarReader::from_stream(
            Cursor::new(data.as_bytes().to_vec()),
            VarFormat::Vcf,
            options,
        )
        .unwrap()
    }

    #[test]
    fn test_pull_cursor_over_fasta() {
        let mut reader = seq_reader(FASTA, SeqFormat::Fasta);
        assert!(reader.current().is_none());

        let mut ids = Vec::new();
        while reader.advance().unwrap() {
            let record = reader.current().unwrap();
            ids.push(record.id().to_string());
        }
        assert_eq!(ids, vec!["ID1", "ID2", "ID3"]);

        assert!(reader.current().is_none());
        assert!(!reader.advance().unwrap());
    }

    #[test]
    fn test_owned_record_iterator() {
        let mut reader = seq_reader(FASTA, SeqFormat::Fasta);
        let records: Vec<SeqRecord> = reader.records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].seq, b"GGGGTTTT");
    }

    #[test]
    fn test_empty_stream_raises_file_open_once() {
        let mut reader = seq_reader(b"", SeqFormat::Fasta);
        let err = reader.advance().unwrap_err();
        assert!(matches!(err, Error::FileOpen { .. }));
        // terminal afterwards: clean EOF, no re-raise
        assert!(!reader.advance().unwrap());
        assert!(!reader.advance().unwrap());
    }

    #[test]
    fn test_error_is_terminal() {
        let mut reader = seq_reader(b"@id\nACGT\n+\nII\n", SeqFormat::Fastq);
        assert!(reader.advance().is_err());
        assert!(!reader.advance().unwrap());
        assert!(reader.current().is_none());
    }

    #[test]
    fn test_var_reader_unrestricted() {
        let mut reader = var_reader(VCF, VarReaderOptions::default());
        let positions: Vec<i64> = reader
            .records()
            .map(|r| r.map(|rec| rec.pos))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(positions, vec![100, 500, 900]);
    }

    #[test]
    fn test_var_reader_header_access() {
        let mut reader = var_reader(VCF, VarReaderOptions::default());
        assert_eq!(reader.header().unwrap().contigs[0].name, "20");
        // header access does not consume records
        assert!(reader.advance().unwrap());
        assert_eq!(reader.current().unwrap().pos(), 100);
    }

    #[test]
    fn test_linear_region_filtering() {
        let options = VarReaderOptions {
            region: Some(GenomicRegion::new("20", 400, 600)),
            region_index_optional: true,
            ..VarReaderOptions::default()
        };
        let mut reader = var_reader(VCF, options);
        assert!(reader.advance().unwrap());
        assert_eq!(reader.current().unwrap().pos(), 500);
        // the next record starts past the region: terminal
        assert!(!reader.advance().unwrap());
    }

    #[test]
    fn test_region_without_index_raises() {
        let options = VarReaderOptions {
            region: Some(GenomicRegion::new("20", 400, 600)),
            ..VarReaderOptions::default()
        };
        let mut reader = var_reader(VCF, options);
        let err = reader.advance().unwrap_err();
        assert!(matches!(err, Error::FileOpen { .. }));
        assert!(err.to_string().contains("region_index_optional"));
    }

    #[test]
    fn test_option_validation_at_construction() {
        let options = VarReaderOptions {
            region_index_file: Some(PathBuf::from("x.tbi")),
            ..VarReaderOptions::default()
        };
        assert!(matches!(
            VarReader::from_stream(Cursor::new(Vec::new()), VarFormat::Vcf, options),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_shallow_view_then_deep_copy() {
        let mut reader = seq_reader(FASTA, SeqFormat::Fasta);
        assert!(reader.advance().unwrap());
        let deep: SeqRecord = reader.current().unwrap().to_record();
        assert!(reader.advance().unwrap());
        // the owned copy survives the advance that invalidated the view
        assert_eq!(deep.id, "ID1");
        assert_eq!(deep.seq, b"ACGT");
    }
}
