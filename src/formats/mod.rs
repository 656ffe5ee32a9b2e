//! File formats: tags, auto-detection and the per-format handlers
//!
//! Each reader family dispatches over a sum of per-format handlers
//! (`SeqHandler`, `VarHandler`); dispatch is centralised in the `match`
//! adapters on the sum types, so handler code stays isolated per format.

use std::io::BufRead;
use std::path::Path;

use crate::error::{Error, Result};
use crate::header::VarHeader;
use crate::io::stream::ByteStream;
use crate::reader::{SeqReaderOptions, VarReaderOptions};
use crate::region::{classify, probe_interval, GenomicRegion, RegionVerdict};
use crate::types::{SeqRecordRef, VarRecordRefInner};

pub mod bcf;
pub mod fasta;
pub mod fastq;
pub mod index;
pub mod vcf;

/// Extensions stripped before format detection
const COMPRESSION_EXTENSIONS: &[&str] = &["gz", "bgz", "bgzf"];

/// Sequence file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqFormat {
    /// FASTA: `>`-headed records with wrapped sequence lines
    Fasta,
    /// FASTQ: four-line records with quality scores
    Fastq,
}

/// Variant file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarFormat {
    /// VCF: tab-separated text, optionally BGZF-compressed
    Vcf,
    /// BCF: little-endian binary framed inside BGZF
    Bcf,
}

/// The innermost extension of `path` after stripping compression suffixes.
fn data_extension(path: &Path) -> Option<&str> {
    let mut stem = path;
    loop {
        let ext = stem.extension()?.to_str()?;
        if COMPRESSION_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            stem = Path::new(stem.file_stem()?);
        } else {
            return Some(ext);
        }
    }
}

/// First non-whitespace byte of the stream, peeked without consuming.
fn peek_first_byte(stream: &mut ByteStream) -> Result<Option<u8>> {
    let head = stream.fill_buf()?;
    Ok(head.iter().copied().find(|b| !b.is_ascii_whitespace()))
}

impl SeqFormat {
    /// Detect from the file extension. `Ok(None)` means the path has no
    /// extension and content sniffing should decide.
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        match data_extension(path) {
            None => Ok(None),
            Some(ext) => match ext.to_ascii_lowercase().as_str() {
                "fasta" | "fa" | "fna" | "ffn" | "faa" | "frn" => Ok(Some(SeqFormat::Fasta)),
                "fastq" | "fq" => Ok(Some(SeqFormat::Fastq)),
                other => Err(Error::UnhandledExtension {
                    path: path.to_path_buf(),
                    extension: other.to_string(),
                }),
            },
        }
    }

    /// Detect from the first non-whitespace byte of the decompressed stream.
    pub(crate) fn sniff(stream: &mut ByteStream) -> Result<Self> {
        match peek_first_byte(stream)? {
            Some(b'>') => Ok(SeqFormat::Fasta),
            Some(b'@') => Ok(SeqFormat::Fastq),
            _ => Err(Error::file_open(
                describe_stream(stream),
                "cannot determine sequence format from content",
            )),
        }
    }

    /// Format name for error messages
    pub fn name(self) -> &'static str {
        match self {
            SeqFormat::Fasta => "FASTA",
            SeqFormat::Fastq => "FASTQ",
        }
    }
}

impl VarFormat {
    /// Detect from the file extension. `Ok(None)` means the path has no
    /// extension and content sniffing should decide.
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        match data_extension(path) {
            None => Ok(None),
            Some(ext) => match ext.to_ascii_lowercase().as_str() {
                "vcf" => Ok(Some(VarFormat::Vcf)),
                "bcf" => Ok(Some(VarFormat::Bcf)),
                other => Err(Error::UnhandledExtension {
                    path: path.to_path_buf(),
                    extension: other.to_string(),
                }),
            },
        }
    }

    /// Detect from the first bytes of the decompressed stream.
    pub(crate) fn sniff(stream: &mut ByteStream) -> Result<Self> {
        let head = stream.fill_buf()?;
        if head.starts_with(b"BCF") {
            return Ok(VarFormat::Bcf);
        }
        match head.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b'#') => Ok(VarFormat::Vcf),
            _ => Err(Error::file_open(
                describe_stream(stream),
                "cannot determine variant format from content",
            )),
        }
    }

    /// Format name for error messages
    pub fn name(self) -> &'static str {
        match self {
            VarFormat::Vcf => "VCF",
            VarFormat::Bcf => "BCF",
        }
    }
}

pub(crate) fn describe_stream(stream: &ByteStream) -> String {
    match stream.path() {
        Some(p) => p.display().to_string(),
        None => "<stream>".to_string(),
    }
}

/// Read one line (without the trailing newline) into `buf`, reusing its
/// allocation. Returns `false` on clean EOF.
pub(crate) fn read_line_into(
    stream: &mut ByteStream,
    buf: &mut Vec<u8>,
    format: &'static str,
) -> Result<bool> {
    buf.clear();
    let n = stream
        .read_until(b'\n', buf)
        .map_err(|e| Error::from_read(e, format))?;
    if n == 0 {
        return Ok(false);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(true)
}

// ----------------------------------------------------------------------------
// handler dispatch
// ----------------------------------------------------------------------------

/// Common capability set of the per-format handlers, as seen by the reader
/// engine.
pub(crate) trait FormatHandler: Sized {
    type Format: Copy;
    type Options;

    /// Detect the format from a file extension, if one is present.
    fn format_from_path(path: &Path) -> Result<Option<Self::Format>>;

    /// Detect the format from stream content.
    fn sniff_format(stream: &mut ByteStream) -> Result<Self::Format>;

    /// Construct the handler: reads the header (variant formats) and leaves
    /// the stream positioned at the first record.
    fn open(stream: ByteStream, format: Self::Format, opts: &Self::Options) -> Result<Self>;

    fn stream_mut(&mut self) -> &mut ByteStream;

    /// Re-synchronise internal parse state after the engine seeked the
    /// stream.
    fn reset_stream(&mut self);

    /// Advance past one record, retaining it in the handler's buffers.
    /// Returns `false` on clean EOF.
    fn advance_record(&mut self) -> Result<bool>;
}

/// Sum of the sequence-format handlers
pub(crate) enum SeqHandler {
    Fasta(fasta::FastaHandler),
    Fastq(fastq::FastqHandler),
}

impl FormatHandler for SeqHandler {
    type Format = SeqFormat;
    type Options = SeqReaderOptions;

    fn format_from_path(path: &Path) -> Result<Option<SeqFormat>> {
        SeqFormat::from_path(path)
    }

    fn sniff_format(stream: &mut ByteStream) -> Result<SeqFormat> {
        SeqFormat::sniff(stream)
    }

    fn open(stream: ByteStream, format: SeqFormat, opts: &SeqReaderOptions) -> Result<Self> {
        Ok(match format {
            SeqFormat::Fasta => SeqHandler::Fasta(fasta::FastaHandler::new(stream, opts.clone())),
            SeqFormat::Fastq => SeqHandler::Fastq(fastq::FastqHandler::new(stream, opts.clone())),
        })
    }

    fn stream_mut(&mut self) -> &mut ByteStream {
        match self {
            SeqHandler::Fasta(h) => h.stream_mut(),
            SeqHandler::Fastq(h) => h.stream_mut(),
        }
    }

    fn reset_stream(&mut self) {
        match self {
            SeqHandler::Fasta(h) => h.reset_stream(),
            SeqHandler::Fastq(h) => h.reset_stream(),
        }
    }

    fn advance_record(&mut self) -> Result<bool> {
        match self {
            SeqHandler::Fasta(h) => h.advance_record(),
            SeqHandler::Fastq(h) => h.advance_record(),
        }
    }
}

impl SeqHandler {
    /// Shallow view of the retained record.
    pub(crate) fn current(&self) -> SeqRecordRef<'_> {
        match self {
            SeqHandler::Fasta(h) => h.current(),
            SeqHandler::Fastq(h) => h.current(),
        }
    }
}

/// Sum of the variant-format handlers
pub(crate) enum VarHandler {
    Vcf(vcf::VcfHandler),
    Bcf(bcf::BcfHandler),
}

impl FormatHandler for VarHandler {
    type Format = VarFormat;
    type Options = VarReaderOptions;

    fn format_from_path(path: &Path) -> Result<Option<VarFormat>> {
        VarFormat::from_path(path)
    }

    fn sniff_format(stream: &mut ByteStream) -> Result<VarFormat> {
        VarFormat::sniff(stream)
    }

    fn open(stream: ByteStream, format: VarFormat, _opts: &VarReaderOptions) -> Result<Self> {
        Ok(match format {
            VarFormat::Vcf => VarHandler::Vcf(vcf::VcfHandler::new(stream)?),
            VarFormat::Bcf => VarHandler::Bcf(bcf::BcfHandler::new(stream)?),
        })
    }

    fn stream_mut(&mut self) -> &mut ByteStream {
        match self {
            VarHandler::Vcf(h) => h.stream_mut(),
            VarHandler::Bcf(h) => h.stream_mut(),
        }
    }

    fn reset_stream(&mut self) {
        match self {
            VarHandler::Vcf(h) => h.reset_stream(),
            VarHandler::Bcf(h) => h.reset_stream(),
        }
    }

    fn advance_record(&mut self) -> Result<bool> {
        match self {
            VarHandler::Vcf(h) => h.advance_record(),
            VarHandler::Bcf(h) => h.advance_record(),
        }
    }
}

impl VarHandler {
    /// The parsed header; stable for the handler's lifetime.
    pub(crate) fn header(&self) -> &VarHeader {
        match self {
            VarHandler::Vcf(h) => h.header(),
            VarHandler::Bcf(h) => h.header(),
        }
    }

    /// Shallow view of the retained record.
    pub(crate) fn current_inner(&self) -> VarRecordRefInner<'_> {
        match self {
            VarHandler::Vcf(h) => VarRecordRefInner::Vcf(h.current_buf()),
            VarHandler::Bcf(h) => VarRecordRefInner::Bcf(h.current_buf()),
        }
    }

    /// Classify the retained record against `region` using the cheap probe
    /// fields (chrom, pos, reference length) only.
    pub(crate) fn probe_verdict(&self, region: &GenomicRegion) -> RegionVerdict {
        let header = self.header();
        let (chrom, pos, ref_len) = match self {
            VarHandler::Vcf(h) => {
                let buf = h.current_buf();
                (buf.chrom(), buf.pos(), buf.ref_allele().len())
            }
            VarHandler::Bcf(h) => {
                let buf = h.current_buf();
                (buf.chrom(header), buf.pos(), buf.ref_allele().len())
            }
        };
        let (beg, end) = probe_interval(pos, ref_len);
        classify(chrom, beg, end, region, |name| header.contig_rank(name))
    }
}
