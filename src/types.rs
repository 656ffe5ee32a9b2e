//! Record types produced by the readers
//!
//! Each reader family has a fixed schema. Records come in two
//! representations under the same surface:
//!
//! - **Owned** ([`SeqRecord`], [`VarRecord`]): contiguous owned storage,
//!   independent lifetime, safe to retain.
//! - **Shallow** ([`SeqRecordRef`], [`VarRecordRef`]): views borrowing the
//!   format handler's internal buffers, valid only until the next advance
//!   of the reader. The borrow checker enforces the invalidation contract.

use crate::formats::bcf::BcfRecordBuf;
use crate::formats::vcf::VcfRecordBuf;
use crate::header::VarHeader;
use crate::Result;

// ----------------------------------------------------------------------------
// sequence family
// ----------------------------------------------------------------------------

/// An owned sequence record (FASTA / FASTQ)
///
/// Fields missing from a format are empty, not absent: FASTA records have an
/// empty `qual`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeqRecord {
    /// Sequence identifier (without the `>` / `@` prefix)
    pub id: String,
    /// Sequence symbols, canonicalised through the configured alphabet
    pub seq: Vec<u8>,
    /// Phred+33 quality scores; empty for FASTA
    pub qual: Vec<u8>,
}

impl SeqRecord {
    /// Create a new sequence record
    pub fn new(id: String, seq: Vec<u8>, qual: Vec<u8>) -> Self {
        Self { id, seq, qual }
    }
}

/// A shallow sequence record borrowing the reader's internal buffers
#[derive(Debug, Clone, Copy)]
pub struct SeqRecordRef<'a> {
    pub(crate) id: &'a str,
    pub(crate) seq: &'a [u8],
    pub(crate) qual: &'a [u8],
}

impl<'a> SeqRecordRef<'a> {
    /// Sequence identifier
    pub fn id(&self) -> &'a str {
        self.id
    }

    /// Sequence symbols
    pub fn seq(&self) -> &'a [u8] {
        self.seq
    }

    /// Quality scores; empty for FASTA
    pub fn qual(&self) -> &'a [u8] {
        self.qual
    }

    /// Copy this view into an owned record
    pub fn to_record(&self) -> SeqRecord {
        SeqRecord {
            id: self.id.to_string(),
            seq: self.seq.to_vec(),
            qual: self.qual.to_vec(),
        }
    }
}

// ----------------------------------------------------------------------------
// variant family
// ----------------------------------------------------------------------------

/// In-band marker for missing integers inside typed vectors.
///
/// VCF writes missing vector elements as `.`; BCF uses a reserved bit
/// pattern per integer width. Both decode to this value.
pub const MISSING_INT: i64 = i64::MIN;

/// In-band marker for missing floats inside typed vectors (`f32::NAN`).
pub const MISSING_FLOAT: f32 = f32::NAN;

/// A typed INFO value, shaped by the header's `Number` and `Type` fields
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    /// The `.` placeholder standing in for a whole value
    Missing,
    /// Presence-only flag (`Number=0,Type=Flag`)
    Flag,
    /// Single integer
    Integer(i64),
    /// Single float
    Float(f32),
    /// Single string (also used for `Type=Character`)
    String(String),
    /// Integer vector (`Number` of `A`, `R`, `G`, `.` or > 1)
    IntegerVec(Vec<i64>),
    /// Float vector
    FloatVec(Vec<f32>),
    /// String vector
    StringVec(Vec<String>),
}

/// A typed per-sample genotype value
#[derive(Debug, Clone, PartialEq)]
pub enum GenotypeValue {
    /// The `.` placeholder
    Missing,
    /// Single integer
    Integer(i64),
    /// Single float
    Float(f32),
    /// Single string; `GT` is rendered in VCF notation (`0|1`, `./.`)
    String(String),
    /// Integer vector
    IntegerVec(Vec<i64>),
    /// Float vector
    FloatVec(Vec<f32>),
    /// String vector
    StringVec(Vec<String>),
}

/// An owned variant record (VCF / BCF)
///
/// Positions are 1-based as in VCF text. Genotypes are grouped **by field**
/// (as in BCF), not by sample: each entry pairs a FORMAT key with one value
/// per sample. Samples that omit trailing fields shorten the vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VarRecord {
    /// Chromosome / contig name
    pub chrom: String,
    /// Position (1-based)
    pub pos: i64,
    /// Record identifier; `.` if none
    pub id: String,
    /// Reference allele bytes
    pub ref_allele: Vec<u8>,
    /// Alternative alleles; empty if the ALT column is `.`
    pub alt: Vec<String>,
    /// Quality; `None` for `.` / the BCF missing sentinel
    pub qual: Option<f32>,
    /// Filter names; empty if the FILTER column is `.`
    pub filter: Vec<String>,
    /// INFO entries in file order
    pub info: Vec<(String, InfoValue)>,
    /// Genotypes grouped by FORMAT field
    pub genotypes: Vec<(String, Vec<GenotypeValue>)>,
}

impl VarRecord {
    pub(crate) fn clear(&mut self) {
        self.chrom.clear();
        self.pos = 0;
        self.id.clear();
        self.ref_allele.clear();
        self.alt.clear();
        self.qual = None;
        self.filter.clear();
        self.info.clear();
        self.genotypes.clear();
    }

    /// Look up an INFO value by key
    pub fn info(&self, key: &str) -> Option<&InfoValue> {
        self.info.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up the per-sample values of a FORMAT field
    pub fn genotype(&self, key: &str) -> Option<&[GenotypeValue]> {
        self.genotypes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }
}

/// A shallow variant record borrowing the format handler's buffers
///
/// Scalar fields are parsed on demand from the retained raw line (VCF) or
/// binary frame (BCF); [`VarRecordRef::to_record`] performs the full typed
/// materialisation.
#[derive(Clone, Copy)]
pub struct VarRecordRef<'a> {
    pub(crate) inner: VarRecordRefInner<'a>,
    pub(crate) header: &'a VarHeader,
}

#[derive(Clone, Copy)]
pub(crate) enum VarRecordRefInner<'a> {
    Vcf(&'a VcfRecordBuf),
    Bcf(&'a BcfRecordBuf),
}

impl<'a> VarRecordRef<'a> {
    /// Chromosome / contig name
    pub fn chrom(&self) -> &'a str {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.chrom(),
            VarRecordRefInner::Bcf(buf) => buf.chrom(self.header),
        }
    }

    /// Position (1-based)
    pub fn pos(&self) -> i64 {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.pos(),
            VarRecordRefInner::Bcf(buf) => buf.pos(),
        }
    }

    /// Record identifier; `.` if none
    pub fn id(&self) -> &'a str {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.id(),
            VarRecordRefInner::Bcf(buf) => buf.id(),
        }
    }

    /// Reference allele bytes
    pub fn ref_allele(&self) -> &'a [u8] {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.ref_allele(),
            VarRecordRefInner::Bcf(buf) => buf.ref_allele(),
        }
    }

    /// Alternative alleles
    pub fn alt(&self) -> Vec<&'a str> {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.alt(),
            VarRecordRefInner::Bcf(buf) => buf.alt(),
        }
    }

    /// Quality; `None` if missing
    pub fn qual(&self) -> Option<f32> {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.qual(),
            VarRecordRefInner::Bcf(buf) => buf.qual(),
        }
    }

    /// Filter names
    pub fn filters(&self) -> Vec<&'a str> {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.filters(),
            VarRecordRefInner::Bcf(buf) => buf.filters(self.header),
        }
    }

    /// Fully materialise this record into `rec`, reusing its allocations.
    pub fn read_into(&self, rec: &mut VarRecord) -> Result<()> {
        match self.inner {
            VarRecordRefInner::Vcf(buf) => buf.materialize_into(self.header, rec),
            VarRecordRefInner::Bcf(buf) => buf.materialize_into(self.header, rec),
        }
    }

    /// Fully materialise this record into a fresh owned [`VarRecord`].
    pub fn to_record(&self) -> Result<VarRecord> {
        let mut rec = VarRecord::default();
        self.read_into(&mut rec)?;
        Ok(rec)
    }
}

impl std::fmt::Debug for VarRecordRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarRecordRef")
            .field("chrom", &self.chrom())
            .field("pos", &self.pos())
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}
