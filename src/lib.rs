//! seqvar: streaming readers for genomic sequence and variant files
//!
//! # Overview
//!
//! seqvar reads FASTA, FASTQ, VCF and BCF files (plain, gzip- or
//! BGZF-compressed) and presents them as a lazy, single-pass sequence of
//! typed records. Variant readers can restrict iteration to a genomic
//! region, seeking via a tabix index when one is available.
//!
//! ## Quick start
//!
//! ```no_run
//! use seqvar::SeqReader;
//!
//! # fn main() -> seqvar::Result<()> {
//! let mut reader = SeqReader::from_path("reads.fastq.gz")?;
//! for record in reader.records() {
//!     let record = record?;
//!     // process one record at a time
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Region filtering
//!
//! ```no_run
//! use seqvar::{GenomicRegion, VarReader, VarReaderOptions};
//!
//! # fn main() -> seqvar::Result<()> {
//! let options = VarReaderOptions {
//!     region: Some(GenomicRegion::new("20", 17000, 1230300)),
//!     ..VarReaderOptions::default()
//! };
//! let mut reader = VarReader::from_path_with("calls.vcf.gz", options)?;
//! while reader.advance()? {
//!     if let Some(record) = reader.current() {
//!         println!("{}:{}", record.chrom(), record.pos());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Shallow and deep records
//!
//! `current()` hands out a *shallow* view borrowing the reader's internal
//! buffers; it is invalidated by the next advance (the borrow checker
//! enforces this). Call `to_record()` on a view, or use the `records()`
//! iterator, for *deep*, owned records that can be retained.
//!
//! ## Module organization
//!
//! - [`io`]: stream layer (raw sources, BGZF, compression sniffing)
//! - [`formats`]: format detection, per-format parsers, tabix index
//! - [`reader`]: the reader engine and its options
//! - [`types`], [`header`]: record and header data model

#![warn(missing_docs)]

pub mod alphabet;
pub mod error;
pub mod formats;
pub mod header;
pub mod io;
pub mod reader;
pub mod region;
pub mod types;

pub use alphabet::{SeqAlphabet, SymbolPolicy};
pub use error::{Error, Result};
pub use formats::index::TbiIndex;
pub use formats::{SeqFormat, VarFormat};
pub use header::VarHeader;
pub use io::{Chunk, VirtualOffset};
pub use reader::{
    SeqReader, SeqReaderOptions, SeqRecords, VarReader, VarReaderOptions, VarRecords,
};
pub use region::GenomicRegion;
pub use types::{
    GenotypeValue, InfoValue, SeqRecord, SeqRecordRef, VarRecord, VarRecordRef,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
