//! Index formats for region queries
//!
//! Tabix indexes map a genomic interval to the BGZF chunks that may contain
//! overlapping records, enabling the reader engine to seek close to the
//! first candidate record instead of scanning the whole file.

pub mod tbi;

pub use tbi::TbiIndex;
