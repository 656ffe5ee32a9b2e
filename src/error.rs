//! Error types for seqvar

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for seqvar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in seqvar
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source cannot be opened, the format is unknown or ambiguous, or a
    /// required index is missing
    #[error("Could not open {source_name}: {msg}")]
    FileOpen {
        /// Path or stream description
        source_name: String,
        /// Error message
        msg: String,
    },

    /// File extension is not in the registered set for the selected reader
    /// family
    #[error("Unhandled file extension {extension:?} for {}", .path.display())]
    UnhandledExtension {
        /// Offending path
        path: PathBuf,
        /// The extension that was not recognised
        extension: String,
    },

    /// Malformed record, CRC failure, unexpected EOF mid-record, or an
    /// illegal alphabet symbol under the strict policy
    #[error("Invalid {format} format{}: {msg}", fmt_record_no(.record))]
    Format {
        /// Name of the format being parsed
        format: &'static str,
        /// Record number where the error occurred, if known (1-based)
        record: Option<u64>,
        /// Error message
        msg: String,
    },

    /// Operation not supported by the source, e.g. seeking a non-seekable
    /// stream
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

fn fmt_record_no(record: &Option<u64>) -> String {
    match record {
        Some(n) => format!(" at record {}", n),
        None => String::new(),
    }
}

impl Error {
    /// Build a `FileOpen` error for a path-like source.
    pub(crate) fn file_open(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::FileOpen {
            source_name: source_name.into(),
            msg: msg.into(),
        }
    }

    /// Build a `Format` error without a record number.
    pub(crate) fn format(format: &'static str, msg: impl Into<String>) -> Self {
        Error::Format {
            format,
            record: None,
            msg: msg.into(),
        }
    }

    /// Build a `Format` error tagged with a record number.
    pub(crate) fn format_at(format: &'static str, record: u64, msg: impl Into<String>) -> Self {
        Error::Format {
            format,
            record: Some(record),
            msg: msg.into(),
        }
    }

    /// Reinterpret an I/O error raised while parsing `format` data.
    ///
    /// Decompression failures (CRC mismatch, truncated BGZF block) surface
    /// from the stream layer as `InvalidData`; those are format errors from
    /// the caller's point of view, everything else stays an I/O error.
    pub(crate) fn from_read(e: std::io::Error, format: &'static str) -> Self {
        if e.kind() == std::io::ErrorKind::InvalidData {
            Error::Format {
                format,
                record: None,
                msg: e.to_string(),
            }
        } else {
            Error::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_message_names_format() {
        let e = Error::format_at("VCF", 3, "expected 8 columns, got 5");
        let msg = e.to_string();
        assert!(msg.contains("VCF"));
        assert!(msg.contains("record 3"));
    }

    #[test]
    fn test_invalid_data_becomes_format_error() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt deflate stream");
        assert!(matches!(
            Error::from_read(io, "bgzf"),
            Error::Format { format: "bgzf", .. }
        ));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(Error::from_read(io, "bgzf"), Error::Io(_)));
    }
}
