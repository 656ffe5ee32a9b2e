//! FASTA format handler
//!
//! # Format
//!
//! ```text
//! >sequence1 description
//! GATTACAGATTACA
//! TGCATGCA
//! >sequence2
//! ACGTACGT
//! ```
//!
//! A `>` line starts a record; following non-`>` lines concatenate into the
//! sequence. There is no quality field, so `qual` is always empty.

use crate::alphabet::decode_seq_into;
use crate::error::{Error, Result};
use crate::formats::read_line_into;
use crate::io::stream::ByteStream;
use crate::reader::SeqReaderOptions;
use crate::types::SeqRecordRef;

const FORMAT: &str = "FASTA";

/// Streaming FASTA parser holding the current record in reused buffers.
pub(crate) struct FastaHandler {
    stream: ByteStream,
    opts: SeqReaderOptions,
    /// Reused line buffer
    line: Vec<u8>,
    /// Header line of the next record, read while scanning sequence lines
    lookahead: Option<Vec<u8>>,
    id: String,
    seq: Vec<u8>,
    record_no: u64,
}

impl FastaHandler {
    pub(crate) fn new(stream: ByteStream, opts: SeqReaderOptions) -> Self {
        FastaHandler {
            stream,
            opts,
            line: Vec::with_capacity(256),
            lookahead: None,
            id: String::new(),
            seq: Vec::new(),
            record_no: 0,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    pub(crate) fn reset_stream(&mut self) {
        self.lookahead = None;
        self.line.clear();
    }

    /// Shallow view of the retained record.
    pub(crate) fn current(&self) -> SeqRecordRef<'_> {
        SeqRecordRef {
            id: &self.id,
            seq: &self.seq,
            qual: &[],
        }
    }

    /// Parse the next record into the handler buffers. `false` on clean EOF.
    pub(crate) fn advance_record(&mut self) -> Result<bool> {
        // header line: either the lookahead from the previous record or the
        // next non-empty line
        let header_line = loop {
            if let Some(peeked) = self.lookahead.take() {
                break peeked;
            }
            if !read_line_into(&mut self.stream, &mut self.line, FORMAT)? {
                return Ok(false);
            }
            if !self.line.is_empty() {
                break std::mem::take(&mut self.line);
            }
        };

        if header_line.first() != Some(&b'>') {
            return Err(Error::format_at(
                FORMAT,
                self.record_no + 1,
                format!(
                    "expected '>' at start of header, got {:?}",
                    header_line.first().map(|&b| b as char).unwrap_or(' ')
                ),
            ));
        }
        self.record_no += 1;

        self.set_id(&header_line[1..])?;

        // sequence lines until the next header or EOF
        self.seq.clear();
        loop {
            if !read_line_into(&mut self.stream, &mut self.line, FORMAT)? {
                break;
            }
            if self.line.is_empty() {
                continue;
            }
            if self.line[0] == b'>' {
                self.lookahead = Some(std::mem::take(&mut self.line));
                break;
            }
            decode_seq_into(
                &mut self.seq,
                &self.line,
                self.opts.alphabet,
                self.opts.on_unknown_symbol,
                FORMAT,
            )
            .map_err(|e| at_record(e, self.record_no))?;
        }

        if self.seq.is_empty() {
            return Err(Error::format_at(FORMAT, self.record_no, "record has no sequence"));
        }
        Ok(true)
    }

    fn set_id(&mut self, raw: &[u8]) -> Result<()> {
        let raw = if self.opts.truncate_ids_at_first_whitespace {
            raw.split(|b| b.is_ascii_whitespace()).next().unwrap_or(b"")
        } else {
            raw
        };
        let id = std::str::from_utf8(raw).map_err(|_| {
            Error::format_at(FORMAT, self.record_no, "record id is not valid UTF-8")
        })?;
        self.id.clear();
        self.id.push_str(id);
        Ok(())
    }
}

fn at_record(e: Error, record_no: u64) -> Error {
    match e {
        Error::Format { format, msg, .. } => Error::format_at(format, record_no, msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::{SeqAlphabet, SymbolPolicy};
    use crate::io::source::RawSource;
    use std::io::Cursor;

    fn handler(data: &[u8], opts: SeqReaderOptions) -> FastaHandler {
        let source = RawSource::from_stream(Box::new(Cursor::new(data.to_vec())));
        let stream = ByteStream::from_source(source, None).unwrap();
        FastaHandler::new(stream, opts)
    }

    #[test]
    fn test_parse_single_record() {
        let mut h = handler(b">seq1\nGATTACA\n", SeqReaderOptions::default());
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().id(), "seq1");
        assert_eq!(h.current().seq(), b"GATTACA");
        assert!(h.current().qual().is_empty());
        assert!(!h.advance_record().unwrap());
    }

    #[test]
    fn test_parse_multiline_sequence() {
        let mut h = handler(b">seq1\nGATT\nACA\n>seq2\nACGT\n", SeqReaderOptions::default());
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().seq(), b"GATTACA");
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().id(), "seq2");
        assert_eq!(h.current().seq(), b"ACGT");
        assert!(!h.advance_record().unwrap());
    }

    #[test]
    fn test_id_keeps_description_by_default() {
        let mut h = handler(b">seq1 some description\nACGT\n", SeqReaderOptions::default());
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().id(), "seq1 some description");
    }

    #[test]
    fn test_truncate_ids_option() {
        let opts = SeqReaderOptions {
            truncate_ids_at_first_whitespace: true,
            ..SeqReaderOptions::default()
        };
        let mut h = handler(b">seq1 some description\nACGT\n", opts);
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().id(), "seq1");
    }

    #[test]
    fn test_lowercase_and_unknown_symbols() {
        let opts = SeqReaderOptions {
            on_unknown_symbol: SymbolPolicy::Replace,
            ..SeqReaderOptions::default()
        };
        let mut h = handler(b">s\nacg?\n", opts);
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().seq(), b"ACGN");

        let mut h = handler(b">s\nacg?\n", SeqReaderOptions::default());
        assert!(matches!(
            h.advance_record().unwrap_err(),
            Error::Format { format: "FASTA", .. }
        ));
    }

    #[test]
    fn test_aa27_alphabet() {
        let opts = SeqReaderOptions {
            alphabet: SeqAlphabet::Aa27,
            ..SeqReaderOptions::default()
        };
        let mut h = handler(b">p\nMKWVTF*\n", opts);
        assert!(h.advance_record().unwrap());
        assert_eq!(h.current().seq(), b"MKWVTF*");
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let mut h = handler(b"GATTACA\n", SeqReaderOptions::default());
        assert!(matches!(
            h.advance_record().unwrap_err(),
            Error::Format { format: "FASTA", .. }
        ));
    }

    #[test]
    fn test_empty_sequence_is_an_error() {
        let mut h = handler(b">seq1\n>seq2\nACGT\n", SeqReaderOptions::default());
        assert!(h.advance_record().is_err());
    }
}
