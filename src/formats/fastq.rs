//! FASTQ format handler
//!
//! # Format
//!
//! Four lines per record:
//!
//! ```text
//! @read1
//! GATTACA
//! +
//! IIIIIII
//! ```
//!
//! The separator line may repeat the id. Sequence and quality must have the
//! same length.

use crate::alphabet::{decode_qual_into, decode_seq_into};
use crate::error::{Error, Result};
use crate::formats::read_line_into;
use crate::io::stream::ByteStream;
use crate::reader::SeqReaderOptions;
use crate::types::SeqRecordRef;

const FORMAT: &str = "FASTQ";

/// Streaming FASTQ parser holding the current record in reused buffers.
pub(crate) struct FastqHandler {
    stream: ByteStream,
    opts: SeqReaderOptions,
    line: Vec<u8>,
    id: String,
    seq: Vec<u8>,
    qual: Vec<u8>,
    record_no: u64,
}

impl FastqHandler {
    pub(crate) fn new(stream: ByteStream, opts: SeqReaderOptions) -> Self {
        FastqHandler {
            stream,
            opts,
            line: Vec::with_capacity(256),
            id: String::new(),
            seq: Vec::new(),
            qual: Vec::new(),
            record_no: 0,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    pub(crate) fn reset_stream(&mut self) {
        self.line.clear();
    }

    /// Shallow view of the retained record.
    pub(crate) fn current(&self) -> SeqRecordRef<'_> {
        SeqRecordRef {
            id: &self.id,
            seq: &self.seq,
            qual: &self.qual,
        }
    }

    /// Parse the next four-line record into the handler buffers. `false` on
    /// clean EOF.
    pub(crate) fn advance_record(&mut self) -> Result<bool> {
        // line 1: @id
        if !read_line_into(&mut self.stream, &mut self.line, FORMAT)? {
            return Ok(false);
        }
        self.record_no += 1;
        if self.line.first() != Some(&b'@') {
            return Err(Error::format_at(
                FORMAT,
                self.record_no,
                "expected '@' at start of header",
            ));
        }
        self.set_id()?;

        // line 2: sequence
        self.require_line("unexpected end of file after header")?;
        self.seq.clear();
        let line = std::mem::take(&mut self.line);
        decode_seq_into(
            &mut self.seq,
            &line,
            self.opts.alphabet,
            self.opts.on_unknown_symbol,
            FORMAT,
        )
        .map_err(|e| at_record(e, self.record_no))?;
        self.line = line;

        // line 3: separator
        self.require_line("unexpected end of file after sequence")?;
        if self.line.first() != Some(&b'+') {
            return Err(Error::format_at(
                FORMAT,
                self.record_no,
                "expected '+' at start of separator",
            ));
        }

        // line 4: quality
        self.require_line("unexpected end of file after separator")?;
        self.qual.clear();
        let line = std::mem::take(&mut self.line);
        decode_qual_into(&mut self.qual, &line, self.opts.on_unknown_symbol, FORMAT)
            .map_err(|e| at_record(e, self.record_no))?;
        self.line = line;

        if self.seq.len() != self.qual.len() {
            return Err(Error::format_at(
                FORMAT,
                self.record_no,
                format!(
                    "sequence length ({}) != quality length ({})",
                    self.seq.len(),
                    self.qual.len()
                ),
            ));
        }
        Ok(true)
    }

    fn require_line(&mut self, msg: &str) -> Result<()> {
        if !read_line_into(&mut self.stream, &mut self.line, FORMAT)? {
            return Err(Error::format_at(FORMAT, self.record_no, msg.to_string()));
        }
        Ok(())
    }

    fn set_id(&mut self) -> Result<()> {
        let raw = &self.line[1..];
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
