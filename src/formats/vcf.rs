//! VCF format handler
//!
//! # Format
//!
//! Tab-separated text, optionally BGZF-compressed. A `#`-prefixed header is
//! followed by body lines with eight fixed columns and optional FORMAT plus
//! per-sample columns:
//!
//! ```text
//! #CHROM POS     ID        REF ALT QUAL FILTER INFO          FORMAT GT ...
//! 20     14370   rs6054257 G   A   29   PASS   NS=3;DP=14    GT:GQ  0|0:48
//! ```
//!
//! The handler keeps the raw line of the current record plus its column
//! spans; scalar fields are parsed on demand and the typed materialisation
//! into a [`VarRecord`] is driven by the header's INFO/FORMAT definitions.

use std::ops::Range;

use memchr::memchr_iter;

use crate::error::{Error, Result};
use crate::formats::read_line_into;
use crate::header::{FieldType, VarHeader};
use crate::io::stream::ByteStream;
use crate::types::{GenotypeValue, InfoValue, VarRecord, MISSING_FLOAT, MISSING_INT};

const FORMAT: &str = "VCF";

/// The retained raw line of the current record, tab-split into spans.
pub(crate) struct VcfRecordBuf {
    line: Vec<u8>,
    cols: Vec<Range<usize>>,
    pos: i64,
    record_no: u64,
}

impl VcfRecordBuf {
    fn new() -> Self {
        VcfRecordBuf {
            line: Vec::with_capacity(256),
            cols: Vec::with_capacity(12),
            pos: 0,
            record_no: 0,
        }
    }

    fn col(&self, i: usize) -> &[u8] {
        match self.cols.get(i) {
            Some(range) => &self.line[range.clone()],
            None => &[],
        }
    }

    // the whole line was checked to be UTF-8 when the record was read
    fn col_str(&self, i: usize) -> &str {
        std::str::from_utf8(self.col(i)).unwrap_or("")
    }

    pub(crate) fn chrom(&self) -> &str {
        self.col_str(0)
    }

    /// Position, 1-based
    pub(crate) fn pos(&self) -> i64 {
        self.pos
    }

    pub(crate) fn id(&self) -> &str {
        self.col_str(2)
    }

    pub(crate) fn ref_allele(&self) -> &[u8] {
        self.col(3)
    }

    pub(crate) fn alt(&self) -> Vec<&str> {
        let alt = self.col_str(4);
        if alt == "." || alt.is_empty() {
            Vec::new()
        } else {
            alt.split(',').collect()
        }
    }

    pub(crate) fn qual(&self) -> Option<f32> {
        self.parse_qual().ok().flatten()
    }

    fn parse_qual(&self) -> Result<Option<f32>> {
        let raw = self.col_str(5);
        if raw == "." || raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f32>().map(Some).map_err(|_| {
            Error::format_at(FORMAT, self.record_no, format!("invalid QUAL value {:?}", raw))
        })
    }

    pub(crate) fn filters(&self) -> Vec<&str> {
        let raw = self.col_str(6);
        if raw == "." || raw.is_empty() {
            Vec::new()
        } else {
            raw.split(';').collect()
        }
    }

    /// Fully parse the retained line into `rec`, reusing its allocations.
    pub(crate) fn materialize_into(&self, header: &VarHeader, rec: &mut VarRecord) -> Result<()> {
        rec.clear();
        rec.chrom.push_str(self.chrom());
        rec.pos = self.pos;
        rec.id.push_str(self.id());
        rec.ref_allele.extend_from_slice(self.ref_allele());
        rec.alt.extend(self.alt().into_iter().map(String::from));
        rec.qual = self.parse_qual()?;
        rec.filter.extend(self.filters().into_iter().map(String::from));

        // INFO
        let info = self.col_str(7);
        if info != "." && !info.is_empty() {
            for item in info.split(';') {
                if item.is_empty() {
                    continue;
                }
                let (key, value) = match item.split_once('=') {
                    None => (item, InfoValue::Flag),
                    Some((key, raw)) => (key, self.parse_info_value(key, raw, header)?),
                };
                rec.info.push((key.to_string(), value));
            }
        }

        // genotypes, grouped by FORMAT field
        if self.cols.len() > 9 {
            let keys: Vec<&str> = self.col_str(8).split(':').collect();
            for (field_idx, key) in keys.iter().enumerate() {
                let mut values = Vec::new();
                for sample_col in 9..self.cols.len() {
                    // samples may drop trailing fields
                    match self.col_str(sample_col).split(':').nth(field_idx) {
                        Some(raw) => values.push(self.parse_genotype_value(key, raw, header)?),
                        None => continue,
                    }
                }
                rec.genotypes.push((key.to_string(), values));
            }
        }
        Ok(())
    }

    fn parse_info_value(&self, key: &str, raw: &str, header: &VarHeader) -> Result<InfoValue> {
        if raw == "." {
            return Ok(InfoValue::Missing);
        }
        let def = header.info_def(key);
        let (ty, vector) = match def {
            Some(def) => (def.ty, def.number.is_vector() || raw.contains(',')),
            None => return Ok(infer_info_value(raw)),
        };
        let value = match (ty, vector) {
            (FieldType::Flag, _) => InfoValue::Flag,
            (FieldType::Integer, false) => InfoValue::Integer(self.parse_int(key, raw)?),
            (FieldType::Integer, true) => InfoValue::IntegerVec(
                raw.split(',')
                    .map(|v| if v == "." { Ok(MISSING_INT) } else { self.parse_int(key, v) })
                    .collect::<Result<_>>()?,
            ),
            (FieldType::Float, false) => InfoValue::Float(self.parse_float(key, raw)?),
            (FieldType::Float, true) => InfoValue::FloatVec(
                raw.split(',')
                    .map(|v| if v == "." { Ok(MISSING_FLOAT) } else { self.parse_float(key, v) })
                    .collect::<Result<_>>()?,
            ),
            (FieldType::String | FieldType::Character, false) => {
                InfoValue::String(raw.to_string())
            }
            (FieldType::String | FieldType::Character, true) => {
                InfoValue::StringVec(raw.split(',').map(String::from).collect())
            }
        };
        Ok(value)
    }

    fn parse_genotype_value(
        &self,
        key: &str,
        raw: &str,
        header: &VarHeader,
    ) -> Result<GenotypeValue> {
        if raw == "." {
            return Ok(GenotypeValue::Missing);
        }
        // GT stays in its string notation regardless of header typing
        if key == "GT" {
            return Ok(GenotypeValue::String(raw.to_string()));
        }
        let def = header.format_def(key);
        let (ty, vector) = match def {
            Some(def) => (def.ty, def.number.is_vector() || raw.contains(',')),
            None => (FieldType::String, raw.contains(',')),
        };
        let value = match (ty, vector) {
            (FieldType::Integer, false) => GenotypeValue::Integer(self.parse_int(key, raw)?),
            (FieldType::Integer, true) => GenotypeValue::IntegerVec(
                raw.split(',')
                    .map(|v| if v == "." { Ok(MISSING_INT) } else { self.parse_int(key, v) })
                    .collect::<Result<_>>()?,
            ),
            (FieldType::Float, false) => GenotypeValue::Float(self.parse_float(key, raw)?),
            (FieldType::Float, true) => GenotypeValue::FloatVec(
                raw.split(',')
                    .map(|v| if v == "." { Ok(MISSING_FLOAT) } else { self.parse_float(key, v) })
                    .collect::<Result<_>>()?,
            ),
            (_, false) => GenotypeValue::String(raw.to_string()),
            (_, true) => GenotypeValue::StringVec(raw.split(',').map(String::from).collect()),
        };
        Ok(value)
    }

    fn parse_int(&self, key: &str, raw: &str) -> Result<i64> {
        raw.parse::<i64>().map_err(|_| {
            Error::format_at(
                FORMAT,
                self.record_no,
                format!("invalid Integer value {:?} for field {}", raw, key),
            )
        })
    }

    fn parse_float(&self, key: &str, raw: &str) -> Result<f32> {
        raw.parse::<f32>().map_err(|_| {
            Error::format_at(
                FORMAT,
                self.record_no,
                format!("invalid Float value {:?} for field {}", raw, key),
            )
        })
    }
}

/// Best-effort typing for INFO keys the header does not define.
fn infer_info_value(raw: &str) -> InfoValue {
    if raw.contains(',') {
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.iter().all(|p| p.parse::<i64>().is_ok()) {
            return InfoValue::IntegerVec(parts.iter().map(|p| p.parse().unwrap_or(0)).collect());
        }
        if parts.iter().all(|p| p.parse::<f32>().is_ok()) {
            return InfoValue::FloatVec(parts.iter().map(|p| p.parse().unwrap_or(0.0)).collect());
        }
        return InfoValue::StringVec(parts.iter().map(|p| p.to_string()).collect());
    }
    if let Ok(v) = raw.parse::<i64>() {
        InfoValue::Integer(v)
    } else if let Ok(v) = raw.parse::<f32>() {
        InfoValue::Float(v)
    } else {
        InfoValue::String(raw.to_string())
    }
}

/// Streaming VCF parser.
pub(crate) struct VcfHandler {
    stream: ByteStream,
    header: VarHeader,
    buf: VcfRecordBuf,
}

impl VcfHandler {
    /// Read the `#` header block and leave the stream at the first record.
    pub(crate) fn new(mut stream: ByteStream) -> Result<Self> {
        use std::io::BufRead;

        let mut text = String::new();
        let mut line: Vec<u8> = Vec::with_capacity(256);
        loop {
            let head = stream.fill_buf().map_err(|e| Error::from_read(e, FORMAT))?;
            if head.first() != Some(&b'#') {
                break;
            }
            read_line_into(&mut stream, &mut line, FORMAT)?;
            let as_str = std::str::from_utf8(&line)
                .map_err(|_| Error::format(FORMAT, "header line is not valid UTF-8"))?;
            text.push_str(as_str);
            text.push('\n');
            // the single-# column line terminates the header
            if !line.starts_with(b"##") {
                break;
            }
        }
        let header = VarHeader::from_text(&text, FORMAT)?;
        Ok(VcfHandler {
            stream,
            header,
            buf: VcfRecordBuf::new(),
        })
    }

    pub(crate) fn header(&self) -> &VarHeader {
        &self.header
    }

    pub(crate) fn current_buf(&self) -> &VcfRecordBuf {
        &self.buf
    }

    pub(crate) fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    pub(crate) fn reset_stream(&mut self) {
        self.buf.line.clear();
        self.buf.cols.clear();
    }

    /// Read the next body line and split it into column spans. The typed
    /// field parse is deferred until the record is materialised.
    pub(crate) fn advance_record(&mut self) -> Result<bool> {
        loop {
            if !read_line_into(&mut self.stream, &mut self.buf.line, FORMAT)? {
                return Ok(false);
            }
            if !self.buf.line.is_empty() {
                break;
            }
        }
        self.buf.record_no += 1;

        std::str::from_utf8(&self.buf.line).map_err(|_| {
            Error::format_at(FORMAT, self.buf.record_no, "record line is not valid UTF-8")
        })?;

        self.buf.cols.clear();
        let mut start = 0;
        for tab in memchr_iter(b'\t', &self.buf.line) {
            self.buf.cols.push(start..tab);
            start = tab + 1;
        }
        self.buf.cols.push(start..self.buf.line.len());

        if self.buf.cols.len() < 8 {
            return Err(Error::format_at(
                FORMAT,
                self.buf.record_no,
                format!("expected at least 8 columns, got {}", self.buf.cols.len()),
            ));
        }

        let pos_raw = self.buf.col_str(1);
        self.buf.pos = pos_raw.parse::<i64>().map_err(|_| {
            Error::format_at(
                FORMAT,
                self.buf.record_no,
                format!("invalid POS value {:?}", pos_raw),
            )
        })?;
        Ok(true)
    }
}
