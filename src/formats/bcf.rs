//! BCF format handler
//!
//! # Format
//!
//! Little-endian binary framed inside BGZF. After the magic `BCF\x02\x02`
//! and a length-prefixed text header (same dialect as VCF), each record is
//! two length-prefixed blocks:
//!
//! ```text
//! l_shared  u32      l_indiv  u32
//! shared:   chrom_idx i32, pos i32 (0-based), rlen i32, qual f32,
//!           n_info u16, n_allele u16, n_sample u24, n_fmt u8,
//!           id (typed string), alleles (typed strings),
//!           filters (typed ints), n_info x (typed key, typed value)
//! indiv:    n_fmt x (typed key, type descriptor, n_sample x values)
//! ```
//!
//! Values are self-describing: a descriptor byte packs the scalar kind in
//! the low nibble and the count in the high nibble, with count 15 escaping
//! to a following typed integer. FILTER/INFO/FORMAT keys index the header's
//! shared string dictionary; `chrom_idx` indexes the contig dictionary.

use std::io::Read;

use crate::error::{Error, Result};
use crate::header::{FieldDef, FieldType, VarHeader};
use crate::io::stream::ByteStream;
use crate::types::{GenotypeValue, InfoValue, VarRecord, MISSING_FLOAT, MISSING_INT};

const FORMAT: &str = "BCF";

/// Shared-block byte offsets of the fixed fields
const CHROM_OFFSET: usize = 0;
const POS_OFFSET: usize = 4;
const QUAL_OFFSET: usize = 12;
const N_INFO_OFFSET: usize = 16;
const N_ALLELE_OFFSET: usize = 18;
const N_SAMPLE_OFFSET: usize = 20;
const N_FMT_OFFSET: usize = 23;
/// First byte after the fixed fields (start of the typed id string)
const ID_OFFSET: usize = 24;

/// Bit pattern of a missing BCF float
const FLOAT_MISSING: u32 = 0x7F80_0001;
/// Bit pattern of the float end-of-vector marker
const FLOAT_EOV: u32 = 0x7F80_0002;

/// Scalar kinds of the typed-value encoding
mod kind {
    pub const MISSING: u8 = 0;
    pub const INT8: u8 = 1;
    pub const INT16: u8 = 2;
    pub const INT32: u8 = 3;
    pub const FLOAT: u8 = 5;
    pub const CHAR: u8 = 7;
}

/// The retained binary frame of the current record.
pub(crate) struct BcfRecordBuf {
    shared: Vec<u8>,
    indiv: Vec<u8>,
    record_no: u64,
}

impl BcfRecordBuf {
    fn new() -> Self {
        BcfRecordBuf {
            shared: Vec::new(),
            indiv: Vec::new(),
            record_no: 0,
        }
    }

    fn fixed_i32(&self, offset: usize) -> i32 {
        let mut b = [0u8; 4];
        if let Some(src) = self.shared.get(offset..offset + 4) {
            b.copy_from_slice(src);
        }
        i32::from_le_bytes(b)
    }

    fn fixed_u16(&self, offset: usize) -> u16 {
        let mut b = [0u8; 2];
        if let Some(src) = self.shared.get(offset..offset + 2) {
            b.copy_from_slice(src);
        }
        u16::from_le_bytes(b)
    }

    fn n_sample(&self) -> usize {
        let mut b = [0u8; 4];
        if let Some(src) = self.shared.get(N_SAMPLE_OFFSET..N_SAMPLE_OFFSET + 3) {
            b[..3].copy_from_slice(src);
        }
        u32::from_le_bytes(b) as usize
    }

    fn n_fmt(&self) -> usize {
        self.shared.get(N_FMT_OFFSET).copied().unwrap_or(0) as usize
    }

    pub(crate) fn chrom<'a>(&'a self, header: &'a VarHeader) -> &'a str {
        header
            .contig_by_index(self.fixed_i32(CHROM_OFFSET) as usize)
            .map(|c| c.name.as_str())
            .unwrap_or("")
    }

    /// Position, 1-based (the on-disk value is 0-based)
    pub(crate) fn pos(&self) -> i64 {
        self.fixed_i32(POS_OFFSET) as i64 + 1
    }

    pub(crate) fn qual(&self) -> Option<f32> {
        let bits = self.fixed_i32(QUAL_OFFSET) as u32;
        if bits == FLOAT_MISSING {
            None
        } else {
            Some(f32::from_bits(bits))
        }
    }

    pub(crate) fn id(&self) -> &str {
        let mut cur = Cursor::new(&self.shared, self.record_no);
        cur.skip_to(ID_OFFSET);
        match cur.typed_string() {
            Ok(raw) if !raw.is_empty() => std::str::from_utf8(raw).unwrap_or("."),
            _ => ".",
        }
    }

    pub(crate) fn ref_allele(&self) -> &[u8] {
        self.nth_allele(0).unwrap_or(&[])
    }

    pub(crate) fn alt(&self) -> Vec<&str> {
        let n_allele = self.fixed_u16(N_ALLELE_OFFSET) as usize;
        (1..n_allele)
            .filter_map(|i| self.nth_allele(i))
            .map(|raw| std::str::from_utf8(raw).unwrap_or(""))
            .collect()
    }

    pub(crate) fn filters<'a>(&'a self, header: &'a VarHeader) -> Vec<&'a str> {
        let mut cur = match self.cursor_past_alleles() {
            Ok(cur) => cur,
            Err(_) => return Vec::new(),
        };
        match cur.typed_ints() {
            Ok(ids) => ids
                .iter()
                .filter_map(|&idx| header.dictionary_name(idx.max(0) as usize))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn nth_allele(&self, n: usize) -> Option<&[u8]> {
        let mut cur = Cursor::new(&self.shared, self.record_no);
        cur.skip_to(ID_OFFSET);
        cur.typed_string().ok()?;
        let mut allele = None;
        for _ in 0..=n {
            allele = cur.typed_string().ok();
            allele?;
        }
        allele
    }

    fn cursor_past_alleles(&self) -> Result<Cursor<'_>> {
        let n_allele = self.fixed_u16(N_ALLELE_OFFSET) as usize;
        let mut cur = Cursor::new(&self.shared, self.record_no);
        cur.skip_to(ID_OFFSET);
        cur.typed_string()?;
        for _ in 0..n_allele {
            cur.typed_string()?;
        }
        Ok(cur)
    }

    /// Fully decode the retained frame into `rec`, reusing its allocations.
    pub(crate) fn materialize_into(&self, header: &VarHeader, rec: &mut VarRecord) -> Result<()> {
        rec.clear();

        let chrom_idx = self.fixed_i32(CHROM_OFFSET);
        let contig = header.contig_by_index(chrom_idx.max(0) as usize).ok_or_else(|| {
            Error::format_at(
                FORMAT,
                self.record_no,
                format!("record references unknown contig index {}", chrom_idx),
            )
        })?;
        rec.chrom.push_str(&contig.name);
        rec.pos = self.pos();
        rec.qual = self.qual();

        let n_info = self.fixed_u16(N_INFO_OFFSET) as usize;
        let n_allele = self.fixed_u16(N_ALLELE_OFFSET) as usize;

        let mut cur = Cursor::new(&self.shared, self.record_no);
        cur.skip_to(ID_OFFSET);

        let id = cur.typed_string()?;
        if id.is_empty() {
            rec.id.push('.');
        } else {
            rec.id.push_str(utf8(id, self.record_no)?);
        }

        for i in 0..n_allele {
            let allele = cur.typed_string()?;
            if i == 0 {
                rec.ref_allele.extend_from_slice(allele);
            } else {
                rec.alt.push(utf8(allele, self.record_no)?.to_string());
            }
        }

        for idx in cur.typed_ints()? {
            let name = header.dictionary_name(idx.max(0) as usize).ok_or_else(|| {
                Error::format_at(
                    FORMAT,
                    self.record_no,
                    format!("record references unknown FILTER index {}", idx),
                )
            })?;
            rec.filter.push(name.to_string());
        }

        for _ in 0..n_info {
            let key_idx = cur.typed_scalar_int()?;
            let key = header.dictionary_name(key_idx.max(0) as usize).ok_or_else(|| {
                Error::format_at(
                    FORMAT,
                    self.record_no,
                    format!("record references unknown INFO index {}", key_idx),
                )
            })?;
            let value = cur.info_value(header.info_def(key))?;
            rec.info.push((key.to_string(), value));
        }

        self.decode_genotypes(header, rec)
    }

    fn decode_genotypes(&self, header: &VarHeader, rec: &mut VarRecord) -> Result<()> {
        let n_fmt = self.n_fmt();
        let n_sample = self.n_sample();
        let mut cur = Cursor::new(&self.indiv, self.record_no);

        for _ in 0..n_fmt {
            let key_idx = cur.typed_scalar_int()?;
            let key = header.dictionary_name(key_idx.max(0) as usize).ok_or_else(|| {
                Error::format_at(
                    FORMAT,
                    self.record_no,
                    format!("record references unknown FORMAT index {}", key_idx),
                )
            })?;
            let (value_kind, per_sample) = cur.type_descriptor()?;
            let def = header.format_def(key);

            let mut values = Vec::with_capacity(n_sample);
            for _ in 0..n_sample {
                values.push(cur.genotype_value(key, def, value_kind, per_sample)?);
            }
            rec.genotypes.push((key.to_string(), values));
        }
        Ok(())
    }
}

fn utf8(raw: &[u8], record_no: u64) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|_| Error::format_at(FORMAT, record_no, "string field is not valid UTF-8"))
}

/// Sequential decoder over one binary block.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    record_no: u64,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], record_no: u64) -> Self {
        Cursor {
            buf,
            pos: 0,
            record_no,
        }
    }

    fn skip_to(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    fn truncated(&self) -> Error {
        Error::format_at(FORMAT, self.record_no, "truncated record block")
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| self.truncated())?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Descriptor byte: low nibble scalar kind, high nibble count; count 15
    /// escapes to a following typed integer.
    fn type_descriptor(&mut self) -> Result<(u8, usize)> {
        let desc = self.u8()?;
        let kind = desc & 0x0F;
        let mut count = (desc >> 4) as usize;
        if count == 15 {
            count = self.typed_scalar_int()?.max(0) as usize;
        }
        Ok((kind, count))
    }

    fn int_of_kind(&mut self, kind: u8) -> Result<i64> {
        match kind {
            kind::INT8 => Ok(self.take(1)?[0] as i8 as i64),
            kind::INT16 => {
                let b = self.take(2)?;
                Ok(i16::from_le_bytes([b[0], b[1]]) as i64)
            }
            kind::INT32 => {
                let b = self.take(4)?;
                Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
            }
            other => Err(Error::format_at(
                FORMAT,
                self.record_no,
                format!("expected integer kind, got type {}", other),
            )),
        }
    }

    fn float(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A typed value that must be a single integer (dictionary keys, escape
    /// counts).
    fn typed_scalar_int(&mut self) -> Result<i64> {
        let (kind, count) = self.type_descriptor()?;
        if count != 1 {
            return Err(Error::format_at(
                FORMAT,
                self.record_no,
                format!("expected scalar integer, got count {}", count),
            ));
        }
        self.int_of_kind(kind)
    }

    /// A typed string (`char` kind); the missing value decodes to empty.
    fn typed_string(&mut self) -> Result<&'a [u8]> {
        let (kind, count) = self.type_descriptor()?;
        match kind {
            kind::CHAR => self.take(count),
            kind::MISSING if count == 0 => Ok(&[]),
            other => Err(Error::format_at(
                FORMAT,
                self.record_no,
                format!("expected string value, got type {}", other),
            )),
        }
    }

    /// A typed integer vector (FILTER ids); the missing value decodes to
    /// empty.
    fn typed_ints(&mut self) -> Result<Vec<i64>> {
        let (kind, count) = self.type_descriptor()?;
        if kind == kind::MISSING && count == 0 {
            return Ok(Vec::new());
        }
        (0..count).map(|_| self.int_of_kind(kind)).collect()
    }

    fn int_vector(&mut self, kind: u8, count: usize) -> Result<Vec<i64>> {
        let (missing, eov) = int_sentinels(kind);
        let mut out = Vec::with_capacity(count);
        let mut done = false;
        for _ in 0..count {
            let v = self.int_of_kind(kind)?;
            if v == eov {
                // remaining slots of this sample are padding
                done = true;
            }
            if !done {
                out.push(if v == missing { MISSING_INT } else { v });
            }
        }
        Ok(out)
    }

    fn float_vector(&mut self, count: usize) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(count);
        let mut done = false;
        for _ in 0..count {
            let v = self.float()?;
            if v.to_bits() == FLOAT_EOV {
                done = true;
            }
            if !done {
                out.push(if v.to_bits() == FLOAT_MISSING {
                    MISSING_FLOAT
                } else {
                    v
                });
            }
        }
        Ok(out)
    }

    /// Decode one INFO value, shaping it by the header definition when the
    /// key is known: declared-vector fields stay vectors even with a single
    /// element, matching the text reader.
    fn info_value(&mut self, def: Option<&FieldDef>) -> Result<InfoValue> {
        let (kind, count) = self.type_descriptor()?;
        if def.map(|d| d.ty) == Some(FieldType::Flag) {
            // flags carry an empty or single placeholder value
            match kind {
                kind::MISSING => {}
                _ => {
                    self.int_vector(kind, count)?;
                }
            }
            return Ok(InfoValue::Flag);
        }
        let scalar = count == 1 && !def.map(|d| d.number.is_vector()).unwrap_or(false);
        match kind {
            kind::MISSING => Ok(InfoValue::Missing),
            kind::INT8 | kind::INT16 | kind::INT32 => {
                let values = self.int_vector(kind, count)?;
                Ok(match (values.len(), scalar) {
                    (1, true) if values[0] == MISSING_INT => InfoValue::Missing,
                    (1, true) => InfoValue::Integer(values[0]),
                    _ => InfoValue::IntegerVec(values),
                })
            }
            kind::FLOAT => {
                let values = self.float_vector(count)?;
                Ok(match (values.len(), scalar) {
                    (1, true) if values[0].to_bits() == MISSING_FLOAT.to_bits() => {
                        InfoValue::Missing
                    }
                    (1, true) => InfoValue::Float(values[0]),
                    _ => InfoValue::FloatVec(values),
                })
            }
            kind::CHAR => {
                let raw = self.take(count)?;
                let s = utf8(raw, self.record_no)?;
                if s.contains(',') {
                    Ok(InfoValue::StringVec(s.split(',').map(String::from).collect()))
                } else {
                    Ok(InfoValue::String(s.to_string()))
                }
            }
            other => Err(Error::format_at(
                FORMAT,
                self.record_no,
                format!("unsupported value type {}", other),
            )),
        }
    }

    /// Decode one sample's value of a FORMAT field.
    fn genotype_value(
        &mut self,
        key: &str,
        def: Option<&FieldDef>,
        kind: u8,
        count: usize,
    ) -> Result<GenotypeValue> {
        if key == "GT" {
            let raw = (0..count)
                .map(|_| self.int_of_kind(kind))
                .collect::<Result<Vec<_>>>()?;
            return Ok(render_gt(&raw, kind));
        }
        let scalar = count == 1 && !def.map(|d| d.number.is_vector()).unwrap_or(false);
        match kind {
            kind::MISSING => Ok(GenotypeValue::Missing),
            kind::INT8 | kind::INT16 | kind::INT32 => {
                let values = self.int_vector(kind, count)?;
                Ok(match (values.len(), scalar) {
                    (0, _) => GenotypeValue::Missing,
                    (1, true) if values[0] == MISSING_INT => GenotypeValue::Missing,
                    (1, true) => GenotypeValue::Integer(values[0]),
                    _ => GenotypeValue::IntegerVec(values),
                })
            }
            kind::FLOAT => {
                let values = self.float_vector(count)?;
                Ok(match (values.len(), scalar) {
                    (0, _) => GenotypeValue::Missing,
                    (1, true) if values[0].to_bits() == MISSING_FLOAT.to_bits() => {
                        GenotypeValue::Missing
                    }
                    (1, true) => GenotypeValue::Float(values[0]),
                    _ => GenotypeValue::FloatVec(values),
                })
            }
            kind::CHAR => {
                let raw = self.take(count)?;
                let trimmed: &[u8] = match raw.iter().position(|&b| b == 0) {
                    Some(end) => &raw[..end],
                    None => raw,
                };
                Ok(GenotypeValue::String(utf8(trimmed, self.record_no)?.to_string()))
            }
            other => Err(Error::format_at(
                FORMAT,
                self.record_no,
                format!("unsupported genotype value type {}", other),
            )),
        }
    }
}

fn int_sentinels(kind: u8) -> (i64, i64) {
    match kind {
        kind::INT8 => (i8::MIN as i64, i8::MIN as i64 + 1),
        kind::INT16 => (i16::MIN as i64, i16::MIN as i64 + 1),
        _ => (i32::MIN as i64, i32::MIN as i64 + 1),
    }
}

/// Render the packed GT encoding into VCF notation: each value is
/// `(allele + 1) << 1 | phased`, zero meaning a missing allele.
fn render_gt(raw: &[i64], kind: u8) -> GenotypeValue {
    let (_, eov) = int_sentinels(kind);
    let mut out = String::new();
    for (i, &v) in raw.iter().enumerate() {
        if v == eov {
            break;
        }
        if i > 0 {
            out.push(if v & 1 == 1 { '|' } else { '/' });
        }
        let allele = (v >> 1) - 1;
        if allele < 0 {
            out.push('.');
        } else {
            out.push_str(&allele.to_string());
        }
    }
    if out.is_empty() {
        GenotypeValue::Missing
    } else {
        GenotypeValue::String(out)
    }
}

/// Streaming BCF parser.
pub(crate) struct BcfHandler {
    stream: ByteStream,
    header: VarHeader,
    buf: BcfRecordBuf,
}

impl std::fmt::Debug for BcfHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcfHandler").finish_non_exhaustive()
    }
}

impl BcfHandler {
    /// Verify the magic, parse the embedded text header, and leave the
    /// stream at the first record frame.
    pub(crate) fn new(mut stream: ByteStream) -> Result<Self> {
        let mut magic = [0u8; 5];
        stream
            .read_exact(&mut magic)
            .map_err(|e| Error::from_read(e, FORMAT))?;
        if &magic[..3] != b"BCF" || magic[3] != 2 {
            return Err(Error::format(
                FORMAT,
                format!("bad magic; expected BCF v2.x, got {:?}", &magic),
            ));
        }

        let mut len = [0u8; 4];
        stream
            .read_exact(&mut len)
            .map_err(|e| Error::from_read(e, FORMAT))?;
        let l_text = u32::from_le_bytes(len) as usize;

        let mut text = vec![0u8; l_text];
        stream
            .read_exact(&mut text)
            .map_err(|e| Error::from_read(e, FORMAT))?;
        while text.last() == Some(&0) {
            text.pop();
        }
        let text = String::from_utf8(text)
            .map_err(|_| Error::format(FORMAT, "header text is not valid UTF-8"))?;
        let header = VarHeader::from_text(&text, FORMAT)?;

        Ok(BcfHandler {
            stream,
            header,
            buf: BcfRecordBuf::new(),
        })
    }

    pub(crate) fn header(&self) -> &VarHeader {
        &self.header
    }

    pub(crate) fn current_buf(&self) -> &BcfRecordBuf {
        &self.buf
    }

    pub(crate) fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    pub(crate) fn reset_stream(&mut self) {
        self.buf.shared.clear();
        self.buf.indiv.clear();
    }

    /// Read the next record frame into the handler buffers. `false` on
    /// clean EOF (a frame boundary).
    pub(crate) fn advance_record(&mut self) -> Result<bool> {
        if self.stream.at_eof().map_err(|e| Error::from_read(e, FORMAT))? {
            return Ok(false);
        }

        let mut lengths = [0u8; 8];
        self.stream
            .read_exact(&mut lengths)
            .map_err(|e| truncated_frame(e, self.buf.record_no + 1))?;
        let l_shared = u32::from_le_bytes([lengths[0], lengths[1], lengths[2], lengths[3]]) as usize;
        let l_indiv = u32::from_le_bytes([lengths[4], lengths[5], lengths[6], lengths[7]]) as usize;

        self.buf.record_no += 1;
        if l_shared < ID_OFFSET {
            return Err(Error::format_at(
                FORMAT,
                self.buf.record_no,
                format!("shared block of {} bytes is too small", l_shared),
            ));
        }

        self.buf.shared.resize(l_shared, 0);
        self.stream
            .read_exact(&mut self.buf.shared)
            .map_err(|e| truncated_frame(e, self.buf.record_no))?;
        self.buf.indiv.resize(l_indiv, 0);
        self.stream
            .read_exact(&mut self.buf.indiv)
            .map_err(|e| truncated_frame(e, self.buf.record_no))?;

        // the probe relies on the contig being resolvable
        let chrom_idx = self.buf.fixed_i32(CHROM_OFFSET);
        if self.header.contig_by_index(chrom_idx.max(0) as usize).is_none() {
            return Err(Error::format_at(
                FORMAT,
                self.buf.record_no,
                format!("record references unknown contig index {}", chrom_idx),
            ));
        }
        Ok(true)
    }
}

fn truncated_frame(e: std::io::Error, record_no: u64) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::format_at(FORMAT, record_no, "unexpected end of file inside record frame")
    } else {
        Error::from_read(e, FORMAT)
    }
}
