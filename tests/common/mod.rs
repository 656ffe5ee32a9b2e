//! Shared fixture builders for the integration tests
//!
//! BGZF blocks, tabix indexes and BCF frames are assembled byte by byte so
//! the tests do not depend on external tooling.

#![allow(dead_code)]

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

/// The VCFv4.3 specification example header
pub const EXAMPLE_HEADER: &str = "##fileformat=VCFv4.3\n\
    ##fileDate=20090805\n\
    ##source=myImputationProgramV3.1\n\
    ##contig=<ID=20,length=62435964,assembly=B36>\n\
    ##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">\n\
    ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n\
    ##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">\n\
    ##INFO=<ID=AA,Number=1,Type=String,Description=\"Ancestral Allele\">\n\
    ##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">\n\
    ##INFO=<ID=H2,Number=0,Type=Flag,Description=\"HapMap2 membership\">\n\
    ##FILTER=<ID=q10,Description=\"Quality below 10\">\n\
    ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
    ##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">\n\
    ##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">\n\
    ##FORMAT=<ID=HQ,Number=2,Type=Integer,Description=\"Haplotype Quality\">\n\
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\tNA00003\n";

/// The five body records of the VCFv4.3 example, one `\n`-terminated
/// line each
pub const EXAMPLE_RECORDS: [&str; 5] = [
    "20\t14370\trs6054257\tG\tA\t29\tPASS\tNS=3;DP=14;AF=0.5;DB;H2\tGT:GQ:DP:HQ\t0|0:48:1:51,51\t1|0:48:8:51,51\t1/1:43:5:.,.\n",
    "20\t17330\t.\tT\tA\t3\tq10\tNS=3;DP=11;AF=0.017\tGT:GQ:DP:HQ\t0|0:49:3:58,50\t0|1:3:5:65,3\t0/0:41:3\n",
    "20\t1110696\trs6040355\tA\tG,T\t67\tPASS\tNS=2;DP=10;AF=0.333,0.667;AA=T;DB\tGT:GQ:DP:HQ\t1|2:21:6:23,27\t2|1:2:0:18,2\t2/2:35:4\n",
    "20\t1230237\t.\tT\t.\t47\tPASS\tNS=3;DP=13;AA=T\tGT:GQ:DP:HQ\t0|0:54:7:56,60\t0|0:48:4:51,51\t0/0:61:2\n",
    "20\t1234567\tmicrosat1\tGTC\tG,GTCT\t50\tPASS\tNS=3;DP=9;AA=G\tGT:GQ:DP\t0/1:35:4\t0/2:17:2\t1/1:40:3\n",
];

/// Compress `payload` into one BGZF block (gzip member with the `BC` extra
/// subfield carrying the block size).
pub fn bgzf_block(payload: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let deflated = encoder.finish().unwrap();

    let mut crc = Crc::new();
    crc.update(payload);

    let total = 12 + 6 + deflated.len() + 8;
    let bsize = (total - 1) as u16;

    let mut block = Vec::with_capacity(total);
    // gzip header: magic, deflate, FEXTRA, mtime 0, XFL 0, OS unknown
    block.extend_from_slice(&[0x1F, 0x8B, 0x08, 0x04, 0, 0, 0, 0, 0, 0xFF]);
    block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
    block.extend_from_slice(&[b'B', b'C', 2, 0]);
    block.extend_from_slice(&bsize.to_le_bytes());
    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.sum().to_le_bytes());
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block
}

/// The 28-byte BGZF end-of-file marker (an empty block)
pub fn bgzf_eof() -> Vec<u8> {
    vec![
        0x1F, 0x8B, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x06, 0x00, 0x42, 0x43, 0x02,
        0x00, 0x1B, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ]
}

/// Compress a whole buffer as a single-block BGZF file with EOF marker.
pub fn bgzf_compress(payload: &[u8]) -> Vec<u8> {
    let mut out = bgzf_block(payload);
    out.extend_from_slice(&bgzf_eof());
    out
}

/// The VCFv4.3 example as a BGZF VCF: the header in its own block,
/// each record line in its own block. Returns the file bytes and the disk
/// offset of every record block.
pub fn example_vcf_bgzf() -> (Vec<u8>, Vec<u64>) {
    let mut data = bgzf_block(EXAMPLE_HEADER.as_bytes());
    let mut record_offsets = Vec::new();
    for line in EXAMPLE_RECORDS {
        record_offsets.push(data.len() as u64);
        data.extend_from_slice(&bgzf_block(line.as_bytes()));
    }
    data.extend_from_slice(&bgzf_eof());
    (data, record_offsets)
}

fn voffset(disk: u64, block: u16) -> u64 {
    disk << 16 | block as u64
}

/// A tabix index for [`example_vcf_bgzf`]: one chunk per record block under
/// bin 0, plus a linear index mapping 16 kb windows to record blocks.
///
/// `file_len` is the total length of the compressed VCF (used as the final
/// chunk end).
pub fn example_tbi(record_offsets: &[u64], file_len: u64) -> Vec<u8> {
    // positions of the example records, 0-based
    let positions: [u32; 5] = [14369, 17329, 1110695, 1230236, 1234566];

    let mut data = Vec::new();
    data.extend_from_slice(b"TBI\x01");
    data.extend_from_slice(&1i32.to_le_bytes()); // n_ref
    data.extend_from_slice(&2i32.to_le_bytes()); // format: VCF
    data.extend_from_slice(&1i32.to_le_bytes()); // col_seq
    data.extend_from_slice(&2i32.to_le_bytes()); // col_beg
    data.extend_from_slice(&0i32.to_le_bytes()); // col_end
    data.extend_from_slice(&(b'#' as i32).to_le_bytes()); // meta
    data.extend_from_slice(&0i32.to_le_bytes()); // skip
    data.extend_from_slice(&3i32.to_le_bytes()); // l_nm: "20\0"
    data.extend_from_slice(b"20\0");

    // binning index: every record chunk filed under bin 0
    data.extend_from_slice(&1i32.to_le_bytes()); // n_bin
    data.extend_from_slice(&0u32.to_le_bytes()); // bin 0
    data.extend_from_slice(&(record_offsets.len() as i32).to_le_bytes());
    for (i, &offset) in record_offsets.iter().enumerate() {
        let end = record_offsets
            .get(i + 1)
            .copied()
            .unwrap_or(file_len);
        data.extend_from_slice(&voffset(offset, 0).to_le_bytes());
        data.extend_from_slice(&voffset(end, 0).to_le_bytes());
    }

    // linear index: lowest record offset per 16 kb window
    let max_window = (positions[positions.len() - 1] >> 14) as usize;
    data.extend_from_slice(&((max_window + 1) as i32).to_le_bytes());
    for window in 0..=max_window {
        let first_in_or_after = positions
            .iter()
            .position(|&p| (p >> 14) as usize >= window)
            .unwrap_or(positions.len() - 1);
        data.extend_from_slice(&voffset(record_offsets[first_in_or_after], 0).to_le_bytes());
    }
    data
}

// ----------------------------------------------------------------------------
// BCF fixture
// ----------------------------------------------------------------------------

const KIND_INT8: u8 = 1;
const KIND_CHAR: u8 = 7;

fn typed_str(s: &[u8]) -> Vec<u8> {
    assert!(s.len() < 15);
    let mut out = vec![(s.len() as u8) << 4 | KIND_CHAR];
    out.extend_from_slice(s);
    out
}

fn typed_i8(v: i8) -> Vec<u8> {
    vec![1 << 4 | KIND_INT8, v as u8]
}

fn typed_i8_vec(vals: &[i8]) -> Vec<u8> {
    assert!(vals.len() < 15);
    let mut out = vec![(vals.len() as u8) << 4 | KIND_INT8];
    out.extend(vals.iter().map(|&v| v as u8));
    out
}

/// Header text used by the BCF fixture (two samples, dictionary:
/// PASS=0, NS=1, DP=2, GT=3, GQ=4)
pub const BCF_HEADER: &str = "##fileformat=VCFv4.3\n\
    ##contig=<ID=20,length=62435964>\n\
    ##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">\n\
    ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n\
    ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
    ##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">\n\
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

/// One BCF record frame (l_shared/l_indiv prefix included): a SNV on contig
/// index 0 with NS and DP INFO fields and GT/GQ genotypes for two samples.
pub fn bcf_record_frame(pos0: i32, ref_allele: u8, alt_allele: u8, depth: i8) -> Vec<u8> {
    let mut shared = Vec::new();
    shared.extend_from_slice(&0i32.to_le_bytes()); // chrom idx
    shared.extend_from_slice(&pos0.to_le_bytes()); // pos, 0-based
    shared.extend_from_slice(&1i32.to_le_bytes()); // rlen
    shared.extend_from_slice(&40.0f32.to_le_bytes()); // qual
    shared.extend_from_slice(&2u16.to_le_bytes()); // n_info
    shared.extend_from_slice(&2u16.to_le_bytes()); // n_allele
    shared.extend_from_slice(&2u32.to_le_bytes()[..3]); // n_sample
    shared.push(2); // n_fmt
    shared.extend(typed_str(b"")); // id: missing
    shared.extend(typed_str(&[ref_allele]));
    shared.extend(typed_str(&[alt_allele]));
    shared.extend(typed_i8_vec(&[0])); // FILTER: PASS
    shared.extend(typed_i8(1)); // key NS
    shared.extend(typed_i8(2));
    shared.extend(typed_i8(2)); // key DP
    shared.extend(typed_i8(depth));

    let mut indiv = Vec::new();
    indiv.extend(typed_i8(3)); // key GT
    indiv.push(2 << 4 | KIND_INT8);
    indiv.extend_from_slice(&[2, 3, 2, 5]); // 0|0 and 0|1
    indiv.extend(typed_i8(4)); // key GQ
    indiv.push(1 << 4 | KIND_INT8);
    indiv.extend_from_slice(&[48, 43]);

    let mut frame = Vec::new();
    frame.extend_from_slice(&(shared.len() as u32).to_le_bytes());
    frame.extend_from_slice(&(indiv.len() as u32).to_le_bytes());
    frame.extend_from_slice(&shared);
    frame.extend_from_slice(&indiv);
    frame
}

/// A symbolic-ALT record frame (`REF` "T", `ALT` "<DEL>") whose `rlen`
/// covers the deleted interval and therefore differs from the REF allele's
/// length. No INFO or genotype fields.
pub fn bcf_symbolic_record_frame(pos0: i32, rlen: i32) -> Vec<u8> {
    let mut shared = Vec::new();
    shared.extend_from_slice(&0i32.to_le_bytes()); // chrom idx
    shared.extend_from_slice(&pos0.to_le_bytes()); // pos, 0-based
    shared.extend_from_slice(&rlen.to_le_bytes());
    shared.extend_from_slice(&40.0f32.to_le_bytes()); // qual
    shared.extend_from_slice(&0u16.to_le_bytes()); // n_info
    shared.extend_from_slice(&2u16.to_le_bytes()); // n_allele
    shared.extend_from_slice(&2u32.to_le_bytes()[..3]); // n_sample
    shared.push(0); // n_fmt
    shared.extend(typed_str(b"")); // id: missing
    shared.extend(typed_str(b"T"));
    shared.extend(typed_str(b"<DEL>"));
    shared.extend(typed_i8_vec(&[0])); // FILTER: PASS

    let mut frame = Vec::new();
    frame.extend_from_slice(&(shared.len() as u32).to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes());
    frame.extend_from_slice(&shared);
    frame
}

/// A complete uncompressed BCF byte stream with the given record frames.
pub fn bcf_bytes(records: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"BCF\x02\x02");
    let text = BCF_HEADER.as_bytes();
    data.extend_from_slice(&(text.len() as u32 + 1).to_le_bytes());
    data.extend_from_slice(text);
    data.push(0);
    for frame in records {
        data.extend_from_slice(frame);
    }
    data
}
