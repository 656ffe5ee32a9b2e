//! VCF / BCF header model
//!
//! # Format
//!
//! A variant header is a block of `##key=value` lines followed by a single
//! `#CHROM ...` column line naming the samples:
//!
//! ```text
//! ##fileformat=VCFv4.3
//! ##contig=<ID=20,length=62435964>
//! ##INFO=<ID=DP,Number=1,Type=Integer,Description="Total Depth">
//! ##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">
//! #CHROM  POS  ID  REF  ALT  QUAL  FILTER  INFO  FORMAT  NA00001
//! ```
//!
//! BCF embeds the same text and addresses FILTER/INFO/FORMAT entries through
//! a shared string dictionary: the `IDX=` field when present, the order of
//! first appearance otherwise, with `PASS` implicitly at index 0. Contigs
//! have their own index space.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Value type of an INFO or FORMAT field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Integer values
    Integer,
    /// Floating point values
    Float,
    /// Presence-only flag (INFO only)
    Flag,
    /// Single characters
    Character,
    /// Free-form strings
    String,
}

/// Arity of an INFO or FORMAT field (the `Number` key)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldArity {
    /// Fixed count
    Count(usize),
    /// One value per ALT allele (`A`)
    PerAlt,
    /// One value per allele incl. REF (`R`)
    PerAllele,
    /// One value per genotype (`G`)
    PerGenotype,
    /// Unknown / variable (`.`)
    Unknown,
}

impl FieldArity {
    /// True if values of this arity are vectors rather than scalars.
    pub fn is_vector(self) -> bool {
        !matches!(self, FieldArity::Count(0) | FieldArity::Count(1))
    }
}

/// Definition of an INFO or FORMAT field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field identifier
    pub id: String,
    /// Arity
    pub number: FieldArity,
    /// Value type
    pub ty: FieldType,
    /// Human-readable description
    pub description: String,
    /// Index in the shared BCF string dictionary
    pub idx: usize,
}

/// Definition of a FILTER entry
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDef {
    /// Filter identifier
    pub id: String,
    /// Human-readable description
    pub description: String,
    /// Index in the shared BCF string dictionary
    pub idx: usize,
}

/// Definition of a contig
#[derive(Debug, Clone, PartialEq)]
pub struct ContigDef {
    /// Contig name
    pub name: String,
    /// Contig length if declared
    pub length: Option<u64>,
    /// Index in the BCF contig dictionary
    pub idx: usize,
}

/// Parsed variant-file header
///
/// Owned by the format handler; the reader hands out a shared reference
/// whose lifetime is bounded by the reader's. `reopen` never replaces the
/// handler, so the reference stays valid across region changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarHeader {
    /// The `##fileformat=` value, e.g. `VCFv4.3`
    pub file_format: String,
    /// Contigs in dictionary order
    pub contigs: Vec<ContigDef>,
    /// INFO definitions in file order
    pub infos: Vec<FieldDef>,
    /// FORMAT definitions in file order
    pub formats: Vec<FieldDef>,
    /// FILTER definitions in file order (incl. the implicit `PASS`)
    pub filters: Vec<FilterDef>,
    /// Sample names from the `#CHROM` line
    pub samples: Vec<String>,
    /// Other `##` lines, verbatim without the leading `##`
    pub extra: Vec<String>,

    /// Shared FILTER/INFO/FORMAT string dictionary, indexed by `IDX`
    dictionary: Vec<String>,
    contig_by_name: HashMap<String, usize>,
    contig_by_idx: HashMap<usize, usize>,
    info_by_id: HashMap<String, usize>,
    format_by_id: HashMap<String, usize>,
}

impl VarHeader {
    /// Parse a header from its text form (VCF lines or the BCF-embedded
    /// text). `format` names the enclosing file format in error messages.
    pub(crate) fn from_text(text: &str, format: &'static str) -> Result<Self> {
        let mut header = VarHeader::default();
        let mut next_contig_idx = 0usize;
        let mut dict_of: HashMap<String, usize> = HashMap::new();
        let mut saw_column_line = false;

        // PASS is defined implicitly at dictionary index 0 unless the header
        // redefines it
        header.filters.push(FilterDef {
            id: "PASS".to_string(),
            description: "All filters passed".to_string(),
            idx: 0,
        });
        dict_of.insert("PASS".to_string(), 0);
        let mut next_dict_idx = 1usize;

        for raw_line in text.lines() {
            let line = raw_line.trim_end_matches('\0');
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("##") {
                if let Some(value) = rest.strip_prefix("fileformat=") {
                    header.file_format = value.to_string();
                } else if let Some(body) = rest.strip_prefix("contig=") {
                    let kv = parse_mapping(body, format)?;
                    let name = required(&kv, "ID", "contig", format)?;
                    let length = kv
                        .get("length")
                        .map(|v| {
                            v.parse::<u64>().map_err(|_| {
                                Error::format(format, format!("invalid contig length {:?}", v))
                            })
                        })
                        .transpose()?;
                    let idx = parse_idx(&kv, format)?.unwrap_or(next_contig_idx);
                    next_contig_idx = next_contig_idx.max(idx + 1);
                    header.contigs.push(ContigDef { name, length, idx });
                } else if let Some(body) = rest.strip_prefix("INFO=") {
                    let def = parse_field_def(body, format, &mut dict_of, &mut next_dict_idx)?;
                    header.infos.push(def);
                } else if let Some(body) = rest.strip_prefix("FORMAT=") {
                    let def = parse_field_def(body, format, &mut dict_of, &mut next_dict_idx)?;
                    header.formats.push(def);
                } else if let Some(body) = rest.strip_prefix("FILTER=") {
                    let kv = parse_mapping(body, format)?;
                    let id = required(&kv, "ID", "FILTER", format)?;
                    let description = kv.get("Description").cloned().unwrap_or_default();
                    let idx = assign_dict_idx(&kv, &id, format, &mut dict_of, &mut next_dict_idx)?;
                    if id == "PASS" {
                        header.filters[0] = FilterDef { id, description, idx };
                    } else {
                        header.filters.push(FilterDef { id, description, idx });
                    }
                } else {
                    header.extra.push(rest.to_string());
                }
            } else if let Some(rest) = line.strip_prefix('#') {
                // "#CHROM POS ID REF ALT QUAL FILTER INFO [FORMAT samples...]"
                let cols: Vec<&str> = rest.split('\t').collect();
                if cols.len() < 8 || cols[0] != "CHROM" {
                    return Err(Error::format(
                        format,
                        format!("malformed column header line: {:?}", line),
                    ));
                }
                header.samples = cols.iter().skip(9).map(|s| s.to_string()).collect();
                saw_column_line = true;
            } else {
                return Err(Error::format(
                    format,
                    format!("unexpected line in header: {:?}", line),
                ));
            }
        }

        if !saw_column_line {
            return Err(Error::format(format, "header is missing the #CHROM column line"));
        }

        header.finish_lookup_tables(dict_of);
        Ok(header)
    }

    fn finish_lookup_tables(&mut self, dict_of: HashMap<String, usize>) {
        let max_idx = dict_of.values().copied().max().unwrap_or(0);
        self.dictionary = vec![String::new(); max_idx + 1];
        for (id, idx) in dict_of {
            self.dictionary[idx] = id;
        }
        for (pos, contig) in self.contigs.iter().enumerate() {
            self.contig_by_name.insert(contig.name.clone(), pos);
            self.contig_by_idx.insert(contig.idx, pos);
        }
        for (pos, def) in self.infos.iter().enumerate() {
            self.info_by_id.insert(def.id.clone(), pos);
        }
        for (pos, def) in self.formats.iter().enumerate() {
            self.format_by_id.insert(def.id.clone(), pos);
        }
    }

    /// Position of `name` in the contig table; used as the reference
    /// ordering for cross-chromosome comparisons.
    pub fn contig_rank(&self, name: &str) -> Option<usize> {
        self.contig_by_name.get(name).copied()
    }

    /// Contig definition for a BCF contig-dictionary index
    pub fn contig_by_index(&self, idx: usize) -> Option<&ContigDef> {
        self.contig_by_idx.get(&idx).map(|&pos| &self.contigs[pos])
    }

    /// Entry of the shared string dictionary
    pub fn dictionary_name(&self, idx: usize) -> Option<&str> {
        match self.dictionary.get(idx) {
            Some(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// INFO definition by id
    pub fn info_def(&self, id: &str) -> Option<&FieldDef> {
        self.info_by_id.get(id).map(|&pos| &self.infos[pos])
    }

    /// FORMAT definition by id
    pub fn format_def(&self, id: &str) -> Option<&FieldDef> {
        self.format_by_id.get(id).map(|&pos| &self.formats[pos])
    }
}

fn required(
    kv: &HashMap<String, String>,
    key: &str,
    what: &str,
    format: &'static str,
) -> Result<String> {
    kv.get(key)
        .cloned()
        .ok_or_else(|| Error::format(format, format!("{} line is missing {}", what, key)))
}

fn parse_idx(kv: &HashMap<String, String>, format: &'static str) -> Result<Option<usize>> {
    kv.get("IDX")
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| Error::format(format, format!("invalid IDX value {:?}", v)))
        })
        .transpose()
}

fn assign_dict_idx(
    kv: &HashMap<String, String>,
    id: &str,
    format: &'static str,
    dict_of: &mut HashMap<String, usize>,
    next_dict_idx: &mut usize,
) -> Result<usize> {
    let idx = match parse_idx(kv, format)? {
        Some(idx) => idx,
        // the same ID may appear as both INFO and FORMAT; it shares one
        // dictionary slot
        None => match dict_of.get(id) {
            Some(&idx) => idx,
            None => *next_dict_idx,
        },
    };
    dict_of.entry(id.to_string()).or_insert(idx);
    *next_dict_idx = (*next_dict_idx).max(idx + 1);
    Ok(idx)
}

fn parse_field_def(
    body: &str,
    format: &'static str,
    dict_of: &mut HashMap<String, usize>,
    next_dict_idx: &mut usize,
) -> Result<FieldDef> {
    let kv = parse_mapping(body, format)?;
    let id = required(&kv, "ID", "field", format)?;
    let number = match required(&kv, "Number", "field", format)?.as_str() {
        "A" => FieldArity::PerAlt,
        "R" => FieldArity::PerAllele,
        "G" => FieldArity::PerGenotype,
        "." => FieldArity::Unknown,
        n => FieldArity::Count(n.parse::<usize>().map_err(|_| {
            Error::format(format, format!("invalid Number value {:?} for {}", n, id))
        })?),
    };
    let ty = match required(&kv, "Type", "field", format)?.as_str() {
        "Integer" => FieldType::Integer,
        "Float" => FieldType::Float,
        "Flag" => FieldType::Flag,
        "Character" => FieldType::Character,
        "String" => FieldType::String,
        t => {
            return Err(Error::format(
                format,
                format!("invalid Type value {:?} for {}", t, id),
            ))
        }
    };
    let description = kv.get("Description").cloned().unwrap_or_default();
    let idx = assign_dict_idx(&kv, &id, format, dict_of, next_dict_idx)?;
    Ok(FieldDef {
        id,
        number,
        ty,
        description,
        idx,
    })
}

/// Parse the `<key=value,key="value",...>` body of a structured header line.
fn parse_mapping(body: &str, format: &'static str) -> Result<HashMap<String, String>> {
    let inner = body
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| Error::format(format, format!("expected <...> mapping, got {:?}", body)))?;

    let mut kv = HashMap::new();
    let bytes = inner.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let eq = match inner[pos..].find('=') {
            Some(off) => pos + off,
            None => {
                return Err(Error::format(
                    format,
                    format!("expected key=value in mapping, got {:?}", &inner[pos..]),
                ))
            }
        };
        let key = inner[pos..eq].trim().to_string();
        let mut cursor = eq + 1;
        let value;
        if bytes.get(cursor) == Some(&b'"') {
            cursor += 1;
            let close = inner[cursor..].find('"').ok_or_else(|| {
                Error::format(format, format!("unterminated quoted value in {:?}", body))
            })?;
            value = inner[cursor..cursor + close].to_string();
            cursor += close + 1;
            // skip the comma after the closing quote, if any
            if bytes.get(cursor) == Some(&b',') {
                cursor += 1;
            }
        } else {
            let end = inner[cursor..]
                .find(',')
                .map(|off| cursor + off)
                .unwrap_or(inner.len());
            value = inner[cursor..end].to_string();
            cursor = (end + 1).min(inner.len());
        }
        kv.insert(key, value);
        pos = cursor;
    }
    Ok(kv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "##fileformat=VCFv4.3\n\
        ##fileDate=20090805\n\
        ##contig=<ID=20,length=62435964,assembly=B36>\n\
        ##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">\n\
        ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">\n\
        ##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">\n\
        ##INFO=<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">\n\
        ##FILTER=<ID=q10,Description=\"Quality below 10\">\n\
        ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
        ##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA00001\tNA00002\tNA00003\n";

    #[test]
    fn test_parse_example_header() {
        let header = VarHeader::from_text(HEADER, "VCF").unwrap();

        assert_eq!(header.file_format, "VCFv4.3");
        assert_eq!(header.contigs.len(), 1);
        assert_eq!(header.contigs[0].name, "20");
        assert_eq!(header.contigs[0].length, Some(62435964));
        assert_eq!(header.samples, vec!["NA00001", "NA00002", "NA00003"]);
        assert_eq!(header.extra, vec!["fileDate=20090805"]);

        let af = header.info_def("AF").unwrap();
        assert_eq!(af.number, FieldArity::PerAlt);
        assert_eq!(af.ty, FieldType::Float);

        let db = header.info_def("DB").unwrap();
        assert_eq!(db.ty, FieldType::Flag);
        assert_eq!(db.number, FieldArity::Count(0));

        assert_eq!(header.format_def("GT").unwrap().ty, FieldType::String);
    }

    #[test]
    fn test_pass_is_implicit_at_dictionary_zero() {
        let header = VarHeader::from_text(HEADER, "VCF").unwrap();
        assert_eq!(header.filters[0].id, "PASS");
        assert_eq!(header.filters[0].idx, 0);
        assert_eq!(header.dictionary_name(0), Some("PASS"));
    }

    #[test]
    fn test_shared_dictionary_slot_for_info_and_format_dp() {
        let header = VarHeader::from_text(HEADER, "VCF").unwrap();
        // DP appears as INFO and FORMAT; both share one dictionary index
        assert_eq!(
            header.info_def("DP").unwrap().idx,
            header.format_def("DP").unwrap().idx
        );
    }

    #[test]
    fn test_idx_override_wins() {
        let text = "##fileformat=VCFv4.3\n\
            ##FILTER=<ID=PASS,Description=\"All filters passed\",IDX=0>\n\
            ##INFO=<ID=NS,Number=1,Type=Integer,Description=\"x\",IDX=5>\n\
            #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        let header = VarHeader::from_text(text, "BCF").unwrap();
        assert_eq!(header.info_def("NS").unwrap().idx, 5);
        assert_eq!(header.dictionary_name(5), Some("NS"));
    }

    #[test]
    fn test_missing_column_line_is_an_error() {
        let text = "##fileformat=VCFv4.3\n";
        assert!(VarHeader::from_text(text, "VCF").is_err());
    }

    #[test]
    fn test_quoted_description_with_commas() {
        let kv = parse_mapping(
            "<ID=DB,Number=0,Type=Flag,Description=\"dbSNP membership, build 129\">",
            "VCF",
        )
        .unwrap();
        assert_eq!(kv["Description"], "dbSNP membership, build 129");
    }
}
