use std::fs;

use bio::io::fasta;
use camino::Utf8Path;
use gb_io::reader::SeqReader;
use gb_io::seq::Seq;

use crate::domain::{RecordFormat, base_accession};
use crate::error::RefgenError;
use crate::fs_util::write_atomic;

/// One record of an efetch stream.
#[derive(Debug, Clone)]
pub struct SequenceRecord {
    /// Identifier as served, version suffix included.
    pub id: String,
    pub sequence: String,
    pub annotation: Option<Seq>,
}

impl SequenceRecord {
    pub fn accession(&self) -> &str {
        base_accession(&self.id)
    }
}

pub fn parse_records(text: &str, format: RecordFormat) -> Result<Vec<SequenceRecord>, RefgenError> {
    match format {
        RecordFormat::Fasta => parse_fasta(text),
        RecordFormat::GenBank => parse_genbank(text),
    }
}

fn parse_fasta(text: &str) -> Result<Vec<SequenceRecord>, RefgenError> {
    fasta::Reader::new(text.as_bytes())
        .records()
        .map(|result| {
            let record = result.map_err(|err| RefgenError::RecordParse(err.to_string()))?;
            Ok(SequenceRecord {
                id: record.id().to_string(),
                sequence: String::from_utf8_lossy(record.seq()).into_owned(),
                annotation: None,
            })
        })
        .collect()
}

fn parse_genbank(text: &str) -> Result<Vec<SequenceRecord>, RefgenError> {
    // efetch prepends plain-text notices on some failures; never treat them
    // as part of the first record.
    if let Some(first) = text.lines().find(|line| !line.trim().is_empty()) {
        if !first.starts_with("LOCUS") {
            return Err(RefgenError::RecordParse(format!(
                "expected LOCUS at record start, found: {}",
                truncate(first)
            )));
        }
    }

    SeqReader::new(text.as_bytes())
        .map(|result| {
            let seq = result.map_err(|err| RefgenError::RecordParse(err.to_string()))?;
            let id = seq
                .version
                .clone()
                .or_else(|| seq.accession.clone())
                .or_else(|| seq.name.clone())
                .ok_or_else(|| {
                    RefgenError::RecordParse("GenBank record without identifier".to_string())
                })?;
            Ok(SequenceRecord {
                id,
                sequence: String::from_utf8_lossy(&seq.seq).to_ascii_uppercase(),
                annotation: Some(seq),
            })
        })
        .collect()
}

fn truncate(line: &str) -> &str {
    match line.char_indices().nth(60) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// FASTA records become a two-line file; GenBank records are re-serialized
/// with their annotation.
pub fn write_record(
    path: &Utf8Path,
    record: &SequenceRecord,
    accession: &str,
    format: RecordFormat,
) -> Result<(), RefgenError> {
    match format {
        RecordFormat::Fasta => write_plain_sequence(path, accession, &record.sequence),
        RecordFormat::GenBank => {
            let seq = record.annotation.as_ref().ok_or_else(|| {
                RefgenError::RecordParse(format!("{} carries no annotation", record.id))
            })?;
            let mut content = Vec::new();
            gb_io::writer::write(&mut content, seq)
                .map_err(|err| RefgenError::Filesystem(format!("serialize {}: {err}", record.id)))?;
            write_atomic(path, &content)
        }
    }
}

pub fn write_plain_sequence(
    path: &Utf8Path,
    accession: &str,
    sequence: &str,
) -> Result<(), RefgenError> {
    write_atomic(path, format!(">{accession}\n{sequence}\n").as_bytes())
}

pub fn read_plain_sequence(path: &Utf8Path) -> Result<(String, String), RefgenError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| RefgenError::Filesystem(format!("read {path}: {err}")))?;
    let mut lines = content.lines();
    let header = lines
        .next()
        .and_then(|line| line.strip_prefix('>'))
        .ok_or_else(|| RefgenError::RecordParse(format!("{path} has no FASTA header")))?;
    let sequence = lines.next().unwrap_or_default();
    Ok((header.to_string(), sequence.to_string()))
}
