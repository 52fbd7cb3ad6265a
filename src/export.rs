use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::error::RefgenError;
use crate::fs_util::{refuse_existing, write_atomic};

pub fn write_summary_csv(
    path: &Utf8Path,
    rows: &[BTreeMap<String, String>],
) -> Result<bool, RefgenError> {
    if refuse_existing(path.as_std_path()) {
        return Ok(false);
    }
    if rows.is_empty() {
        warn!(path = %path, "no summaries to write");
        return Ok(false);
    }
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|column| row.get(*column).map(String::as_str).unwrap_or_default()),
        )?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| RefgenError::Ledger(err.to_string()))?;
    write_atomic(path, &content)?;
    info!(path = %path, rows = rows.len(), "metadata stored");
    Ok(true)
}

pub fn write_fasta(path: &Utf8Path, sequences: &[(String, String)]) -> Result<bool, RefgenError> {
    if refuse_existing(path.as_std_path()) {
        return Ok(false);
    }
    let mut content = String::new();
    for (accession, sequence) in sequences {
        content.push('>');
        content.push_str(accession);
        content.push('\n');
        content.push_str(sequence);
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())?;
    info!(path = %path, records = sequences.len(), "sequence data stored");
    Ok(true)
}

/// Human-readable account of one download run.
#[derive(Debug, Clone)]
pub struct DownloadLog {
    pub database: String,
    pub dataset_name: String,
    pub taxa: Vec<String>,
    pub max_per_taxon: Option<u32>,
    pub sequence_path: String,
    pub metadata_path: String,
}

impl DownloadLog {
    pub fn render(&self, date: &str) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Download of NCBI {} data.", self.database);
        let _ = writeln!(text, "  Name of the {}: {}", self.database, self.dataset_name);
        let _ = writeln!(text, "  Date: {date}");
        if !self.taxa.is_empty() {
            let _ = writeln!(text, "  Given taxa as queries were:");
            for taxon in &self.taxa {
                let _ = writeln!(text, "\t{taxon}");
            }
        }
        if let Some(max) = self.max_per_taxon {
            let _ = writeln!(
                text,
                "  A maximum of {max} RefSeq entries per taxon was downloaded."
            );
        }
        let _ = writeln!(text);
        let _ = writeln!(text, "Sequence data: {}", self.sequence_path);
        let _ = writeln!(text, "Metadata: {}", self.metadata_path);
        text
    }
}

pub fn write_download_log(path: &Utf8Path, log: &DownloadLog) -> Result<bool, RefgenError> {
    if refuse_existing(path.as_std_path()) {
        return Ok(false);
    }
    let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    write_atomic(path, log.render(&date).as_bytes())?;
    info!(path = %path, "download log stored");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    fn target(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn summary_csv_sorts_columns_and_refuses_rewrite() {
        let temp = tempfile::tempdir().unwrap();
        let path = target(&temp, "summary.csv");
        let rows = vec![
            BTreeMap::from([
                ("title".to_string(), "a, b".to_string()),
                ("accession".to_string(), "NC_1".to_string()),
            ]),
            BTreeMap::from([("accession".to_string(), "NC_2".to_string())]),
        ];
        assert!(write_summary_csv(&path, &rows).unwrap());
        let content = fs::read_to_string(path.as_std_path()).unwrap();
        assert_eq!(content, "accession,title\nNC_1,\"a, b\"\nNC_2,\n");

        assert!(!write_summary_csv(&path, &rows[..1]).unwrap());
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), content);
    }

    #[test]
    fn fasta_has_two_lines_per_record() {
        let temp = tempfile::tempdir().unwrap();
        let path = target(&temp, "seqs.fasta");
        let seqs = vec![
            ("A1".to_string(), "ACGT".to_string()),
            ("B2".to_string(), "GG".to_string()),
        ];
        assert!(write_fasta(&path, &seqs).unwrap());
        assert_eq!(
            fs::read_to_string(path.as_std_path()).unwrap(),
            ">A1\nACGT\n>B2\nGG\n"
        );
        assert!(!write_fasta(&path, &seqs).unwrap());
    }

    #[test]
    fn download_log_lists_taxa() {
        let log = DownloadLog {
            database: "nuccore".to_string(),
            dataset_name: "plastomes".to_string(),
            taxa: vec!["Pinus".to_string(), "Picea".to_string()],
            max_per_taxon: Some(5),
            sequence_path: "genomes/".to_string(),
            metadata_path: "genomes.csv".to_string(),
        };
        let text = log.render("2024-05-01 10:00:00");
        assert!(text.starts_with("Download of NCBI nuccore data.\n"));
        assert!(text.contains("\tPinus\n\tPicea\n"));
        assert!(text.contains("A maximum of 5 RefSeq entries per taxon"));
        assert!(text.ends_with("Metadata: genomes.csv\n"));

        let temp = tempfile::tempdir().unwrap();
        let path = target(&temp, "download.log");
        assert!(write_download_log(&path, &log).unwrap());
        assert!(!write_download_log(&path, &log).unwrap());
    }
}
