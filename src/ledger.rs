use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{GenomeSummary, base_accession};
use crate::error::RefgenError;
use crate::fs_util::ensure_parent_dir;

pub const LEDGER_COLUMNS: [&str; 11] = [
    "accession_id",
    "gb_taxid",
    "filepath",
    "date_fetched",
    "title",
    "genome_type",
    "source_type",
    "topology",
    "organism",
    "length",
    "last_update_on_db",
];

/// Written into `date_fetched` until the record has actually been downloaded.
pub const PLACEHOLDER_TIMESTAMP: &str = "PLACEHOLDER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub accession_id: String,
    pub gb_taxid: Option<String>,
    pub filepath: String,
    pub date_fetched: String,
    pub title: Option<String>,
    pub genome_type: Option<String>,
    pub source_type: Option<String>,
    pub topology: Option<String>,
    pub organism: Option<String>,
    /// bp
    pub length: Option<String>,
    pub last_update_on_db: Option<String>,
}

impl LedgerRow {
    pub fn staging(accession_id: &str, filepath: &Utf8Path, summary: &GenomeSummary) -> Self {
        Self {
            accession_id: accession_id.to_string(),
            gb_taxid: summary.taxid.clone(),
            filepath: filepath.to_string(),
            date_fetched: PLACEHOLDER_TIMESTAMP.to_string(),
            title: summary.title.clone(),
            genome_type: summary.genome.clone(),
            source_type: summary.sourcedb.clone(),
            topology: summary.topology.clone(),
            organism: summary.organism.clone(),
            length: summary.slen.clone(),
            last_update_on_db: summary.updatedate.clone(),
        }
    }

    pub fn confirmed(&self, fetched_at: &str) -> Self {
        Self {
            date_fetched: fetched_at.to_string(),
            ..self.clone()
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.date_fetched != PLACEHOLDER_TIMESTAMP
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// New file only; an existing file is an error.
    Create,
    Append,
    Overwrite,
}

impl LedgerMode {
    pub fn from_flags(extend: bool, force: bool) -> Result<Self, RefgenError> {
        match (extend, force) {
            (true, true) => Err(RefgenError::ConflictingLedgerMode),
            (true, false) => Ok(LedgerMode::Append),
            (false, true) => Ok(LedgerMode::Overwrite),
            (false, false) => Ok(LedgerMode::Create),
        }
    }
}

#[derive(Debug)]
pub struct LedgerWriter {
    path: Utf8PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl LedgerWriter {
    pub fn open(path: &Utf8Path, mode: LedgerMode) -> Result<Self, RefgenError> {
        let existing_len = fs::metadata(path.as_std_path()).ok().map(|meta| meta.len());
        if mode == LedgerMode::Create && existing_len.is_some() {
            return Err(RefgenError::LedgerExists(path.to_path_buf()));
        }
        ensure_parent_dir(path)?;

        let mut options = OpenOptions::new();
        match mode {
            LedgerMode::Create => options.write(true).create_new(true),
            LedgerMode::Overwrite => options.write(true).create(true).truncate(true),
            LedgerMode::Append => options.append(true).create(true),
        };
        let file = options
            .open(path.as_std_path())
            .map_err(|err| RefgenError::Filesystem(format!("open {path}: {err}")))?;

        let write_header = match mode {
            LedgerMode::Create | LedgerMode::Overwrite => true,
            LedgerMode::Append => existing_len.unwrap_or(0) == 0,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if write_header {
            writer.write_record(LEDGER_COLUMNS)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flushes after every row.
    pub fn write_row(&mut self, row: &LedgerRow) -> Result<(), RefgenError> {
        self.writer.serialize(row)?;
        self.writer
            .flush()
            .map_err(|err| RefgenError::Filesystem(format!("flush {}: {err}", self.path)))?;
        self.rows += 1;
        Ok(())
    }

    pub fn close(mut self) -> Result<(), RefgenError> {
        self.writer
            .flush()
            .map_err(|err| RefgenError::Filesystem(format!("flush {}: {err}", self.path)))
    }
}

pub fn read_ledger(path: &Utf8Path) -> Result<Vec<LedgerRow>, RefgenError> {
    let mut reader = csv::Reader::from_path(path.as_std_path())?;
    reader
        .deserialize::<LedgerRow>()
        .map(|row| row.map_err(RefgenError::from))
        .collect()
}

/// Base accessions holding a real fetch timestamp; empty if the ledger does
/// not exist yet.
pub fn confirmed_accessions(path: &Utf8Path) -> Result<HashSet<String>, RefgenError> {
    if !path.as_std_path().exists() {
        return Ok(HashSet::new());
    }
    Ok(read_ledger(path)?
        .into_iter()
        .filter(LedgerRow::is_confirmed)
        .map(|row| base_accession(&row.accession_id).to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn row(acc: &str) -> LedgerRow {
        let summary = GenomeSummary {
            title: Some("Pinus thunbergii chloroplast, complete genome".to_string()),
            taxid: Some("3350".to_string()),
            ..GenomeSummary::default()
        };
        LedgerRow::staging(acc, Utf8Path::new("/data/x.fasta"), &summary)
    }

    fn ledger_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("ledger.csv")).unwrap()
    }

    #[test]
    fn mode_flags() {
        assert_eq!(LedgerMode::from_flags(false, false).unwrap(), LedgerMode::Create);
        assert_eq!(LedgerMode::from_flags(true, false).unwrap(), LedgerMode::Append);
        assert_eq!(LedgerMode::from_flags(false, true).unwrap(), LedgerMode::Overwrite);
        assert_matches!(
            LedgerMode::from_flags(true, true),
            Err(RefgenError::ConflictingLedgerMode)
        );
    }

    #[test]
    fn header_once_across_appends() {
        let temp = tempfile::tempdir().unwrap();
        let path = ledger_path(&temp);

        let mut writer = LedgerWriter::open(&path, LedgerMode::Append).unwrap();
        writer.write_row(&row("A1")).unwrap();
        writer.close().unwrap();

        let mut writer = LedgerWriter::open(&path, LedgerMode::Append).unwrap();
        writer.write_row(&row("B2").confirmed("2024-01-01 00:00:00")).unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(path.as_std_path()).unwrap();
        assert_eq!(content.matches("accession_id").count(), 1);
        assert!(content.starts_with(&LEDGER_COLUMNS.join(",")));

        let rows = read_ledger(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title.as_deref(), Some("Pinus thunbergii chloroplast, complete genome"));
        assert_eq!(rows[0].organism, None);

        let confirmed = confirmed_accessions(&path).unwrap();
        assert!(confirmed.contains("B2"));
        assert!(!confirmed.contains("A1"));
    }

    #[test]
    fn confirmed_accessions_drop_versions() {
        let temp = tempfile::tempdir().unwrap();
        let path = ledger_path(&temp);
        let mut writer = LedgerWriter::open(&path, LedgerMode::Create).unwrap();
        writer.write_row(&row("NC_000932.1").confirmed("2024-01-01 00:00:00")).unwrap();
        writer.close().unwrap();

        let confirmed = confirmed_accessions(&path).unwrap();
        assert!(confirmed.contains("NC_000932"));
        assert!(!confirmed.contains("NC_000932.1"));
    }

    #[test]
    fn create_refuses_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = ledger_path(&temp);
        fs::write(path.as_std_path(), "keep me\n").unwrap();

        assert_matches!(
            LedgerWriter::open(&path, LedgerMode::Create),
            Err(RefgenError::LedgerExists(_))
        );
        assert_eq!(fs::read_to_string(path.as_std_path()).unwrap(), "keep me\n");
    }

    #[test]
    fn overwrite_truncates() {
        let temp = tempfile::tempdir().unwrap();
        let path = ledger_path(&temp);
        fs::write(path.as_std_path(), "stale\n").unwrap();

        let mut writer = LedgerWriter::open(&path, LedgerMode::Overwrite).unwrap();
        writer.write_row(&row("A1")).unwrap();
        assert_eq!(writer.rows_written(), 1);
        writer.close().unwrap();

        let content = fs::read_to_string(path.as_std_path()).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(read_ledger(&path).unwrap().len(), 1);
    }
}
