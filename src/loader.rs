use std::collections::{HashMap, HashSet, VecDeque};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{AccessionId, DEFAULT_DATABASE, GenomeSummary, RecordFormat};
use crate::entrez::{EntrezRequest, EntrezTransport, Gateway};
use crate::error::RefgenError;
use crate::fs_util::{absolute_utf8, remove_if_exists};
use crate::ledger::{LedgerMode, LedgerRow, LedgerWriter};
use crate::record::{parse_records, write_record};
use crate::summary::SummaryResolver;

/// Upper bound of identifiers per efetch call.
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Registering,
    Fetching,
    Done,
    /// A flush aborted; the loader must be rebuilt.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    pub ledger: String,
    pub batches: usize,
    pub confirmed: usize,
    /// Requested but absent from the response stream.
    pub missing: Vec<String>,
}

pub struct BufferedGenomeLoader<T: EntrezTransport> {
    ledger_path: Utf8PathBuf,
    staging_path: Utf8PathBuf,
    mode: LedgerMode,
    gateway: Gateway<T>,
    summary_database: String,
    state: SessionState,
    pending: VecDeque<AccessionId>,
    staged: HashMap<String, LedgerRow>,
    staging: Option<LedgerWriter>,
}

impl<T: EntrezTransport> BufferedGenomeLoader<T> {
    pub fn new(
        ledger_path: impl Into<Utf8PathBuf>,
        extend: bool,
        force: bool,
        gateway: Gateway<T>,
    ) -> Result<Self, RefgenError> {
        let ledger_path = ledger_path.into();
        let mode = LedgerMode::from_flags(extend, force)?;
        if mode == LedgerMode::Create && ledger_path.as_std_path().exists() {
            return Err(RefgenError::LedgerExists(ledger_path));
        }
        let staging_path = Utf8PathBuf::from(format!("{ledger_path}.tmp"));

        Ok(Self {
            ledger_path,
            staging_path,
            mode,
            gateway,
            summary_database: DEFAULT_DATABASE.to_string(),
            state: SessionState::Idle,
            pending: VecDeque::new(),
            staged: HashMap::new(),
            staging: None,
        })
    }

    pub fn with_summary_database(mut self, database: &str) -> Self {
        self.summary_database = database.to_string();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ledger_path(&self) -> &Utf8Path {
        &self.ledger_path
    }

    pub fn staging_path(&self) -> &Utf8Path {
        &self.staging_path
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_registered(&self, accession: &AccessionId) -> bool {
        self.staged.contains_key(accession.base())
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    pub fn register(
        &mut self,
        accession: &AccessionId,
        destination: &Utf8Path,
        summary: Option<GenomeSummary>,
    ) -> Result<(), RefgenError> {
        match self.state {
            SessionState::Idle | SessionState::Registering => {}
            SessionState::Done => self.staged.clear(),
            state => {
                return Err(RefgenError::InvalidState {
                    operation: "register",
                    state,
                });
            }
        }
        if self.is_registered(accession) {
            debug!(accession = %accession, "already registered");
            return Ok(());
        }

        let summary = match summary {
            Some(summary) => summary,
            None => SummaryResolver::for_database(&self.gateway, &self.summary_database)
                .resolve(accession)?
                .unwrap_or_else(|| {
                    warn!(accession = %accession, "no summary available");
                    GenomeSummary::default()
                }),
        };
        let destination = absolute_utf8(destination)?;
        let row = LedgerRow::staging(accession.as_str(), &destination, &summary);

        let staging = match self.staging.take() {
            Some(writer) => writer,
            None => LedgerWriter::open(&self.staging_path, LedgerMode::Overwrite)?,
        };
        self.staging.insert(staging).write_row(&row)?;

        self.staged.insert(accession.base().to_string(), row);
        self.pending.push_back(accession.clone());
        self.state = SessionState::Registering;
        Ok(())
    }

    /// Rows confirmed before a failure stay in the ledger.
    pub fn flush(
        &mut self,
        format: RecordFormat,
        database: &str,
    ) -> Result<FlushReport, RefgenError> {
        if self.state != SessionState::Registering {
            return Err(RefgenError::InvalidState {
                operation: "flush",
                state: self.state,
            });
        }
        if let Some(staging) = self.staging.take() {
            staging.close()?;
        }
        self.state = SessionState::Fetching;

        match self.drain(format, database) {
            Ok(report) => {
                remove_if_exists(&self.staging_path)?;
                self.mode = LedgerMode::Append;
                self.state = SessionState::Done;
                Ok(report)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn drain(&mut self, format: RecordFormat, database: &str) -> Result<FlushReport, RefgenError> {
        let mut ledger = LedgerWriter::open(&self.ledger_path, self.mode)?;
        let mut report = FlushReport {
            ledger: self.ledger_path.to_string(),
            batches: 0,
            confirmed: 0,
            missing: Vec::new(),
        };
        let mut seen = HashSet::new();

        while !self.pending.is_empty() {
            let take = self.pending.len().min(MAX_BATCH_SIZE);
            let batch: Vec<AccessionId> = self.pending.drain(..take).collect();
            let ids: Vec<&str> = batch.iter().map(AccessionId::as_str).collect();
            let request = EntrezRequest::batch_fetch(database, &ids, format.rettype(), "text");

            let body = self.gateway.call(&request)?;
            let fetched_at = fetch_timestamp();
            report.batches += 1;

            let records = parse_records(&body, format)?;
            for record in &records {
                let key = record.accession();
                let row = self
                    .staged
                    .get(key)
                    .ok_or_else(|| RefgenError::Reconciliation(record.id.clone()))?;
                if !seen.insert(key.to_string()) {
                    warn!(accession = key, "record served twice; keeping the first copy");
                    continue;
                }
                write_record(Utf8Path::new(&row.filepath), record, &row.accession_id, format)?;
                ledger.write_row(&row.confirmed(&fetched_at))?;
                report.confirmed += 1;
                debug!(accession = key, path = %row.filepath, "record stored");
            }

            for accession in &batch {
                if !seen.contains(accession.base()) {
                    warn!(accession = %accession, "requested record missing from response");
                    report.missing.push(accession.to_string());
                }
            }
            info!(
                batch = report.batches,
                requested = batch.len(),
                received = records.len(),
                "batch stored"
            );
        }

        ledger.close()?;
        Ok(report)
    }
}

fn fetch_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}
