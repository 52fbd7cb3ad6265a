use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::{GenomeRequest, ResolvedConfig};
use crate::domain::RecordFormat;
use crate::entrez::{EntrezTransport, Gateway, RetryPolicy};
use crate::error::RefgenError;
use crate::export::{DownloadLog, write_download_log};
use crate::ledger::confirmed_accessions;
use crate::loader::{BufferedGenomeLoader, FlushReport};

#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub ledger: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub database: String,
    pub format: RecordFormat,
    pub extend: bool,
    pub force: bool,
    pub genomes: Vec<GenomeRequest>,
    pub log: Option<Utf8PathBuf>,
    pub dataset_name: Option<String>,
    pub taxa: Vec<String>,
    pub max_per_taxon: Option<u32>,
}

impl From<ResolvedConfig> for FetchPlan {
    fn from(config: ResolvedConfig) -> Self {
        Self {
            ledger: config.ledger,
            output_dir: config.output_dir,
            database: config.database,
            format: config.format,
            extend: config.extend,
            force: config.force,
            genomes: config.genomes,
            log: config.log,
            dataset_name: config.dataset_name,
            taxa: config.taxa,
            max_per_taxon: config.max_per_taxon,
        }
    }
}

impl FetchPlan {
    fn destination(&self, request: &GenomeRequest) -> Utf8PathBuf {
        request.path.clone().unwrap_or_else(|| {
            self.output_dir.join(format!(
                "{}.{}",
                request.accession.base(),
                self.format.rettype()
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub registered: usize,
    /// Already confirmed in an extended ledger.
    pub skipped: Vec<String>,
    pub flush: Option<FlushReport>,
    pub log: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: EntrezTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: EntrezTransport> App<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn gateway(&self) -> Gateway<&T> {
        Gateway::with_policy(&self.transport, self.policy.clone())
    }

    pub fn fetch(
        &self,
        plan: &FetchPlan,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, RefgenError> {
        let already = if plan.extend {
            confirmed_accessions(&plan.ledger)?
        } else {
            Default::default()
        };
        let mut loader = BufferedGenomeLoader::new(
            plan.ledger.clone(),
            plan.extend,
            plan.force,
            self.gateway(),
        )?
        .with_summary_database(&plan.database);

        let start = Instant::now();
        let mut skipped = Vec::new();
        for request in &plan.genomes {
            if already.contains(request.accession.base()) {
                skipped.push(request.accession.to_string());
                continue;
            }
            sink.event(ProgressEvent {
                message: format!("phase=Register; {}", request.accession),
                elapsed: Some(start.elapsed()),
            });
            loader.register(&request.accession, &plan.destination(request), None)?;
        }
        if !skipped.is_empty() {
            sink.event(ProgressEvent {
                message: format!("phase=Register; {} already in ledger", skipped.len()),
                elapsed: None,
            });
        }

        let registered = loader.pending_len();
        let flush = if registered > 0 {
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; {registered} records"),
                elapsed: Some(start.elapsed()),
            });
            Some(loader.flush(plan.format, &plan.database)?)
        } else {
            None
        };

        let mut log = None;
        if let Some(path) = &plan.log {
            let entry = DownloadLog {
                database: plan.database.clone(),
                dataset_name: plan
                    .dataset_name
                    .clone()
                    .unwrap_or_else(|| plan.ledger.file_stem().unwrap_or("genomes").to_string()),
                taxa: plan.taxa.clone(),
                max_per_taxon: plan.max_per_taxon,
                sequence_path: plan.output_dir.to_string(),
                metadata_path: plan.ledger.to_string(),
            };
            if write_download_log(path, &entry)? {
                log = Some(path.to_string());
            }
        }

        sink.event(ProgressEvent {
            message: "phase=Done".to_string(),
            elapsed: Some(start.elapsed()),
        });
        Ok(FetchResult {
            registered,
            skipped,
            flush,
            log,
        })
    }
}
