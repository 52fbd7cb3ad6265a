use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::loader::SessionState;

#[derive(Debug, Error, Diagnostic)]
pub enum RefgenError {
    #[error("invalid accession id: {0}")]
    InvalidAccession(String),

    #[error("invalid record format: {0} (expected fasta or gb)")]
    InvalidFormat(String),

    #[error("missing config file refgen.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("transient Entrez failure: {0}")]
    Transient(String),

    #[error("Entrez request failed: {0}")]
    EntrezHttp(String),

    #[error("Entrez returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },

    #[error("Entrez gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("failed to decode Entrez response: {0}")]
    Decode(String),

    #[error("malformed record stream: {0}")]
    RecordParse(String),

    #[error("ledger {0} already exists; pass extend to append or force to overwrite")]
    #[diagnostic(help("use --extend to continue an existing ledger"))]
    LedgerExists(Utf8PathBuf),

    #[error("conflicting ledger flags: extend (append) and force (overwrite) are exclusive")]
    ConflictingLedgerMode,

    #[error("fetched record {0} was never registered in this session")]
    Reconciliation(String),

    #[error("cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl RefgenError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RefgenError::Transient(_))
    }
}

impl From<csv::Error> for RefgenError {
    fn from(err: csv::Error) -> Self {
        RefgenError::Ledger(err.to_string())
    }
}
