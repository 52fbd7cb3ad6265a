use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RefgenError;

/// Entrez database queried when the caller does not name one.
pub const DEFAULT_DATABASE: &str = "nuccore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Fasta,
    #[value(name = "gb", alias = "genbank")]
    #[serde(rename = "gb", alias = "genbank")]
    GenBank,
}

impl RecordFormat {
    /// Entrez `rettype`, also used as the file extension.
    pub fn rettype(self) -> &'static str {
        match self {
            RecordFormat::Fasta => "fasta",
            RecordFormat::GenBank => "gb",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rettype())
    }
}

impl FromStr for RecordFormat {
    type Err = RefgenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fasta" => Ok(RecordFormat::Fasta),
            "gb" | "genbank" => Ok(RecordFormat::GenBank),
            _ => Err(RefgenError::InvalidFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessionId(String);

impl AccessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier without its `.version` suffix; the join key of the ledger.
    pub fn base(&self) -> &str {
        base_accession(&self.0)
    }
}

pub fn base_accession(id: &str) -> &str {
    id.split_once('.').map(|(head, _)| head).unwrap_or(id)
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccessionId {
    type Err = RefgenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let (head, version) = match normalized.split_once('.') {
            Some((head, version)) => (head, Some(version)),
            None => (normalized, None),
        };
        let head_ok =
            !head.is_empty() && head.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        let version_ok = version
            .map(|v| !v.is_empty() && v.chars().all(|ch| ch.is_ascii_digit()))
            .unwrap_or(true);
        if !head_ok || !version_ok {
            return Err(RefgenError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeSummary {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub organism: Option<String>,
    pub taxid: Option<String>,
    pub genome: Option<String>,
    pub sourcedb: Option<String>,
    pub topology: Option<String>,
    pub slen: Option<String>,
    pub updatedate: Option<String>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accession_base_strips_version() {
        let acc: AccessionId = "NC_000932.1".parse().unwrap();
        assert_eq!(acc.as_str(), "NC_000932.1");
        assert_eq!(acc.base(), "NC_000932");

        let bare: AccessionId = " AP000423 ".parse().unwrap();
        assert_eq!(bare.base(), "AP000423");
    }

    #[test]
    fn accession_rejects_garbage() {
        assert_matches!(
            "NC 000932".parse::<AccessionId>(),
            Err(RefgenError::InvalidAccession(_))
        );
        assert_matches!(
            "NC_000932.x".parse::<AccessionId>(),
            Err(RefgenError::InvalidAccession(_))
        );
        assert_matches!("".parse::<AccessionId>(), Err(RefgenError::InvalidAccession(_)));
    }

    #[test]
    fn record_format_names() {
        assert_eq!("gb".parse::<RecordFormat>().unwrap(), RecordFormat::GenBank);
        assert_eq!("GenBank".parse::<RecordFormat>().unwrap(), RecordFormat::GenBank);
        assert_eq!(RecordFormat::Fasta.rettype(), "fasta");
        assert_matches!("embl".parse::<RecordFormat>(), Err(RefgenError::InvalidFormat(_)));
    }
}
