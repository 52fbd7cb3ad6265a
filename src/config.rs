use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{AccessionId, DEFAULT_DATABASE, RecordFormat};
use crate::error::RefgenError;

pub const CONFIG_FILE: &str = "refgen.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Credentials {
    /// Fill blanks from `NCBI_EMAIL` and `NCBI_API_KEY`; environment values win.
    pub fn with_env(mut self) -> Self {
        if let Some(email) = non_blank_env("NCBI_EMAIL") {
            self.email = Some(email);
        }
        if let Some(key) = non_blank_env("NCBI_API_KEY") {
            self.api_key = Some(key);
        }
        self
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub ledger: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub format: Option<RecordFormat>,
    #[serde(default)]
    pub extend: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub taxa: Vec<String>,
    #[serde(default)]
    pub max_per_taxon: Option<u32>,
    #[serde(default)]
    pub genomes: Vec<GenomeEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GenomeEntry {
    Shorthand(String),
    Detailed(GenomeEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GenomeEntryObject {
    pub accession: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenomeRequest {
    pub accession: AccessionId,
    pub path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub credentials: Credentials,
    pub ledger: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub database: String,
    pub format: RecordFormat,
    pub extend: bool,
    pub force: bool,
    pub log: Option<Utf8PathBuf>,
    pub dataset_name: Option<String>,
    pub taxa: Vec<String>,
    pub max_per_taxon: Option<u32>,
    pub genomes: Vec<GenomeRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RefgenError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(RefgenError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| RefgenError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RefgenError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RefgenError> {
        if config.extend && config.force {
            return Err(RefgenError::ConflictingLedgerMode);
        }

        let genomes = config
            .genomes
            .into_iter()
            .map(|entry| match entry {
                GenomeEntry::Shorthand(value) => Ok(GenomeRequest {
                    accession: value.parse()?,
                    path: None,
                }),
                GenomeEntry::Detailed(obj) => Ok(GenomeRequest {
                    accession: obj.accession.parse()?,
                    path: obj.path.map(Utf8PathBuf::from),
                }),
            })
            .collect::<Result<Vec<_>, RefgenError>>()?;

        Ok(ResolvedConfig {
            credentials: config.credentials.with_env(),
            ledger: Utf8PathBuf::from(config.ledger.unwrap_or_else(default_ledger)),
            output_dir: Utf8PathBuf::from(config.output_dir.unwrap_or_else(default_output_dir)),
            database: config
                .database
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            format: config.format.unwrap_or_default(),
            extend: config.extend,
            force: config.force,
            log: config.log.map(Utf8PathBuf::from),
            dataset_name: config.dataset_name,
            taxa: config.taxa,
            max_per_taxon: config.max_per_taxon,
            genomes,
        })
    }
}

pub fn default_ledger() -> String {
    "genomes.csv".to_string()
}

pub fn default_output_dir() -> String {
    "genomes".to_string()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn empty_config() -> Config {
        serde_json::from_str("{}").unwrap()
    }

    #[test]
    fn defaults_fill_in() {
        let resolved = ConfigLoader::resolve_config(empty_config()).unwrap();
        assert_eq!(resolved.database, "nuccore");
        assert_eq!(resolved.format, RecordFormat::Fasta);
        assert_eq!(resolved.ledger, Utf8PathBuf::from("genomes.csv"));
        assert!(resolved.genomes.is_empty());
    }

    #[test]
    fn extend_and_force_conflict() {
        let mut config = empty_config();
        config.extend = true;
        config.force = true;
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(RefgenError::ConflictingLedgerMode)
        );
    }
}
