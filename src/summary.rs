use serde_json::Value;
use tracing::warn;

use crate::domain::{AccessionId, DEFAULT_DATABASE, GenomeSummary};
use crate::entrez::{EntrezRequest, EntrezTransport, Gateway};
use crate::error::RefgenError;

const SUMMARY_MAX_RESULTS: u32 = 10;
const SUMMARY_SORT: &str = "pdat";

pub struct SummaryResolver<'a, T: EntrezTransport> {
    gateway: &'a Gateway<T>,
    database: String,
}

impl<'a, T: EntrezTransport> SummaryResolver<'a, T> {
    pub fn new(gateway: &'a Gateway<T>) -> Self {
        Self::for_database(gateway, DEFAULT_DATABASE)
    }

    pub fn for_database(gateway: &'a Gateway<T>, database: &str) -> Self {
        Self {
            gateway,
            database: database.to_string(),
        }
    }

    /// `Ok(None)` when the response holds no usable summary.
    pub fn resolve(&self, accession: &AccessionId) -> Result<Option<GenomeSummary>, RefgenError> {
        let request = EntrezRequest::summary(
            &self.database,
            &[accession.as_str()],
            SUMMARY_MAX_RESULTS,
            SUMMARY_SORT,
            "json",
        );
        let body = self.gateway.call(&request)?;
        match serde_json::from_str::<Value>(&body) {
            Ok(raw) => Ok(extract_summary(&raw)),
            Err(err) => {
                warn!(accession = %accession, error = %err, "undecodable esummary response");
                Ok(None)
            }
        }
    }

    /// Identifiers in `database_to` linked to `ids` in `database_from`.
    pub fn links(
        &self,
        database_from: &str,
        database_to: &str,
        ids: &[&str],
    ) -> Result<Vec<String>, RefgenError> {
        let request = EntrezRequest::link(database_from, database_to, ids);
        let body = self.gateway.call(&request)?;
        match serde_json::from_str::<Value>(&body) {
            Ok(raw) => Ok(extract_links(&raw)),
            Err(err) => {
                warn!(error = %err, "undecodable elink response");
                Ok(Vec::new())
            }
        }
    }
}

pub fn extract_summary(raw: &Value) -> Option<GenomeSummary> {
    let result = raw.get("result")?;
    let uid = result
        .get("uids")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(value_text)?;
    let doc = result.get(uid.as_str())?;

    Some(GenomeSummary {
        uid: Some(uid.clone()),
        title: field(doc, "title"),
        organism: field(doc, "organism"),
        taxid: field(doc, "taxid"),
        genome: field(doc, "genome"),
        sourcedb: field(doc, "sourcedb"),
        topology: field(doc, "topology"),
        slen: field(doc, "slen"),
        updatedate: field(doc, "updatedate"),
    })
}

pub fn extract_links(raw: &Value) -> Vec<String> {
    let mut links = Vec::new();
    let linksets = raw.get("linksets").and_then(|v| v.as_array());
    for linkset in linksets.into_iter().flatten() {
        let dbs = linkset.get("linksetdbs").and_then(|v| v.as_array());
        for db in dbs.into_iter().flatten() {
            let ids = db.get("links").and_then(|v| v.as_array());
            links.extend(ids.into_iter().flatten().filter_map(value_text));
        }
    }
    links
}

fn field(doc: &Value, key: &str) -> Option<String> {
    doc.get(key).and_then(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct Canned {
        body: String,
        seen: Mutex<Vec<EntrezRequest>>,
    }

    impl Canned {
        fn new(body: &str) -> Self {
            Self {
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl EntrezTransport for Canned {
        fn send(&self, request: &EntrezRequest) -> Result<String, RefgenError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.body.clone())
        }
    }

    #[test]
    fn extract_summary_reads_first_uid() {
        let raw = json!({
            "result": {
                "uids": ["7524838"],
                "7524838": {
                    "title": "Arabidopsis thaliana chloroplast, complete genome",
                    "organism": "Arabidopsis thaliana",
                    "taxid": 3702,
                    "slen": 154478,
                    "topology": "circular",
                    "genome": "chloroplast",
                    "sourcedb": "refseq",
                    "updatedate": "2023/03/07"
                }
            }
        });
        let summary = extract_summary(&raw).unwrap();
        assert_eq!(summary.uid.as_deref(), Some("7524838"));
        assert_eq!(summary.taxid.as_deref(), Some("3702"));
        assert_eq!(summary.slen.as_deref(), Some("154478"));
        assert_eq!(summary.topology.as_deref(), Some("circular"));
    }

    #[test]
    fn missing_fields_become_none() {
        let raw = json!({"result": {"uids": ["1"], "1": {"title": "partial"}}});
        let summary = extract_summary(&raw).unwrap();
        assert_eq!(summary.title.as_deref(), Some("partial"));
        assert_eq!(summary.taxid, None);
        assert_eq!(summary.organism, None);
    }

    #[test]
    fn resolve_tolerates_non_json() {
        let gateway = Gateway::new(Canned::new("<html>busy</html>"));
        let acc: AccessionId = "NC_000932.1".parse().unwrap();
        let resolved = SummaryResolver::new(&gateway).resolve(&acc).unwrap();
        assert_eq!(resolved, None);

        let seen = gateway.transport().seen.lock().unwrap();
        assert_eq!(seen[0].param("retmax"), Some("10"));
        assert_eq!(seen[0].param("sort"), Some("pdat"));
        assert_eq!(seen[0].param("retmode"), Some("json"));
    }

    #[test]
    fn resolve_without_uids_is_none() {
        let gateway = Gateway::new(Canned::new(r#"{"result": {"uids": []}}"#));
        let acc: AccessionId = "NC_999999".parse().unwrap();
        assert_eq!(SummaryResolver::new(&gateway).resolve(&acc).unwrap(), None);
    }

    #[test]
    fn links_collects_all_linksets() {
        let body = json!({
            "linksets": [{
                "dbfrom": "protein",
                "linksetdbs": [
                    {"dbto": "nuccore", "links": ["11", "12"]},
                    {"dbto": "nuccore", "links": [13]}
                ]
            }]
        })
        .to_string();
        let gateway = Gateway::new(Canned::new(&body));
        let links = SummaryResolver::new(&gateway)
            .links("protein", "nuccore", &["555"])
            .unwrap();
        assert_eq!(links, vec!["11", "12", "13"]);
    }
}
