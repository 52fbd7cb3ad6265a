use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::warn;

use crate::config::Credentials;
use crate::error::RefgenError;

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrezOperation {
    Summary,
    Fetch,
    Link,
}

impl EntrezOperation {
    pub fn endpoint(self) -> &'static str {
        match self {
            EntrezOperation::Summary => "esummary.fcgi",
            EntrezOperation::Fetch => "efetch.fcgi",
            EntrezOperation::Link => "elink.fcgi",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrezRequest {
    pub operation: EntrezOperation,
    pub params: Vec<(String, String)>,
}

impl EntrezRequest {
    pub fn summary(
        database: &str,
        ids: &[&str],
        max_results: u32,
        sort_order: &str,
        format: &str,
    ) -> Self {
        Self {
            operation: EntrezOperation::Summary,
            params: vec![
                ("db".to_string(), database.to_string()),
                ("id".to_string(), ids.join(",")),
                ("retmax".to_string(), max_results.to_string()),
                ("sort".to_string(), sort_order.to_string()),
                ("retmode".to_string(), format.to_string()),
            ],
        }
    }

    pub fn batch_fetch(database: &str, ids: &[&str], return_type: &str, return_mode: &str) -> Self {
        Self {
            operation: EntrezOperation::Fetch,
            params: vec![
                ("db".to_string(), database.to_string()),
                ("id".to_string(), ids.join(",")),
                ("rettype".to_string(), return_type.to_string()),
                ("retmode".to_string(), return_mode.to_string()),
            ],
        }
    }

    pub fn link(database_from: &str, database_to: &str, ids: &[&str]) -> Self {
        Self {
            operation: EntrezOperation::Link,
            params: vec![
                ("dbfrom".to_string(), database_from.to_string()),
                ("db".to_string(), database_to.to_string()),
                ("id".to_string(), ids.join(",")),
                ("retmode".to_string(), "json".to_string()),
            ],
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Identifiers carried by the `id` parameter.
    pub fn ids(&self) -> Vec<&str> {
        self.param("id")
            .map(|ids| ids.split(',').filter(|id| !id.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Single-attempt access to E-utilities. Retrying is the gateway's job.
pub trait EntrezTransport: Send + Sync {
    fn send(&self, request: &EntrezRequest) -> Result<String, RefgenError>;
}

impl<T: EntrezTransport + ?Sized> EntrezTransport for &T {
    fn send(&self, request: &EntrezRequest) -> Result<String, RefgenError> {
        (**self).send(request)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
    pub retryable: fn(&RefgenError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
            retryable: RefgenError::is_transient,
        }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            ..Self::unbounded()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

pub struct Gateway<T: EntrezTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: EntrezTransport> Gateway<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn call(&self, request: &EntrezRequest) -> Result<String, RefgenError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.transport.send(request) {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };
            if !(self.policy.retryable)(&err) {
                return Err(err);
            }
            if let Some(max) = self.policy.max_attempts {
                if attempt >= max {
                    return Err(RefgenError::RetriesExhausted {
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            }
            warn!(
                operation = ?request.operation,
                attempt,
                error = %err,
                "retrying Entrez request"
            );
            if !self.policy.backoff.is_zero() {
                thread::sleep(self.policy.backoff);
            }
        }
    }
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl EntrezHttpClient {
    pub fn new(credentials: Credentials) -> Result<Self, RefgenError> {
        Self::with_base_url(credentials, EUTILS_BASE_URL)
    }

    pub fn with_base_url(credentials: Credentials, base_url: &str) -> Result<Self, RefgenError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("refgen/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RefgenError::EntrezHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| RefgenError::EntrezHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn form(&self, request: &EntrezRequest) -> Vec<(String, String)> {
        let mut form = request.params.clone();
        form.push(("tool".to_string(), "refgen".to_string()));
        if let Some(email) = &self.credentials.email {
            form.push(("email".to_string(), email.clone()));
        }
        if let Some(key) = &self.credentials.api_key {
            form.push(("api_key".to_string(), key.clone()));
        }
        form
    }
}

impl EntrezTransport for EntrezHttpClient {
    fn send(&self, request: &EntrezRequest) -> Result<String, RefgenError> {
        let url = format!("{}/{}", self.base_url, request.operation.endpoint());
        let response = self
            .client
            .post(&url)
            .form(&self.form(request))
            .send()
            .map_err(|err| classify_error(&err))?;

        let status = response.status().as_u16();
        if is_retryable_status(status) {
            return Err(RefgenError::Transient(format!("status {status} from {url}")));
        }
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Entrez request failed".to_string());
            return Err(RefgenError::EntrezStatus { status, message });
        }
        // A body cut short mid-stream is the classic incomplete-read case.
        response.text().map_err(|err| classify_error(&err))
    }
}

fn classify_error(err: &reqwest::Error) -> RefgenError {
    if is_retryable_error(err) {
        RefgenError::Transient(err.to_string())
    } else {
        RefgenError::EntrezHttp(err.to_string())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    struct Flaky {
        failures: Mutex<u32>,
        calls: Mutex<u32>,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }
    }

    impl EntrezTransport for Flaky {
        fn send(&self, _request: &EntrezRequest) -> Result<String, RefgenError> {
            *self.calls.lock().unwrap() += 1;
            let mut left = self.failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(RefgenError::Transient("connection reset".to_string()));
            }
            Ok("ok".to_string())
        }
    }

    struct BadParams;

    impl EntrezTransport for BadParams {
        fn send(&self, _request: &EntrezRequest) -> Result<String, RefgenError> {
            Err(RefgenError::EntrezStatus {
                status: 400,
                message: "bad id".to_string(),
            })
        }
    }

    fn request() -> EntrezRequest {
        EntrezRequest::batch_fetch("nuccore", &["NC_000932"], "fasta", "text")
    }

    #[test]
    fn retries_until_success() {
        let gateway = Gateway::new(Flaky::new(5));
        assert_eq!(gateway.call(&request()).unwrap(), "ok");
        assert_eq!(*gateway.transport().calls.lock().unwrap(), 6);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let gateway = Gateway::with_policy(Flaky::new(10), RetryPolicy::bounded(3));
        assert_matches!(
            gateway.call(&request()),
            Err(RefgenError::RetriesExhausted { attempts: 3, .. })
        );
        assert_eq!(*gateway.transport().calls.lock().unwrap(), 3);
    }

    #[test]
    fn backoff_waits_between_attempts() {
        let policy = RetryPolicy::bounded(3).with_backoff(Duration::from_millis(5));
        let gateway = Gateway::with_policy(Flaky::new(2), policy);
        let start = std::time::Instant::now();
        assert_eq!(gateway.call(&request()).unwrap(), "ok");
        assert_eq!(*gateway.transport().calls.lock().unwrap(), 3);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn non_transient_errors_propagate_at_once() {
        let gateway = Gateway::new(BadParams);
        assert_matches!(
            gateway.call(&request()),
            Err(RefgenError::EntrezStatus { status: 400, .. })
        );
    }

    #[test]
    fn request_builders_join_ids() {
        let req = EntrezRequest::summary("nuccore", &["A1", "B2"], 10, "pdat", "json");
        assert_eq!(req.operation, EntrezOperation::Summary);
        assert_eq!(req.param("id"), Some("A1,B2"));
        assert_eq!(req.param("retmax"), Some("10"));
        assert_eq!(req.ids(), vec!["A1", "B2"]);

        let link = EntrezRequest::link("protein", "nuccore", &["123"]);
        assert_eq!(link.param("dbfrom"), Some("protein"));
        assert_eq!(link.operation.endpoint(), "elink.fcgi");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
    }
}
