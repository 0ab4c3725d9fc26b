use super::report::{decode_report, Report};
use crate::error::QueryError;
use crate::model::{PackageRecord, RepositoryDescriptor, Severity, VulnerabilityEntry};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Production component analysis endpoint.
pub const DEFAULT_URL: &str = "https://gw.api.openshift.io";

/// Per-request deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const API_PATH: [&str; 3] = ["api", "v2", "component-analyses"];
const CLIENT_ID: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Looks up the vulnerabilities of a single package.
///
/// The correlator only depends on this trait, so any transport can be
/// plugged in behind it.
#[async_trait]
pub trait PackageQuery: Send + Sync + 'static {
    /// Queries one record. Every returned entry is attributed to `record`.
    async fn query(
        &self,
        record: &Arc<PackageRecord>,
    ) -> Result<Vec<VulnerabilityEntry>, QueryError>;
}

/// HTTP client for the component analyses API.
///
/// Issues exactly one `GET` per query, never retries and caches nothing.
pub struct ComponentAnalysisClient {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
    timeout: Duration,
    repository: Option<RepositoryDescriptor>,
}

impl ComponentAnalysisClient {
    /// Creates a client for the service rooted at `base`.
    ///
    /// `base` must be an `http` or `https` URL; any path it carries is kept
    /// as a prefix of the API path.
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            repository: None,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_repository(mut self, repository: Option<RepositoryDescriptor>) -> Self {
        self.repository = repository;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds `<base>/api/v2/component-analyses/<ecosystem>/<name>/<version>?user_key=<key>`.
    pub fn request_url(&self, record: &PackageRecord) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(API_PATH)
                .extend([&record.ecosystem, &record.name, &record.version]);
        }
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("user_key", key);
        }
        url
    }

    fn transport_error(&self, err: reqwest::Error) -> QueryError {
        // the url carries the access key
        QueryError::from_reqwest(err.without_url(), self.timeout)
    }
}

#[async_trait]
impl PackageQuery for ComponentAnalysisClient {
    async fn query(
        &self,
        record: &Arc<PackageRecord>,
    ) -> Result<Vec<VulnerabilityEntry>, QueryError> {
        debug!(record = %record.id, package = %record, "querying component analysis");

        let response = self
            .client
            .get(self.request_url(record))
            .header(USER_AGENT, CLIENT_ID)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        let report = decode_report(&body)?;

        debug!(
            record = %record.id,
            vulnerabilities = report.vulnerabilities.len(),
            "decoded component analysis"
        );

        Ok(attribute(report, record, self.repository.as_ref()))
    }
}

/// Turns a decoded report into entries owned by `record`.
///
/// Service order is preserved. When a vulnerability carries no fix list the
/// report's recommended version stands in for it.
pub(crate) fn attribute(
    report: Report,
    record: &Arc<PackageRecord>,
    repository: Option<&RepositoryDescriptor>,
) -> Vec<VulnerabilityEntry> {
    let Report {
        message,
        recommended_version,
        vulnerabilities,
    } = report;

    vulnerabilities
        .into_iter()
        .map(|vuln| {
            let raw_severity = vuln.severity.unwrap_or_default();
            let normalized_severity = match Severity::normalize(&raw_severity) {
                Severity::Unknown => vuln
                    .cvss_score
                    .map(Severity::from_cvss_score)
                    .unwrap_or_default(),
                severity => severity,
            };
            let fixed_in_versions = if vuln.fixed_in.is_empty() {
                recommended_version.iter().cloned().collect()
            } else {
                vuln.fixed_in
            };

            VulnerabilityEntry {
                title: vuln.title.unwrap_or_else(|| vuln.id.clone()),
                vendor_id: vuln.id,
                description: message.clone(),
                raw_severity,
                normalized_severity,
                cvss_score: vuln.cvss_score,
                cve_ids: vuln.cve_ids,
                fixed_in_versions,
                reference_links: vuln.url.into_iter().collect(),
                source_package: Arc::clone(record),
                repository: repository.cloned(),
            }
        })
        .collect()
}
