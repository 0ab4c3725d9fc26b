use super::client::{ComponentAnalysisClient, PackageQuery};
use super::correlator::Correlator;
use super::Matcher;
use crate::error::{CorrelateError, QueryFailure};
use crate::model::{BatchResult, PackageRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ecosystem handled when none is configured.
pub const DEFAULT_ECOSYSTEM: &str = "pypi";

/// Remote matcher backed by the component analyses API.
///
/// Handles records of a single ecosystem and looks each one up remotely;
/// nothing is matched against a local vulnerability database.
pub struct CrdaMatcher<Q = ComponentAnalysisClient> {
    name: String,
    ecosystem: String,
    correlator: Correlator<Q>,
}

impl<Q: PackageQuery> CrdaMatcher<Q> {
    pub fn new(query: Q) -> Self {
        Self::from_correlator(Correlator::new(query))
    }

    pub fn from_correlator(correlator: Correlator<Q>) -> Self {
        Self {
            name: matcher_name(DEFAULT_ECOSYSTEM),
            ecosystem: DEFAULT_ECOSYSTEM.to_string(),
            correlator,
        }
    }

    pub fn with_ecosystem(mut self, ecosystem: impl Into<String>) -> Self {
        self.ecosystem = ecosystem.into().to_ascii_lowercase();
        self.name = matcher_name(&self.ecosystem);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.correlator = self.correlator.with_concurrency(concurrency);
        self
    }

    pub fn with_failure_sink(mut self, sink: mpsc::UnboundedSender<QueryFailure>) -> Self {
        self.correlator = self.correlator.with_failure_sink(sink);
        self
    }

    pub fn ecosystem(&self) -> &str {
        &self.ecosystem
    }

    pub fn correlator(&self) -> &Correlator<Q> {
        &self.correlator
    }

    /// Queries `records`, stopping early when `cancel` fires.
    pub async fn query_remote_until(
        &self,
        records: &[Arc<PackageRecord>],
        cancel: &CancellationToken,
    ) -> Result<BatchResult, CorrelateError> {
        debug!(matcher = %self.name, records = records.len(), "querying remote matcher");
        self.correlator.correlate_until(records, cancel).await
    }
}

fn matcher_name(ecosystem: &str) -> String {
    format!("crda-{ecosystem}")
}

#[async_trait]
impl<Q: PackageQuery> Matcher for CrdaMatcher<Q> {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self, record: &PackageRecord) -> bool {
        record.ecosystem.eq_ignore_ascii_case(&self.ecosystem)
    }

    async fn query_remote(
        &self,
        records: &[Arc<PackageRecord>],
    ) -> Result<BatchResult, CorrelateError> {
        debug!(matcher = %self.name, records = records.len(), "querying remote matcher");
        self.correlator.correlate(records).await
    }
}
