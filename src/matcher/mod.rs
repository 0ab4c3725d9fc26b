//! Remote vulnerability matching.
//!
//! [`CrdaMatcher`] is the one concrete [`Matcher`]: it fans a batch of
//! records out through a [`Correlator`] to a [`ComponentAnalysisClient`]
//! and returns a [`BatchResult`] keyed by record id.
//!
//! # Example
//!
//! ```no_run
//! use crda_matcher::matcher::{ComponentAnalysisClient, CrdaMatcher, Matcher};
//! use crda_matcher::PackageRecord;
//! use reqwest::Url;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ComponentAnalysisClient::new(Url::parse("https://gw.api.openshift.io")?)
//!         .with_api_key("my-key");
//!     let matcher = CrdaMatcher::new(client);
//!
//!     let records = vec![PackageRecord::new("pyyaml", "pyyaml", "5.3", "pypi").shared()];
//!     let result = matcher.query_remote(&records).await?;
//!
//!     for entry in &result["pyyaml"] {
//!         println!("{} {}", entry.vendor_id, entry.normalized_severity);
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod correlator;
mod crda;
mod report;
mod set;

pub use client::{ComponentAnalysisClient, PackageQuery, DEFAULT_TIMEOUT, DEFAULT_URL};
pub use correlator::{Correlator, DEFAULT_CONCURRENCY};
pub use crda::{CrdaMatcher, DEFAULT_ECOSYSTEM};
pub use report::{decode_report, Report, ReportedVulnerability};
pub use set::MatcherSet;

use crate::error::CorrelateError;
use crate::model::{BatchResult, PackageRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// A matcher that looks records up in a remote service.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Unique name of this matcher within a [`MatcherSet`].
    fn name(&self) -> &str;

    /// Returns true if this matcher can look up `record`.
    fn filter(&self, record: &PackageRecord) -> bool;

    /// Looks up every record.
    ///
    /// Per-record failures do not fail the call; an error means the batch
    /// was rejected before anything was sent.
    async fn query_remote(
        &self,
        records: &[Arc<PackageRecord>],
    ) -> Result<BatchResult, CorrelateError>;
}
