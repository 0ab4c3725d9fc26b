use super::{PackageRecord, Severity};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Static description of an ecosystem's canonical package source.
///
/// Supplied by configuration and stamped onto every entry; the remote
/// service never reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub uri: String,
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }

    /// The Python Package Index.
    pub fn pypi() -> Self {
        Self::new("pypi", "https://pypi.org/simple")
    }
}

/// A vulnerability attributed to exactly one package record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilityEntry {
    pub vendor_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub raw_severity: String,
    pub normalized_severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    pub cve_ids: Vec<String>,
    /// Empty when no fix is known.
    pub fixed_in_versions: Vec<String>,
    pub reference_links: Vec<String>,
    #[serde(serialize_with = "serialize_record_id")]
    pub source_package: Arc<PackageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryDescriptor>,
}

fn serialize_record_id<S: Serializer>(
    record: &Arc<PackageRecord>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&record.id)
}

/// Record id to vulnerabilities, in the order the service reported them.
///
/// A present key with an empty list means the record was queried and
/// nothing was found.
pub type BatchResult = HashMap<String, Vec<VulnerabilityEntry>>;
