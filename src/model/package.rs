use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A discovered package instance.
///
/// `id` is unique within a batch and is the key results are correlated by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub ecosystem: String,
}

impl PackageRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        ecosystem: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ecosystem: ecosystem.into(),
        }
    }

    /// Wraps the record for sharing with the matcher.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl std::fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.ecosystem, self.name, self.version)
    }
}
