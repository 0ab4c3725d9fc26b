//! Core data types for package records and correlated vulnerabilities.
//!
//! - [`PackageRecord`] - A discovered package submitted for lookup
//! - [`VulnerabilityEntry`] - One vulnerability attributed to a record
//! - [`Severity`] - Ordered severity scale
//! - [`RepositoryDescriptor`] - Canonical source of an ecosystem
//! - [`BatchResult`] - Record id to vulnerabilities mapping
//!
//! # Example
//!
//! ```
//! use crda_matcher::{BatchResult, PackageRecord};
//!
//! let record = PackageRecord::new("pyyaml", "pyyaml", "5.3", "pypi");
//! let mut result = BatchResult::new();
//! result.insert(record.id.clone(), Vec::new());
//!
//! assert!(result["pyyaml"].is_empty());
//! ```

mod package;
mod severity;
mod vulnerability;

pub use package::*;
pub use severity::*;
pub use vulnerability::*;
