pub mod config;
pub mod error;
pub mod matcher;
pub mod model;
pub mod output;

pub use config::Config;
pub use error::{ConfigError, CorrelateError, QueryError, QueryFailure};
pub use matcher::{CrdaMatcher, Matcher, MatcherSet};
pub use model::{BatchResult, PackageRecord, RepositoryDescriptor, Severity, VulnerabilityEntry};
