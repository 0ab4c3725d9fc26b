mod json;
mod table;

pub use json::{print_json, render_json};
pub use table::{print_table, render_table};

use crate::error::QueryFailure;
use crate::model::{BatchResult, PackageRecord};
use anyhow::Result;
use std::sync::Arc;

/// Output format for match results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

/// Everything a single run produced.
pub struct MatchReport<'a> {
    pub records: &'a [Arc<PackageRecord>],
    pub results: &'a BatchResult,
    pub failures: &'a [QueryFailure],
}

impl MatchReport<'_> {
    pub fn vulnerability_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }
}

pub fn print_result(report: &MatchReport<'_>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_table(report),
        OutputFormat::Json => print_json(report),
    }
}

/// Format result to string for file output
pub fn format_result_to_string(report: &MatchReport<'_>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(report),
        OutputFormat::Table => Ok(render_table(report, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("table"), Ok(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("JSON"), Ok(OutputFormat::Json));
        assert!(OutputFormat::from_str("sarif").is_err());
    }

    #[test]
    fn test_table_file_output_is_plain() {
        use crate::model::{Severity, VulnerabilityEntry};

        let pyyaml = PackageRecord::new("pyyaml", "pyyaml", "5.3", "pypi").shared();
        let mut results = BatchResult::new();
        results.insert(
            "pyyaml".into(),
            vec![VulnerabilityEntry {
                vendor_id: "SNYK-PYTHON-PYYAML-590151".into(),
                title: "Arbitrary Code Execution".into(),
                description: None,
                raw_severity: "critical".into(),
                normalized_severity: Severity::Critical,
                cvss_score: None,
                cve_ids: Vec::new(),
                fixed_in_versions: Vec::new(),
                reference_links: Vec::new(),
                source_package: Arc::clone(&pyyaml),
                repository: None,
            }],
        );
        let records = vec![pyyaml];
        let report = MatchReport {
            records: &records,
            results: &results,
            failures: &[],
        };

        let saved = format_result_to_string(&report, OutputFormat::Table).unwrap();

        assert!(saved.contains("CRITICAL"));
        assert!(!saved.contains('\x1b'));
    }
}
