use super::MatchReport;
use crate::model::VulnerabilityEntry;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct JsonReport<'a> {
    results: BTreeMap<&'a str, &'a [VulnerabilityEntry]>,
    failures: Vec<JsonFailure<'a>>,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    record: &'a str,
    package: String,
    error: String,
}

pub fn render_json(report: &MatchReport<'_>) -> Result<String> {
    let json = JsonReport {
        results: report
            .results
            .iter()
            .map(|(id, entries)| (id.as_str(), entries.as_slice()))
            .collect(),
        failures: report
            .failures
            .iter()
            .map(|f| JsonFailure {
                record: &f.record.id,
                package: f.record.to_string(),
                error: f.error.to_string(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

pub fn print_json(report: &MatchReport<'_>) -> Result<()> {
    println!("{}", render_json(report)?);
    Ok(())
}
