use super::MatchReport;
use crate::model::Severity;
use anyhow::Result;
use std::fmt::Write as _;
use std::io::IsTerminal;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "ID")]
    vendor_id: String,
    #[tabled(rename = "CVE")]
    cve: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Renders the report as tables. Severities are ANSI-coloured only when
/// `colour` is set.
pub fn render_table(report: &MatchReport<'_>, colour: bool) -> String {
    let mut out = String::new();

    let mut entries: Vec<_> = report.results.values().flatten().collect();
    entries.sort_by(|a, b| {
        b.normalized_severity
            .cmp(&a.normalized_severity)
            .then_with(|| a.source_package.id.cmp(&b.source_package.id))
    });

    if entries.is_empty() {
        let _ = writeln!(out, "No vulnerabilities found.");
    } else {
        let _ = writeln!(out, "Found {} vulnerabilities:", report.vulnerability_count());
        let _ = writeln!(out);

        let rows: Vec<VulnRow> = entries
            .iter()
            .map(|v| VulnRow {
                severity: format_severity(v.normalized_severity, colour),
                package: truncate(&v.source_package.to_string(), 40),
                vendor_id: v.vendor_id.clone(),
                cve: or_dash(v.cve_ids.join(", ")),
                title: truncate(&v.title, 50),
                fixed_in: or_dash(v.fixed_in_versions.join(", ")),
            })
            .collect();

        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Could not query {} packages (results are incomplete):",
            report.failures.len()
        );
        let _ = writeln!(out);

        let rows: Vec<FailureRow> = report
            .failures
            .iter()
            .map(|f| FailureRow {
                package: truncate(&f.record.to_string(), 40),
                error: truncate(&f.error.to_string(), 60),
            })
            .collect();
        let _ = writeln!(out, "{}", Table::new(rows).with(Style::rounded()));
    }

    let affected = report.results.values().filter(|v| !v.is_empty()).count();
    let _ = writeln!(out);
    let _ = write!(
        out,
        "Summary: {} packages queried, {} affected, {} failed",
        report.records.len(),
        affected,
        report.failures.len()
    );

    out
}

pub fn print_table(report: &MatchReport<'_>) -> Result<()> {
    println!();
    println!("{}", render_table(report, std::io::stdout().is_terminal()));
    Ok(())
}

fn format_severity(severity: Severity, colour: bool) -> String {
    if !colour {
        return severity.as_str().to_uppercase();
    }
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Negligible => "NEGLIGIBLE".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn or_dash(s: String) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
