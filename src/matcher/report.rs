//! Component analysis report decoding.

use serde::de::{Error as _, Unexpected};
use serde::Deserialize;

/// One decoded response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub message: Option<String>,
    pub recommended_version: Option<String>,
    pub vulnerabilities: Vec<ReportedVulnerability>,
}

/// A vulnerability as reported by the service, before it is attributed
/// to a package record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedVulnerability {
    pub id: String,
    pub title: Option<String>,
    pub severity: Option<String>,
    pub cvss_score: Option<f32>,
    pub cve_ids: Vec<String>,
    pub url: Option<String>,
    pub fixed_in: Vec<String>,
}

#[derive(Deserialize)]
struct RawReport {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    recommended_versions: Option<String>,
    #[serde(default)]
    vulnerability: Option<Vec<RawVulnerability>>,
}

#[derive(Deserialize)]
struct RawVulnerability {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    cvss: Option<RawScore>,
    #[serde(default)]
    cve_ids: Option<Vec<String>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    fixed_in: Option<Vec<String>>,
}

// The service has sent the score both as a JSON number and as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScore {
    Number(f32),
    Text(String),
}

impl RawScore {
    fn value(self) -> Option<f32> {
        match self {
            RawScore::Number(n) => Some(n),
            RawScore::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Decodes one response body.
///
/// A missing, `null` or empty `vulnerability` list yields a report with no
/// vulnerabilities. Anything other than a JSON object of the expected shape
/// is an error.
pub fn decode_report(body: &[u8]) -> Result<Report, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(serde_json::Error::invalid_type(
            unexpected(&value),
            &"a component analysis report object",
        ));
    }

    let raw: RawReport = serde_json::from_value(value)?;
    let vulnerabilities = raw
        .vulnerability
        .unwrap_or_default()
        .into_iter()
        .map(|v| ReportedVulnerability {
            id: v.id,
            title: v.title,
            severity: v.severity,
            cvss_score: v.cvss.and_then(RawScore::value),
            cve_ids: v.cve_ids.unwrap_or_default(),
            url: v.url.filter(|u| !u.is_empty()),
            fixed_in: v.fixed_in.unwrap_or_default(),
        })
        .collect();

    Ok(Report {
        message: raw.message.filter(|m| !m.is_empty()),
        recommended_version: raw.recommended_versions.filter(|v| !v.is_empty()),
        vulnerabilities,
    })
}

fn unexpected(value: &serde_json::Value) -> Unexpected<'_> {
    match value {
        serde_json::Value::Null => Unexpected::Unit,
        serde_json::Value::Bool(b) => Unexpected::Bool(*b),
        serde_json::Value::Number(_) => Unexpected::Other("number"),
        serde_json::Value::String(s) => Unexpected::Str(s),
        serde_json::Value::Array(_) => Unexpected::Seq,
        serde_json::Value::Object(_) => Unexpected::Map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYYAML: &str = r#"{
        "message": "pyyaml 5.3 has 1 known security vulnerability",
        "recommended_versions": "5.4",
        "vulnerability": [
            {
                "id": "SNYK-PYTHON-PYYAML-590151",
                "cvss": "9.8",
                "cve_ids": ["CVE-2020-14343"],
                "severity": "critical",
                "title": "Arbitrary Code Execution",
                "url": "https://snyk.io/vuln/SNYK-PYTHON-PYYAML-590151",
                "fixed_in": ["5.4"]
            }
        ]
    }"#;

    #[test]
    fn test_decode_full_report() {
        let report = decode_report(PYYAML.as_bytes()).unwrap();

        assert_eq!(report.recommended_version.as_deref(), Some("5.4"));
        assert_eq!(report.vulnerabilities.len(), 1);

        let vuln = &report.vulnerabilities[0];
        assert_eq!(vuln.id, "SNYK-PYTHON-PYYAML-590151");
        assert_eq!(vuln.cvss_score, Some(9.8));
        assert_eq!(vuln.cve_ids, vec!["CVE-2020-14343"]);
        assert_eq!(vuln.severity.as_deref(), Some("critical"));
        assert_eq!(vuln.fixed_in, vec!["5.4"]);
    }

    #[test]
    fn test_decode_empty_list() {
        let report = decode_report(br#"{"message": "no vulnerabilities", "vulnerability": []}"#)
            .unwrap();
        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.message.as_deref(), Some("no vulnerabilities"));
    }

    #[test]
    fn test_decode_null_or_missing_list() {
        assert!(decode_report(br#"{"vulnerability": null}"#)
            .unwrap()
            .vulnerabilities
            .is_empty());
        assert!(decode_report(b"{}").unwrap().vulnerabilities.is_empty());
    }

    #[test]
    fn test_decode_missing_optional_fields() {
        let report = decode_report(br#"{"vulnerability": [{"id": "V-1"}]}"#).unwrap();
        let vuln = &report.vulnerabilities[0];

        assert!(vuln.fixed_in.is_empty());
        assert!(vuln.cve_ids.is_empty());
        assert_eq!(vuln.url, None);
        assert_eq!(vuln.severity, None);
        assert_eq!(vuln.cvss_score, None);
    }

    #[test]
    fn test_decode_numeric_and_garbage_scores() {
        let report = decode_report(
            br#"{"vulnerability": [{"id": "A", "cvss": 7.5}, {"id": "B", "cvss": "n/a"}]}"#,
        )
        .unwrap();
        assert_eq!(report.vulnerabilities[0].cvss_score, Some(7.5));
        assert_eq!(report.vulnerabilities[1].cvss_score, None);
    }

    #[test]
    fn test_decode_preserves_service_order() {
        let report = decode_report(
            br#"{"vulnerability": [{"id": "3"}, {"id": "1"}, {"id": "2"}]}"#,
        )
        .unwrap();
        let ids: Vec<_> = report.vulnerabilities.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["3", "1", "2"]);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_report(b"").is_err());
        assert!(decode_report(b"<html>502 Bad Gateway</html>").is_err());
        assert!(decode_report(b"[]").is_err());
        assert!(decode_report(b"null").is_err());
        assert!(decode_report(br#"{"vulnerability": {"id": "V-1"}}"#).is_err());
        assert!(decode_report(br#"{"vulnerability": [{"title": "no id"}]}"#).is_err());
    }
}
