use serde::{Deserialize, Serialize};

/// Ordered severity scale.
///
/// Variant order is the ordering: `Unknown < Negligible < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Unknown,
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Normalizes a vendor severity label.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Empty or unrecognized labels map to [`Severity::Unknown`].
    ///
    /// ```
    /// use crda_matcher::Severity;
    ///
    /// assert_eq!(Severity::normalize("Moderate"), Severity::Medium);
    /// assert_eq!(Severity::normalize("bogus"), Severity::Unknown);
    /// ```
    pub fn normalize(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "negligible" => Severity::Negligible,
            "low" => Severity::Low,
            "medium" | "moderate" => Severity::Medium,
            "high" | "important" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }

    /// Maps a numeric CVSS base score onto the scale.
    pub fn from_cvss_score(score: f32) -> Self {
        match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Negligible => "negligible",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
