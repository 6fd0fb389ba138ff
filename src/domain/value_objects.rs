//! Domain value objects representing immutable concepts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;

/// Platform identifier binding an SBOM artifact to the registry namespace (CPE 2.3 string).
/// Treated as opaque; only emptiness is validated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CpeName(String);

impl CpeName {
    /// Create a new component identifier, trimming surrounding whitespace
    pub fn new(cpe: impl Into<String>) -> Result<Self, DomainError> {
        let cpe = cpe.into();
        let trimmed = cpe.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidInput {
                field: "cpe".to_string(),
                message: "Component identifier cannot be empty".to_string(),
            });
        }
        Ok(CpeName(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CpeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed vulnerability identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VulnerabilityId(String);

impl VulnerabilityId {
    /// Create a new VulnerabilityId with validation
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err(DomainError::InvalidVulnerabilityId { id: id.to_string() });
        }

        if id.len() > 100 {
            return Err(DomainError::InvalidVulnerabilityId {
                id: format!("{}...", id.chars().take(32).collect::<String>()),
            });
        }

        Ok(VulnerabilityId(id.to_string()))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is a CVE identifier
    pub fn is_cve(&self) -> bool {
        self.0.starts_with("CVE-")
    }

    /// Case-insensitive identity check, registry IDs are upper-case but user input is not
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for VulnerabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VulnerabilityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Severity band used for ranking. Variant order is the ranking order (Unknown lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeverityBand {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityBand {
    /// Map a verbatim registry severity string ("CRITICAL", "High", ...) onto a band
    pub fn from_verbatim(severity: Option<&str>) -> Self {
        match severity.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") => SeverityBand::Critical,
            Some("high") => SeverityBand::High,
            Some("medium") | Some("moderate") => SeverityBand::Medium,
            Some("low") => SeverityBand::Low,
            _ => SeverityBand::Unknown,
        }
    }
}

impl fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeverityBand::Unknown => write!(f, "Unknown"),
            SeverityBand::Low => write!(f, "Low"),
            SeverityBand::Medium => write!(f, "Medium"),
            SeverityBand::High => write!(f, "High"),
            SeverityBand::Critical => write!(f, "Critical"),
        }
    }
}

/// CVSS scheme a record's scores were taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CvssVersion {
    #[serde(rename = "3.1")]
    V31,
    #[serde(rename = "2.0")]
    V2,
}

impl fmt::Display for CvssVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CvssVersion::V31 => write!(f, "3.1"),
            CvssVersion::V2 => write!(f, "2.0"),
        }
    }
}

/// Remediation status of a single finding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum FixStatus {
    #[default]
    Pending,
    Applied,
    Rejected,
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixStatus::Pending => write!(f, "Pending"),
            FixStatus::Applied => write!(f, "Applied"),
            FixStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl FromStr for FixStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(FixStatus::Pending),
            "applied" | "fixed" => Ok(FixStatus::Applied),
            "rejected" => Ok(FixStatus::Rejected),
            _ => Err(DomainError::InvalidFixStatus {
                status: s.to_string(),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for FixStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpe_name_trims_and_rejects_empty() {
        let cpe = CpeName::new("  cpe:2.3:a:openssl:openssl:1.1.1:*:*:*:*:*:*:*  ").unwrap();
        assert_eq!(cpe.as_str(), "cpe:2.3:a:openssl:openssl:1.1.1:*:*:*:*:*:*:*");
        assert!(CpeName::new("   ").is_err());
    }

    #[test]
    fn test_vulnerability_id_validation() {
        let id = VulnerabilityId::new("CVE-2021-44228").unwrap();
        assert!(id.is_cve());
        assert!(id.matches("cve-2021-44228"));
        assert!(VulnerabilityId::new("").is_err());
        assert!(VulnerabilityId::new("x".repeat(101)).is_err());
    }

    #[test]
    fn test_severity_band_ordering() {
        assert!(SeverityBand::Critical > SeverityBand::High);
        assert!(SeverityBand::High > SeverityBand::Medium);
        assert!(SeverityBand::Medium > SeverityBand::Low);
        assert!(SeverityBand::Low > SeverityBand::Unknown);
    }

    #[test]
    fn test_severity_band_from_verbatim() {
        assert_eq!(SeverityBand::from_verbatim(Some("CRITICAL")), SeverityBand::Critical);
        assert_eq!(SeverityBand::from_verbatim(Some("High")), SeverityBand::High);
        assert_eq!(SeverityBand::from_verbatim(Some("MEDIUM")), SeverityBand::Medium);
        assert_eq!(SeverityBand::from_verbatim(Some("low")), SeverityBand::Low);
        assert_eq!(SeverityBand::from_verbatim(Some("NONE")), SeverityBand::Unknown);
        assert_eq!(SeverityBand::from_verbatim(None), SeverityBand::Unknown);
    }

    #[test]
    fn test_fix_status_parsing() {
        assert_eq!("Applied".parse::<FixStatus>().unwrap(), FixStatus::Applied);
        assert_eq!("pending".parse::<FixStatus>().unwrap(), FixStatus::Pending);
        assert_eq!("REJECTED".parse::<FixStatus>().unwrap(), FixStatus::Rejected);
        assert!("done-ish".parse::<FixStatus>().is_err());

        let status: FixStatus = serde_json::from_str("\"applied\"").unwrap();
        assert_eq!(status, FixStatus::Applied);
        assert_eq!(serde_json::to_string(&FixStatus::Pending).unwrap(), "\"Pending\"");
    }
}
