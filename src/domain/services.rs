//! Domain services containing business logic
//!
//! Everything here is synchronous and side-effect free; the async layers call into it
//! after all outbound I/O for a request has completed.

use super::{
    CpeName, CvssVersion, FixEntry, FixStatus, PrioritizedFinding, RawCvssMetric,
    RawRegistryRecord, Sbom, SeverityBand, VexDocument, VexStatement, VulnerabilityId,
    VulnerabilityRecord,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

const NO_DESCRIPTION: &str = "No description available";

/// Service extracting canonical scores from heterogeneous registry records
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a raw record. Returns `None` for records without a registry ID.
    ///
    /// Metric selection: CVSS v3.1 block if present, otherwise v2, otherwise no scores.
    pub fn normalize(
        &self,
        raw: &RawRegistryRecord,
        component: Option<&CpeName>,
    ) -> Option<VulnerabilityRecord> {
        let id = VulnerabilityId::new(raw.id.as_str()).ok()?;

        let description = raw
            .descriptions
            .iter()
            .find(|d| d.lang == "en" && !d.value.trim().is_empty())
            .or_else(|| raw.descriptions.first())
            .map(|d| d.value.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        let selected = raw
            .metrics
            .cvss_metric_v31
            .first()
            .map(|m| (CvssVersion::V31, m))
            .or_else(|| {
                raw.metrics
                    .cvss_metric_v2
                    .first()
                    .map(|m| (CvssVersion::V2, m))
            });

        let record = match selected {
            Some((version, metric)) => VulnerabilityRecord {
                id,
                description,
                base_score: metric.cvss_data.base_score,
                exploitability_score: metric.exploitability_score,
                impact_score: metric.impact_score,
                base_severity: Self::block_severity(metric),
                cvss_version: Some(version),
                component: component.cloned(),
            },
            None => VulnerabilityRecord {
                id,
                description,
                base_score: None,
                exploitability_score: None,
                impact_score: None,
                base_severity: None,
                cvss_version: None,
                component: component.cloned(),
            },
        };

        Some(record)
    }

    /// Normalize a batch, discarding records that carry no registry ID
    pub fn normalize_all(
        &self,
        raw: &[RawRegistryRecord],
        component: Option<&CpeName>,
    ) -> Vec<VulnerabilityRecord> {
        let records: Vec<_> = raw
            .iter()
            .filter_map(|r| self.normalize(r, component))
            .collect();
        if records.len() < raw.len() {
            tracing::warn!(
                discarded = raw.len() - records.len(),
                "Discarded registry records without an ID"
            );
        }
        records
    }

    fn block_severity(metric: &RawCvssMetric) -> Option<String> {
        metric
            .cvss_data
            .base_severity
            .clone()
            .or_else(|| metric.base_severity.clone())
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Service ordering findings for remediation
pub struct PrioritizationEngine;

impl PrioritizationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Total order: band desc, base score desc, exploitability desc, registry ID asc.
    /// Absent scores sort below any present score.
    pub fn compare(a: &VulnerabilityRecord, b: &VulnerabilityRecord) -> Ordering {
        b.severity_band()
            .cmp(&a.severity_band())
            .then_with(|| Self::compare_score_desc(a.base_score, b.base_score))
            .then_with(|| {
                Self::compare_score_desc(a.exploitability_score, b.exploitability_score)
            })
            .then_with(|| a.id.cmp(&b.id))
    }

    fn compare_score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Rank one product's findings. Repeated registry IDs keep their first occurrence,
    /// compared without regard to case.
    pub fn prioritize(&self, findings: Vec<VulnerabilityRecord>) -> Vec<PrioritizedFinding> {
        let mut seen = HashSet::new();
        let mut unique: Vec<VulnerabilityRecord> = findings
            .into_iter()
            .filter(|f| seen.insert(f.id.as_str().to_ascii_uppercase()))
            .collect();

        unique.sort_by(Self::compare);

        unique
            .into_iter()
            .enumerate()
            .map(|(index, record)| PrioritizedFinding {
                rank: index + 1,
                bucket: record.severity_band(),
                record,
            })
            .collect()
    }
}

impl Default for PrioritizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Service producing remediation plans from ranked findings
pub struct FixPlanner;

impl FixPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn estimated_completion(bucket: SeverityBand) -> &'static str {
        match bucket {
            SeverityBand::Critical => "48 hours",
            SeverityBand::High => "1 week",
            SeverityBand::Medium => "2 weeks",
            SeverityBand::Low => "1 month",
            SeverityBand::Unknown => "2 weeks",
        }
    }

    pub fn plan(&self, prioritized: &[PrioritizedFinding]) -> Vec<FixEntry> {
        prioritized
            .iter()
            .map(|finding| FixEntry {
                vulnerability_id: finding.record.id.clone(),
                action: format!(
                    "Patch for {} ({} severity)",
                    finding.record.id, finding.bucket
                ),
                estimated_completion: Self::estimated_completion(finding.bucket).to_string(),
                status: FixStatus::Pending,
            })
            .collect()
    }
}

impl Default for FixPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Service assembling VEX documents and annotating SBOMs with fix state
pub struct VexGenerator;

impl VexGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Build the document in input order; IDs missing from the map are `Pending`
    pub fn generate(
        &self,
        product_id: &str,
        finding_ids: &[String],
        fix_status: &HashMap<String, FixStatus>,
    ) -> VexDocument {
        VexDocument {
            product_id: product_id.to_string(),
            vulnerabilities: finding_ids
                .iter()
                .map(|id| VexStatement {
                    vulnerability_id: id.clone(),
                    status: fix_status.get(id).copied().unwrap_or_default(),
                })
                .collect(),
        }
    }

    /// Return a copy of `sbom` whose matching CPE entries carry a `fix_status` annotation
    pub fn apply_fixes(&self, sbom: &Sbom, fixes: &HashMap<String, FixStatus>) -> Sbom {
        let mut updated = sbom.clone();
        for artifact in &mut updated.artifacts {
            for entry in &mut artifact.cpes {
                if let Some(status) = fixes.get(entry.cpe.as_str()) {
                    entry.fix_status = Some(*status);
                }
            }
        }
        updated
    }
}

impl Default for VexGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Full-text search expression derived from free-form user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    tokens: Vec<String>,
}

impl SearchQuery {
    /// Split on whitespace and drop characters that carry meaning in `to_tsquery`
    pub fn tokenize(raw: &str) -> Self {
        let tokens = raw
            .split_whitespace()
            .map(|word| {
                word.chars()
                    .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Conjunction of all tokens, e.g. `openssl & heartbleed`
    pub fn to_tsquery(&self) -> String {
        self.tokens.join(" & ")
    }
}
