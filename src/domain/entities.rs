//! Domain entities representing core business concepts

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::errors::DomainError;
use super::value_objects::*;

/// A component identifier entry as it appears inside an SBOM artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cpe {
    pub cpe: String,
    #[serde(default)]
    pub source: Option<String>,
    /// Annotation added when fixes are applied to the SBOM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_status: Option<FixStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cpe {
    pub fn new(cpe: impl Into<String>) -> Self {
        Self {
            cpe: cpe.into(),
            source: None,
            fix_status: None,
            extra: Map::new(),
        }
    }
}

/// One SBOM entry (syft JSON layout)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub found_by: String,
    #[serde(default)]
    pub locations: Vec<Value>,
    #[serde(default)]
    pub licenses: Vec<Value>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub cpes: Vec<Cpe>,
    #[serde(default)]
    pub purl: String,
    #[serde(default)]
    pub metadata_type: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artifact {
    /// Minimal artifact used by tests and programmatic callers
    pub fn new(name: impl Into<String>, version: impl Into<String>, cpes: Vec<Cpe>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            version: version.into(),
            r#type: String::new(),
            found_by: String::new(),
            locations: Vec::new(),
            licenses: Vec::new(),
            language: String::new(),
            cpes,
            purl: String::new(),
            metadata_type: String::new(),
            metadata: Value::Null,
            extra: Map::new(),
        }
    }
}

/// Software Bill of Materials as received from the producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sbom {
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub artifact_relationships: Vec<Value>,
    #[serde(default)]
    pub files: Vec<Value>,
    #[serde(default)]
    pub source: Value,
    #[serde(default)]
    pub distro: Value,
    #[serde(default)]
    pub descriptor: Value,
    #[serde(default)]
    pub schema: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sbom {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        Self {
            artifacts,
            artifact_relationships: Vec::new(),
            files: Vec::new(),
            source: Value::Null,
            distro: Value::Null,
            descriptor: Value::Null,
            schema: Value::Null,
            extra: Map::new(),
        }
    }

    /// Distinct component identifiers across all artifacts, in first-seen order
    pub fn component_identifiers(&self) -> Result<Vec<CpeName>, DomainError> {
        let mut seen = HashSet::new();
        let mut identifiers = Vec::new();

        for (index, artifact) in self.artifacts.iter().enumerate() {
            for entry in &artifact.cpes {
                let cpe = CpeName::new(entry.cpe.as_str()).map_err(|_| {
                    DomainError::InvalidInput {
                        field: format!("artifacts[{}].cpes", index),
                        message: "Component identifier cannot be empty".to_string(),
                    }
                })?;
                if seen.insert(cpe.clone()) {
                    identifiers.push(cpe);
                }
            }
        }

        Ok(identifiers)
    }
}

/// Description entry of a raw registry record
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDescription {
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCvssData {
    pub base_score: Option<f64>,
    pub base_severity: Option<String>,
}

/// One CVSS metric block. v3.1 keeps `baseSeverity` inside `cvssData`, v2 at block level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCvssMetric {
    #[serde(default)]
    pub cvss_data: RawCvssData,
    pub base_severity: Option<String>,
    pub exploitability_score: Option<f64>,
    pub impact_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetrics {
    #[serde(default)]
    pub cvss_metric_v31: Vec<RawCvssMetric>,
    #[serde(default)]
    pub cvss_metric_v2: Vec<RawCvssMetric>,
}

/// Registry record as delivered by the CVE API, before normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRegistryRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub descriptions: Vec<RawDescription>,
    #[serde(default)]
    pub metrics: RawMetrics,
}

/// Canonical finding derived from a registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub id: VulnerabilityId,
    pub description: String,
    pub base_score: Option<f64>,
    pub exploitability_score: Option<f64>,
    pub impact_score: Option<f64>,
    /// Severity string exactly as the selected metric block carried it
    pub base_severity: Option<String>,
    pub cvss_version: Option<CvssVersion>,
    pub component: Option<CpeName>,
}

impl VulnerabilityRecord {
    pub fn severity_band(&self) -> SeverityBand {
        SeverityBand::from_verbatim(self.base_severity.as_deref())
    }

    /// Placeholder for an ID the registry could not resolve; ranks as Unknown
    pub fn unresolved(id: VulnerabilityId) -> Self {
        Self {
            id,
            description: "No description available".to_string(),
            base_score: None,
            exploitability_score: None,
            impact_score: None,
            base_severity: None,
            cvss_version: None,
            component: None,
        }
    }
}

/// A finding ranked within one product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedFinding {
    /// 1-based position in remediation order
    pub rank: usize,
    pub bucket: SeverityBand,
    pub record: VulnerabilityRecord,
}

/// Remediation action for one finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixEntry {
    pub vulnerability_id: VulnerabilityId,
    pub action: String,
    pub estimated_completion: String,
    pub status: FixStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VexStatement {
    pub vulnerability_id: String,
    pub status: FixStatus,
}

/// Exploitability statement for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VexDocument {
    pub product_id: String,
    pub vulnerabilities: Vec<VexStatement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRow {
    pub id: Option<String>,
    pub advisory_text: Option<String>,
    pub description: Option<String>,
    pub published_date: Option<String>,
    pub assigner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRow {
    pub cve_id: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixRow {
    pub fix_id: Option<String>,
    pub fix_description: Option<String>,
    pub fixed_product_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub version: Option<String>,
    pub vendor_id: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorRow {
    pub vendor_id: Option<String>,
    pub vendor_name: Option<String>,
    pub contact_info: Option<String>,
}

/// Rows gathered from the local advisory store for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvisoryContext {
    pub advisories: Vec<AdvisoryRow>,
    pub vulnerabilities: Vec<VulnerabilityRow>,
    pub fixes: Vec<FixRow>,
    pub products: Vec<ProductRow>,
    pub vendors: Vec<VendorRow>,
}

fn or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

impl AdvisoryContext {
    pub fn is_empty(&self) -> bool {
        self.advisories.is_empty()
            && self.vulnerabilities.is_empty()
            && self.fixes.is_empty()
            && self.products.is_empty()
            && self.vendors.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.advisories.len()
            + self.vulnerabilities.len()
            + self.fixes.len()
            + self.products.len()
            + self.vendors.len()
    }

    /// Render the context as line-per-row text suitable for display or a prompt
    pub fn render(&self) -> String {
        let mut context = String::new();

        for a in &self.advisories {
            context.push_str(&format!(
                "Advisory ID: {}, Text: {}, Description: {}, Published Date: {}, Assigner: {}\n",
                or_na(&a.id),
                or_na(&a.advisory_text),
                or_na(&a.description),
                or_na(&a.published_date),
                or_na(&a.assigner)
            ));
        }
        for v in &self.vulnerabilities {
            context.push_str(&format!(
                "Vulnerability: {}, Description: {}, Severity: {}\n",
                or_na(&v.cve_id),
                or_na(&v.description),
                or_na(&v.severity)
            ));
        }
        for f in &self.fixes {
            context.push_str(&format!(
                "Fix ID: {}, Description: {}, Fixed Product ID: {}\n",
                or_na(&f.fix_id),
                or_na(&f.fix_description),
                or_na(&f.fixed_product_id)
            ));
        }
        for p in &self.products {
            context.push_str(&format!(
                "Product ID: {}, Name: {}, Version: {}, Vendor ID: {}, Release Date: {}\n",
                or_na(&p.product_id),
                or_na(&p.product_name),
                or_na(&p.version),
                or_na(&p.vendor_id),
                or_na(&p.release_date)
            ));
        }
        for v in &self.vendors {
            context.push_str(&format!(
                "Vendor ID: {}, Name: {}, Contact Info: {}\n",
                or_na(&v.vendor_id),
                or_na(&v.vendor_name),
                or_na(&v.contact_info)
            ));
        }

        context
    }
}
