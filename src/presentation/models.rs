//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::{
    AdvisoryAnswer, AdvisorySource, ComponentFindings, FixPlan, ProductPriorities,
};
use crate::domain::{FixStatus, Sbom, VexDocument, VulnerabilityRecord};

/// Request model for SBOM analysis
#[derive(Deserialize, ToSchema)]
pub struct AnalyzeSbomRequest {
    /// Syft-style SBOM document
    #[schema(value_type = Object)]
    pub sbom: Sbom,
}

/// DTO for a normalized registry record
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityRecordDto {
    #[schema(example = "CVE-2022-0778")]
    pub id: String,

    pub description: String,

    /// Base score of the selected CVSS block
    #[schema(example = 7.5)]
    pub base_score: Option<f64>,

    pub exploitability_score: Option<f64>,

    pub impact_score: Option<f64>,

    /// Severity exactly as the registry reported it
    #[schema(example = "HIGH")]
    pub base_severity: Option<String>,

    /// Severity bucket used for ranking
    #[schema(example = "High")]
    pub severity_band: String,

    #[schema(example = "3.1")]
    pub cvss_version: Option<String>,
}

impl From<&VulnerabilityRecord> for VulnerabilityRecordDto {
    fn from(record: &VulnerabilityRecord) -> Self {
        Self {
            id: record.id.to_string(),
            description: record.description.clone(),
            base_score: record.base_score,
            exploitability_score: record.exploitability_score,
            impact_score: record.impact_score,
            base_severity: record.base_severity.clone(),
            severity_band: record.severity_band().to_string(),
            cvss_version: record.cvss_version.map(|v| v.to_string()),
        }
    }
}

/// Lookup outcome of one component identifier
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFindingsDto {
    pub vulnerabilities: Vec<VulnerabilityRecordDto>,

    /// Set when the registry could not be consulted for this component
    pub failed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ComponentFindings> for ComponentFindingsDto {
    fn from(findings: &ComponentFindings) -> Self {
        Self {
            vulnerabilities: findings.vulnerabilities.iter().map(Into::into).collect(),
            failed: findings.failed,
            error: findings.error.clone(),
        }
    }
}

/// Request model for a single CVE assessment
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssessRequest {
    #[serde(alias = "cve_id")]
    #[schema(example = "CVE-2021-44228")]
    pub cve_id: String,
}

/// Risk assessment of one CVE
#[derive(Serialize, ToSchema)]
pub struct AssessmentDto {
    #[serde(rename = "CVE ID")]
    pub cve_id: String,

    #[serde(rename = "Description")]
    pub description: String,

    /// Base score, or "N/A" when the record carries no metrics
    #[serde(rename = "CVSS Score")]
    #[schema(value_type = Object, example = 10.0)]
    pub cvss_score: serde_json::Value,

    #[serde(rename = "impactScore")]
    pub impact_score: Option<f64>,

    #[serde(rename = "exploitabilityScore")]
    pub exploitability_score: Option<f64>,

    #[serde(rename = "baseSeverity")]
    pub base_severity: Option<String>,
}

impl From<&VulnerabilityRecord> for AssessmentDto {
    fn from(record: &VulnerabilityRecord) -> Self {
        Self {
            cve_id: record.id.to_string(),
            description: record.description.clone(),
            cvss_score: record
                .base_score
                .map(serde_json::Value::from)
                .unwrap_or_else(|| serde_json::Value::from("N/A")),
            impact_score: record.impact_score,
            exploitability_score: record.exploitability_score,
            base_severity: record.base_severity.clone(),
        }
    }
}

/// Request model shared by prioritization and fix planning
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixRequest {
    #[serde(alias = "product_id")]
    #[schema(example = "acme-gateway-2.4")]
    pub product_id: String,

    #[serde(alias = "vulnerability_ids")]
    #[schema(example = json!(["CVE-2022-0778", "CVE-2021-22945"]))]
    pub vulnerability_ids: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PriorityDto {
    /// Severity band
    #[schema(example = "Critical")]
    pub priority: String,

    /// 1-based remediation order
    pub rank: usize,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizeResponse {
    pub product_id: String,
    pub prioritized_fixes: BTreeMap<String, PriorityDto>,
    /// IDs in remediation order
    pub ranking: Vec<String>,
}

impl From<ProductPriorities> for PrioritizeResponse {
    fn from(priorities: ProductPriorities) -> Self {
        let ranking = priorities
            .findings
            .iter()
            .map(|f| f.record.id.to_string())
            .collect();
        let prioritized_fixes = priorities
            .findings
            .into_iter()
            .map(|f| {
                (
                    f.record.id.to_string(),
                    PriorityDto {
                        priority: f.bucket.to_string(),
                        rank: f.rank,
                    },
                )
            })
            .collect();

        Self {
            product_id: priorities.product_id,
            prioritized_fixes,
            ranking,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixPlanEntryDto {
    #[schema(example = "Patch for CVE-2022-0778 (High severity)")]
    pub fix_action: String,

    #[schema(example = "1 week")]
    pub estimated_completion: String,

    #[schema(example = "Pending")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixPlanResponse {
    pub product_id: String,
    pub fix_plan: BTreeMap<String, FixPlanEntryDto>,
}

impl From<FixPlan> for FixPlanResponse {
    fn from(plan: FixPlan) -> Self {
        Self {
            product_id: plan.product_id,
            fix_plan: plan
                .entries
                .into_iter()
                .map(|entry| {
                    (
                        entry.vulnerability_id.to_string(),
                        FixPlanEntryDto {
                            fix_action: entry.action,
                            estimated_completion: entry.estimated_completion,
                            status: entry.status.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Fix status given either once for every finding or per vulnerability ID
#[derive(Deserialize)]
#[serde(untagged)]
pub enum FixStatusInput {
    Uniform(FixStatus),
    PerVulnerability(HashMap<String, FixStatus>),
}

impl FixStatusInput {
    pub fn into_map(self, vulnerability_ids: &[String]) -> HashMap<String, FixStatus> {
        match self {
            FixStatusInput::Uniform(status) => vulnerability_ids
                .iter()
                .map(|id| (id.clone(), status))
                .collect(),
            FixStatusInput::PerVulnerability(map) => map,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VexRequest {
    #[serde(alias = "product_id")]
    pub product_id: String,

    #[serde(alias = "vulnerability_ids")]
    pub vulnerability_ids: Vec<String>,

    /// Status string or map of vulnerability ID to status; missing entries are Pending
    #[serde(default, alias = "fix_status")]
    #[schema(value_type = Option<Object>)]
    pub fix_status: Option<FixStatusInput>,
}

/// VEX documents keep the snake_case field names of the document format
#[derive(Serialize, ToSchema)]
pub struct VexStatementDto {
    pub vulnerability_id: String,

    #[schema(example = "Pending")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct VexDocumentDto {
    pub product_id: String,
    pub vulnerabilities: Vec<VexStatementDto>,
}

impl From<VexDocument> for VexDocumentDto {
    fn from(doc: VexDocument) -> Self {
        Self {
            product_id: doc.product_id,
            vulnerabilities: doc
                .vulnerabilities
                .into_iter()
                .map(|statement| VexStatementDto {
                    vulnerability_id: statement.vulnerability_id,
                    status: statement.status.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSbomRequest {
    #[schema(value_type = Object)]
    pub sbom: Sbom,

    /// Map of CPE to fix status
    #[serde(default)]
    #[schema(value_type = Object)]
    pub fixes: HashMap<String, FixStatus>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSbomResponse {
    #[schema(value_type = Object)]
    pub updated_sbom: Sbom,
}

#[derive(Deserialize, ToSchema)]
pub struct AdvisoryQueryRequest {
    #[schema(example = "openssl buffer overflow")]
    pub query: String,
}

#[derive(Serialize, ToSchema)]
pub struct AdvisoryQueryResponse {
    pub query: String,

    /// Tier that produced the context
    #[schema(value_type = String, example = "local_store")]
    pub source: AdvisorySource,

    pub context: String,
}

impl AdvisoryQueryResponse {
    pub fn new(query: String, answer: AdvisoryAnswer) -> Self {
        Self {
            query,
            source: answer.source,
            context: answer.text,
        }
    }
}

/// Error response model
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "INVALID_INPUT")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "Invalid request")]
    pub message: String,

    /// Textual cause of the failure
    #[schema(example = "Invalid input for field cveId: Vulnerability ID cannot be empty")]
    pub detail: Option<String>,

    /// Unique request identifier for tracking and support
    pub request_id: Uuid,

    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,

    #[schema(example = "0.1.0")]
    pub version: String,

    pub timestamp: DateTime<Utc>,

    /// Dependency status, cache statistics and build information
    pub details: Option<serde_json::Value>,
}
