//! Application services for orchestrating business logic

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::errors::{AdvisoryError, ApplicationError, VulnerabilityError};
use crate::config::GenerativeConfig;
use crate::domain::{
    AdvisoryContext, CpeName, FixEntry, FixPlanner, FixStatus, PrioritizationEngine,
    PrioritizedFinding, Sbom, SearchQuery, VexDocument, VexGenerator, VulnerabilityId,
    VulnerabilityRecord,
};
use crate::infrastructure::{
    AdvisoryStore, GenerationRequest, TextGenerator, VulnerabilityRepository,
};

/// Lookup outcome for one component identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentFindings {
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    /// True when the registry could not be consulted for this component
    pub failed: bool,
    pub error: Option<String>,
}

/// Findings of one SBOM keyed by component identifier
pub type SbomAnalysis = BTreeMap<String, ComponentFindings>;

/// Service for orchestrating vulnerability analysis
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze_sbom(&self, sbom: &Sbom) -> Result<SbomAnalysis, ApplicationError>;

    async fn get_vulnerability_details(
        &self,
        vulnerability_id: &VulnerabilityId,
    ) -> Result<VulnerabilityRecord, ApplicationError>;
}

/// Pipeline coordinator fanning an SBOM's components out to the repository
pub struct AnalysisServiceImpl {
    vulnerability_repository: Arc<dyn VulnerabilityRepository>,
    max_concurrent_lookups: usize,
}

impl AnalysisServiceImpl {
    pub fn new(
        vulnerability_repository: Arc<dyn VulnerabilityRepository>,
        max_concurrent_lookups: usize,
    ) -> Self {
        Self {
            vulnerability_repository,
            max_concurrent_lookups: max_concurrent_lookups.max(1),
        }
    }

    /// Per-component outcome of a failed lookup. Malformed payloads count as zero
    /// findings; everything else flags the component.
    fn absorb(cpe: &CpeName, error: &VulnerabilityError) -> ComponentFindings {
        if !error.marks_component_failed() {
            warn!(
                cpe = %cpe,
                error = %error,
                "Treating malformed registry response as zero findings"
            );
            return ComponentFindings::default();
        }

        warn!(cpe = %cpe, error = %error, "Component lookup failed");
        ComponentFindings {
            vulnerabilities: Vec::new(),
            failed: true,
            error: Some(error.to_string()),
        }
    }
}

#[async_trait]
impl AnalysisService for AnalysisServiceImpl {
    async fn analyze_sbom(&self, sbom: &Sbom) -> Result<SbomAnalysis, ApplicationError> {
        let start_time = Instant::now();
        let cpes = sbom.component_identifiers()?;

        if cpes.is_empty() {
            warn!(artifacts = sbom.artifacts.len(), "No component identifiers found in SBOM");
            return Ok(SbomAnalysis::new());
        }

        info!(
            artifacts = sbom.artifacts.len(),
            components = cpes.len(),
            max_concurrent = self.max_concurrent_lookups,
            "Starting SBOM analysis"
        );

        // Every component starts out failed so a lost task is still reported
        let mut analysis: SbomAnalysis = cpes
            .iter()
            .map(|cpe| {
                (
                    cpe.to_string(),
                    ComponentFindings {
                        vulnerabilities: Vec::new(),
                        failed: true,
                        error: Some("lookup task did not complete".to_string()),
                    },
                )
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_lookups));
        let mut join_set = JoinSet::new();

        for cpe in cpes {
            let repository = self.vulnerability_repository.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = repository.lookup(&cpe).await;
                (cpe, result)
            });
        }

        let mut errors: BTreeMap<String, VulnerabilityError> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((cpe, result)) => {
                    let findings = match result {
                        Ok(records) => ComponentFindings {
                            vulnerabilities: records.to_vec(),
                            failed: false,
                            error: None,
                        },
                        Err(e) => {
                            let findings = Self::absorb(&cpe, &e);
                            if findings.failed {
                                errors.insert(cpe.to_string(), e);
                            }
                            findings
                        }
                    };
                    analysis.insert(cpe.to_string(), findings);
                }
                Err(join_error) => {
                    error!(error = %join_error, "Component lookup task failed");
                }
            }
        }

        let failed = analysis.values().filter(|f| f.failed).count();
        if failed == analysis.len() {
            error!(components = failed, "Every component lookup failed");
            let cause = match errors.into_values().next() {
                Some(e @ VulnerabilityError::UpstreamUnavailable { .. }) => e,
                Some(other) => VulnerabilityError::UpstreamUnavailable {
                    attempts: 0,
                    message: other.to_string(),
                },
                None => VulnerabilityError::UpstreamUnavailable {
                    attempts: 0,
                    message: "every component lookup failed".to_string(),
                },
            };
            return Err(ApplicationError::Vulnerability(cause));
        }

        info!(
            components = analysis.len(),
            failed = failed,
            findings = analysis.values().map(|f| f.vulnerabilities.len()).sum::<usize>(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "SBOM analysis completed"
        );

        Ok(analysis)
    }

    async fn get_vulnerability_details(
        &self,
        vulnerability_id: &VulnerabilityId,
    ) -> Result<VulnerabilityRecord, ApplicationError> {
        self.vulnerability_repository
            .find_by_id(vulnerability_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound {
                resource: "vulnerability".to_string(),
                id: vulnerability_id.as_str().to_string(),
            })
    }
}

/// Ranked findings of one product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPriorities {
    pub product_id: String,
    pub findings: Vec<PrioritizedFinding>,
}

/// Remediation plan of one product, in priority order
#[derive(Debug, Clone, PartialEq)]
pub struct FixPlan {
    pub product_id: String,
    pub entries: Vec<FixEntry>,
}

/// Service for remediation ordering, fix planning and VEX output
#[async_trait]
pub trait FixService: Send + Sync {
    async fn prioritize(
        &self,
        product_id: &str,
        vulnerability_ids: &[VulnerabilityId],
    ) -> Result<ProductPriorities, ApplicationError>;

    async fn plan(
        &self,
        product_id: &str,
        vulnerability_ids: &[VulnerabilityId],
    ) -> Result<FixPlan, ApplicationError>;

    fn generate_vex(
        &self,
        product_id: &str,
        vulnerability_ids: &[String],
        fix_status: &HashMap<String, FixStatus>,
    ) -> VexDocument;

    fn update_sbom(&self, sbom: &Sbom, fixes: &HashMap<String, FixStatus>) -> Sbom;
}

pub struct FixServiceImpl {
    vulnerability_repository: Arc<dyn VulnerabilityRepository>,
    prioritizer: PrioritizationEngine,
    planner: FixPlanner,
    vex: VexGenerator,
}

impl FixServiceImpl {
    pub fn new(vulnerability_repository: Arc<dyn VulnerabilityRepository>) -> Self {
        Self {
            vulnerability_repository,
            prioritizer: PrioritizationEngine::new(),
            planner: FixPlanner::new(),
            vex: VexGenerator::new(),
        }
    }

    /// Resolve IDs to records. Unknown IDs and failed lookups rank as Unknown; the
    /// call only fails when no ID could be looked up at all.
    async fn resolve(
        &self,
        ids: &[VulnerabilityId],
    ) -> Result<Vec<VulnerabilityRecord>, ApplicationError> {
        let mut records = Vec::with_capacity(ids.len());
        let mut failures = 0;
        let mut first_error = None;

        for id in ids {
            match self.vulnerability_repository.find_by_id(id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    debug!(id = %id, "Registry has no record for ID");
                    records.push(VulnerabilityRecord::unresolved(id.clone()));
                }
                Err(e) if !e.marks_component_failed() => {
                    warn!(id = %id, error = %e, "Malformed registry response for ID");
                    records.push(VulnerabilityRecord::unresolved(id.clone()));
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Failed to resolve vulnerability ID");
                    failures += 1;
                    first_error.get_or_insert(e);
                    records.push(VulnerabilityRecord::unresolved(id.clone()));
                }
            }
        }

        if failures > 0 && failures == ids.len() {
            if let Some(e) = first_error {
                return Err(ApplicationError::Vulnerability(e));
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl FixService for FixServiceImpl {
    async fn prioritize(
        &self,
        product_id: &str,
        vulnerability_ids: &[VulnerabilityId],
    ) -> Result<ProductPriorities, ApplicationError> {
        let records = self.resolve(vulnerability_ids).await?;
        let findings = self.prioritizer.prioritize(records);

        info!(
            product_id = product_id,
            findings = findings.len(),
            "Prioritized findings"
        );

        Ok(ProductPriorities {
            product_id: product_id.to_string(),
            findings,
        })
    }

    async fn plan(
        &self,
        product_id: &str,
        vulnerability_ids: &[VulnerabilityId],
    ) -> Result<FixPlan, ApplicationError> {
        let priorities = self.prioritize(product_id, vulnerability_ids).await?;
        Ok(FixPlan {
            product_id: priorities.product_id,
            entries: self.planner.plan(&priorities.findings),
        })
    }

    fn generate_vex(
        &self,
        product_id: &str,
        vulnerability_ids: &[String],
        fix_status: &HashMap<String, FixStatus>,
    ) -> VexDocument {
        self.vex.generate(product_id, vulnerability_ids, fix_status)
    }

    fn update_sbom(&self, sbom: &Sbom, fixes: &HashMap<String, FixStatus>) -> Sbom {
        self.vex.apply_fixes(sbom, fixes)
    }
}

/// Retrieval state of one advisory query
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryState {
    Retrieving,
    Found(AdvisoryContext),
    /// No local rows; `retrieval_failed` is set when every search errored
    NotFound { retrieval_failed: bool },
}

/// Tier that produced an advisory answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisorySource {
    LocalStore,
    ScopedGeneration,
    GenericGeneration,
    StaticGuidance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryAnswer {
    pub source: AdvisorySource,
    pub text: String,
}

pub const SCOPED_SYSTEM_PROMPT: &str =
    "You are an assistant that helps with software security advisories.";
pub const GENERIC_SYSTEM_PROMPT: &str =
    "You are an assistant that provides general information about software security.";
pub const GENERIC_USER_PROMPT: &str =
    "Please provide general information or recommendations on software security advisories.";
pub const STATIC_GUIDANCE: &str = "No advisory information is available for this query right now. \
Check the affected components against their vendors' security advisories and upgrade to the \
latest patched releases.";

/// Model selection for the two generation tiers
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: u32,
    pub fallback_model: String,
    pub fallback_max_tokens: u32,
}

impl From<&GenerativeConfig> for GenerationSettings {
    fn from(config: &GenerativeConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            fallback_model: config.fallback_model.clone(),
            fallback_max_tokens: config.fallback_max_tokens,
        }
    }
}

fn rows_or_empty<T>(
    table: &str,
    result: Result<Vec<T>, AdvisoryError>,
    failures: &mut usize,
) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            *failures += 1;
            warn!(table = table, error = %e, "Advisory store search failed");
            Vec::new()
        }
    }
}

/// Retrieval-augmented advisory engine
pub struct AdvisoryEngine {
    store: Arc<dyn AdvisoryStore>,
    generator: Arc<dyn TextGenerator>,
    settings: GenerationSettings,
}

impl AdvisoryEngine {
    pub fn new(
        store: Arc<dyn AdvisoryStore>,
        generator: Arc<dyn TextGenerator>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            generator,
            settings,
        }
    }

    /// Run the five local searches concurrently. Each search failure is logged and
    /// contributes no rows.
    pub async fn retrieve(&self, query: &SearchQuery) -> AdvisoryState {
        if query.is_empty() {
            debug!("Advisory query has no searchable tokens");
            return AdvisoryState::NotFound {
                retrieval_failed: false,
            };
        }

        let tsquery = query.to_tsquery();
        let (advisories, vulnerabilities, fixes, products, vendors) = tokio::join!(
            self.store.search_advisories(&tsquery),
            self.store.search_vulnerabilities(&tsquery),
            self.store.search_fixes(&tsquery),
            self.store.search_products(&tsquery),
            self.store.search_vendors(&tsquery),
        );

        let mut failures = 0;
        let context = AdvisoryContext {
            advisories: rows_or_empty("advisories", advisories, &mut failures),
            vulnerabilities: rows_or_empty("vulnerabilities", vulnerabilities, &mut failures),
            fixes: rows_or_empty("fixes", fixes, &mut failures),
            products: rows_or_empty("products", products, &mut failures),
            vendors: rows_or_empty("vendors", vendors, &mut failures),
        };

        if !context.is_empty() {
            info!(rows = context.row_count(), "Advisory context found in local store");
            AdvisoryState::Found(context)
        } else {
            AdvisoryState::NotFound {
                retrieval_failed: failures == 5,
            }
        }
    }

    fn scoped_request(&self, raw_query: &str, context: &str) -> GenerationRequest {
        GenerationRequest {
            model: self.settings.model.clone(),
            system: SCOPED_SYSTEM_PROMPT.to_string(),
            user: format!(
                "Given the following SBOM data:\n{}\nQuery: {}\nPlease provide detailed recommendations for mitigating the identified vulnerabilities.",
                context, raw_query
            ),
            max_tokens: self.settings.max_tokens,
        }
    }

    fn generic_request(&self) -> GenerationRequest {
        GenerationRequest {
            model: self.settings.fallback_model.clone(),
            system: GENERIC_SYSTEM_PROMPT.to_string(),
            user: GENERIC_USER_PROMPT.to_string(),
            max_tokens: self.settings.fallback_max_tokens,
        }
    }

    async fn generate(&self, raw_query: &str) -> AdvisoryAnswer {
        match self.generator.generate(&self.scoped_request(raw_query, "")).await {
            Ok(text) => {
                return AdvisoryAnswer {
                    source: AdvisorySource::ScopedGeneration,
                    text,
                };
            }
            Err(e) => warn!(error = %e, "Scoped generation failed, requesting generic guidance"),
        }

        match self.generator.generate(&self.generic_request()).await {
            Ok(text) => AdvisoryAnswer {
                source: AdvisorySource::GenericGeneration,
                text,
            },
            Err(e) => {
                error!(error = %e, "Generic generation failed, returning static guidance");
                AdvisoryAnswer {
                    source: AdvisorySource::StaticGuidance,
                    text: STATIC_GUIDANCE.to_string(),
                }
            }
        }
    }

    /// Answer a free-text query; never fails
    pub async fn answer(&self, raw_query: &str) -> AdvisoryAnswer {
        let query = SearchQuery::tokenize(raw_query);
        let mut state = AdvisoryState::Retrieving;

        loop {
            state = match state {
                AdvisoryState::Retrieving => self.retrieve(&query).await,
                AdvisoryState::Found(context) => {
                    return AdvisoryAnswer {
                        source: AdvisorySource::LocalStore,
                        text: context.render(),
                    };
                }
                AdvisoryState::NotFound { retrieval_failed } => {
                    if retrieval_failed {
                        warn!("Advisory store unavailable, falling back to generation");
                    }
                    return self.generate(raw_query).await;
                }
            };
        }
    }
}
