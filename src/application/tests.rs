// Application service tests with in-memory infrastructure doubles
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::{
    AdvisoryEngine, AdvisoryError, AdvisorySource, AdvisoryState, AnalysisService,
    AnalysisServiceImpl, ApplicationError, FixService, FixServiceImpl, GenerationSettings,
    STATIC_GUIDANCE, VulnerabilityError,
};
use crate::domain::{
    AdvisoryContext, AdvisoryRow, Artifact, Cpe, CpeName, FixRow, FixStatus, ProductRow, Sbom,
    SearchQuery, SeverityBand, VendorRow, VulnerabilityId, VulnerabilityRecord,
    VulnerabilityRow,
};
use crate::infrastructure::{
    AdvisoryStore, GenerationRequest, TextGenerator, VulnerabilityRepository,
};

#[derive(Clone)]
enum Outcome {
    Records(Vec<VulnerabilityRecord>),
    Unavailable,
    RateLimited,
    Malformed,
}

#[derive(Default)]
struct InMemoryRepository {
    by_cpe: HashMap<String, Outcome>,
    by_id: HashMap<String, VulnerabilityRecord>,
    fail_ids: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl VulnerabilityRepository for InMemoryRepository {
    async fn lookup(
        &self,
        cpe: &CpeName,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.by_cpe.get(cpe.as_str()).cloned() {
            None => Ok(Arc::from(Vec::new())),
            Some(Outcome::Records(records)) => Ok(records.into()),
            Some(Outcome::Unavailable) => Err(VulnerabilityError::UpstreamUnavailable {
                attempts: 3,
                message: "Timeout occurred after 30s".to_string(),
            }),
            Some(Outcome::RateLimited) => {
                Err(VulnerabilityError::UpstreamRateLimited { max_wait_ms: 1000 })
            }
            Some(Outcome::Malformed) => Err(VulnerabilityError::MalformedUpstreamResponse {
                message: "expected value at line 1".to_string(),
            }),
        }
    }

    async fn lookup_keyword(
        &self,
        _keyword: &str,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        Ok(Arc::from(Vec::new()))
    }

    async fn find_by_id(
        &self,
        id: &VulnerabilityId,
    ) -> Result<Option<VulnerabilityRecord>, VulnerabilityError> {
        if self.fail_ids {
            return Err(VulnerabilityError::UpstreamUnavailable {
                attempts: 3,
                message: "HTTP error 503".to_string(),
            });
        }
        Ok(self.by_id.get(&id.as_str().to_ascii_uppercase()).cloned())
    }
}

fn record(id: &str, severity: Option<&str>, score: Option<f64>) -> VulnerabilityRecord {
    VulnerabilityRecord {
        id: VulnerabilityId::new(id).unwrap(),
        description: format!("{} description", id),
        base_score: score,
        exploitability_score: None,
        impact_score: None,
        base_severity: severity.map(str::to_string),
        cvss_version: None,
        component: None,
    }
}

fn sbom_with(cpes: &[&str]) -> Sbom {
    Sbom::new(
        cpes.iter()
            .enumerate()
            .map(|(i, cpe)| Artifact::new(format!("artifact-{}", i), "1.0", vec![Cpe::new(*cpe)]))
            .collect(),
    )
}

const CPE_1: &str = "cpe:2.3:a:openssl:openssl:1.1.1:*:*:*:*:*:*:*";
const CPE_2: &str = "cpe:2.3:a:zlib:zlib:1.2.11:*:*:*:*:*:*:*";
const CPE_3: &str = "cpe:2.3:a:curl:curl:7.79.0:*:*:*:*:*:*:*";

#[tokio::test]
async fn partial_failure_keeps_other_components() {
    let mut repo = InMemoryRepository::default();
    repo.by_cpe.insert(
        CPE_1.into(),
        Outcome::Records(vec![record("CVE-2022-0778", Some("HIGH"), Some(7.5))]),
    );
    repo.by_cpe.insert(CPE_2.into(), Outcome::Unavailable);
    repo.by_cpe.insert(
        CPE_3.into(),
        Outcome::Records(vec![record("CVE-2021-22945", Some("CRITICAL"), Some(9.1))]),
    );
    let service = AnalysisServiceImpl::new(Arc::new(repo), 4);

    let analysis = service
        .analyze_sbom(&sbom_with(&[CPE_1, CPE_2, CPE_3]))
        .await
        .unwrap();

    assert_eq!(analysis.len(), 3);
    assert_eq!(analysis[CPE_1].vulnerabilities.len(), 1);
    assert!(!analysis[CPE_1].failed);
    assert!(analysis[CPE_2].failed);
    assert!(analysis[CPE_2].vulnerabilities.is_empty());
    assert!(analysis[CPE_2].error.as_deref().unwrap().contains("Upstream unavailable"));
    assert_eq!(
        analysis[CPE_3].vulnerabilities[0].id.as_str(),
        "CVE-2021-22945"
    );
}

#[tokio::test]
async fn every_component_failing_surfaces_single_error() {
    let mut repo = InMemoryRepository::default();
    repo.by_cpe.insert(CPE_1.into(), Outcome::Unavailable);
    repo.by_cpe.insert(CPE_2.into(), Outcome::RateLimited);
    let service = AnalysisServiceImpl::new(Arc::new(repo), 2);

    let result = service.analyze_sbom(&sbom_with(&[CPE_1, CPE_2])).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Vulnerability(
            VulnerabilityError::UpstreamUnavailable { attempts: 3, .. }
        ))
    ));
}

#[tokio::test]
async fn malformed_response_is_zero_findings_not_failure() {
    let mut repo = InMemoryRepository::default();
    repo.by_cpe.insert(CPE_1.into(), Outcome::Malformed);
    let service = AnalysisServiceImpl::new(Arc::new(repo), 2);

    let analysis = service.analyze_sbom(&sbom_with(&[CPE_1])).await.unwrap();
    assert!(!analysis[CPE_1].failed);
    assert!(analysis[CPE_1].vulnerabilities.is_empty());
    assert!(analysis[CPE_1].error.is_none());
}

#[tokio::test]
async fn empty_sbom_and_artifacts_without_cpes_yield_empty_map() {
    let service = AnalysisServiceImpl::new(Arc::new(InMemoryRepository::default()), 2);

    assert!(service.analyze_sbom(&Sbom::new(vec![])).await.unwrap().is_empty());

    let no_cpes = Sbom::new(vec![Artifact::new("busybox", "1.36", vec![])]);
    assert!(service.analyze_sbom(&no_cpes).await.unwrap().is_empty());
}

#[tokio::test]
async fn blank_cpe_is_invalid_input() {
    let service = AnalysisServiceImpl::new(Arc::new(InMemoryRepository::default()), 2);
    let result = service.analyze_sbom(&sbom_with(&["   "])).await;
    assert!(matches!(result, Err(ApplicationError::Domain(_))));
}

#[tokio::test(start_paused = true)]
async fn lookups_are_bounded_by_configured_concurrency() {
    let repo = Arc::new(InMemoryRepository {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let service = AnalysisServiceImpl::new(repo.clone(), 2);

    let cpes: Vec<String> = (0..6)
        .map(|i| format!("cpe:2.3:a:vendor:product{}:1.0:*:*:*:*:*:*:*", i))
        .collect();
    let refs: Vec<&str> = cpes.iter().map(String::as_str).collect();

    let analysis = service.analyze_sbom(&sbom_with(&refs)).await.unwrap();

    assert_eq!(analysis.len(), 6);
    assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_cpes_are_looked_up_once() {
    let service = AnalysisServiceImpl::new(Arc::new(InMemoryRepository::default()), 2);
    let analysis = service
        .analyze_sbom(&sbom_with(&[CPE_1, CPE_1, CPE_2]))
        .await
        .unwrap();
    assert_eq!(analysis.keys().collect::<Vec<_>>(), vec![CPE_1, CPE_2]);
}

#[tokio::test]
async fn unknown_vulnerability_is_not_found() {
    let service = AnalysisServiceImpl::new(Arc::new(InMemoryRepository::default()), 2);
    let id = VulnerabilityId::new("CVE-1999-0001").unwrap();
    assert!(matches!(
        service.get_vulnerability_details(&id).await,
        Err(ApplicationError::NotFound { .. })
    ));
}

fn fix_repository() -> InMemoryRepository {
    let mut repo = InMemoryRepository::default();
    for r in [
        record("CVE-2023-1000", Some("MEDIUM"), Some(5.3)),
        record("CVE-2023-2000", Some("CRITICAL"), Some(9.8)),
        record("CVE-2023-3000", Some("LOW"), Some(2.1)),
    ] {
        repo.by_id.insert(r.id.to_string(), r);
    }
    repo
}

fn ids(raw: &[&str]) -> Vec<VulnerabilityId> {
    raw.iter().map(|id| VulnerabilityId::new(*id).unwrap()).collect()
}

#[tokio::test]
async fn prioritize_ranks_critical_first_and_unresolved_last() {
    let service = FixServiceImpl::new(Arc::new(fix_repository()));

    let priorities = service
        .prioritize(
            "product-1",
            &ids(&["CVE-2023-3000", "CVE-2023-9999", "cve-2023-2000", "CVE-2023-1000"]),
        )
        .await
        .unwrap();

    let ranking: Vec<(&str, SeverityBand)> = priorities
        .findings
        .iter()
        .map(|f| (f.record.id.as_str(), f.bucket))
        .collect();
    assert_eq!(
        ranking,
        vec![
            ("CVE-2023-2000", SeverityBand::Critical),
            ("CVE-2023-1000", SeverityBand::Medium),
            ("CVE-2023-3000", SeverityBand::Low),
            ("CVE-2023-9999", SeverityBand::Unknown),
        ]
    );
    assert_eq!(priorities.findings[3].rank, 4);
}

#[tokio::test]
async fn prioritize_fails_only_when_nothing_resolves() {
    let repo = InMemoryRepository {
        fail_ids: true,
        ..Default::default()
    };
    let service = FixServiceImpl::new(Arc::new(repo));
    assert!(matches!(
        service.prioritize("p", &ids(&["CVE-2023-1000"])).await,
        Err(ApplicationError::Vulnerability(
            VulnerabilityError::UpstreamUnavailable { .. }
        ))
    ));
}

#[tokio::test]
async fn plan_follows_priority_order() {
    let service = FixServiceImpl::new(Arc::new(fix_repository()));
    let plan = service
        .plan("product-1", &ids(&["CVE-2023-1000", "CVE-2023-2000"]))
        .await
        .unwrap();

    assert_eq!(plan.product_id, "product-1");
    assert_eq!(plan.entries[0].vulnerability_id.as_str(), "CVE-2023-2000");
    assert_eq!(plan.entries[0].estimated_completion, "48 hours");
    assert_eq!(plan.entries[1].estimated_completion, "2 weeks");
}

#[test]
fn vex_and_sbom_update_go_through_fix_service() {
    let service = FixServiceImpl::new(Arc::new(InMemoryRepository::default()));
    let mut statuses = HashMap::new();
    statuses.insert("CVE-2023-1000".to_string(), FixStatus::Applied);

    let doc = service.generate_vex(
        "product-1",
        &["CVE-2023-1000".to_string(), "CVE-2023-2000".to_string()],
        &statuses,
    );
    assert_eq!(doc.vulnerabilities[0].status, FixStatus::Applied);
    assert_eq!(doc.vulnerabilities[1].status, FixStatus::Pending);

    let mut fixes = HashMap::new();
    fixes.insert(CPE_1.to_string(), FixStatus::Applied);
    let updated = service.update_sbom(&sbom_with(&[CPE_1, CPE_2]), &fixes);
    assert_eq!(updated.artifacts[0].cpes[0].fix_status, Some(FixStatus::Applied));
    assert_eq!(updated.artifacts[1].cpes[0].fix_status, None);
}

#[derive(Default)]
struct InMemoryStore {
    advisories: Vec<AdvisoryRow>,
    vendors: Vec<VendorRow>,
    failing: bool,
    calls: AtomicUsize,
}

impl InMemoryStore {
    fn outcome<T: Clone>(&self, rows: &[T]) -> Result<Vec<T>, AdvisoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            Err(AdvisoryError::StoreNotConfigured)
        } else {
            Ok(rows.to_vec())
        }
    }
}

#[async_trait]
impl AdvisoryStore for InMemoryStore {
    async fn search_advisories(&self, _tsquery: &str) -> Result<Vec<AdvisoryRow>, AdvisoryError> {
        self.outcome(&self.advisories)
    }

    async fn search_vulnerabilities(
        &self,
        _tsquery: &str,
    ) -> Result<Vec<VulnerabilityRow>, AdvisoryError> {
        self.outcome::<VulnerabilityRow>(&[])
    }

    async fn search_fixes(&self, _tsquery: &str) -> Result<Vec<FixRow>, AdvisoryError> {
        self.outcome::<FixRow>(&[])
    }

    async fn search_products(&self, _tsquery: &str) -> Result<Vec<ProductRow>, AdvisoryError> {
        self.outcome::<ProductRow>(&[])
    }

    async fn search_vendors(&self, _tsquery: &str) -> Result<Vec<VendorRow>, AdvisoryError> {
        self.outcome(&self.vendors)
    }

    async fn ping(&self) -> Result<(), AdvisoryError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingGenerator {
    failing_models: Vec<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AdvisoryError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing_models.contains(&request.model) {
            Err(AdvisoryError::GenerationHttp {
                status: 500,
                message: "model overloaded".to_string(),
            })
        } else {
            Ok(format!("answer from {}", request.model))
        }
    }
}

fn settings() -> GenerationSettings {
    GenerationSettings {
        model: "gpt-4-turbo".to_string(),
        max_tokens: 300,
        fallback_model: "gpt-3.5-turbo".to_string(),
        fallback_max_tokens: 150,
    }
}

fn engine(store: InMemoryStore, generator: Arc<RecordingGenerator>) -> AdvisoryEngine {
    AdvisoryEngine::new(Arc::new(store), generator, settings())
}

fn acme() -> VendorRow {
    VendorRow {
        vendor_id: Some("42".to_string()),
        vendor_name: Some("Acme Corp".to_string()),
        contact_info: Some("security@acme.example".to_string()),
    }
}

#[tokio::test]
async fn single_vendor_row_is_found_without_generation() {
    let generator = Arc::new(RecordingGenerator::default());
    let engine = engine(
        InMemoryStore {
            vendors: vec![acme()],
            ..Default::default()
        },
        generator.clone(),
    );

    let state = engine.retrieve(&SearchQuery::tokenize("acme")).await;
    assert_eq!(
        state,
        AdvisoryState::Found(AdvisoryContext {
            vendors: vec![acme()],
            ..Default::default()
        })
    );

    let answer = engine.answer("acme").await;
    assert_eq!(answer.source, AdvisorySource::LocalStore);
    assert_eq!(
        answer.text,
        "Vendor ID: 42, Name: Acme Corp, Contact Info: security@acme.example\n"
    );
    assert!(generator.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn nothing_found_falls_back_to_scoped_generation() {
    let generator = Arc::new(RecordingGenerator::default());
    let engine = engine(InMemoryStore::default(), generator.clone());

    assert_eq!(
        engine.retrieve(&SearchQuery::tokenize("log4j rce")).await,
        AdvisoryState::NotFound {
            retrieval_failed: false
        }
    );

    let answer = engine.answer("log4j rce").await;
    assert_eq!(answer.source, AdvisorySource::ScopedGeneration);
    assert_eq!(answer.text, "answer from gpt-4-turbo");

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, 300);
    assert!(requests[0].user.contains("log4j rce"));
}

#[tokio::test]
async fn scoped_failure_falls_back_to_generic_guidance() {
    let generator = Arc::new(RecordingGenerator {
        failing_models: vec!["gpt-4-turbo".to_string()],
        ..Default::default()
    });
    let engine = engine(InMemoryStore::default(), generator.clone());

    let answer = engine.answer("log4j").await;
    assert_eq!(answer.source, AdvisorySource::GenericGeneration);
    assert_eq!(answer.text, "answer from gpt-3.5-turbo");

    let requests = generator.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].max_tokens, 150);
    assert!(!requests[1].user.contains("log4j"));
}

#[tokio::test]
async fn every_tier_failing_returns_static_guidance() {
    let generator = Arc::new(RecordingGenerator {
        failing_models: vec!["gpt-4-turbo".to_string(), "gpt-3.5-turbo".to_string()],
        ..Default::default()
    });
    let engine = engine(
        InMemoryStore {
            failing: true,
            ..Default::default()
        },
        generator,
    );

    let answer = engine.answer("openssl").await;
    assert_eq!(answer.source, AdvisorySource::StaticGuidance);
    assert_eq!(answer.text, STATIC_GUIDANCE);
}

#[tokio::test]
async fn store_failure_is_retrieval_failure() {
    let generator = Arc::new(RecordingGenerator::default());
    let store = InMemoryStore {
        failing: true,
        ..Default::default()
    };
    let engine = engine(store, generator);

    assert_eq!(
        engine.retrieve(&SearchQuery::tokenize("openssl")).await,
        AdvisoryState::NotFound {
            retrieval_failed: true
        }
    );
    assert_eq!(
        engine.answer("openssl").await.source,
        AdvisorySource::ScopedGeneration
    );
}

#[tokio::test]
async fn query_without_tokens_skips_the_store() {
    let generator = Arc::new(RecordingGenerator::default());
    let store = Arc::new(InMemoryStore {
        advisories: vec![AdvisoryRow::default()],
        ..Default::default()
    });
    let engine = AdvisoryEngine::new(store.clone(), generator, settings());

    let answer = engine.answer("  &  |  ").await;
    assert_eq!(answer.source, AdvisorySource::ScopedGeneration);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}
