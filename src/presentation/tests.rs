use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use crate::application::{
    AdvisoryEngine, AdvisoryError, AnalysisServiceImpl, FixServiceImpl, GenerationSettings,
    VulnerabilityError,
};
use crate::domain::{CpeName, VulnerabilityId, VulnerabilityRecord};
use crate::infrastructure::{
    DisabledAdvisoryStore, GenerationRequest, LookupCache, TextGenerator, VulnerabilityRepository,
};
use crate::presentation::{AppState, create_router};

struct StaticRepository {
    records: HashMap<String, VulnerabilityRecord>,
}

#[async_trait]
impl VulnerabilityRepository for StaticRepository {
    async fn lookup(
        &self,
        _cpe: &CpeName,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        Ok(self.records.values().cloned().collect::<Vec<_>>().into())
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
        Ok(self.records.get(id.as_str()).cloned())
    }
}

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AdvisoryError> {
        Ok(format!("generated by {}", request.model))
    }
}

fn record(id: &str, score: Option<f64>, severity: Option<&str>) -> VulnerabilityRecord {
    VulnerabilityRecord {
        id: VulnerabilityId::new(id).unwrap(),
        description: "Remote code execution".to_string(),
        base_score: score,
        exploitability_score: score.map(|_| 3.9),
        impact_score: score.map(|_| 6.0),
        base_severity: severity.map(str::to_string),
        cvss_version: None,
        component: None,
    }
}

fn test_state() -> AppState {
    let records = [
        record("CVE-2021-44228", Some(10.0), Some("CRITICAL")),
        record("CVE-2019-0001", None, None),
    ]
    .into_iter()
    .map(|r| (r.id.to_string(), r))
    .collect();
    let repository = Arc::new(StaticRepository { records });
    let store = Arc::new(DisabledAdvisoryStore);

    AppState {
        analysis_service: Arc::new(AnalysisServiceImpl::new(repository.clone(), 2)),
        fix_service: Arc::new(FixServiceImpl::new(repository)),
        advisory_engine: Arc::new(AdvisoryEngine::new(
            store.clone(),
            Arc::new(EchoGenerator),
            GenerationSettings::from(&crate::Config::default().apis.generative),
        )),
        advisory_store: store,
        cache: Arc::new(LookupCache::new(Duration::from_secs(60))),
        started_at: Instant::now(),
    }
}

fn app() -> Router {
    create_router(test_state(), &crate::Config::default().server)
}

async fn post_json(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn docs_disabled_returns_404() {
    let mut config = crate::Config::default();
    config.server.enable_docs = false;
    let app = create_router(test_state(), &config.server);
    let response = app
        .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn docs_enabled_returns_ok() {
    let response = app()
        .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // Swagger UI may redirect (303) before serving index depending on version
    assert!(
        matches!(response.status(), StatusCode::OK | StatusCode::SEE_OTHER),
        "unexpected status: {}",
        response.status()
    );
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let (status, body) = post_json(app(), "/sbom/analyze", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn ill_typed_body_is_bad_request() {
    let (status, _) = post_json(
        app(),
        "/fixes/prioritize",
        json!({ "productId": "p1", "vulnerabilityIds": "CVE-2021-44228" }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assess_returns_registry_fields() {
    let (status, body) = post_json(
        app(),
        "/vulnerability/assess",
        json!({ "cveId": "CVE-2021-44228" }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let assessment = &body["CVE-2021-44228"];
    assert_eq!(assessment["CVE ID"], "CVE-2021-44228");
    assert_eq!(assessment["CVSS Score"], 10.0);
    assert_eq!(assessment["baseSeverity"], "CRITICAL");
    assert_eq!(assessment["exploitabilityScore"], 3.9);
}

#[tokio::test]
async fn assess_without_metrics_reports_na_and_accepts_snake_case() {
    let (status, body) = post_json(
        app(),
        "/vulnerability/assess",
        json!({ "cve_id": "CVE-2019-0001" }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["CVE-2019-0001"]["CVSS Score"], "N/A");
    assert!(body["CVE-2019-0001"]["impactScore"].is_null());
}

#[tokio::test]
async fn assess_unknown_cve_is_not_found() {
    let (status, body) = post_json(
        app(),
        "/vulnerability/assess",
        json!({ "cveId": "CVE-2000-9999" }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn assess_empty_cve_is_bad_request() {
    let (status, body) = post_json(
        app(),
        "/vulnerability/assess",
        json!({ "cveId": "  " }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn prioritize_reports_priority_rank_and_ranking() {
    let (status, body) = post_json(
        app(),
        "/fixes/prioritize",
        json!({
            "product_id": "gateway",
            "vulnerability_ids": ["CVE-2019-0001", "CVE-2021-44228"]
        })
        .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["productId"], "gateway");
    assert_eq!(body["ranking"], json!(["CVE-2021-44228", "CVE-2019-0001"]));
    assert_eq!(body["prioritizedFixes"]["CVE-2021-44228"]["priority"], "Critical");
    assert_eq!(body["prioritizedFixes"]["CVE-2021-44228"]["rank"], 1);
    assert_eq!(body["prioritizedFixes"]["CVE-2019-0001"]["priority"], "Unknown");
}

#[tokio::test]
async fn fix_plan_estimates_by_severity() {
    let (status, body) = post_json(
        app(),
        "/fixes/plan",
        json!({ "productId": "gateway", "vulnerabilityIds": ["CVE-2021-44228"] }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let entry = &body["fixPlan"]["CVE-2021-44228"];
    assert_eq!(entry["estimatedCompletion"], "48 hours");
    assert_eq!(entry["status"], "Pending");
    assert!(entry["fixAction"].as_str().unwrap().starts_with("Patch for CVE-2021-44228"));
}

#[tokio::test]
async fn empty_product_id_is_bad_request() {
    let (status, _) = post_json(
        app(),
        "/fixes/plan",
        json!({ "productId": "", "vulnerabilityIds": [] }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn vex_accepts_single_status_for_every_finding() {
    let (status, body) = post_json(
        app(),
        "/vex/generate",
        json!({
            "productId": "gateway",
            "vulnerabilityIds": ["CVE-1", "CVE-2"],
            "fixStatus": "Applied"
        })
        .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "product_id": "gateway",
            "vulnerabilities": [
                { "vulnerability_id": "CVE-1", "status": "Applied" },
                { "vulnerability_id": "CVE-2", "status": "Applied" }
            ]
        })
    );
}

#[tokio::test]
async fn vex_rejects_unknown_status() {
    let (status, _) = post_json(
        app(),
        "/vex/generate",
        json!({
            "productId": "gateway",
            "vulnerabilityIds": ["CVE-1"],
            "fixStatus": { "CVE-1": "Maybe" }
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sbom_update_annotates_matching_cpes() {
    let cpe = "cpe:2.3:a:apache:log4j:2.14.1:*:*:*:*:*:*:*";
    let (status, body) = post_json(
        app(),
        "/sbom/update",
        json!({
            "sbom": { "artifacts": [{ "name": "log4j-core", "version": "2.14.1", "cpes": [{ "cpe": cpe }] }] },
            "fixes": { cpe: "fixed" }
        })
        .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["updatedSbom"]["artifacts"][0]["cpes"][0]["fix_status"],
        "Applied"
    );
}

#[tokio::test]
async fn advisory_query_falls_back_to_generation_without_store() {
    let (status, body) = post_json(
        app(),
        "/advisory/query",
        json!({ "query": "log4j jndi" }).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "log4j jndi");
    assert_eq!(body["source"], "scoped_generation");
    assert_eq!(body["context"], "generated by gpt-4-turbo");
}

#[tokio::test]
async fn blank_advisory_query_is_bad_request() {
    let (status, _) =
        post_json(app(), "/advisory/query", json!({ "query": " " }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detailed_health_reports_degraded_store() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health/detailed")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["details"]["dependencies"]["advisory_store"]["status"], "unavailable");
    assert_eq!(body["details"]["cache_statistics"]["total_entries"], 0);
}
