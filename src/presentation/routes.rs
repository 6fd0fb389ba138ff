//! Route definitions and server setup

use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::presentation::{
    controllers::{
        AppState,
        advisory::query_advisory,
        fixes::{generate_fix_plan, generate_vex, prioritize_fixes},
        health::{detailed_health_check, health_check, liveness_probe},
        sbom::{analyze_sbom, update_sbom},
        vulnerability::assess_vulnerability,
    },
    middleware::logging_middleware,
    models::*,
};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::sbom::analyze_sbom,
        crate::presentation::controllers::sbom::update_sbom,
        crate::presentation::controllers::vulnerability::assess_vulnerability,
        crate::presentation::controllers::fixes::prioritize_fixes,
        crate::presentation::controllers::fixes::generate_fix_plan,
        crate::presentation::controllers::fixes::generate_vex,
        crate::presentation::controllers::advisory::query_advisory,
        crate::presentation::controllers::health::health_check,
        crate::presentation::controllers::health::detailed_health_check,
        crate::presentation::controllers::health::liveness_probe
    ),
    components(
        schemas(
            AnalyzeSbomRequest,
            ComponentFindingsDto,
            VulnerabilityRecordDto,
            AssessRequest,
            AssessmentDto,
            FixRequest,
            PriorityDto,
            PrioritizeResponse,
            FixPlanEntryDto,
            FixPlanResponse,
            VexRequest,
            VexStatementDto,
            VexDocumentDto,
            UpdateSbomRequest,
            UpdateSbomResponse,
            AdvisoryQueryRequest,
            AdvisoryQueryResponse,
            ErrorResponse,
            HealthResponse
        )
    ),
    tags(
        (name = "sbom", description = "SBOM vulnerability analysis and fix annotation"),
        (name = "vulnerabilities", description = "Single CVE risk assessment"),
        (name = "fixes", description = "Remediation ordering, fix plans and VEX documents"),
        (name = "advisory", description = "Advisory question answering"),
        (name = "health", description = "Service health endpoints")
    ),
    info(
        title = "SBOM VEX API",
        version = "0.1.0",
        description = "Looks up SBOM components in the NVD CVE registry, ranks findings for remediation, emits VEX documents and answers advisory questions from a local store with a generative fallback."
    )
)]
pub struct ApiDoc;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

/// Create the application router with its middleware stack
pub fn create_router(app_state: AppState, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/sbom/analyze", post(analyze_sbom))
        .route("/sbom/update", post(update_sbom))
        .route("/vulnerability/assess", post(assess_vulnerability))
        .route("/fixes/prioritize", post(prioritize_fixes))
        .route("/fixes/plan", post(generate_fix_plan))
        .route("/vex/generate", post(generate_vex))
        .route("/advisory/query", post(query_advisory));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .route("/health/live", get(liveness_probe));

    let mut router = Router::new().merge(api_routes).merge(health_routes);

    if config.enable_docs {
        router = router
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.allowed_origins))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(config.request_timeout_seconds),
                ))
                .layer(middleware::from_fn(logging_middleware)),
        )
        .with_state(app_state)
}
