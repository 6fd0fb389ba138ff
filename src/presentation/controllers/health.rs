//! Health check controller

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use serde_json::json;
use std::time::Instant;

use crate::presentation::controllers::AppState;
use crate::presentation::models::HealthResponse;

/// Basic health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        details: None,
    })
}

/// Detailed health check with cache statistics, store connectivity and build info.
///
/// An unreachable advisory store only degrades the service: advisory queries still
/// answer through generation.
#[utoipa::path(
    get,
    path = "/health/detailed",
    tag = "health",
    responses(
        (status = 200, description = "Detailed health information", body = HealthResponse)
    )
)]
pub async fn detailed_health_check(State(app_state): State<AppState>) -> Json<HealthResponse> {
    let start_time = Instant::now();
    let mut overall_status = "healthy";

    let cache_stats = app_state.cache.stats().await;

    let store_status = match app_state.advisory_store.ping().await {
        Ok(()) => json!({ "status": "healthy", "last_check": Utc::now() }),
        Err(e) => {
            overall_status = "degraded";
            json!({ "status": "unavailable", "message": e.to_string(), "last_check": Utc::now() })
        }
    };

    Json(HealthResponse {
        status: overall_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        details: Some(json!({
            "dependencies": {
                "advisory_store": store_status,
            },
            "cache_statistics": {
                "hits": cache_stats.hits,
                "misses": cache_stats.misses,
                "hit_rate": cache_stats.hit_rate(),
                "expired_entries": cache_stats.expired_entries,
                "cleanup_runs": cache_stats.cleanup_runs,
                "in_flight_keys": cache_stats.in_flight_keys,
                "total_entries": cache_stats.total_entries,
            },
            "check_duration_ms": start_time.elapsed().as_millis() as u64,
            "uptime_seconds": app_state.started_at.elapsed().as_secs(),
            "build_info": {
                "version": env!("CARGO_PKG_VERSION"),
                "build_date": option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
                "git_sha": option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
            }
        })),
    })
}

/// Liveness probe endpoint
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn liveness_probe() -> StatusCode {
    StatusCode::OK
}
