//! Remediation ordering, fix planning and VEX generation endpoints

use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json, Response},
};
use std::collections::HashMap;

use crate::application::ApplicationError;
use crate::domain::VulnerabilityId;
use crate::presentation::controllers::{AppState, accept};
use crate::presentation::models::{
    ErrorResponse, FixPlanResponse, FixRequest, PrioritizeResponse, VexDocumentDto, VexRequest,
};

fn require_product(product_id: &str) -> Result<&str, Response> {
    let trimmed = product_id.trim();
    if trimmed.is_empty() {
        return Err(
            ApplicationError::invalid_input("productId", "Product ID cannot be empty")
                .into_response(),
        );
    }
    Ok(trimmed)
}

fn parse_ids(raw: &[String]) -> Result<Vec<VulnerabilityId>, Response> {
    raw.iter()
        .map(|id| VulnerabilityId::new(id.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApplicationError::from(e).into_response())
}

/// Rank a product's findings for remediation
#[utoipa::path(
    post,
    path = "/fixes/prioritize",
    tag = "fixes",
    request_body = FixRequest,
    responses(
        (status = 200, description = "Findings in remediation order", body = PrioritizeResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Registry unavailable", body = ErrorResponse)
    )
)]
pub async fn prioritize_fixes(
    State(app_state): State<AppState>,
    payload: Result<Json<FixRequest>, JsonRejection>,
) -> Result<Json<PrioritizeResponse>, Response> {
    let request = accept(payload)?;
    let product_id = require_product(&request.product_id)?;
    let ids = parse_ids(&request.vulnerability_ids)?;

    let priorities = app_state
        .fix_service
        .prioritize(product_id, &ids)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(priorities.into()))
}

/// Produce a remediation plan in priority order
#[utoipa::path(
    post,
    path = "/fixes/plan",
    tag = "fixes",
    request_body = FixRequest,
    responses(
        (status = 200, description = "Fix plan keyed by vulnerability ID", body = FixPlanResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Registry unavailable", body = ErrorResponse)
    )
)]
pub async fn generate_fix_plan(
    State(app_state): State<AppState>,
    payload: Result<Json<FixRequest>, JsonRejection>,
) -> Result<Json<FixPlanResponse>, Response> {
    let request = accept(payload)?;
    let product_id = require_product(&request.product_id)?;
    let ids = parse_ids(&request.vulnerability_ids)?;

    let plan = app_state
        .fix_service
        .plan(product_id, &ids)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(plan.into()))
}

/// Emit a VEX document for a product
#[utoipa::path(
    post,
    path = "/vex/generate",
    tag = "fixes",
    request_body = VexRequest,
    responses(
        (status = 200, description = "VEX document", body = VexDocumentDto),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn generate_vex(
    State(app_state): State<AppState>,
    payload: Result<Json<VexRequest>, JsonRejection>,
) -> Result<Json<VexDocumentDto>, Response> {
    let request = accept(payload)?;
    let product_id = require_product(&request.product_id)?;

    let fix_status = request
        .fix_status
        .map(|input| input.into_map(&request.vulnerability_ids))
        .unwrap_or_else(HashMap::new);

    let document =
        app_state
            .fix_service
            .generate_vex(product_id, &request.vulnerability_ids, &fix_status);

    Ok(Json(document.into()))
}
