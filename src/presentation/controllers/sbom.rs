//! SBOM analysis and update endpoints

use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json, Response},
};
use std::collections::BTreeMap;

use crate::presentation::controllers::{AppState, accept};
use crate::presentation::models::{
    AnalyzeSbomRequest, ComponentFindingsDto, ErrorResponse, UpdateSbomRequest,
    UpdateSbomResponse,
};

/// Look up every component identifier of an SBOM in the CVE registry
#[utoipa::path(
    post,
    path = "/sbom/analyze",
    tag = "sbom",
    request_body = AnalyzeSbomRequest,
    responses(
        (status = 200, description = "Findings keyed by component identifier", body = BTreeMap<String, ComponentFindingsDto>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Every registry lookup failed", body = ErrorResponse)
    )
)]
pub async fn analyze_sbom(
    State(app_state): State<AppState>,
    payload: Result<Json<AnalyzeSbomRequest>, JsonRejection>,
) -> Result<Json<BTreeMap<String, ComponentFindingsDto>>, Response> {
    let request = accept(payload)?;

    let analysis = app_state
        .analysis_service
        .analyze_sbom(&request.sbom)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(
        analysis
            .iter()
            .map(|(cpe, findings)| (cpe.clone(), ComponentFindingsDto::from(findings)))
            .collect(),
    ))
}

/// Annotate SBOM component identifiers with applied fix statuses
#[utoipa::path(
    post,
    path = "/sbom/update",
    tag = "sbom",
    request_body = UpdateSbomRequest,
    responses(
        (status = 200, description = "Annotated SBOM", body = UpdateSbomResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn update_sbom(
    State(app_state): State<AppState>,
    payload: Result<Json<UpdateSbomRequest>, JsonRejection>,
) -> Result<Json<UpdateSbomResponse>, Response> {
    let request = accept(payload)?;

    tracing::debug!(
        artifacts = request.sbom.artifacts.len(),
        fixes = request.fixes.len(),
        "Applying fix statuses to SBOM"
    );

    Ok(Json(UpdateSbomResponse {
        updated_sbom: app_state.fix_service.update_sbom(&request.sbom, &request.fixes),
    }))
}
