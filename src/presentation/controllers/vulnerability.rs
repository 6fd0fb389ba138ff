//! Single CVE risk assessment

use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json, Response},
};
use std::collections::BTreeMap;

use crate::application::ApplicationError;
use crate::domain::VulnerabilityId;
use crate::presentation::controllers::{AppState, accept};
use crate::presentation::models::{AssessRequest, AssessmentDto, ErrorResponse};

#[utoipa::path(
    post,
    path = "/vulnerability/assess",
    tag = "vulnerabilities",
    request_body = AssessRequest,
    responses(
        (status = 200, description = "Assessment keyed by CVE ID", body = BTreeMap<String, AssessmentDto>),
        (status = 400, description = "Invalid CVE ID", body = ErrorResponse),
        (status = 404, description = "CVE not known to the registry", body = ErrorResponse),
        (status = 500, description = "Registry unavailable", body = ErrorResponse)
    )
)]
pub async fn assess_vulnerability(
    State(app_state): State<AppState>,
    payload: Result<Json<AssessRequest>, JsonRejection>,
) -> Result<Json<BTreeMap<String, AssessmentDto>>, Response> {
    let request = accept(payload)?;
    let id = VulnerabilityId::new(request.cve_id)
        .map_err(|e| ApplicationError::from(e).into_response())?;

    let record = app_state
        .analysis_service
        .get_vulnerability_details(&id)
        .await
        .map_err(IntoResponse::into_response)?;

    let mut assessment = BTreeMap::new();
    assessment.insert(id.to_string(), AssessmentDto::from(&record));
    Ok(Json(assessment))
}
