//! Advisory question answering

use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json, Response},
};

use crate::application::ApplicationError;
use crate::presentation::controllers::{AppState, accept};
use crate::presentation::models::{AdvisoryQueryRequest, AdvisoryQueryResponse, ErrorResponse};

/// Answer a free-text query from the local advisory store, falling back to generation
#[utoipa::path(
    post,
    path = "/advisory/query",
    tag = "advisory",
    request_body = AdvisoryQueryRequest,
    responses(
        (status = 200, description = "Advisory context and the tier that produced it", body = AdvisoryQueryResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn query_advisory(
    State(app_state): State<AppState>,
    payload: Result<Json<AdvisoryQueryRequest>, JsonRejection>,
) -> Result<Json<AdvisoryQueryResponse>, Response> {
    let request = accept(payload)?;
    if request.query.trim().is_empty() {
        return Err(
            ApplicationError::invalid_input("query", "Query cannot be empty").into_response(),
        );
    }

    let answer = app_state.advisory_engine.answer(&request.query).await;
    tracing::info!(source = ?answer.source, "Advisory query answered");

    Ok(Json(AdvisoryQueryResponse::new(request.query, answer)))
}
