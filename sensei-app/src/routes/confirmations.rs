use super::{ApiResponse, error, not_found, ok, required, store_error};
use crate::confirmations::{Approval, Rejection};
use crate::server::SenseiState;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json};
use sensei_tools::{ConfirmationId, OwnerId};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    user_id: String,
}

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/confirmations", get(list_confirmations))
        .route("/api/v1/confirmations/{id}/approve", post(approve_confirmation))
        .route("/api/v1/confirmations/{id}/reject", post(reject_confirmation))
}

fn owner_from(user_id: &str) -> Result<OwnerId, ApiResponse> {
    required(user_id)
        .map(OwnerId::new)
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "user_id_required"))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_confirmations(
    Extension(state): Extension<Arc<SenseiState>>,
    Query(query): Query<OwnerQuery>,
) -> ApiResponse {
    let owner = match owner_from(&query.user_id) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    let confirmations: Vec<serde_json::Value> = state
        .queue
        .list_pending(&owner)
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id(),
                "summary": c.summary(),
                "announced": c.announced(),
                "created_at": c.created_at(),
            })
        })
        .collect();
    ok(serde_json::json!({ "confirmations": confirmations }))
}

#[tracing::instrument(level = "info", skip_all, fields(confirmation_id = %id))]
async fn approve_confirmation(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> ApiResponse {
    let owner = match owner_from(&req.user_id) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    match state
        .executor
        .approve(&owner, &ConfirmationId::new(id))
        .await
    {
        Ok(Approval::Executed {
            confirmation,
            outcome,
        }) => ok(serde_json::json!({
            "confirmation": confirmation,
            "outcome": outcome,
        })),
        Ok(Approval::NotFound) => not_found("confirmation_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(confirmation_id = %id))]
async fn reject_confirmation(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> ApiResponse {
    let owner = match owner_from(&req.user_id) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    match state.executor.reject(&owner, &ConfirmationId::new(id)) {
        Rejection::Rejected { confirmation } => ok(serde_json::json!({
            "status": "rejected",
            "confirmation": confirmation,
        })),
        Rejection::NotFound => not_found("confirmation_not_found"),
    }
}
