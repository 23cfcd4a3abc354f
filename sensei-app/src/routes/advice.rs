use super::{ApiResponse, error, ok, required};
use crate::server::SenseiState;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json};
use sensei_tools::OwnerId;
use serde::Deserialize;
use std::sync::Arc;

/// Owner used when an HTTP caller does not identify the user.
const DEFAULT_HTTP_USER: &str = "http";

#[derive(Debug, Deserialize)]
struct AdviceRequest {
    text: String,
    #[serde(default)]
    user_id: Option<String>,
}

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/advice", post(post_advice))
}

#[tracing::instrument(level = "info", skip_all)]
async fn post_advice(
    Extension(state): Extension<Arc<SenseiState>>,
    Json(req): Json<AdviceRequest>,
) -> ApiResponse {
    let Some(text) = required(&req.text) else {
        return error(StatusCode::BAD_REQUEST, "text_required");
    };
    let owner = OwnerId::new(
        req.user_id
            .as_deref()
            .and_then(required)
            .unwrap_or_else(|| DEFAULT_HTTP_USER.to_string()),
    );

    match state.orchestrator.run_turn(&owner, &text).await {
        Ok(result) => ok(serde_json::json!({ "response": result })),
        Err(e) => {
            tracing::error!(owner = %owner, error = %e, "advice turn failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "processing_failed")
        }
    }
}
