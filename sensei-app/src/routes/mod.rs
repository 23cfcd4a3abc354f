pub mod advice;
pub mod confirmations;
pub mod fertilizers;
pub mod health;
pub mod sessions;
pub mod species;
pub mod specimens;
pub mod telegram;
pub mod treatments;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use sensei_tools::records::StoreError;

pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(advice::router())
        .merge(confirmations::router())
        .merge(sessions::router())
        .merge(species::router())
        .merge(specimens::router())
        .merge(fertilizers::router())
        .merge(treatments::router())
        .merge(telegram::router())
}

pub(crate) type ApiResponse = (StatusCode, Json<serde_json::Value>);

pub(crate) fn ok(body: serde_json::Value) -> ApiResponse {
    with_status(StatusCode::OK, body)
}

pub(crate) fn created(body: serde_json::Value) -> ApiResponse {
    with_status(StatusCode::CREATED, body)
}

pub(crate) fn error(status: StatusCode, code: &str) -> ApiResponse {
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": code })),
    )
}

pub(crate) fn not_found(code: &str) -> ApiResponse {
    error(StatusCode::NOT_FOUND, code)
}

pub(crate) fn store_error(e: StoreError) -> ApiResponse {
    match e {
        StoreError::Constraint(message) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "error",
                "error": "constraint_violation",
                "message": message,
            })),
        ),
        other => {
            tracing::error!(error = %other, "record store failure");
            error(StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        }
    }
}

/// Trimmed, non-empty value of a required text field.
pub(crate) fn required(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn with_status(status: StatusCode, body: serde_json::Value) -> ApiResponse {
    let mut body = body;
    if let Some(map) = body.as_object_mut() {
        map.entry("status").or_insert_with(|| "ok".into());
    }
    (status, Json(body))
}
