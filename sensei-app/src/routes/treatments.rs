use super::{ApiResponse, created, error, not_found, ok, required, store_error};
use crate::server::SenseiState;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json};
use sensei_tools::records::{NewTreatment, TreatmentUpdate};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route(
            "/api/v1/treatments",
            get(list_treatments).post(create_treatment),
        )
        .route(
            "/api/v1/treatments/{name}",
            get(get_treatment)
                .put(update_treatment)
                .delete(delete_treatment),
        )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_treatments(Extension(state): Extension<Arc<SenseiState>>) -> ApiResponse {
    match state.store.list_treatments().await {
        Ok(treatments) => ok(serde_json::json!({ "treatments": treatments })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_treatment(
    Extension(state): Extension<Arc<SenseiState>>,
    Json(mut new): Json<NewTreatment>,
) -> ApiResponse {
    let Some(name) = required(&new.name) else {
        return error(StatusCode::BAD_REQUEST, "treatment_name_required");
    };
    new.name = name;
    match state.store.create_treatment(new).await {
        Ok(treatment) => created(serde_json::json!({ "treatment": treatment })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(treatment = %name))]
async fn get_treatment(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(name): Path<String>,
) -> ApiResponse {
    match state.store.get_treatment(&name).await {
        Ok(Some(treatment)) => ok(serde_json::json!({ "treatment": treatment })),
        Ok(None) => not_found("treatment_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(treatment = %name))]
async fn update_treatment(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(name): Path<String>,
    Json(update): Json<TreatmentUpdate>,
) -> ApiResponse {
    if update.is_empty() {
        return error(StatusCode::BAD_REQUEST, "treatment_update_required");
    }
    match state.store.update_treatment(&name, update).await {
        Ok(Some(treatment)) => ok(serde_json::json!({ "treatment": treatment })),
        Ok(None) => not_found("treatment_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(treatment = %name))]
async fn delete_treatment(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(name): Path<String>,
) -> ApiResponse {
    match state.store.delete_treatment(&name).await {
        Ok(true) => ok(serde_json::json!({ "deleted": name })),
        Ok(false) => not_found("treatment_not_found"),
        Err(e) => store_error(e),
    }
}
