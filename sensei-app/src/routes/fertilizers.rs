use super::{ApiResponse, created, error, not_found, ok, required, store_error};
use crate::server::SenseiState;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json};
use sensei_tools::records::{FertilizerUpdate, NewFertilizer};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route(
            "/api/v1/fertilizers",
            get(list_fertilizers).post(create_fertilizer),
        )
        .route(
            "/api/v1/fertilizers/{name}",
            get(get_fertilizer)
                .put(update_fertilizer)
                .delete(delete_fertilizer),
        )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_fertilizers(Extension(state): Extension<Arc<SenseiState>>) -> ApiResponse {
    match state.store.list_fertilizers().await {
        Ok(fertilizers) => ok(serde_json::json!({ "fertilizers": fertilizers })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_fertilizer(
    Extension(state): Extension<Arc<SenseiState>>,
    Json(mut new): Json<NewFertilizer>,
) -> ApiResponse {
    let Some(name) = required(&new.name) else {
        return error(StatusCode::BAD_REQUEST, "fertilizer_name_required");
    };
    new.name = name;
    match state.store.create_fertilizer(new).await {
        Ok(fertilizer) => created(serde_json::json!({ "fertilizer": fertilizer })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(fertilizer = %name))]
async fn get_fertilizer(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(name): Path<String>,
) -> ApiResponse {
    match state.store.get_fertilizer(&name).await {
        Ok(Some(fertilizer)) => ok(serde_json::json!({ "fertilizer": fertilizer })),
        Ok(None) => not_found("fertilizer_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(fertilizer = %name))]
async fn update_fertilizer(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(name): Path<String>,
    Json(update): Json<FertilizerUpdate>,
) -> ApiResponse {
    if update.is_empty() {
        return error(StatusCode::BAD_REQUEST, "fertilizer_update_required");
    }
    match state.store.update_fertilizer(&name, update).await {
        Ok(Some(fertilizer)) => ok(serde_json::json!({ "fertilizer": fertilizer })),
        Ok(None) => not_found("fertilizer_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(fertilizer = %name))]
async fn delete_fertilizer(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(name): Path<String>,
) -> ApiResponse {
    match state.store.delete_fertilizer(&name).await {
        Ok(true) => ok(serde_json::json!({ "deleted": name })),
        Ok(false) => not_found("fertilizer_not_found"),
        Err(e) => store_error(e),
    }
}
