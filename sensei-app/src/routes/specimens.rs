use super::{ApiResponse, created, error, not_found, ok, required, store_error};
use crate::server::SenseiState;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json};
use sensei_tools::records::{NewSpecimen, RecordId, SpecimenUpdate};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/specimens", get(list_specimens).post(create_specimen))
        .route(
            "/api/v1/specimens/{id}",
            get(get_specimen).put(update_specimen).delete(delete_specimen),
        )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_specimens(Extension(state): Extension<Arc<SenseiState>>) -> ApiResponse {
    match state.store.list_specimens().await {
        Ok(specimens) => ok(serde_json::json!({ "specimens": specimens })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_specimen(
    Extension(state): Extension<Arc<SenseiState>>,
    Json(mut new): Json<NewSpecimen>,
) -> ApiResponse {
    let Some(name) = required(&new.name) else {
        return error(StatusCode::BAD_REQUEST, "specimen_name_required");
    };
    new.name = name;
    match state.store.get_species(new.species_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("species_not_found"),
        Err(e) => return store_error(e),
    }
    match state.store.create_specimen(new).await {
        Ok(specimen) => created(serde_json::json!({ "specimen": specimen })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(specimen_id = id))]
async fn get_specimen(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<RecordId>,
) -> ApiResponse {
    match state.store.get_specimen(id).await {
        Ok(Some(specimen)) => ok(serde_json::json!({ "specimen": specimen })),
        Ok(None) => not_found("specimen_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(specimen_id = id))]
async fn update_specimen(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<RecordId>,
    Json(update): Json<SpecimenUpdate>,
) -> ApiResponse {
    if update.is_empty() {
        return error(StatusCode::BAD_REQUEST, "specimen_update_required");
    }
    match state.store.update_specimen(id, update).await {
        Ok(Some(specimen)) => ok(serde_json::json!({ "specimen": specimen })),
        Ok(None) => not_found("specimen_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(specimen_id = id))]
async fn delete_specimen(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<RecordId>,
) -> ApiResponse {
    match state.store.delete_specimen(id).await {
        Ok(true) => ok(serde_json::json!({ "deleted": id })),
        Ok(false) => not_found("specimen_not_found"),
        Err(e) => store_error(e),
    }
}
