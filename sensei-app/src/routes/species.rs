use super::{ApiResponse, created, error, not_found, ok, required, store_error};
use crate::server::SenseiState;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json};
use sensei_tools::records::{NewSpecies, RecordId, SpeciesUpdate};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct SearchQuery {
    name: String,
}

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/species", get(list_species).post(create_species))
        .route("/api/v1/species/search", get(search_species))
        .route(
            "/api/v1/species/{id}",
            get(get_species).put(update_species).delete(delete_species),
        )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_species(Extension(state): Extension<Arc<SenseiState>>) -> ApiResponse {
    match state.store.list_species().await {
        Ok(species) => ok(serde_json::json!({ "species": species })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "debug", skip_all)]
async fn search_species(
    Extension(state): Extension<Arc<SenseiState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResponse {
    let Some(name) = required(&query.name) else {
        return error(StatusCode::BAD_REQUEST, "name_required");
    };
    match state.store.search_species(&name).await {
        Ok(species) => ok(serde_json::json!({ "species": species })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_species(
    Extension(state): Extension<Arc<SenseiState>>,
    Json(mut new): Json<NewSpecies>,
) -> ApiResponse {
    let Some(name) = required(&new.name) else {
        return error(StatusCode::BAD_REQUEST, "species_name_required");
    };
    new.name = name;
    if new.care_guide.is_null() {
        new.care_guide = serde_json::json!({});
    }
    match state.store.create_species(new).await {
        Ok(species) => created(serde_json::json!({ "species": species })),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(species_id = id))]
async fn get_species(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<RecordId>,
) -> ApiResponse {
    match state.store.get_species(id).await {
        Ok(Some(species)) => ok(serde_json::json!({ "species": species })),
        Ok(None) => not_found("species_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(species_id = id))]
async fn update_species(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<RecordId>,
    Json(update): Json<SpeciesUpdate>,
) -> ApiResponse {
    if update.is_empty() {
        return error(StatusCode::BAD_REQUEST, "species_update_required");
    }
    match state.store.update_species(id, update).await {
        Ok(Some(species)) => ok(serde_json::json!({ "species": species })),
        Ok(None) => not_found("species_not_found"),
        Err(e) => store_error(e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(species_id = id))]
async fn delete_species(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(id): Path<RecordId>,
) -> ApiResponse {
    match state.store.delete_species(id).await {
        Ok(true) => ok(serde_json::json!({ "deleted": id })),
        Ok(false) => not_found("species_not_found"),
        Err(e) => store_error(e),
    }
}
