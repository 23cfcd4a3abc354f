use super::{ApiResponse, error, ok, required};
use crate::server::SenseiState;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json};
use sensei_channels::OutboundMessage;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct SendRequest {
    chat_id: String,
    text: String,
}

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/telegram/send", post(send_message))
}

/// Operator message to a Telegram chat, bypassing the agent.
#[tracing::instrument(level = "info", skip_all)]
async fn send_message(
    Extension(state): Extension<Arc<SenseiState>>,
    Json(req): Json<SendRequest>,
) -> ApiResponse {
    let Some(adapter) = state.channels.get("telegram") else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "telegram_not_enabled");
    };
    let (Some(chat_id), Some(text)) = (required(&req.chat_id), required(&req.text)) else {
        return error(StatusCode::BAD_REQUEST, "chat_id_and_text_required");
    };

    if let Err(e) = adapter.send(&chat_id, OutboundMessage::text(text)).await {
        tracing::warn!(chat_id = %chat_id, error = %e, "telegram send failed");
        return error(StatusCode::BAD_GATEWAY, "telegram_send_failed");
    }
    ok(serde_json::json!({ "chat_id": chat_id }))
}
