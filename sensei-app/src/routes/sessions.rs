use super::{ApiResponse, not_found, ok};
use crate::server::SenseiState;
use axum::extract::Path;
use axum::routing::{delete, get};
use axum::{Extension, Json};
use sensei_tools::OwnerId;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/{owner}", delete(reset_session))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_sessions(Extension(state): Extension<Arc<SenseiState>>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({ "status": "ok", "sessions": sessions }))
}

/// Same effect as `/reset` in chat: history and pending confirmations go.
#[tracing::instrument(level = "info", skip_all, fields(owner = %owner))]
async fn reset_session(
    Extension(state): Extension<Arc<SenseiState>>,
    Path(owner): Path<String>,
) -> ApiResponse {
    let owner = OwnerId::new(owner);
    let existed = state.sessions.reset(&owner);
    let discarded = state.queue.clear(&owner);
    if !existed && discarded == 0 {
        return not_found("session_not_found");
    }
    tracing::info!(discarded, "session reset over http");
    ok(serde_json::json!({ "discarded_confirmations": discarded }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{call, state};
    use axum::http::{Method, StatusCode};
    use sensei_llm::{ChatMessage, Usage};
    use sensei_tools::OwnerId;

    #[tokio::test]
    async fn lists_sessions_with_usage() {
        let state = state();
        state.sessions.record_turn(
            &OwnerId::new("42"),
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            Usage {
                prompt_tokens: 12,
                completion_tokens: 3,
            },
        );
        let (status, body) = call(&state, Method::GET, "/api/v1/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions"][0]["owner"], "42");
        assert_eq!(body["sessions"][0]["messages"], 2);
        assert_eq!(body["sessions"][0]["usage"]["prompt_tokens"], 12);
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let state = state();
        state.sessions.record_turn(
            &OwnerId::new("42"),
            vec![ChatMessage::user("hi")],
            Usage::default(),
        );

        let (status, _) = call(&state, Method::DELETE, "/api/v1/sessions/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.sessions.history(&OwnerId::new("42")).is_empty());

        let (status, body) = call(&state, Method::DELETE, "/api/v1/sessions/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
    }
}
