//! Bonsai sensei server: wiring, HTTP stack and graceful shutdown.

use crate::assistant::LlmAgentRuntime;
use crate::config::SenseiConfig;
use crate::confirmations::ConfirmationExecutor;
use crate::gateway::{Gateway, SenderPolicy};
use crate::routes;
use crate::session::SessionManager;
use crate::turn::{Orchestrator, TurnResult};
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use sensei_channels::{ChannelAdapter, TelegramAdapter};
use sensei_llm::LlmClient;
use sensei_tools::records::{RecordStore, SqliteRecordStore};
use sensei_tools::{ConfirmationQueue, OwnerId, build_toolset};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct SenseiState {
    pub store: Arc<dyn RecordStore>,
    pub queue: Arc<ConfirmationQueue>,
    pub orchestrator: Arc<Orchestrator>,
    pub executor: Arc<ConfirmationExecutor>,
    pub sessions: Arc<SessionManager>,
    pub channels: HashMap<String, Arc<dyn ChannelAdapter>>,
    pub started_at: Instant,
}

/// Services shared by the HTTP API, the chat gateway and the CLI.
struct Core {
    store: Arc<dyn RecordStore>,
    queue: Arc<ConfirmationQueue>,
    sessions: Arc<SessionManager>,
    orchestrator: Arc<Orchestrator>,
    executor: Arc<ConfirmationExecutor>,
}

fn build_core(cfg: &SenseiConfig) -> Result<Core> {
    let db_path = cfg.database_path()?;
    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open(&db_path)?);
    tracing::info!(database_path = %db_path.display(), "record store opened");

    let queue = Arc::new(ConfirmationQueue::new());
    let tools = build_toolset(
        store.clone(),
        queue.clone(),
        cfg.agent.max_identical_tool_calls,
    )?;
    tracing::info!(
        tool_count = tools.len(),
        tools = ?tools.names(),
        identical_call_limit = cfg.agent.max_identical_tool_calls,
        "toolset registered"
    );

    let api_key = cfg.llm_api_key().ok_or_else(|| {
        anyhow::anyhow!("no LLM api key configured (keys.llm_api_key or SENSEI_LLM_API_KEY)")
    })?;
    let llm = LlmClient::new(
        api_key,
        &cfg.general.model,
        cfg.general.api_base_url.as_deref(),
    )?;
    tracing::info!(model = %llm.model(), base_url = %llm.base_url(), "llm client initialized");

    let sessions = Arc::new(SessionManager::new(cfg.agent.history_max_messages));
    let runtime = Arc::new(LlmAgentRuntime::new(
        Arc::new(llm),
        tools,
        sessions.clone(),
        cfg.general.system_prompt.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        runtime,
        queue.clone(),
        cfg.agent.max_steps,
    ));
    let executor = Arc::new(ConfirmationExecutor::new(queue.clone(), store.clone()));

    Ok(Core {
        store,
        queue,
        sessions,
        orchestrator,
        executor,
    })
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = SenseiConfig::load_with_path(config_path).await?;
    tracing::info!(
        model = %cfg.general.model,
        llm_api_key_configured = cfg.llm_api_key().is_some(),
        database_path = %cfg.database_path()?.display(),
        bind_addr = %cfg.server.bind,
        telegram_enabled = cfg.channels.telegram.enabled,
        config_path = %path.display(),
        "config ok"
    );
    Ok(())
}

/// Runs a single turn and prints the reply.
///
/// The confirmation queue lives in memory, so proposals made here cannot be
/// approved once the process exits.
pub async fn ask(config_path: Option<PathBuf>, user: &str, message: &str) -> Result<()> {
    let cfg = SenseiConfig::load(config_path).await?;
    let core = build_core(&cfg)?;
    let result = core
        .orchestrator
        .run_turn(&OwnerId::new(user), message)
        .await?;
    println!("{}", ask_output(&result));
    Ok(())
}

fn ask_output(result: &TurnResult) -> String {
    if result.pending.is_empty() {
        return result.text.clone();
    }
    format!(
        "{}\n{} proposed change(s) discarded: confirmations only survive inside `serve`",
        result.text,
        result.pending.len()
    )
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = SenseiConfig::load(config_path).await?;
    let started_at = Instant::now();
    let addr = cfg.server.bind;
    tracing::info!(
        bind_addr = %addr,
        model = %cfg.general.model,
        max_steps = cfg.agent.max_steps,
        max_identical_tool_calls = cfg.agent.max_identical_tool_calls,
        history_max_messages = cfg.agent.history_max_messages,
        http_timeout_secs = cfg.server.http_timeout_secs,
        http_max_in_flight = cfg.server.max_in_flight,
        telegram_enabled = cfg.channels.telegram.enabled,
        telegram_allow_all_senders = cfg.channels.telegram.allow_all_senders,
        telegram_allowed_users = cfg.channels.telegram.allowed_users.len(),
        "server configuration loaded"
    );

    let listener = preflight_bind_listener(addr).await?;
    let core = build_core(&cfg)?;

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(1024);
    let mut channels: HashMap<String, Arc<dyn ChannelAdapter>> = HashMap::new();
    if cfg.channels.telegram.enabled {
        let telegram = Arc::new(TelegramAdapter::new(&cfg.channels.telegram.bot_token)?);
        telegram.start(inbound_tx.clone()).await?;
        if !cfg.channels.telegram.allow_all_senders
            && cfg.channels.telegram.allowed_users.is_empty()
        {
            tracing::warn!("telegram enabled with an empty allowlist; every sender is ignored");
        }
        channels.insert(telegram.channel_id().to_string(), telegram);
    }
    drop(inbound_tx);

    let shutdown = CancellationToken::new();
    let gateway = Arc::new(Gateway::new(
        SenderPolicy::from_config(&cfg.channels.telegram),
        core.orchestrator.clone(),
        core.executor.clone(),
        core.queue.clone(),
        core.sessions.clone(),
        channels.clone(),
        inbound_rx,
    ));
    let gateway_handle = gateway.start(shutdown.child_token());
    tracing::info!(
        channel_count = channels.len(),
        channels = ?channels.keys().collect::<Vec<_>>(),
        "gateway started"
    );

    let state = Arc::new(SenseiState {
        store: core.store,
        queue: core.queue,
        orchestrator: core.orchestrator,
        executor: core.executor,
        sessions: core.sessions,
        channels,
        started_at,
    });

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router()
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_secs),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "bonsai sensei serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");

    shutdown.cancel();
    match gateway_handle.await {
        Ok(()) => tracing::info!("gateway shutdown completed"),
        Err(e) => tracing::error!(error = %e, "gateway task join failed during shutdown"),
    }

    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
            _ = shutdown.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => {}
        }
    }
    shutdown.cancel();
}
