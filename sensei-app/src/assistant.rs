//! LLM-backed agent runtime: prompt assembly and the tool-call loop.

use crate::session::SessionManager;
use async_trait::async_trait;
use sensei_llm::{ChatMessage, ChatResponse, LlmClient, ToolDefinition, Usage};
use sensei_tools::{OwnerId, ToolContext, ToolRegistry, TurnScope, tool_error};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Author of events produced by the model itself.
pub const SENSEI_AUTHOR: &str = "sensei";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("agent exceeded {limit} reasoning steps")]
    StepLimitExceeded { limit: usize },

    #[error("tool call limit exceeded: {0}")]
    ToolCallLimitExceeded(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RuntimeError {
    /// Failures that bound the agent's loop rather than signal a fault.
    pub fn is_loop_control(&self) -> bool {
        matches!(
            self,
            Self::StepLimitExceeded { .. } | Self::ToolCallLimitExceeded(_)
        )
    }
}

pub struct AgentRequest {
    pub owner: OwnerId,
    pub message: String,
    pub max_steps: usize,
    pub turn: Arc<TurnScope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEvent {
    pub author: String,
    pub text: Option<String>,
}

impl AgentEvent {
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: Some(text.into()),
        }
    }

    pub fn silent(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: None,
        }
    }
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs one user message to completion and returns the emitted events in order.
    async fn run(&self, request: AgentRequest) -> Result<Vec<AgentEvent>, RuntimeError>;
}

/// The chat model behind the runtime.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> anyhow::Result<ChatResponse>;
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> anyhow::Result<ChatResponse> {
        Ok(LlmClient::chat(self, messages, tools).await?)
    }
}

pub struct LlmAgentRuntime {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    sessions: Arc<SessionManager>,
    system_prompt: String,
}

impl LlmAgentRuntime {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        sessions: Arc<SessionManager>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model,
            tools,
            sessions,
            system_prompt: system_prompt.into(),
        }
    }

    async fn call_tool(&self, ctx: &ToolContext, call: &sensei_llm::ToolCall) -> ToolStep {
        let Some(tool) = self.tools.find(&call.name) else {
            tracing::error!(
                tool_call_id = %call.id,
                tool_name = %call.name,
                "tool call referenced unknown tool"
            );
            return ToolStep::Output(tool_error("unknown_tool"));
        };
        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    error = %e,
                    "tool call arguments are not valid json"
                );
                return ToolStep::Output(tool_error("invalid_arguments_json"));
            }
        };

        let started = Instant::now();
        match tool.execute(ctx, args).await {
            Ok(out) => {
                tracing::info!(
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    agent = tool.governed_by().unwrap_or("-"),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "tool call executed"
                );
                ToolStep::Output(out)
            }
            Err(e) if e.is_call_limit() => ToolStep::LimitReached(e.to_string()),
            Err(e) => {
                tracing::warn!(
                    tool_call_id = %call.id,
                    tool_name = %call.name,
                    error = %e,
                    "tool call failed"
                );
                ToolStep::Output(tool_error(&e.to_string()))
            }
        }
    }
}

enum ToolStep {
    Output(serde_json::Value),
    LimitReached(String),
}

#[async_trait]
impl AgentRuntime for LlmAgentRuntime {
    #[tracing::instrument(level = "info", skip_all, fields(owner = %request.owner, turn_id = %request.turn.id()))]
    async fn run(&self, request: AgentRequest) -> Result<Vec<AgentEvent>, RuntimeError> {
        let history = self.sessions.history(&request.owner);
        tracing::info!(
            prior_history_messages = history.len(),
            tools_registered = self.tools.len(),
            max_steps = request.max_steps,
            "agent run started"
        );

        let tool_defs = self.tools.definitions();
        let ctx = ToolContext::for_turn(request.turn.clone());
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend(history);
        let first_new = messages.len();
        messages.push(ChatMessage::user(&request.message));

        let mut events = Vec::new();
        let mut usage = Usage::default();

        for step in 1..=request.max_steps {
            let started = Instant::now();
            let response = self.model.chat(&messages, &tool_defs).await?;
            usage.prompt_tokens += response.usage.prompt_tokens;
            usage.completion_tokens += response.usage.completion_tokens;
            tracing::info!(
                step,
                latency_ms = started.elapsed().as_millis() as u64,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                tool_calls = response.message.tool_calls.len(),
                "agent llm call completed"
            );

            let message = response.message;
            if !message.content.trim().is_empty() {
                events.push(AgentEvent::text(SENSEI_AUTHOR, message.content.clone()));
            }
            let tool_calls = message.tool_calls.clone();
            messages.push(message);

            if tool_calls.is_empty() {
                self.sessions
                    .record_turn(&request.owner, messages.split_off(first_new), usage);
                tracing::info!(step, events = events.len(), "agent run completed");
                return Ok(events);
            }

            for call in &tool_calls {
                match self.call_tool(&ctx, call).await {
                    ToolStep::Output(out) => {
                        events.push(AgentEvent::silent(call.name.clone()));
                        messages.push(ChatMessage::tool_result(call.id.clone(), out.to_string()));
                    }
                    ToolStep::LimitReached(reason) => {
                        tracing::warn!(
                            step,
                            tool_name = %call.name,
                            reason = %reason,
                            "agent run aborted by tool call limit"
                        );
                        return Err(RuntimeError::ToolCallLimitExceeded(reason));
                    }
                }
            }
        }

        tracing::warn!(max_steps = request.max_steps, "agent run exceeded step limit");
        Err(RuntimeError::StepLimitExceeded {
            limit: request.max_steps,
        })
    }
}
