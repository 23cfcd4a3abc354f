//! Turn orchestration: one user message in, one reply plus new confirmations out.

use crate::assistant::{AgentRequest, AgentRuntime};
use sensei_tools::{ConfirmationQueue, OwnerId, PendingConfirmation, TurnScope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reply used when the agent loop was cut short by a step or call limit.
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not complete the request with the information available.";

/// Reply used when the agent finished without producing any text.
pub const NO_ANSWER_REPLY: &str = "Sorry, no answer could be generated.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResult {
    pub text: String,
    /// Confirmations surfaced for the first time by this turn.
    pub pending: Vec<PendingConfirmation>,
}

pub struct Orchestrator {
    runtime: Arc<dyn AgentRuntime>,
    queue: Arc<ConfirmationQueue>,
    max_steps: usize,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        queue: Arc<ConfirmationQueue>,
        max_steps: usize,
    ) -> Self {
        Self {
            runtime,
            queue,
            max_steps,
        }
    }

    /// Runs `message` through the agent for `owner`.
    ///
    /// Step and call limit failures become [`FALLBACK_REPLY`]; any other
    /// runtime failure is returned to the caller.
    #[tracing::instrument(level = "info", skip_all, fields(owner = %owner))]
    pub async fn run_turn(&self, owner: &OwnerId, message: &str) -> anyhow::Result<TurnResult> {
        let turn = Arc::new(TurnScope::new(owner.clone()));
        let request = AgentRequest {
            owner: owner.clone(),
            message: message.to_string(),
            max_steps: self.max_steps,
            turn: turn.clone(),
        };

        let outcome = self.runtime.run(request).await;
        // Counters belong to this turn only.
        drop(turn);

        let text = match outcome {
            Ok(events) => {
                let fragments: Vec<String> =
                    events.into_iter().filter_map(|event| event.text).collect();
                if fragments.is_empty() {
                    tracing::warn!("agent produced no text");
                    NO_ANSWER_REPLY.to_string()
                } else {
                    fragments.join("\n")
                }
            }
            Err(e) if e.is_loop_control() => {
                tracing::warn!(error = %e, "turn cut short by loop control");
                FALLBACK_REPLY.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        let pending: Vec<PendingConfirmation> = self
            .queue
            .list_unannounced(owner)
            .iter()
            .map(|command| command.pending())
            .collect();
        tracing::info!(
            text_len = text.len(),
            pending = pending.len(),
            "turn completed"
        );
        Ok(TurnResult { text, pending })
    }
}
