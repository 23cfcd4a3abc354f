//! Approval side of the confirmation queue.

use sensei_tools::records::{MutationOutcome, RecordStore, StoreError};
use sensei_tools::{ConfirmationId, ConfirmationQueue, DeferredCommand, OwnerId, PendingConfirmation};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Approval {
    Executed {
        confirmation: PendingConfirmation,
        outcome: MutationOutcome,
    },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Rejection {
    Rejected { confirmation: PendingConfirmation },
    NotFound,
}

/// Pops deferred commands on explicit user approval and runs them once.
///
/// A command is removed before it executes, so a failed execution is never
/// retried and a concurrent second approval finds nothing.
pub struct ConfirmationExecutor {
    queue: Arc<ConfirmationQueue>,
    store: Arc<dyn RecordStore>,
}

impl ConfirmationExecutor {
    pub fn new(queue: Arc<ConfirmationQueue>, store: Arc<dyn RecordStore>) -> Self {
        Self { queue, store }
    }

    #[tracing::instrument(level = "info", skip_all, fields(owner = %owner, confirmation_id = %id))]
    pub async fn approve(
        &self,
        owner: &OwnerId,
        id: &ConfirmationId,
    ) -> Result<Approval, StoreError> {
        let command = self.queue.pop_by_id(owner, id);
        self.execute(command).await
    }

    /// Approves the owner's oldest pending command.
    #[tracing::instrument(level = "info", skip_all, fields(owner = %owner))]
    pub async fn approve_oldest(&self, owner: &OwnerId) -> Result<Approval, StoreError> {
        let command = self.queue.pop_oldest(owner);
        self.execute(command).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(owner = %owner, confirmation_id = %id))]
    pub fn reject(&self, owner: &OwnerId, id: &ConfirmationId) -> Rejection {
        rejected(self.queue.pop_by_id(owner, id))
    }

    #[tracing::instrument(level = "info", skip_all, fields(owner = %owner))]
    pub fn reject_oldest(&self, owner: &OwnerId) -> Rejection {
        rejected(self.queue.pop_oldest(owner))
    }

    async fn execute(&self, command: Option<DeferredCommand>) -> Result<Approval, StoreError> {
        let Some(command) = command else {
            tracing::info!("nothing to approve");
            return Ok(Approval::NotFound);
        };
        let confirmation = command.pending();
        match command.mutation().apply(self.store.as_ref()).await {
            Ok(outcome) => {
                tracing::info!(
                    confirmation_id = %confirmation.id,
                    summary = %confirmation.summary,
                    target_missing = outcome.is_not_found(),
                    "confirmation executed"
                );
                Ok(Approval::Executed {
                    confirmation,
                    outcome,
                })
            }
            Err(e) => {
                tracing::error!(
                    confirmation_id = %confirmation.id,
                    error = %e,
                    "confirmation execution failed; command consumed"
                );
                Err(e)
            }
        }
    }
}

fn rejected(command: Option<DeferredCommand>) -> Rejection {
    match command {
        Some(command) => {
            tracing::info!(confirmation_id = %command.id(), "confirmation rejected");
            Rejection::Rejected {
                confirmation: command.pending(),
            }
        }
        None => Rejection::NotFound,
    }
}
