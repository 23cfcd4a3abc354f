use crate::confirmation::{ConfirmationQueue, DeferredCommand};
use crate::context::{OwnerId, ToolContext};
use crate::records::Mutation;
use serde_json::json;

pub(crate) const OWNER_REQUIRED: &str = "owner_required_for_confirmation";

/// JSON schema fragment shared by every proposal tool.
pub(crate) fn summary_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Short summary shown to the user when asking for approval."
    })
}

pub(crate) fn require_owner(ctx: &ToolContext) -> Option<OwnerId> {
    ctx.owner().cloned()
}

/// Queues `mutation` for approval by `owner` and builds the tool result.
pub(crate) fn submit(
    queue: &ConfirmationQueue,
    owner: OwnerId,
    summary: Option<String>,
    mutation: Mutation,
) -> serde_json::Value {
    let summary = summary.unwrap_or_else(|| mutation.describe());
    let command = DeferredCommand::new(owner, summary, mutation);
    let pending = command.pending();
    queue.enqueue(command);
    json!({
        "status": "pending_confirmation",
        "confirmation_id": pending.id,
        "summary": pending.summary,
    })
}
