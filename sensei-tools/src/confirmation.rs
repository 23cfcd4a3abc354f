//! Deferred commands awaiting human approval.
//!
//! Proposal tools enqueue a [`DeferredCommand`]; nothing is written until the
//! owner approves it, at which point the command is popped (once, ever) and its
//! mutation applied. The queue is in-memory only.

use crate::context::{ConfirmationId, OwnerId};
use crate::records::Mutation;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeferredCommand {
    id: ConfirmationId,
    owner: OwnerId,
    summary: String,
    mutation: Mutation,
    created_at: DateTime<Utc>,
    announced: bool,
}

impl DeferredCommand {
    pub fn new(owner: OwnerId, summary: impl Into<String>, mutation: Mutation) -> Self {
        Self::with_id(ConfirmationId::generate(), owner, summary, mutation)
    }

    pub fn with_id(
        id: ConfirmationId,
        owner: OwnerId,
        summary: impl Into<String>,
        mutation: Mutation,
    ) -> Self {
        Self {
            id,
            owner,
            summary: summary.into(),
            mutation,
            created_at: Utc::now(),
            announced: false,
        }
    }

    pub fn id(&self) -> &ConfirmationId {
        &self.id
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn announced(&self) -> bool {
        self.announced
    }

    /// The part of a command that may leave the core: id and summary.
    pub fn pending(&self) -> PendingConfirmation {
        PendingConfirmation {
            id: self.id.clone(),
            summary: self.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: ConfirmationId,
    pub summary: String,
}

/// Per-owner FIFO queues of deferred commands.
///
/// Every mutating operation goes through the owner's map entry, so it is
/// atomic per owner while unrelated owners never contend. An owner with no
/// pending commands has no entry at all.
#[derive(Debug, Default)]
pub struct ConfirmationQueue {
    queues: DashMap<OwnerId, VecDeque<DeferredCommand>>,
}

impl ConfirmationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the command's owner queue.
    pub fn enqueue(&self, command: DeferredCommand) {
        tracing::info!(
            owner = %command.owner,
            confirmation_id = %command.id,
            summary = %command.summary,
            "confirmation enqueued"
        );
        self.queues
            .entry(command.owner.clone())
            .or_default()
            .push_back(command);
    }

    pub fn peek_oldest(&self, owner: &OwnerId) -> Option<DeferredCommand> {
        self.queues.get(owner).and_then(|q| q.front().cloned())
    }

    pub fn list_pending(&self, owner: &OwnerId) -> Vec<DeferredCommand> {
        self.queues
            .get(owner)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns commands not yet surfaced to the owner and marks them announced.
    pub fn list_unannounced(&self, owner: &OwnerId) -> Vec<DeferredCommand> {
        let Some(mut queue) = self.queues.get_mut(owner) else {
            return Vec::new();
        };
        queue
            .iter_mut()
            .filter(|c| !c.announced)
            .map(|c| {
                c.announced = true;
                c.clone()
            })
            .collect()
    }

    pub fn pop_oldest(&self, owner: &OwnerId) -> Option<DeferredCommand> {
        self.take(owner, |q| q.pop_front())
    }

    /// Removes the command with `id` wherever it sits in the owner's queue.
    ///
    /// Returns `None` for an unknown id, another owner's id, or a command that
    /// was already popped.
    pub fn pop_by_id(&self, owner: &OwnerId, id: &ConfirmationId) -> Option<DeferredCommand> {
        self.take(owner, |q| {
            let pos = q.iter().position(|c| &c.id == id)?;
            q.remove(pos)
        })
    }

    /// Drops every pending command of `owner`; returns how many were dropped.
    pub fn clear(&self, owner: &OwnerId) -> usize {
        let dropped = self.queues.remove(owner).map(|(_, q)| q.len()).unwrap_or(0);
        if dropped > 0 {
            tracing::info!(owner = %owner, dropped, "confirmations cleared");
        }
        dropped
    }

    pub fn len(&self, owner: &OwnerId) -> usize {
        self.queues.get(owner).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of owners with at least one pending command.
    pub fn tracked_owners(&self) -> usize {
        self.queues.len()
    }

    fn take(
        &self,
        owner: &OwnerId,
        pick: impl FnOnce(&mut VecDeque<DeferredCommand>) -> Option<DeferredCommand>,
    ) -> Option<DeferredCommand> {
        let Entry::Occupied(mut entry) = self.queues.entry(owner.clone()) else {
            return None;
        };
        let command = pick(entry.get_mut());
        if entry.get().is_empty() {
            entry.remove();
        }
        if let Some(command) = &command {
            tracing::debug!(
                owner = %owner,
                confirmation_id = %command.id,
                "confirmation popped"
            );
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn delete_species(name: &str) -> Mutation {
        Mutation::DeleteSpecies {
            id: 1,
            name: name.to_string(),
        }
    }

    fn command(owner: &str, id: &str, summary: &str) -> DeferredCommand {
        DeferredCommand::with_id(
            ConfirmationId::new(id),
            OwnerId::new(owner),
            summary,
            delete_species("Elm"),
        )
    }

    #[test]
    fn pop_oldest_is_fifo() {
        let queue = ConfirmationQueue::new();
        let owner = OwnerId::new("u1");
        queue.enqueue(command("u1", "c1", "first"));
        queue.enqueue(command("u1", "c2", "second"));
        assert_eq!(queue.peek_oldest(&owner).map(|c| c.summary), Some("first".to_string()));
        assert_eq!(queue.pop_oldest(&owner).map(|c| c.id), Some("c1".into()));
        assert_eq!(queue.pop_oldest(&owner).map(|c| c.id), Some("c2".into()));
        assert!(queue.pop_oldest(&owner).is_none());
    }

    #[test]
    fn a_command_pops_at_most_once() {
        let queue = ConfirmationQueue::new();
        let owner = OwnerId::new("u1");
        queue.enqueue(command("u1", "c1", "only"));
        assert!(queue.pop_by_id(&owner, &"c1".into()).is_some());
        assert!(queue.pop_by_id(&owner, &"c1".into()).is_none());
        assert!(queue.pop_oldest(&owner).is_none());
    }

    #[test]
    fn popping_the_last_command_removes_the_owner_entry() {
        let queue = ConfirmationQueue::new();
        let owner = OwnerId::new("u1");
        queue.enqueue(command("u1", "c1", "a"));
        queue.enqueue(command("u1", "c2", "b"));
        assert_eq!(queue.tracked_owners(), 1);
        queue.pop_by_id(&owner, &"c2".into()).expect("c2");
        queue.pop_oldest(&owner).expect("c1");
        assert!(queue.list_pending(&owner).is_empty());
        assert_eq!(queue.tracked_owners(), 0);
    }

    #[test]
    fn pop_by_id_takes_from_the_middle_and_respects_owner() {
        let queue = ConfirmationQueue::new();
        let owner = OwnerId::new("u1");
        for id in ["c1", "c2", "c3"] {
            queue.enqueue(command("u1", id, id));
        }
        assert!(queue.pop_by_id(&OwnerId::new("u2"), &"c2".into()).is_none());
        assert!(queue.pop_by_id(&owner, &"missing".into()).is_none());
        assert_eq!(queue.pop_by_id(&owner, &"c2".into()).map(|c| c.id), Some("c2".into()));
        let remaining: Vec<_> = queue.list_pending(&owner).into_iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec![ConfirmationId::new("c1"), ConfirmationId::new("c3")]);
        assert_eq!(queue.tracked_owners(), 1);
    }

    #[test]
    fn unannounced_commands_surface_once() {
        let queue = ConfirmationQueue::new();
        let owner = OwnerId::new("u2");
        queue.enqueue(command("u2", "c1", "a"));
        queue.enqueue(command("u2", "c2", "b"));
        let first = queue.list_unannounced(&owner);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(DeferredCommand::announced));
        assert!(queue.list_unannounced(&owner).is_empty());
        assert!(queue.list_pending(&owner).iter().all(DeferredCommand::announced));

        queue.enqueue(command("u2", "c3", "c"));
        let later: Vec<_> = queue.list_unannounced(&owner).into_iter().map(|c| c.id).collect();
        assert_eq!(later, vec![ConfirmationId::new("c3")]);
    }

    #[test]
    fn clear_drops_only_that_owner() {
        let queue = ConfirmationQueue::new();
        queue.enqueue(command("u1", "c1", "a"));
        queue.enqueue(command("u1", "c2", "b"));
        queue.enqueue(command("u3", "c3", "c"));
        assert_eq!(queue.clear(&OwnerId::new("u1")), 2);
        assert_eq!(queue.clear(&OwnerId::new("u1")), 0);
        assert_eq!(queue.len(&OwnerId::new("u3")), 1);
        assert_eq!(queue.tracked_owners(), 1);
    }

    #[test]
    fn pending_exposes_only_id_and_summary() {
        let c = command("u1", "x1", "delete species Elm");
        let value = serde_json::to_value(c.pending()).expect("serialize");
        assert_eq!(value, serde_json::json!({"id": "x1", "summary": "delete species Elm"}));
    }

    #[test]
    fn racing_pops_for_one_id_yield_a_single_winner() {
        let queue = Arc::new(ConfirmationQueue::new());
        queue.enqueue(command("u1", "x1", "delete species Elm"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    queue
                        .pop_by_id(&OwnerId::new("u1"), &ConfirmationId::new("x1"))
                        .is_some()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread joined"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(queue.tracked_owners(), 0);
    }
}
