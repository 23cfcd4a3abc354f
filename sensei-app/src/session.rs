//! Per-owner conversation history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sensei_llm::{ChatMessage, Role, Usage};
use sensei_tools::OwnerId;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Session {
    pub history: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub usage_totals: Usage,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            history: Vec::new(),
            created_at: now,
            last_active: now,
            usage_totals: Usage::default(),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.usage_totals = Usage::default();
        self.last_active = Utc::now();
    }

    /// Appends `messages` and drops the oldest ones beyond `max_messages`.
    ///
    /// The kept window always starts at a user message so a tool result never
    /// loses the assistant message that requested it. A single turn longer
    /// than the cap is kept whole.
    fn append(&mut self, messages: Vec<ChatMessage>, max_messages: usize) {
        self.history.extend(messages);
        self.last_active = Utc::now();
        if self.history.len() <= max_messages {
            return;
        }
        let window = self.history.len() - max_messages;
        let start = match self.history[window..]
            .iter()
            .position(|m| m.role == Role::User)
        {
            Some(offset) => window + offset,
            None => self
                .history
                .iter()
                .rposition(|m| m.role == Role::User)
                .unwrap_or(window),
        };
        self.history.drain(..start);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub owner: OwnerId,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub messages: usize,
    pub usage: Usage,
}

pub struct SessionManager {
    sessions: DashMap<OwnerId, Session>,
    history_max_messages: usize,
}

impl SessionManager {
    pub fn new(history_max_messages: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            history_max_messages,
        }
    }

    /// Copy of the owner's history; the shard lock is not held across a turn.
    pub fn history(&self, owner: &OwnerId) -> Vec<ChatMessage> {
        self.sessions
            .get(owner)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    pub fn record_turn(&self, owner: &OwnerId, messages: Vec<ChatMessage>, usage: Usage) {
        let mut session = self
            .sessions
            .entry(owner.clone())
            .or_insert_with(Session::new);
        session.append(messages, self.history_max_messages);
        session.usage_totals.prompt_tokens += usage.prompt_tokens;
        session.usage_totals.completion_tokens += usage.completion_tokens;
    }

    /// Clears the owner's history; returns whether a session existed.
    pub fn reset(&self, owner: &OwnerId) -> bool {
        match self.sessions.get_mut(owner) {
            Some(mut session) => {
                session.reset();
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| {
                let (owner, s) = entry.pair();
                SessionSummary {
                    owner: owner.clone(),
                    created_at: s.created_at,
                    last_active: s.last_active,
                    messages: s.history.len(),
                    usage: s.usage_totals,
                }
            })
            .collect();
        out.sort_by_key(|s| std::cmp::Reverse(s.last_active));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensei_llm::ToolCall;

    fn tool_round(n: usize) -> Vec<ChatMessage> {
        let mut call = ChatMessage::assistant("");
        call.tool_calls.push(ToolCall {
            id: format!("c{n}"),
            name: "list_species".to_string(),
            arguments: "{}".to_string(),
        });
        vec![
            ChatMessage::user(format!("q{n}")),
            call,
            ChatMessage::tool_result(format!("c{n}"), "[]"),
            ChatMessage::assistant(format!("a{n}")),
        ]
    }

    #[test]
    fn history_is_capped_at_a_user_boundary() {
        let manager = SessionManager::new(6);
        let owner = OwnerId::new("u1");
        manager.record_turn(&owner, tool_round(1), Usage::default());
        manager.record_turn(&owner, tool_round(2), Usage::default());

        let history = manager.history(&owner);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "q2");
    }

    #[test]
    fn turn_longer_than_cap_is_kept_whole() {
        let manager = SessionManager::new(6);
        let owner = OwnerId::new("u1");
        manager.record_turn(
            &owner,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            Usage::default(),
        );

        let mut long_turn = vec![ChatMessage::user("repot all three junipers")];
        for n in 0..3 {
            let mut call = ChatMessage::assistant("");
            call.tool_calls.push(ToolCall {
                id: format!("c{n}"),
                name: "propose_update_specimen".to_string(),
                arguments: "{}".to_string(),
            });
            long_turn.push(call);
            long_turn.push(ChatMessage::tool_result(format!("c{n}"), "{}"));
        }
        long_turn.push(ChatMessage::assistant("Three updates await confirmation."));
        manager.record_turn(&owner, long_turn, Usage::default());

        let history = manager.history(&owner);
        assert_eq!(history.len(), 8);
        assert_eq!(history[0].content, "repot all three junipers");
        assert_eq!(
            history.last().map(|m| m.content.as_str()),
            Some("Three updates await confirmation.")
        );
    }

    #[test]
    fn reset_clears_history_and_usage() {
        let manager = SessionManager::new(10);
        let owner = OwnerId::new("u1");
        assert!(!manager.reset(&owner));
        manager.record_turn(
            &owner,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            Usage {
                prompt_tokens: 10,
                completion_tokens: 2,
            },
        );
        assert!(manager.reset(&owner));
        assert!(manager.history(&owner).is_empty());
        assert_eq!(manager.list()[0].messages, 0);
        assert_eq!(manager.list()[0].usage, Usage::default());
    }

    #[test]
    fn owners_do_not_share_history() {
        let manager = SessionManager::new(10);
        manager.record_turn(
            &OwnerId::new("a"),
            vec![ChatMessage::user("hi")],
            Usage::default(),
        );
        assert!(manager.history(&OwnerId::new("b")).is_empty());
        assert_eq!(manager.list().len(), 1);
    }
}
