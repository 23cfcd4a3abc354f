//! Chat gateway: every channel adapter feeds one inbound queue.

use crate::commands::{self, ChatCommand, Decision};
use crate::config::TelegramConfig;
use crate::confirmations::{Approval, ConfirmationExecutor, Rejection};
use crate::session::SessionManager;
use crate::turn::Orchestrator;
use anyhow::Result;
use sensei_channels::{ChannelAdapter, InboundMessage, InboundMessageKind, OutboundMessage};
use sensei_tools::{ConfirmationId, ConfirmationQueue, OwnerId, PendingConfirmation};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Last-resort reply when a turn fails for a reason other than loop control.
pub const SAFETY_NET_REPLY: &str = "Sorry, an unexpected error occurred.";

#[derive(Debug, Clone, Default)]
pub struct SenderPolicy {
    allow_all: bool,
    allowed: HashSet<String>,
}

impl SenderPolicy {
    pub fn from_config(cfg: &TelegramConfig) -> Self {
        Self {
            allow_all: cfg.allow_all_senders,
            allowed: cfg
                .allowed_users
                .iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, sender_id: &str) -> bool {
        self.allow_all || self.allowed.contains(sender_id)
    }
}

pub struct Gateway {
    policy: SenderPolicy,
    orchestrator: Arc<Orchestrator>,
    executor: Arc<ConfirmationExecutor>,
    queue: Arc<ConfirmationQueue>,
    sessions: Arc<SessionManager>,
    channels: HashMap<String, Arc<dyn ChannelAdapter>>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl Gateway {
    pub fn new(
        policy: SenderPolicy,
        orchestrator: Arc<Orchestrator>,
        executor: Arc<ConfirmationExecutor>,
        queue: Arc<ConfirmationQueue>,
        sessions: Arc<SessionManager>,
        channels: HashMap<String, Arc<dyn ChannelAdapter>>,
        inbound_rx: mpsc::Receiver<InboundMessage>,
    ) -> Self {
        Self {
            policy,
            orchestrator,
            executor,
            queue,
            sessions,
            channels,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run_loop(shutdown).await {
                tracing::error!(%e, "gateway loop exited");
            }
        })
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut rx = self.inbound_rx.lock().await;
        loop {
            let inbound = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("gateway loop stopping");
                    return Ok(());
                }
                msg = rx.recv() => msg,
            };
            let Some(inbound) = inbound else {
                return Ok(());
            };

            // Turns for different owners run concurrently.
            let gateway = self.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_inbound(inbound).await {
                    tracing::warn!(%e, "handle_inbound failed");
                }
            });
        }
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(channel_id = %inbound.channel_id, sender_id = %inbound.sender_id, kind = ?inbound.kind)
    )]
    async fn handle_inbound(&self, inbound: InboundMessage) -> Result<()> {
        if !self.policy.allows(&inbound.sender_id) {
            tracing::info!("sender not allowed; message dropped");
            return Ok(());
        }

        let channel = self
            .channels
            .get(inbound.channel_id.as_str())
            .ok_or_else(|| anyhow::anyhow!("unknown channel: {}", inbound.channel_id))?
            .clone();
        let owner = OwnerId::new(inbound.sender_id.as_str());

        match inbound.kind {
            InboundMessageKind::Callback => self.handle_callback(channel, &owner, &inbound).await,
            InboundMessageKind::Message => self.handle_message(channel, &owner, &inbound).await,
        }
    }

    async fn handle_message(
        &self,
        channel: Arc<dyn ChannelAdapter>,
        owner: &OwnerId,
        inbound: &InboundMessage,
    ) -> Result<()> {
        let target = inbound.reply_target();

        if let Some(command) = commands::parse_command(&inbound.content) {
            let reply = self.run_command(owner, command).await;
            return channel.send(target, reply_to(inbound, reply)).await;
        }

        let result = match self.orchestrator.run_turn(owner, &inbound.content).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(owner = %owner, error = %e, "turn failed");
                return channel
                    .send(target, reply_to(inbound, SAFETY_NET_REPLY.to_string()))
                    .await;
            }
        };

        channel.send(target, reply_to(inbound, result.text)).await?;
        for pending in &result.pending {
            channel
                .send(target, pending_message(channel.as_ref(), pending))
                .await?;
        }
        Ok(())
    }

    async fn handle_callback(
        &self,
        channel: Arc<dyn ChannelAdapter>,
        owner: &OwnerId,
        inbound: &InboundMessage,
    ) -> Result<()> {
        let reply = match commands::parse_callback(&inbound.content) {
            Some((Decision::Accept, id)) => self.approve(owner, id).await,
            Some((Decision::Cancel, id)) => self.cancel(owner, id),
            None => {
                tracing::warn!(data = %inbound.content, "unrecognized callback data");
                "Unknown action.".to_string()
            }
        };

        if let Some(callback_id) = inbound.callback_id.as_deref() {
            if let Err(e) = channel.acknowledge_callback(callback_id, None).await {
                tracing::warn!(%e, "acknowledge_callback failed");
            }
        }

        let target = inbound.reply_target();
        if let Err(e) = channel
            .edit_message(target, &inbound.message_id, &reply)
            .await
        {
            tracing::debug!(%e, "edit_message failed; sending a new message");
            channel.send(target, OutboundMessage::text(reply)).await?;
        }
        Ok(())
    }

    async fn run_command(&self, owner: &OwnerId, command: ChatCommand) -> String {
        match command {
            ChatCommand::Start => commands::help_text(),
            ChatCommand::Reset => {
                self.sessions.reset(owner);
                let dropped = self.queue.clear(owner);
                if dropped == 0 {
                    "Conversation reset.".to_string()
                } else {
                    format!("Conversation reset. Discarded {dropped} pending confirmation(s).")
                }
            }
            ChatCommand::Pending => {
                let pending: Vec<PendingConfirmation> = self
                    .queue
                    .list_pending(owner)
                    .iter()
                    .map(|c| c.pending())
                    .collect();
                commands::pending_text(&pending)
            }
            ChatCommand::Confirm(id) => self.approve(owner, id).await,
            ChatCommand::Cancel(id) => self.cancel(owner, id),
            ChatCommand::Unknown(name) => format!(
                "Unknown command {name}. Supported: /start /pending /confirm /cancel /reset"
            ),
        }
    }

    async fn approve(&self, owner: &OwnerId, id: Option<ConfirmationId>) -> String {
        let result = match id {
            Some(id) => self.executor.approve(owner, &id).await,
            None => self.executor.approve_oldest(owner).await,
        };
        match result {
            Ok(Approval::Executed {
                confirmation,
                outcome,
            }) if outcome.is_not_found() => format!(
                "Confirmation accepted.\n{}: the record no longer exists.",
                confirmation.summary
            ),
            Ok(Approval::Executed { confirmation, .. }) => {
                format!("Confirmation accepted.\n{}", confirmation.summary)
            }
            Ok(Approval::NotFound) => "Nothing to confirm.".to_string(),
            Err(e) => {
                tracing::error!(owner = %owner, error = %e, "approved change failed");
                format!("The change could not be applied: {e}")
            }
        }
    }

    fn cancel(&self, owner: &OwnerId, id: Option<ConfirmationId>) -> String {
        let rejection = match id {
            Some(id) => self.executor.reject(owner, &id),
            None => self.executor.reject_oldest(owner),
        };
        match rejection {
            Rejection::Rejected { confirmation } => {
                format!("Confirmation cancelled.\n{}", confirmation.summary)
            }
            Rejection::NotFound => "Nothing to confirm.".to_string(),
        }
    }
}

fn reply_to(inbound: &InboundMessage, content: String) -> OutboundMessage {
    OutboundMessage {
        content,
        reply_to_message_id: Some(inbound.message_id.clone()),
        actions: vec![],
    }
}

fn pending_message(channel: &dyn ChannelAdapter, pending: &PendingConfirmation) -> OutboundMessage {
    if channel.supports_actions() {
        return OutboundMessage::text(pending.summary.clone())
            .with_actions(commands::confirmation_actions(pending));
    }
    OutboundMessage::text(format!(
        "{}\nReply /confirm {} or /cancel {}",
        pending.summary, pending.id, pending.id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AgentEvent, RuntimeError};
    use crate::testing::{ChannelCall, FakeRuntime, RecordingChannel};
    use chrono::Utc;
    use sensei_tools::DeferredCommand;
    use sensei_tools::records::{Mutation, NewSpecies, RecordStore, SqliteRecordStore};

    struct Fixture {
        gateway: Gateway,
        channel: Arc<RecordingChannel>,
        queue: Arc<ConfirmationQueue>,
        store: Arc<dyn RecordStore>,
    }

    fn fixture(runtime: Arc<FakeRuntime>) -> Fixture {
        let queue = Arc::new(ConfirmationQueue::new());
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::open_in_memory().expect("store"));
        let channel = Arc::new(RecordingChannel::default());
        let mut channels: HashMap<String, Arc<dyn ChannelAdapter>> = HashMap::new();
        channels.insert("telegram".to_string(), channel.clone());
        let (_tx, rx) = mpsc::channel(8);
        let policy = SenderPolicy::from_config(&TelegramConfig {
            enabled: true,
            bot_token: "t".to_string(),
            allowed_users: vec!["42".to_string()],
            allow_all_senders: false,
        });
        let gateway = Gateway::new(
            policy,
            Arc::new(Orchestrator::new(runtime, queue.clone(), 20)),
            Arc::new(ConfirmationExecutor::new(queue.clone(), store.clone())),
            queue.clone(),
            Arc::new(SessionManager::new(20)),
            channels,
            rx,
        );
        Fixture {
            gateway,
            channel,
            queue,
            store,
        }
    }

    fn inbound(sender: &str, kind: InboundMessageKind, content: &str) -> InboundMessage {
        InboundMessage {
            kind,
            message_id: "m1".into(),
            channel_id: "telegram".into(),
            sender_id: sender.into(),
            thread_id: Some("chat-1".into()),
            is_group: false,
            content: content.to_string(),
            callback_id: (kind == InboundMessageKind::Callback).then(|| "cb-1".to_string()),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    fn species(name: &str) -> Mutation {
        Mutation::CreateSpecies(NewSpecies {
            name: name.to_string(),
            scientific_name: Some("Ulmus parvifolia".to_string()),
            care_guide: serde_json::json!({}),
        })
    }

    #[test]
    fn sender_policy_requires_allowlist_unless_open() {
        let closed = SenderPolicy::from_config(&TelegramConfig {
            allowed_users: vec![" 42 ".to_string(), "".to_string()],
            ..TelegramConfig::default()
        });
        assert!(closed.allows("42"));
        assert!(!closed.allows("7"));
        let open = SenderPolicy::from_config(&TelegramConfig {
            allow_all_senders: true,
            ..TelegramConfig::default()
        });
        assert!(open.allows("7"));
    }

    #[tokio::test]
    async fn unknown_sender_gets_no_reply() {
        let f = fixture(FakeRuntime::replying("hi"));
        f.gateway
            .handle_inbound(inbound("7", InboundMessageKind::Message, "hello"))
            .await
            .expect("handled");
        assert!(f.channel.calls().is_empty());
    }

    #[tokio::test]
    async fn turn_reply_is_followed_by_one_prompt_per_pending() {
        let queue_slot = Arc::new(std::sync::Mutex::new(None::<Arc<ConfirmationQueue>>));
        let slot = queue_slot.clone();
        let runtime = FakeRuntime::new(move |req| {
            if let Some(queue) = slot.lock().expect("lock").as_ref() {
                queue.enqueue(DeferredCommand::with_id(
                    ConfirmationId::new("x1"),
                    req.owner.clone(),
                    "create species Elm",
                    species("Elm"),
                ));
            }
            Ok(vec![AgentEvent::text("sensei", "Please confirm.")])
        });
        let f = fixture(runtime);
        *queue_slot.lock().expect("lock") = Some(f.queue.clone());

        f.gateway
            .handle_inbound(inbound("42", InboundMessageKind::Message, "add elm"))
            .await
            .expect("handled");

        let calls = f.channel.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            ChannelCall::Send { recipient, message } => {
                assert_eq!(recipient, "chat-1");
                assert_eq!(message.content, "create species Elm");
                assert_eq!(message.actions[0].data, "confirm:accept:x1");
                assert_eq!(message.actions[1].data, "confirm:cancel:x1");
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(f.channel.sent_texts()[0], "Please confirm.");
    }

    #[tokio::test]
    async fn accept_callback_executes_and_edits_the_prompt() {
        let f = fixture(FakeRuntime::replying("unused"));
        f.queue.enqueue(DeferredCommand::with_id(
            ConfirmationId::new("x1"),
            OwnerId::new("42"),
            "create species Elm",
            species("Elm"),
        ));

        f.gateway
            .handle_inbound(inbound(
                "42",
                InboundMessageKind::Callback,
                "confirm:accept:x1",
            ))
            .await
            .expect("handled");

        assert_eq!(f.store.list_species().await.expect("list").len(), 1);
        let calls = f.channel.calls();
        assert_eq!(
            calls[0],
            ChannelCall::Ack {
                callback_id: "cb-1".to_string()
            }
        );
        match &calls[1] {
            ChannelCall::Edit {
                message_id,
                content,
                ..
            } => {
                assert_eq!(message_id, "m1");
                assert!(content.starts_with("Confirmation accepted."));
            }
            other => panic!("unexpected call {other:?}"),
        }

        f.gateway
            .handle_inbound(inbound(
                "42",
                InboundMessageKind::Callback,
                "confirm:accept:x1",
            ))
            .await
            .expect("handled");
        match f.channel.calls().last() {
            Some(ChannelCall::Edit { content, .. }) => assert_eq!(content, "Nothing to confirm."),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_command_discards_oldest() {
        let f = fixture(FakeRuntime::replying("unused"));
        f.queue.enqueue(DeferredCommand::with_id(
            ConfirmationId::new("x1"),
            OwnerId::new("42"),
            "create species Elm",
            species("Elm"),
        ));
        f.gateway
            .handle_inbound(inbound("42", InboundMessageKind::Message, "/cancel"))
            .await
            .expect("handled");
        assert!(f.channel.sent_texts()[0].starts_with("Confirmation cancelled."));
        assert_eq!(f.queue.len(&OwnerId::new("42")), 0);
        assert!(f.store.list_species().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn reset_clears_pending_confirmations() {
        let f = fixture(FakeRuntime::replying("unused"));
        f.queue.enqueue(DeferredCommand::new(
            OwnerId::new("42"),
            "create species Elm",
            species("Elm"),
        ));
        f.gateway
            .handle_inbound(inbound("42", InboundMessageKind::Message, "/reset"))
            .await
            .expect("handled");
        assert_eq!(
            f.channel.sent_texts(),
            vec!["Conversation reset. Discarded 1 pending confirmation(s).".to_string()]
        );
        assert_eq!(f.queue.tracked_owners(), 0);
    }

    #[tokio::test]
    async fn failed_turn_gets_the_safety_net_reply() {
        let runtime = FakeRuntime::new(|_| Err(RuntimeError::Other(anyhow::anyhow!("boom"))));
        let f = fixture(runtime);
        f.gateway
            .handle_inbound(inbound("42", InboundMessageKind::Message, "hi"))
            .await
            .expect("handled");
        assert_eq!(f.channel.sent_texts(), vec![SAFETY_NET_REPLY.to_string()]);
    }
}
