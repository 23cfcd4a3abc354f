use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(MessageId);
id_newtype!(ChannelId);
id_newtype!(SenderId);
id_newtype!(ThreadId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundMessageKind {
    Message,
    /// The user pressed an inline action button; `content` carries its data.
    Callback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub kind: InboundMessageKind,
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: SenderId,
    /// Conversation to reply into (the Telegram chat id).
    pub thread_id: Option<ThreadId>,
    pub is_group: bool,
    pub content: String,
    /// Platform id needed to acknowledge a callback.
    #[serde(default)]
    pub callback_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Where replies go: the thread when present, otherwise the sender.
    pub fn reply_target(&self) -> &str {
        self.thread_id
            .as_ref()
            .map(ThreadId::as_str)
            .unwrap_or_else(|| self.sender_id.as_str())
    }
}

/// An inline button rendered under an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub label: String,
    pub data: String,
}

impl MessageAction {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default)]
    pub reply_to_message_id: Option<MessageId>,
    #[serde(default)]
    pub actions: Vec<MessageAction>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_actions(mut self, actions: Vec<MessageAction>) -> Self {
        self.actions = actions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_target_prefers_thread() {
        let mut inbound = InboundMessage {
            kind: InboundMessageKind::Message,
            message_id: "1".into(),
            channel_id: "telegram".into(),
            sender_id: "42".into(),
            thread_id: Some("-100".into()),
            is_group: true,
            content: "hola".to_string(),
            callback_id: None,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        };
        assert_eq!(inbound.reply_target(), "-100");
        inbound.thread_id = None;
        assert_eq!(inbound.reply_target(), "42");
    }

    #[test]
    fn outbound_actions_default_to_empty() {
        let parsed: OutboundMessage =
            serde_json::from_value(serde_json::json!({"content": "hi"})).expect("parse");
        assert!(parsed.actions.is_empty());
        let msg = OutboundMessage::text("approve?")
            .with_actions(vec![MessageAction::new("Yes", "confirm:accept:x1")]);
        assert_eq!(msg.actions[0].data, "confirm:accept:x1");
    }
}
