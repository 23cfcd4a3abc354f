//! Fakes shared by the app's unit tests.

use crate::assistant::{AgentEvent, AgentRequest, AgentRuntime, ChatModel, RuntimeError};
use anyhow::Result;
use async_trait::async_trait;
use sensei_channels::{ChannelAdapter, InboundMessage, MessageId, OutboundMessage};
use sensei_llm::{ChatMessage, ChatResponse, ToolCall, ToolDefinition, Usage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Script = Box<dyn Fn(&AgentRequest) -> Result<Vec<AgentEvent>, RuntimeError> + Send + Sync>;

/// Runtime whose behavior is a closure over the request.
pub struct FakeRuntime {
    script: Script,
    pub seen_max_steps: Mutex<Vec<usize>>,
}

impl FakeRuntime {
    pub fn new(
        script: impl Fn(&AgentRequest) -> Result<Vec<AgentEvent>, RuntimeError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            seen_max_steps: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(vec![AgentEvent::text("sensei", text)]))
    }
}

#[async_trait]
impl AgentRuntime for FakeRuntime {
    async fn run(&self, request: AgentRequest) -> Result<Vec<AgentEvent>, RuntimeError> {
        self.seen_max_steps
            .lock()
            .expect("lock")
            .push(request.max_steps);
        (self.script)(&request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Send {
        recipient: String,
        message: OutboundMessage,
    },
    Ack {
        callback_id: String,
    },
    Edit {
        recipient: String,
        message_id: String,
        content: String,
    },
}

/// Channel that records every outbound call.
#[derive(Default)]
pub struct RecordingChannel {
    pub calls: Mutex<Vec<ChannelCall>>,
}

impl RecordingChannel {
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ChannelCall::Send { message, .. } => Some(message.content),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn channel_id(&self) -> &str {
        "telegram"
    }

    async fn start(&self, _tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        Ok(())
    }

    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()> {
        self.calls.lock().expect("lock").push(ChannelCall::Send {
            recipient: recipient_id.to_string(),
            message,
        });
        Ok(())
    }

    async fn acknowledge_callback(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
        self.calls.lock().expect("lock").push(ChannelCall::Ack {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        recipient_id: &str,
        message_id: &MessageId,
        content: &str,
    ) -> Result<()> {
        self.calls.lock().expect("lock").push(ChannelCall::Edit {
            recipient: recipient_id.to_string(),
            message_id: message_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    fn supports_actions(&self) -> bool {
        true
    }
}

/// Replays canned responses and records every prompt it was sent.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ChatMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> anyhow::Result<ChatResponse> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(messages.to_vec());
        let message = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        Ok(ChatResponse {
            message,
            usage: Usage {
                prompt_tokens: 5,
                completion_tokens: 1,
            },
            finish_reason: "stop".to_string(),
        })
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ChatMessage {
    let mut msg = ChatMessage::assistant("");
    msg.tool_calls.push(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    });
    msg
}
