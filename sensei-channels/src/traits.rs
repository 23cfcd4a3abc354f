use crate::types::{InboundMessage, MessageId, OutboundMessage};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Unique channel identifier, e.g. "telegram".
    fn channel_id(&self) -> &str;

    /// Start receiving messages. Push to tx for each inbound message.
    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()>;

    /// Send a message to a specific user/chat on this platform.
    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()>;

    /// Acknowledge a button press so the client stops its loading indicator.
    async fn acknowledge_callback(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// Replace the text of a previously sent message, dropping its actions.
    async fn edit_message(
        &self,
        _recipient_id: &str,
        _message_id: &MessageId,
        _content: &str,
    ) -> Result<()> {
        Err(anyhow::anyhow!(
            "edit_message is not supported by this channel"
        ))
    }

    /// Whether `OutboundMessage::actions` are rendered as buttons.
    fn supports_actions(&self) -> bool {
        false
    }
}
