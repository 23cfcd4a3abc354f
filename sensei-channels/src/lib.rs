//! Chat transport adapters for the bonsai assistant.
//!
//! Adapters are pure I/O: they convert platform updates to/from
//! `InboundMessage` / `OutboundMessage`, including inline action buttons used
//! for approving or cancelling pending confirmations.

mod telegram;
mod traits;
mod types;

pub use telegram::TelegramAdapter;
pub use traits::ChannelAdapter;
pub use types::{
    ChannelId, InboundMessage, InboundMessageKind, MessageAction, MessageId, OutboundMessage,
    SenderId, ThreadId,
};
