use crate::traits::ChannelAdapter;
use crate::types::{InboundMessage, InboundMessageKind, MessageAction, MessageId, OutboundMessage};
use anyhow::Result;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

const TELEGRAM_CHANNEL_ID: &str = "telegram";
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_LONG_POLL_TIMEOUT_SECS: &str = "30";
const TELEGRAM_ALLOWED_UPDATES: &str = r#"["message","callback_query"]"#;
const TELEGRAM_NON_TEXT_PLACEHOLDER: &str = "[telegram non-text message]";
const TELEGRAM_NON_TRANSIENT_DELAY: Duration = Duration::from_secs(10);
const TELEGRAM_RETRY_BASE_MS: u64 = 250;
const TELEGRAM_RETRY_MAX_MS: u64 = 30_000;

#[derive(Clone)]
pub struct TelegramAdapter {
    http: reqwest::Client,
    bot_token: String,
}

impl TelegramAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("telegram bot token must not be empty"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.trim().to_string(),
        })
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{TELEGRAM_API_BASE}/bot{}/{method}",
            self.bot_token
        ))?)
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<()> {
        let url = self.api_url(method)?;
        let resp = self.http.post(url).json(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(anyhow::anyhow!(
                "telegram {method} failed: status={status} body={text}"
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel_id(&self) -> &str {
        TELEGRAM_CHANNEL_ID
    }

    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.run_poll_loop(tx).await {
                tracing::error!(%e, "telegram poll loop exited");
            }
        });
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(recipient_id = %recipient_id, actions = message.actions.len()))]
    async fn send(&self, recipient_id: &str, message: OutboundMessage) -> Result<()> {
        self.call("sendMessage", &send_message_body(recipient_id, &message))
            .await
    }

    async fn acknowledge_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", &body).await
    }

    async fn edit_message(
        &self,
        recipient_id: &str,
        message_id: &MessageId,
        content: &str,
    ) -> Result<()> {
        let message_id: i64 = message_id
            .parse()
            .map_err(|_| anyhow::anyhow!("telegram message id is not numeric: {message_id}"))?;
        let body = serde_json::json!({
            "chat_id": recipient_id,
            "message_id": message_id,
            "text": content,
        });
        self.call("editMessageText", &body).await
    }

    fn supports_actions(&self) -> bool {
        true
    }
}

impl TelegramAdapter {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_poll_loop(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut offset: i64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            let url = self.api_url("getUpdates")?;
            let response = match self
                .http
                .get(url)
                .query(&[
                    ("timeout", TELEGRAM_LONG_POLL_TIMEOUT_SECS),
                    ("offset", &offset.to_string()),
                    ("allowed_updates", TELEGRAM_ALLOWED_UPDATES),
                ])
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates request failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|error| {
                    format!("<failed to read telegram error body: {error}>")
                });
                if is_transient_status(status) {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %status,
                        %body,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates transient failure; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    consecutive_failures = 0;
                    tracing::error!(
                        %status,
                        %body,
                        ?TELEGRAM_NON_TRANSIENT_DELAY,
                        "telegram getUpdates non-transient failure; keeping poll loop alive"
                    );
                    tokio::time::sleep(TELEGRAM_NON_TRANSIENT_DELAY).await;
                }
                continue;
            }

            let parsed = match response.json::<TelegramGetUpdatesResponse>().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates payload parse failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            consecutive_failures = 0;

            let mut updates = parsed.result;
            updates.sort_by_key(|update| update.update_id);
            for update in updates {
                // Offset moves before conversion so a malformed update is never replayed.
                if update.update_id < offset {
                    continue;
                }
                offset = update.update_id.saturating_add(1);

                for inbound in build_inbound_messages(&update) {
                    tx.send(inbound)
                        .await
                        .map_err(|e| anyhow::anyhow!("telegram inbound queue closed: {e}"))?;
                }
            }
        }
    }
}

fn send_message_body(recipient_id: &str, message: &OutboundMessage) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": recipient_id,
        "text": message.content,
    });
    if let Some(reply_to) = &message.reply_to_message_id {
        body["reply_to_message_id"] = serde_json::Value::String(reply_to.to_string());
    }
    if !message.actions.is_empty() {
        body["reply_markup"] = inline_keyboard(&message.actions);
    }
    body
}

/// All actions render side by side in a single keyboard row.
fn inline_keyboard(actions: &[MessageAction]) -> serde_json::Value {
    let row: Vec<serde_json::Value> = actions
        .iter()
        .map(|action| {
            serde_json::json!({
                "text": action.label,
                "callback_data": action.data,
            })
        })
        .collect();
    serde_json::json!({ "inline_keyboard": [row] })
}

fn transient_retry_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.saturating_sub(1).min(10);
    Duration::from_millis((TELEGRAM_RETRY_BASE_MS * multiplier).min(TELEGRAM_RETRY_MAX_MS))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn build_inbound_messages(update: &TelegramUpdate) -> Vec<InboundMessage> {
    let mut inbound = Vec::new();
    if let Some(message) = build_message_inbound(update.update_id, update.message.as_ref()) {
        inbound.push(message);
    }
    if let Some(callback) = build_callback_inbound(update.update_id, update.callback_query.as_ref())
    {
        inbound.push(callback);
    }
    inbound
}

fn build_message_inbound(
    update_id: i64,
    message: Option<&TelegramMessage>,
) -> Option<InboundMessage> {
    let message = message?;
    let chat = message.chat.as_ref()?;
    let content = extract_message_content(message)?;
    let sender_id = message
        .from
        .as_ref()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| format!("chat:{}", chat.id));
    let message_id = message
        .message_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("update:{update_id}:message"));

    Some(InboundMessage {
        kind: InboundMessageKind::Message,
        message_id: message_id.into(),
        channel_id: TELEGRAM_CHANNEL_ID.into(),
        sender_id: sender_id.into(),
        thread_id: Some(chat.id.to_string().into()),
        is_group: chat.r#type != "private",
        content,
        callback_id: None,
        metadata: serde_json::Value::Null,
        received_at: Utc::now(),
    })
}

/// Callback queries carry the message that showed the buttons, so its id is
/// used as `message_id`; the gateway edits that message after handling.
fn build_callback_inbound(
    update_id: i64,
    query: Option<&TelegramCallbackQuery>,
) -> Option<InboundMessage> {
    let query = query?;
    let data = query.data.as_deref().map(str::trim).filter(|d| !d.is_empty())?;
    let source = query.message.as_ref();
    let chat = source.and_then(|m| m.chat.as_ref());
    let message_id = source
        .and_then(|m| m.message_id)
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("update:{update_id}:callback"));

    Some(InboundMessage {
        kind: InboundMessageKind::Callback,
        message_id: message_id.into(),
        channel_id: TELEGRAM_CHANNEL_ID.into(),
        sender_id: query.from.id.to_string().into(),
        thread_id: chat.map(|c| c.id.to_string().into()),
        is_group: chat.is_some_and(|c| c.r#type != "private"),
        content: data.to_string(),
        callback_id: Some(query.id.clone()),
        metadata: serde_json::Value::Null,
        received_at: Utc::now(),
    })
}

fn extract_message_content(message: &TelegramMessage) -> Option<String> {
    if let Some(text) = message.text.as_deref().map(str::trim) {
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    if let Some(caption) = message.caption.as_deref().map(str::trim) {
        if !caption.is_empty() {
            return Some(caption.to_string());
        }
    }
    if message.has_non_text_payload() {
        return Some(TELEGRAM_NON_TEXT_PLACEHOLDER.to_string());
    }
    None
}

#[derive(Debug, Deserialize)]
struct TelegramGetUpdatesResponse {
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    chat: Option<TelegramChat>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Vec<serde_json::Value>,
    #[serde(default)]
    document: Option<serde_json::Value>,
    #[serde(default)]
    voice: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    from: TelegramUser,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
    #[serde(rename = "type")]
    r#type: String,
}

impl TelegramMessage {
    fn has_non_text_payload(&self) -> bool {
        !self.photo.is_empty() || self.document.is_some() || self.voice.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_update(value: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(value).expect("parse update")
    }

    #[test]
    fn retry_delay_grows_exponentially_and_caps() {
        assert_eq!(transient_retry_delay(1).as_millis(), 250);
        assert_eq!(transient_retry_delay(2).as_millis(), 500);
        assert_eq!(transient_retry_delay(3).as_millis(), 1000);
        assert_eq!(transient_retry_delay(20).as_millis(), 30000);
    }

    #[test]
    fn message_content_prefers_text_then_caption_then_placeholder() {
        let mut message = TelegramMessage {
            text: Some(" hola ".to_string()),
            caption: Some("caption".to_string()),
            ..TelegramMessage::default()
        };
        assert_eq!(extract_message_content(&message).as_deref(), Some("hola"));
        message.text = None;
        assert_eq!(extract_message_content(&message).as_deref(), Some("caption"));
        message.caption = None;
        assert_eq!(extract_message_content(&message), None);
        message.photo = vec![json!({"file_id": "abc"})];
        assert_eq!(
            extract_message_content(&message).as_deref(),
            Some(TELEGRAM_NON_TEXT_PLACEHOLDER)
        );
    }

    #[test]
    fn text_update_becomes_message_inbound() {
        let update = parse_update(json!({
            "update_id": 10,
            "message": {
                "message_id": 55,
                "from": {"id": 42},
                "chat": {"id": 42, "type": "private"},
                "text": "¿Cuándo abono el olmo?"
            }
        }));
        let inbound = build_inbound_messages(&update);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].kind, InboundMessageKind::Message);
        assert_eq!(inbound[0].sender_id.as_str(), "42");
        assert_eq!(inbound[0].message_id.as_str(), "55");
        assert!(!inbound[0].is_group);
    }

    #[test]
    fn callback_query_carries_data_and_source_message() {
        let update = parse_update(json!({
            "update_id": 11,
            "callback_query": {
                "id": "cbq-1",
                "from": {"id": 42},
                "message": {"message_id": 77, "chat": {"id": 42, "type": "private"}},
                "data": "confirm:accept:abc123"
            }
        }));
        let inbound = build_inbound_messages(&update);
        assert_eq!(inbound.len(), 1);
        let callback = &inbound[0];
        assert_eq!(callback.kind, InboundMessageKind::Callback);
        assert_eq!(callback.content, "confirm:accept:abc123");
        assert_eq!(callback.message_id.as_str(), "77");
        assert_eq!(callback.callback_id.as_deref(), Some("cbq-1"));
        assert_eq!(callback.reply_target(), "42");
    }

    #[test]
    fn callback_without_data_is_ignored() {
        let update = parse_update(json!({
            "update_id": 12,
            "callback_query": {"id": "cbq-2", "from": {"id": 1}}
        }));
        assert!(build_inbound_messages(&update).is_empty());
    }

    #[test]
    fn actions_render_as_one_keyboard_row() {
        let message = OutboundMessage::text("delete species Elm").with_actions(vec![
            MessageAction::new("Accept", "confirm:accept:x1"),
            MessageAction::new("Cancel", "confirm:cancel:x1"),
        ]);
        let body = send_message_body("42", &message);
        assert_eq!(body["chat_id"], "42");
        let row = &body["reply_markup"]["inline_keyboard"][0];
        assert_eq!(row.as_array().map(Vec::len), Some(2));
        assert_eq!(row[1]["callback_data"], "confirm:cancel:x1");

        let plain = send_message_body("42", &OutboundMessage::text("hola"));
        assert!(plain.get("reply_markup").is_none());
    }
}
