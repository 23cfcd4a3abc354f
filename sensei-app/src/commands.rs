//! Chat command and button-callback parsing.

use sensei_channels::MessageAction;
use sensei_tools::{ConfirmationId, PendingConfirmation};

const CALLBACK_PREFIX: &str = "confirm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    /// Clears history and pending confirmations.
    Reset,
    Pending,
    /// Approve by id, or the oldest pending command.
    Confirm(Option<ConfirmationId>),
    Cancel(Option<ConfirmationId>),
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Cancel,
}

/// Parses a chat message; `None` means it is not a command.
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut parts = trimmed.split_whitespace();
    let head = parts.next().unwrap_or_default();
    // Telegram appends the bot name in groups: /confirm@bonsai_sensei_bot
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    let id = parts.next().map(ConfirmationId::new);

    Some(match name.as_str() {
        "/start" | "/help" => ChatCommand::Start,
        "/reset" | "/new" => ChatCommand::Reset,
        "/pending" => ChatCommand::Pending,
        "/confirm" | "/yes" => ChatCommand::Confirm(id),
        "/cancel" | "/no" => ChatCommand::Cancel(id),
        _ => ChatCommand::Unknown(name),
    })
}

/// Parses `confirm:<accept|cancel>[:<id>]` button data.
pub fn parse_callback(data: &str) -> Option<(Decision, Option<ConfirmationId>)> {
    let mut parts = data.trim().splitn(3, ':');
    if parts.next()? != CALLBACK_PREFIX {
        return None;
    }
    let decision = match parts.next()? {
        "accept" => Decision::Accept,
        "cancel" => Decision::Cancel,
        _ => return None,
    };
    let id = parts
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ConfirmationId::new);
    Some((decision, id))
}

/// Approve and cancel buttons for one pending confirmation.
pub fn confirmation_actions(pending: &PendingConfirmation) -> Vec<MessageAction> {
    vec![
        MessageAction::new("Confirm", format!("{CALLBACK_PREFIX}:accept:{}", pending.id)),
        MessageAction::new("Cancel", format!("{CALLBACK_PREFIX}:cancel:{}", pending.id)),
    ]
}

pub fn help_text() -> String {
    [
        "I am your bonsai sensei. Ask me about care, species, your trees, fertilizers or treatments.",
        "Changes to your records wait for your confirmation.",
        "",
        "/pending - list changes awaiting confirmation",
        "/confirm [id] - apply a change (oldest if no id)",
        "/cancel [id] - discard a change (oldest if no id)",
        "/reset - forget this conversation and its pending changes",
    ]
    .join("\n")
}

pub fn pending_text(pending: &[PendingConfirmation]) -> String {
    if pending.is_empty() {
        return "Nothing to confirm.".to_string();
    }
    let mut lines = vec!["Pending confirmations:".to_string()];
    lines.extend(pending.iter().map(|p| format!("{} - {}", p.id, p.summary)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_optional_ids() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/start"), Some(ChatCommand::Start));
        assert_eq!(parse_command(" /RESET "), Some(ChatCommand::Reset));
        assert_eq!(parse_command("/confirm"), Some(ChatCommand::Confirm(None)));
        assert_eq!(
            parse_command("/confirm@sensei_bot abc123"),
            Some(ChatCommand::Confirm(Some(ConfirmationId::new("abc123"))))
        );
        assert_eq!(
            parse_command("/cancel x1"),
            Some(ChatCommand::Cancel(Some(ConfirmationId::new("x1"))))
        );
        assert_eq!(
            parse_command("/water"),
            Some(ChatCommand::Unknown("/water".to_string()))
        );
    }

    #[test]
    fn parses_callback_data() {
        assert_eq!(
            parse_callback("confirm:accept:x1"),
            Some((Decision::Accept, Some(ConfirmationId::new("x1"))))
        );
        assert_eq!(parse_callback("confirm:cancel"), Some((Decision::Cancel, None)));
        assert_eq!(parse_callback("confirm:cancel:"), Some((Decision::Cancel, None)));
        assert_eq!(parse_callback("confirm:maybe:x1"), None);
        assert_eq!(parse_callback("other:accept:x1"), None);
    }

    #[test]
    fn actions_round_trip_through_the_callback_parser() {
        let pending = PendingConfirmation {
            id: ConfirmationId::new("x1"),
            summary: "delete species Elm".to_string(),
        };
        let actions = confirmation_actions(&pending);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            parse_callback(&actions[0].data),
            Some((Decision::Accept, Some(ConfirmationId::new("x1"))))
        );
        assert_eq!(
            parse_callback(&actions[1].data),
            Some((Decision::Cancel, Some(ConfirmationId::new("x1"))))
        );
    }

    #[test]
    fn pending_text_lists_ids() {
        assert_eq!(pending_text(&[]), "Nothing to confirm.");
        let text = pending_text(&[PendingConfirmation {
            id: ConfirmationId::new("x1"),
            summary: "delete species Elm".to_string(),
        }]);
        assert!(text.contains("x1 - delete species Elm"));
    }
}
