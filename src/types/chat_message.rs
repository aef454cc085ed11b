use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Role, Source};

/// One entry of a conversation transcript.
///
/// An assistant message is created empty when the user submits a turn and is then
/// mutated in place by a [`ChatTurnAssembler`](crate::ChatTurnAssembler) until the
/// stream ends. `content` only grows while streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,

    /// The message text.
    pub content: String,

    /// True while the service is still searching the knowledge base for this turn.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub searching: bool,

    /// Documents the answer was grounded on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    /// When the message was created.
    #[serde(
        default,
        with = "crate::utils::time",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl ChatMessage {
    /// A message typed by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            searching: false,
            sources: Vec::new(),
            created_at: Some(OffsetDateTime::now_utc()),
        }
    }

    /// An empty assistant message awaiting a streamed answer.
    ///
    /// `searching` should be true when the turn requested retrieval.
    pub fn assistant_pending(searching: bool) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            searching,
            sources: Vec::new(),
            created_at: Some(OffsetDateTime::now_utc()),
        }
    }

    /// True for messages written by the user.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// True for messages produced by the service.
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_assistant_message() {
        let message = ChatMessage::assistant_pending(true);
        assert!(message.is_assistant());
        assert!(message.searching);
        assert!(message.content.is_empty());
        assert!(message.sources.is_empty());
    }

    #[test]
    fn transcript_round_trip_keeps_sources() {
        let mut message = ChatMessage::assistant_pending(false);
        message.content = "See the manual.".to_string();
        message.sources = vec![Source::new("manual.pdf", 3)];
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], json!("assistant"));
        assert!(value.get("searching").is_none());
        let back: ChatMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn legacy_entry_without_timestamp() {
        let message: ChatMessage =
            serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert!(message.is_user());
        assert!(message.created_at.is_none());
    }
}
