use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a message came from in the FIFO queue / recall log.
///
/// `System` and `Tool` records are folded into a single `user`-role turn when
/// rendered for the model (see `memos-memory::working_context`); `kind` keeps
/// that provenance around for rendering and for recall search, while `role`
/// (on [`ChatMessage`]) is the narrower notion the model API itself needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    Tool,
    User,
    Assistant,
}

/// The two roles the chat completion endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the FIFO queue and, once appended, in the recall log.
///
/// `user_id` is only meaningful for `Tool` and `User` records (it says which
/// human the turn belongs to); `System` and `Assistant` records carry the
/// conversation's own id. Timestamps are day-granular by convention, matching
/// the recall log's date-only search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub kind: MessageKind,
    pub user_id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: NaiveDate,
}

impl MessageRecord {
    pub fn new(kind: MessageKind, user_id: i64, role: Role, content: impl Into<String>) -> Self {
        Self {
            kind,
            user_id,
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().date_naive(),
        }
    }

    pub fn system(content: impl Into<String>, conversation_user_id: i64) -> Self {
        Self::new(MessageKind::System, conversation_user_id, Role::User, content)
    }

    pub fn tool(content: impl Into<String>, user_id: i64) -> Self {
        Self::new(MessageKind::Tool, user_id, Role::User, content)
    }

    pub fn user(content: impl Into<String>, user_id: i64) -> Self {
        Self::new(MessageKind::User, user_id, Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, conversation_user_id: i64) -> Self {
        Self::new(
            MessageKind::Assistant,
            conversation_user_id,
            Role::Assistant,
            content,
        )
    }

    /// Render this record's natural-language sentinel, the form the summarizer
    /// and the working-context renderer use to fold non-assistant turns into
    /// a single `user`-role message.
    pub fn sentinel_text(&self) -> String {
        match self.kind {
            MessageKind::System => format!("\u{276e}SYSTEM MESSAGE\u{276f} {}", self.content),
            MessageKind::Tool => format!(
                "\u{276e}TOOL MESSAGE for conversation with user with id '{}'\u{276f} {}",
                self.user_id, self.content
            ),
            MessageKind::User => format!(
                "\u{276e}USER MESSAGE for conversation with user with id '{}'\u{276f} {}",
                self.user_id, self.content
            ),
            MessageKind::Assistant => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_carries_user_id_for_tool_and_user_records() {
        let tool = MessageRecord::tool("result: ok", 42);
        assert!(tool.sentinel_text().contains("'42'"));
        assert!(tool.sentinel_text().starts_with("\u{276e}TOOL MESSAGE"));

        let user = MessageRecord::user("hi", 7);
        assert!(user.sentinel_text().contains("'7'"));
    }

    #[test]
    fn assistant_sentinel_is_bare_content() {
        let assistant = MessageRecord::assistant("hello there", 1);
        assert_eq!(assistant.sentinel_text(), "hello there");
    }
}
