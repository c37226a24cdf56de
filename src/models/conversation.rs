//! Conversations, stored messages and the chat request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Who authored a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One prior turn supplied as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl From<Message> for ChatTurn {
    fn from(message: Message) -> Self {
        let role = if message.role == ChatRole::Assistant.as_str() {
            ChatRole::Assistant
        } else {
            ChatRole::User
        };
        Self {
            role,
            content: message.content,
        }
    }
}

/// Request body for `POST /api/v1/chat`.
///
/// `history` and `job_id` are only honoured on plans that include them.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

pub const MAX_MESSAGE_CHARS: usize = 8000;

impl ChatRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("Message cannot be empty".to_string());
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(format!(
                "Message must be {MAX_MESSAGE_CHARS} characters or fewer"
            ));
        }
        Ok(())
    }
}

/// Response body for `POST /api/v1/chat`.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub message: Message,
}

/// A conversation with its messages, oldest first.
#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub shared: bool,
    pub messages: Vec<Message>,
}

/// Conversation list entry; `shared` marks conversations owned by someone else.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub job_id: Option<Uuid>,
    pub shared: bool,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/conversations/{id}/share`.
#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub email: String,
}

/// Title for a new conversation: the first 60 characters of the opening message.
pub fn conversation_title(message: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;

    let trimmed = message.trim();
    let first_line = trimmed.lines().next().unwrap_or_default();
    if first_line.chars().count() <= MAX_TITLE_CHARS {
        return first_line.to_string();
    }

    let mut title: String = first_line.chars().take(MAX_TITLE_CHARS - 1).collect();
    title.push('…');
    title
}
