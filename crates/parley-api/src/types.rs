//! Core wire types shared by the client and the chat runtime

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One piece of user or error content
///
/// Field names follow the backend's stored shape (`{type, name, content}`),
/// so parts round-trip through `GET /conversation/{id}` unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text { text: String },
    /// A document attached inline as a data URL
    File { name: String, content: String },
    /// An image previously stored through `/upload`; `content` is the server path
    Image { name: String, content: String },
}

impl Part {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a document part from a data URL
    pub fn file(name: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self::File {
            name: name.into(),
            content: data_url.into(),
        }
    }

    /// Create an image part from an uploaded file path
    pub fn image(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Image {
            name: name.into(),
            content: path.into(),
        }
    }

    /// Get text if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Whether this part is an attachment rather than text
    pub fn is_attachment(&self) -> bool {
        !matches!(self, Self::Text { .. })
    }

    /// Display name of an attachment part
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::File { name, .. } | Self::Image { name, .. } => Some(name),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
        })
    }
}

/// A single turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// User turn
    User {
        #[serde(deserialize_with = "parts_or_text")]
        content: Vec<Part>,
    },
    /// Assistant reply; `content` is markdown source that grows while streaming
    Assistant {
        content: String,
        #[serde(default = "default_true")]
        is_complete: bool,
        /// Set when the user cancelled the stream that produced this message
        #[serde(default, skip_serializing_if = "is_false")]
        interrupted: bool,
    },
    /// Transport, protocol or server failure recorded in the conversation
    Error {
        #[serde(deserialize_with = "parts_or_text")]
        content: Vec<Part>,
    },
}

fn default_true() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The backend stores plain strings; newer clients send part arrays.
fn parts_or_text<'de, D>(deserializer: D) -> std::result::Result<Vec<Part>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Text(String),
        Parts(Vec<Part>),
    }

    Ok(match Wire::deserialize(deserializer)? {
        Wire::Text(text) => vec![Part::text(text)],
        Wire::Parts(parts) => parts,
    })
}

impl Message {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![Part::text(text)],
        }
    }

    /// Create a user message from text plus attachments; empty text is omitted
    pub fn user_with_parts(text: &str, attachments: Vec<Part>) -> Self {
        let mut content = Vec::with_capacity(attachments.len() + 1);
        if !text.is_empty() {
            content.push(Part::text(text));
        }
        content.extend(attachments);
        Self::User { content }
    }

    /// Create a complete assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: text.into(),
            is_complete: true,
            interrupted: false,
        }
    }

    /// Create an error message
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error {
            content: vec![Part::text(text)],
        }
    }

    /// Get the role
    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Error { .. } => Role::Error,
        }
    }

    /// Get combined text content
    pub fn text(&self) -> String {
        match self {
            Self::Assistant { content, .. } => content.clone(),
            Self::User { content } | Self::Error { content } => content
                .iter()
                .filter_map(|p| p.as_text())
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Attachment parts of a user or error message
    pub fn attachments(&self) -> Vec<Part> {
        match self {
            Self::Assistant { .. } => vec![],
            Self::User { content } | Self::Error { content } => content
                .iter()
                .filter(|p| p.is_attachment())
                .cloned()
                .collect(),
        }
    }

    /// Whether the stream for this message has terminated; always true for non-assistant roles
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Assistant { is_complete, .. } => *is_complete,
            _ => true,
        }
    }

    /// Whether this assistant message was cut short by cancellation
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Assistant { interrupted: true, .. })
    }
}

/// Body of a streamed chat request (`POST {model.endpoint}`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub model: String,
    pub in_billing: f64,
    pub out_billing: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_billing: Option<f64>,
    pub temperature: f32,
    pub reason: u8,
    pub system_message: String,
    pub user_message: String,
    /// Attachment parts sent alongside the text; omitted when there are none
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Part>,
    pub dan: bool,
    pub stream: bool,
}

/// Full conversation as returned by `GET /conversation/{id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation_id: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub reason: u8,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Sidebar entry from `GET /conversations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub alias: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
}

/// Body of `POST /new_conversation`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewConversationRequest {
    pub model: String,
    pub temperature: f32,
    pub reason: u8,
    pub system_message: String,
    pub user_message: String,
}

/// Response of `POST /new_conversation`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewConversation {
    pub conversation_id: String,
    pub alias: String,
}

/// Response of `POST /upload`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UploadResponse {
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub error: Option<String>,
}

/// A stored upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub file_path: String,
}

/// Response of `GET /auth/status`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub logged_in: bool,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub error: Option<String>,
}

/// Response of `GET /auth/user`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub billing: f64,
}

/// Response of `POST /login`; the session itself travels in a cookie
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RenameRequest<'a> {
    pub alias: &'a str,
}
