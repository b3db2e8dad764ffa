use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::company::CompanyId;
use crate::domain::normalize_identifier;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize_identifier(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub company_id: CompanyId,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatUser {
    User,
    Assistant,
    Tool,
}

impl ChatUser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl FromStr for ChatUser {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(DomainError::InvalidTurnRecord(format!("unknown chat user `{other}`"))),
        }
    }
}

/// A model-issued request to run one capability, as recorded on the
/// assistant turn that asked for it. `arguments` is the raw JSON text the
/// model produced; it is replayed verbatim when the context is rebuilt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "callId")]
    pub call_id: String,
    #[serde(rename = "functionName")]
    pub function_name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnBody {
    User { text: String },
    Assistant { text: Option<String>, tool_calls: Vec<ToolCall> },
    Tool { call_id: String, result_text: String },
}

impl TurnBody {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant { text: Some(text.into()), tool_calls: Vec::new() }
    }

    pub fn tool_result(call_id: impl Into<String>, result_text: impl Into<String>) -> Self {
        Self::Tool { call_id: call_id.into(), result_text: result_text.into() }
    }

    pub fn role(&self) -> ChatUser {
        match self {
            Self::User { .. } => ChatUser::User,
            Self::Assistant { .. } => ChatUser::Assistant,
            Self::Tool { .. } => ChatUser::Tool,
        }
    }

    pub fn chat_text(&self) -> Option<&str> {
        match self {
            Self::User { text } => Some(text),
            Self::Assistant { text, .. } => text.as_deref(),
            Self::Tool { result_text, .. } => Some(result_text),
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Persisted metadata bag for this body.
    pub fn meta(&self) -> Value {
        match self {
            Self::User { .. } => json!({}),
            Self::Assistant { tool_calls, .. } if tool_calls.is_empty() => json!({}),
            Self::Assistant { tool_calls, .. } => json!({ "toolCalls": tool_calls }),
            Self::Tool { call_id, .. } => json!({ "callId": call_id }),
        }
    }

    /// Rebuilds a typed body from the stored `(chatUser, chatText, meta)` triple.
    pub fn from_parts(
        chat_user: ChatUser,
        chat_text: Option<String>,
        meta: Option<Value>,
    ) -> Result<Self, DomainError> {
        let meta = meta.unwrap_or(Value::Null);
        match chat_user {
            ChatUser::User => Ok(Self::User { text: chat_text.unwrap_or_default() }),
            ChatUser::Assistant => {
                let tool_calls = match meta.get("toolCalls") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(raw) => serde_json::from_value::<Vec<ToolCall>>(raw.clone()).map_err(
                        |error| {
                            DomainError::InvalidTurnRecord(format!(
                                "assistant toolCalls metadata is malformed: {error}"
                            ))
                        },
                    )?,
                };
                Ok(Self::Assistant { text: chat_text, tool_calls })
            }
            ChatUser::Tool => {
                let call_id = meta.get("callId").and_then(Value::as_str).ok_or_else(|| {
                    DomainError::InvalidTurnRecord("tool turn metadata lacks callId".to_string())
                })?;
                Ok(Self::Tool {
                    call_id: call_id.to_string(),
                    result_text: chat_text.unwrap_or_default(),
                })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub conversation_id: ConversationId,
    pub body: TurnBody,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn to_record(&self) -> TurnRecord {
        TurnRecord {
            id: self.id.0.clone(),
            conversation_id: self.conversation_id.0.clone(),
            chat_text: self.body.chat_text().map(ToString::to_string),
            chat_user: self.body.role(),
            meta: self.body.meta(),
            created_at: self.created_at,
        }
    }
}

/// Shape in which turns are exposed to readers outside the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub id: String,
    pub conversation_id: String,
    pub chat_text: Option<String>,
    pub chat_user: ChatUser,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

/// Creation timestamp for the next turn of a conversation.
///
/// Stored timestamps have microsecond precision and must strictly increase
/// within a conversation, so a clock that has not advanced past the previous
/// turn is bumped one microsecond beyond it.
pub fn next_turn_timestamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.duration_trunc(Duration::microseconds(1)).unwrap_or(now);
    match previous {
        Some(previous) if previous >= now => previous + Duration::microseconds(1),
        _ => now,
    }
}
