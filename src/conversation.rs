//! Conversation model shared by every phase of a turn.
//!
//! Messages arrive from the front end and are read immutably. Cross-turn agent
//! state rides in `custom_content.state` and is decoded into the closed
//! [`AgentState`] set rather than inspected as an untyped map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

const SESSION_ID_KEY: &str = "session_id";
const DELEGATE_FLAG_KEY: &str = "is_delegate";
const HIDDEN_MESSAGES_KEY: &str = "hidden_messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomContent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_content: Option<CustomContent>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            custom_content: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn with_state(mut self, state: &AgentState) -> Self {
        self.custom_content.get_or_insert_with(CustomContent::default).state = state.to_value();
        self
    }

    /// The same message with metadata dropped.
    #[must_use]
    pub fn text_only(&self) -> Self {
        Self::new(self.role, self.content.clone())
    }

    pub fn state(&self) -> Option<&Value> {
        self.custom_content.as_ref()?.state.as_ref()
    }

    pub fn agent_state(&self) -> AgentState {
        AgentState::from_value(self.state())
    }
}

/// Agent-specific state persisted on an assistant message for the next turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    /// No state, or state written by something this coordinator does not own.
    Plain,
    /// The general agent's private thread, replayed invisibly on later turns.
    Delegate { hidden: Value },
    /// The managed-session agent's backend conversation.
    Session { session_id: String },
}

impl AgentState {
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::Plain;
        };

        if map.get(DELEGATE_FLAG_KEY).and_then(Value::as_bool) == Some(true) {
            return Self::Delegate {
                hidden: map.get(HIDDEN_MESSAGES_KEY).cloned().unwrap_or(Value::Null),
            };
        }

        match map.get(SESSION_ID_KEY).and_then(Value::as_str) {
            Some(session_id) if !session_id.is_empty() => Self::Session {
                session_id: session_id.to_string(),
            },
            _ => Self::Plain,
        }
    }

    pub fn to_value(&self) -> Option<Value> {
        let mut map = Map::new();
        match self {
            Self::Plain => return None,
            Self::Delegate { hidden } => {
                map.insert(DELEGATE_FLAG_KEY.into(), Value::Bool(true));
                map.insert(HIDDEN_MESSAGES_KEY.into(), hidden.clone());
            }
            Self::Session { session_id } => {
                map.insert(SESSION_ID_KEY.into(), Value::String(session_id.clone()));
            }
        }
        Some(Value::Object(map))
    }
}

/// First session id found scanning in original order.
///
/// Scan order, not recency, decides when several markers exist.
pub fn first_session_id(messages: &[Message]) -> Option<&str> {
    messages.iter().find_map(|message| match message.state() {
        Some(Value::Object(map)) => map
            .get(SESSION_ID_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty()),
        _ => None,
    })
}

/// A past general-agent exchange found in the visible conversation.
#[derive(Debug, Clone, Copy)]
pub struct DelegateTurn<'a> {
    pub request: Option<&'a Message>,
    pub reply: &'a Message,
    pub hidden: &'a Value,
}

/// Every assistant message carrying a delegate marker, in original order.
pub fn delegate_turns(messages: &[Message]) -> Vec<DelegateTurn<'_>> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.role == Role::Assistant)
        .filter_map(|(idx, message)| {
            let Some(Value::Object(map)) = message.state() else {
                return None;
            };
            if map.get(DELEGATE_FLAG_KEY).and_then(Value::as_bool) != Some(true) {
                return None;
            }
            Some(DelegateTurn {
                request: idx.checked_sub(1).map(|prev| &messages[prev]),
                reply: message,
                hidden: map.get(HIDDEN_MESSAGES_KEY).unwrap_or(&Value::Null),
            })
        })
        .collect()
}

pub fn last_user_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|message| message.role == Role::User)
}
