//! Session and event data model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Author tag used for events appended by tools
pub const AUTHOR_TOOL: &str = "tool";
/// Author tag used for end-user turns (and monitor injections)
pub const AUTHOR_USER: &str = "user";
/// Author tag used for model turns
pub const AUTHOR_MODEL: &str = "model";

/// Identifies one conversation on the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionRef {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// Materialized view of a session as returned by a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: HashMap<String, Value>,
    /// Append-only; insertion order is the order observed by the store
    #[serde(default)]
    pub events: Vec<Event>,
    /// Epoch seconds
    #[serde(default)]
    pub last_update_time: f64,
}

impl Session {
    pub fn session_ref(&self) -> SessionRef {
        SessionRef::new(&self.app_name, &self.user_id, &self.id)
    }
}

/// One entry in a session's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    /// Epoch seconds
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub actions: EventActions,
}

impl Event {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: format!("e-{}", Uuid::new_v4()),
            author: author.into(),
            timestamp: now_epoch_secs(),
            content: None,
            actions: EventActions::default(),
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_text(self, role: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_content(Content::text(role, text))
    }

    pub fn with_state_delta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.actions.state_delta.insert(key.into(), value);
        self
    }

    /// Concatenated text of all parts, if there is any
    pub fn text(&self) -> Option<String> {
        let content = self.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn is_from(&self, author: &str) -> bool {
        self.author == author
    }
}

/// Side effects carried by an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_delta: HashMap<String, Value>,
}

/// A message: a role plus ordered parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

pub fn now_epoch_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
