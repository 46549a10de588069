//! Conversation turns exchanged with the model.

use serde::{Deserialize, Serialize};

/// Originator of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One content item inside a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text { text: String },

    /// Reference to a file previously registered with the provider.
    Asset { uri: String, mime_type: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn asset(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Part::Asset {
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::Asset { .. } => None,
        }
    }
}

/// A single message in a conversation. Order of `parts` is significant:
/// an image reference precedes the text that accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_turn_serializes_with_lowercase_role() {
        let turn = Turn::user(vec![Part::asset("files/abc", "image/png"), Part::text("hi")]);

        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({
                "role": "user",
                "parts": [
                    { "type": "asset", "uri": "files/abc", "mime_type": "image/png" },
                    { "type": "text", "text": "hi" }
                ]
            })
        );
    }

    #[test]
    fn model_turn_holds_single_text_part() {
        let turn = Turn::model("hello back");
        assert_eq!(turn.role, Role::Model);
        assert_eq!(turn.parts.len(), 1);
        assert_eq!(turn.parts[0].as_text(), Some("hello back"));
        assert!(matches!(turn.parts[0], Part::Text { .. }));
    }
}
