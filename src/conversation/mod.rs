//! Conversation types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Unknown roles read back from storage are treated as user text.
    pub fn parse(role: &str) -> Self {
        match role {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// The prompt assembled for a single turn: system prompt, prior history,
/// then the new user message.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, prompt: &str) -> Self {
        if !prompt.is_empty() {
            self.messages.push(Message::system(prompt));
        }
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.messages.extend(history);
        self
    }

    pub fn add_user(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    /// Renders the prompt the way it is logged in verbose mode.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| match m.role {
                Role::System => m.content.clone(),
                Role::User => format!("Human: {}", m.content),
                Role::Assistant => format!("AI: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
