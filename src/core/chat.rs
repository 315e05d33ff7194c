//! Chat engine
//!
//! The ChatEngine runs one conversational turn at a time per session:
//! 1. Loads the session's history from memory
//! 2. Builds the prompt: system prompt, history, new user message
//! 3. Sends it to the upstream model
//! 4. Saves the user message and the reply to memory
//! 5. Returns the reply
//!
//! Nothing is written to memory when the upstream call fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as TurnLock;

use crate::config::prompts;
use crate::conversation::{Conversation, Message};
use crate::providers::{ChatModel, ProviderError};

use super::memory::{MemoryStore, StoredMessage};

/// Session used by callers that do not send a session id
pub const DEFAULT_SESSION: &str = "default";

/// Errors from the chat engine
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream model unavailable: {0}")]
    UpstreamUnavailable(ProviderError),

    #[error("Upstream model error: {0}")]
    Upstream(ProviderError),

    #[error("Memory error: {0}")]
    Memory(#[from] sqlx::Error),
}

impl From<ProviderError> for ChatError {
    fn from(err: ProviderError) -> Self {
        if err.is_unavailable() {
            ChatError::UpstreamUnavailable(err)
        } else {
            ChatError::Upstream(err)
        }
    }
}

/// The core chat engine
pub struct ChatEngine {
    model: Arc<dyn ChatModel>,
    memory: Arc<MemoryStore>,
    system_prompt: String,
    turns: Mutex<HashMap<String, Arc<TurnLock<()>>>>,
}

impl ChatEngine {
    pub fn new(model: Arc<dyn ChatModel>, memory: Arc<MemoryStore>) -> Self {
        Self {
            model,
            memory,
            system_prompt: prompts::CONVERSATION.to_string(),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Set a custom system prompt; an empty prompt sends history only
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    /// Run one turn for `session_id` and return the model's reply.
    pub async fn run(&self, session_id: &str, input: &str) -> Result<String, ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::InvalidInput("query must not be empty".into()));
        }

        let turn = self.turn_slot(session_id);
        let _guard = turn.lock.lock().await;

        let history = self.memory.history(session_id).await?;
        let mut conversation = Conversation::new()
            .with_system(&self.system_prompt)
            .with_history(history);
        conversation.add_user(input);

        tracing::debug!(
            session = session_id,
            "Prompt after formatting:\n{}",
            conversation.transcript()
        );

        let reply = match self.model.complete(&conversation.messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session = session_id, error = %e, "Upstream call failed");
                return Err(e.into());
            }
        };

        self.memory
            .append_turn(session_id, &Message::user(input), &reply)
            .await?;

        Ok(reply.content)
    }

    /// Forget a session's history, returning the number of removed messages.
    pub async fn reset(&self, session_id: &str) -> Result<u64, ChatError> {
        let turn = self.turn_slot(session_id);
        let _guard = turn.lock.lock().await;

        let cleared = self.memory.clear(session_id).await?;
        tracing::info!(session = session_id, cleared, "Conversation memory cleared");
        Ok(cleared)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<StoredMessage>, ChatError> {
        Ok(self.memory.entries(session_id).await?)
    }

    pub async fn memory_len(&self, session_id: &str) -> Result<usize, ChatError> {
        Ok(self.memory.len(session_id).await?)
    }

    fn turn_slot(&self, session_id: &str) -> TurnSlot<'_> {
        let mut turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        let lock = turns
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(TurnLock::new(())))
            .clone();

        TurnSlot {
            turns: &self.turns,
            session_id: session_id.to_string(),
            lock,
        }
    }
}

/// A claim on a session's turn lock. The map entry is dropped together with
/// the last claim, so idle sessions hold no lock.
struct TurnSlot<'a> {
    turns: &'a Mutex<HashMap<String, Arc<TurnLock<()>>>>,
    session_id: String,
    lock: Arc<TurnLock<()>>,
}

impl Drop for TurnSlot<'_> {
    fn drop(&mut self) {
        let mut turns = self.turns.lock().unwrap_or_else(|e| e.into_inner());
        // Claims are only cloned under the map lock: the map plus this slot
        // means nobody else is waiting.
        let idle = turns
            .get(&self.session_id)
            .is_some_and(|held| Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2);
        if idle {
            turns.remove(&self.session_id);
        }
    }
}
