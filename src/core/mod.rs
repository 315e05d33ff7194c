//! Core chat components: the engine and its conversation memory.

mod chat;
mod memory;

pub use chat::{ChatEngine, ChatError, DEFAULT_SESSION};
pub use memory::{MemoryStore, StoredMessage};

#[cfg(test)]
pub(crate) use chat::tests::{EchoModel, FailingModel};
