mod file;
mod memory;

pub use file::{ConversationMetadata, JsonFileStore};
pub use memory::MemoryStore;

use crate::error::ConvoError;
use crate::model::Conversation;
use uuid::Uuid;

/// Persistence capability the engine saves snapshots to and loads them from.
///
/// Implementations own their concurrency discipline. A save that has completed
/// must be visible to a later `load` of the same id.
#[async_trait::async_trait]
pub trait ChatStorage: Send + Sync {
    /// Fetch a snapshot. Fails with `ConvoError::NotFound` when the id is unknown.
    async fn load(&self, id: Uuid) -> Result<Conversation, ConvoError>;

    /// Insert or replace the snapshot keyed by `conversation.id()`.
    async fn save(&self, conversation: Conversation) -> Result<(), ConvoError>;
}
