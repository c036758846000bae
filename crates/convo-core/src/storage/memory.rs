use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::ChatStorage;
use crate::error::ConvoError;
use crate::model::Conversation;

/// In-process store. Snapshots vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn most_recent(&self) -> Option<Conversation> {
        self.conversations
            .read()
            .await
            .values()
            .max_by_key(|c| c.last_interaction())
            .cloned()
    }

    /// The `n` most recently touched conversations, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<Conversation> {
        let mut all: Vec<Conversation> =
            self.conversations.read().await.values().cloned().collect();
        all.sort_by_key(|c| c.last_interaction());
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).collect()
    }

    pub async fn get_many(&self, ids: &[Uuid]) -> Vec<Conversation> {
        let conversations = self.conversations.read().await;
        ids.iter()
            .filter_map(|id| conversations.get(id).cloned())
            .collect()
    }

    pub async fn remove_all(&self) {
        tracing::info!("Removing all stored conversations");
        self.conversations.write().await.clear();
    }
}

#[async_trait::async_trait]
impl ChatStorage for MemoryStore {
    async fn load(&self, id: Uuid) -> Result<Conversation, ConvoError> {
        self.conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ConvoError::NotFound(id))
    }

    async fn save(&self, conversation: Conversation) -> Result<(), ConvoError> {
        self.conversations
            .write()
            .await
            .insert(conversation.id(), conversation);
        Ok(())
    }
}
