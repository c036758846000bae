use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ChatStorage;
use crate::error::ConvoError;
use crate::model::Conversation;

/// Metadata about a saved conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub id: Uuid,
    pub title: String,
    pub last_interaction: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&Conversation> for ConversationMetadata {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id(),
            title: conversation.title(),
            last_interaction: conversation.last_interaction(),
            message_count: conversation.message_count(),
        }
    }
}

/// Index of all conversations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConversationIndex {
    conversations: Vec<ConversationMetadata>,
}

impl ConversationIndex {
    /// Most recently touched first.
    fn sort(&mut self) {
        self.conversations
            .sort_by(|a, b| b.last_interaction.cmp(&a.last_interaction));
    }
}

/// Stores each conversation as `<id>.json` in a directory, alongside an `index.json`.
pub struct JsonFileStore {
    base_dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store in the default directory (~/.convo/conversations/)
    pub fn new() -> Result<Self, ConvoError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConvoError::Config("Could not determine home directory".to_string()))?;
        Self::with_dir(home.join(".convo").join("conversations"))
    }

    /// Create a store rooted at `base_dir`, creating it if needed
    pub fn with_dir(base_dir: impl Into<PathBuf>) -> Result<Self, ConvoError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.json")
    }

    fn conversation_path(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    async fn load_index(&self) -> Result<ConversationIndex, ConvoError> {
        let path = self.index_path();
        if !fs::try_exists(&path).await? {
            return self.rebuild_index().await;
        }
        let contents = fs::read_to_string(&path).await?;
        match serde_json::from_str(&contents) {
            Ok(index) => Ok(index),
            Err(e) => {
                tracing::warn!("Conversation index is unreadable, rebuilding it: {}", e);
                self.rebuild_index().await
            }
        }
    }

    /// Recreate the index from the `<id>.json` files in the directory.
    /// Files that fail to decode are left on disk and skipped.
    async fn rebuild_index(&self) -> Result<ConversationIndex, ConvoError> {
        let mut index = ConversationIndex::default();
        let mut entries = fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let is_snapshot = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| Uuid::parse_str(stem).is_ok());
            if !is_snapshot {
                continue;
            }

            let contents = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Conversation>(&contents) {
                Ok(conversation) => index
                    .conversations
                    .push(ConversationMetadata::from(&conversation)),
                Err(e) => tracing::warn!("Skipping unreadable {}: {}", path.display(), e),
            }
        }
        index.sort();
        if !index.conversations.is_empty() {
            tracing::info!(
                conversations = index.conversations.len(),
                "Rebuilt conversation index"
            );
        }
        Ok(index)
    }

    async fn write_atomic(&self, path: PathBuf, contents: String) -> Result<(), ConvoError> {
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn save_index(&self, index: &ConversationIndex) -> Result<(), ConvoError> {
        let contents = serde_json::to_string_pretty(index)?;
        self.write_atomic(self.index_path(), contents).await
    }

    /// Most recently touched conversations first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ConversationMetadata>, ConvoError> {
        let _guard = self.lock.lock().await;
        let index = self.load_index().await?;
        Ok(index.conversations.into_iter().take(limit).collect())
    }

    /// Case-insensitive title search
    pub async fn search(&self, query: &str) -> Result<Vec<ConversationMetadata>, ConvoError> {
        let _guard = self.lock.lock().await;
        let index = self.load_index().await?;
        let query = query.to_lowercase();
        Ok(index
            .conversations
            .into_iter()
            .filter(|m| m.title.to_lowercase().contains(&query))
            .collect())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ConvoError> {
        let _guard = self.lock.lock().await;
        let path = self.conversation_path(id);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }

        let mut index = self.load_index().await?;
        index.conversations.retain(|m| m.id != id);
        self.save_index(&index).await
    }

    pub async fn remove_all(&self) -> Result<(), ConvoError> {
        let _guard = self.lock.lock().await;
        tracing::info!("Deleting all conversations in {}", self.base_dir.display());
        let index = self.load_index().await?;
        for meta in &index.conversations {
            let path = self.conversation_path(meta.id);
            if fs::try_exists(&path).await? {
                fs::remove_file(&path).await?;
            }
        }
        self.save_index(&ConversationIndex::default()).await
    }
}

#[async_trait::async_trait]
impl ChatStorage for JsonFileStore {
    async fn load(&self, id: Uuid) -> Result<Conversation, ConvoError> {
        let _guard = self.lock.lock().await;
        let path = self.conversation_path(id);
        if !fs::try_exists(&path).await? {
            return Err(ConvoError::NotFound(id));
        }
        let contents = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn save(&self, conversation: Conversation) -> Result<(), ConvoError> {
        let _guard = self.lock.lock().await;
        let contents = serde_json::to_string_pretty(&conversation)?;
        self.write_atomic(self.conversation_path(conversation.id()), contents)
            .await?;

        let mut index = self.load_index().await?;
        index.conversations.retain(|m| m.id != conversation.id());
        index.conversations.push(ConversationMetadata::from(&conversation));
        index.sort();
        self.save_index(&index).await?;

        tracing::debug!(id = %conversation.id(), "Saved conversation snapshot");
        Ok(())
    }
}
