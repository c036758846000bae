use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{HttpTransport, RequestOptions};
use crate::constants::{defaults, endpoints};
use crate::engine::ChatEngine;
use crate::error::ConvoError;
use crate::model::ChatModel;
use crate::storage::{ChatStorage, JsonFileStore, MemoryStore};
use crate::truncation::HistoryTruncator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub model: ChatModel,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    pub token_limit: usize,
    pub chars_per_token: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Overrides the default conversations directory for the file backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiSettings {
                base_url: endpoints::OPENAI_BASE_URL.to_string(),
                api_key_env: defaults::API_KEY_ENV.to_string(),
                model: ChatModel::default(),
                temperature: defaults::TEMPERATURE,
                max_tokens: None,
                system_prompt: None,
            },
            history: HistorySettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            token_limit: defaults::TOKEN_LIMIT,
            chars_per_token: defaults::CHARS_PER_TOKEN,
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convo")
            .join("config.toml")
    }

    /// Settings from the default path, or defaults when the file is missing or invalid.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConvoError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConvoError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<(), ConvoError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConvoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConvoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the API key from the environment variable named in settings.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn truncator(&self) -> HistoryTruncator {
        HistoryTruncator::new(self.history.token_limit, self.history.chars_per_token)
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            max_tokens: self.api.max_tokens,
            ..Default::default()
        }
    }

    /// Build the configured storage backend.
    pub fn build_storage(&self) -> Result<Arc<dyn ChatStorage>, ConvoError> {
        match self.storage.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StorageBackend::File => Ok(Arc::new(self.build_file_store()?)),
        }
    }

    pub fn build_file_store(&self) -> Result<JsonFileStore, ConvoError> {
        match &self.storage.dir {
            Some(dir) => JsonFileStore::with_dir(dir.clone()),
            None => JsonFileStore::new(),
        }
    }

    /// Build an engine from the current settings with the given storage.
    pub fn build_engine(&self, storage: Arc<dyn ChatStorage>) -> Result<ChatEngine, ConvoError> {
        let api_key = self.api_key().ok_or_else(|| {
            ConvoError::Config(format!(
                "API key not found; set the {} environment variable",
                self.api.api_key_env
            ))
        })?;
        let transport = HttpTransport::new(api_key).with_base_url(self.api.base_url.clone());

        let mut engine = ChatEngine::with_transport(Arc::new(transport))
            .with_model(self.api.model.clone())
            .with_temperature(self.api.temperature)
            .with_truncator(self.truncator())
            .with_request_options(self.request_options())
            .with_storage(storage);
        if let Some(prompt) = &self.api.system_prompt {
            engine = engine.with_system_prompt(prompt.clone());
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_section_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[api]
base_url = "http://localhost:8080"
api_key_env = "LOCAL_KEY"
model = "gpt-4"
temperature = 0.2
"#,
        )
        .unwrap();

        assert_eq!(settings.api.model, ChatModel::Gpt4);
        assert_eq!(settings.history.token_limit, 4000);
        assert_eq!(settings.history.chars_per_token, 4);
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert!(settings.storage.dir.is_none());
    }
}
