use convo_core::config::StorageBackend;
use convo_core::{ChatModel, ConvoError, MemoryStore, Settings};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_settings_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut settings = Settings::default();
    settings.api.model = ChatModel::Custom("gpt-4o-mini".to_string());
    settings.api.temperature = 0.3;
    settings.api.max_tokens = Some(512);
    settings.api.system_prompt = Some("Be brief".to_string());
    settings.history.token_limit = 2000;
    settings.storage.backend = StorageBackend::Memory;

    settings.save_to(&path).unwrap();
    let loaded = Settings::load_from(&path).unwrap();

    assert_eq!(loaded.api.model, ChatModel::Custom("gpt-4o-mini".to_string()));
    assert_eq!(loaded.api.temperature, 0.3);
    assert_eq!(loaded.api.max_tokens, Some(512));
    assert_eq!(loaded.api.system_prompt.as_deref(), Some("Be brief"));
    assert_eq!(loaded.history.token_limit, 2000);
    assert_eq!(loaded.history.chars_per_token, 4);
    assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    assert_eq!(loaded.request_options().max_tokens, Some(512));
    assert_eq!(loaded.truncator().token_limit(), 2000);
}

#[test]
fn test_invalid_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[api\nmodel = ").unwrap();

    assert!(matches!(Settings::load_from(&path), Err(ConvoError::Config(_))));
}

#[test]
fn test_api_key_comes_from_named_variable() {
    let mut settings = Settings::default();
    settings.api.api_key_env = "CONVO_TEST_KEY_PRESENT".to_string();
    std::env::set_var("CONVO_TEST_KEY_PRESENT", "sk-from-env");
    assert_eq!(settings.api_key().as_deref(), Some("sk-from-env"));

    settings.api.api_key_env = "CONVO_TEST_KEY_EMPTY".to_string();
    std::env::set_var("CONVO_TEST_KEY_EMPTY", "");
    assert_eq!(settings.api_key(), None);
}

#[test]
fn test_build_engine_requires_api_key() {
    let mut settings = Settings::default();
    settings.api.api_key_env = "CONVO_TEST_KEY_UNSET".to_string();
    std::env::remove_var("CONVO_TEST_KEY_UNSET");

    let result = settings.build_engine(Arc::new(MemoryStore::new()));
    assert!(matches!(result, Err(ConvoError::Config(msg)) if msg.contains("CONVO_TEST_KEY_UNSET")));
}

#[test]
fn test_build_engine_applies_settings() {
    let mut settings = Settings::default();
    settings.api.api_key_env = "CONVO_TEST_KEY_ENGINE".to_string();
    settings.api.model = ChatModel::Gpt4;
    settings.api.temperature = 9.0;
    settings.api.system_prompt = Some("You are a pirate".to_string());
    std::env::set_var("CONVO_TEST_KEY_ENGINE", "sk-engine");

    let engine = settings.build_engine(Arc::new(MemoryStore::new())).unwrap();

    assert_eq!(engine.model(), &ChatModel::Gpt4);
    assert_eq!(engine.temperature(), 2.0);
    assert_eq!(engine.system_message().content(), "You are a pirate");
    assert!(engine.has_storage());
}

#[test]
fn test_from_settings_with_memory_backend() {
    let mut settings = Settings::default();
    settings.api.api_key_env = "CONVO_TEST_KEY_FROM_SETTINGS".to_string();
    settings.storage.backend = StorageBackend::Memory;
    std::env::set_var("CONVO_TEST_KEY_FROM_SETTINGS", "sk-settings");

    let engine = convo_core::ChatEngine::from_settings(&settings).unwrap();
    assert!(engine.has_storage());
    assert_eq!(engine.model(), &ChatModel::Gpt35Turbo);
}

#[test]
fn test_file_backend_uses_configured_dir() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.storage.dir = Some(dir.path().join("chats"));

    let store = settings.build_file_store().unwrap();
    assert_eq!(store.base_dir(), dir.path().join("chats"));
    assert!(dir.path().join("chats").is_dir());
}
