use serde::{Deserialize, Serialize};

/// Model identifier sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatModel {
    #[default]
    Gpt35Turbo,
    Gpt4,
    Custom(String),
}

impl ChatModel {
    pub fn id(&self) -> &str {
        match self {
            ChatModel::Gpt35Turbo => "gpt-3.5-turbo",
            ChatModel::Gpt4 => "gpt-4",
            ChatModel::Custom(id) => id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            ChatModel::Gpt35Turbo => "GPT-3.5 Turbo",
            ChatModel::Gpt4 => "GPT-4",
            ChatModel::Custom(id) => id,
        }
    }
}

impl From<String> for ChatModel {
    fn from(id: String) -> Self {
        match id.as_str() {
            "gpt-3.5-turbo" => ChatModel::Gpt35Turbo,
            "gpt-4" => ChatModel::Gpt4,
            _ => ChatModel::Custom(id),
        }
    }
}

impl From<&str> for ChatModel {
    fn from(id: &str) -> Self {
        ChatModel::from(id.to_string())
    }
}

impl From<ChatModel> for String {
    fn from(model: ChatModel) -> Self {
        model.id().to_string()
    }
}

impl std::fmt::Display for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids_round_trip() {
        assert_eq!(ChatModel::from("gpt-4"), ChatModel::Gpt4);
        assert_eq!(ChatModel::default().id(), "gpt-3.5-turbo");
        assert_eq!(ChatModel::Gpt35Turbo.display_name(), "GPT-3.5 Turbo");

        let custom = ChatModel::from("gpt-4o-mini");
        assert_eq!(custom, ChatModel::Custom("gpt-4o-mini".into()));
        assert_eq!(serde_json::to_string(&custom).unwrap(), "\"gpt-4o-mini\"");
    }
}
