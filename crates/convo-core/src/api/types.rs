use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{ChatModel, Message, Role};

/// A message as it travels over the wire: role and content only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role(),
            content: message.content().to_string(),
        }
    }
}

/// Optional sampling parameters forwarded with every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<u32, i32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: ChatModel,
    pub temperature: f64,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(flatten)]
    pub options: RequestOptions,
}

impl ChatRequest {
    pub fn new(
        model: ChatModel,
        temperature: f64,
        messages: &[Message],
        stream: bool,
        options: RequestOptions,
    ) -> Self {
        Self {
            model,
            temperature,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream,
            options,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Text of the first choice, empty when the server sent none.
    pub fn into_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorRoot {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Human-readable message for a failed response body: the server's `error.message`
/// when it decodes, the trimmed raw body otherwise.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorRoot>(body) {
        Ok(root) => root.error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest::new(
            ChatModel::Gpt35Turbo,
            0.8,
            &[
                Message::system("You are a chatbot"),
                Message::user("tell me about chatbot history").into_example(),
            ],
            true,
            RequestOptions {
                max_tokens: Some(256),
                ..Default::default()
            },
        );

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-3.5-turbo",
                "temperature": 0.8,
                "messages": [
                    {"role": "system", "content": "You are a chatbot"},
                    {"role": "user", "content": "tell me about chatbot history"}
                ],
                "stream": true,
                "max_tokens": 256
            })
        );
    }

    #[test]
    fn test_completion_text() {
        let body = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });
        let response: CompletionResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.usage.as_ref().and_then(|u| u.total_tokens), Some(4));
        assert_eq!(response.into_text(), "hello");

        let empty: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.into_text(), "");
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Invalid API key");
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
    }
}
