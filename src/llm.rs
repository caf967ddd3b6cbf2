//! Language-model providers.
//!
//! The pipeline talks to chat models only through [`ChatModel`]: one
//! system prompt, the prior conversation, and the new user message in,
//! plain text out. [`OpenAIChat`] implements it against an
//! OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::models::{ChatMessage, ModelName};
use crate::provider::{build_client, malformed, post_json_with_retry};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

/// One fully rendered model call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Prior turns, oldest first.
    pub history: Vec<ChatMessage>,
    pub user_message: String,
}

impl CompletionRequest {
    /// Flatten into the wire message list: system, history, then the user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.user_message.clone()));
        messages
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a single completion and return the model's raw text.
    async fn complete(&self, model: ModelName, request: &CompletionRequest) -> Result<String>;
}

/// Instantiate the chat model selected by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => Err(RagError::Config(format!("Unknown llm provider: {}", other))),
    }
}

/// Chat model used when `llm.provider = "disabled"`. Every call fails.
pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    async fn complete(&self, _model: ModelName, _request: &CompletionRequest) -> Result<String> {
        Err(RagError::provider(
            "llm",
            "llm provider is disabled; set [llm] provider in the config",
            false,
        ))
    }
}

/// OpenAI chat-completions client.
pub struct OpenAIChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    temperature: f32,
}

impl OpenAIChat {
    /// Create the client, reading the key from `OPENAI_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client("openai", config.timeout_secs)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, model: ModelName, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model.as_str(),
            "messages": request.messages(),
            "temperature": self.temperature,
            "stream": false,
        });

        let payload = post_json_with_retry("openai", 0, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| malformed("openai", "missing choices[0].message.content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> LlmConfig {
        LlmConfig {
            provider: "openai".to_string(),
            url: Some(url.to_string()),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "Be brief.".to_string(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            user_message: "What is Rust?".to_string(),
        }
    }

    #[test]
    fn messages_are_system_history_user() {
        let messages = request().messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::system("Be brief."));
        assert_eq!(messages[2], ChatMessage::assistant("hello"));
        assert_eq!(messages[3], ChatMessage::user("What is Rust?"));
    }

    #[tokio::test]
    async fn disabled_chat_fails() {
        let llm = create_chat_model(&LlmConfig::default()).unwrap();
        let err = llm
            .complete(ModelName::Gpt4oMini, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn openai_chat_sends_model_and_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4.1-mini",
                "temperature": 0.0,
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "What is Rust?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "A language."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let llm = OpenAIChat::with_api_key(&config(&server.uri()), "test-key").unwrap();
        let answer = llm
            .complete(ModelName::Gpt41Mini, &request())
            .await
            .unwrap();
        assert_eq!(answer, "A language.");
    }

    #[tokio::test]
    async fn openai_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let llm = OpenAIChat::with_api_key(&config(&server.uri()), "test-key").unwrap();
        let err = llm
            .complete(ModelName::Gpt4o, &request())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let llm = OpenAIChat::with_api_key(&config(&server.uri()), "test-key").unwrap();
        let err = llm
            .complete(ModelName::Gpt4o, &request())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("malformed"));
    }
}
