//! Chat-completion client.
//!
//! [`ChatClient`] is the seam between the pipeline and the remote model: one
//! request in, one completion string out. [`OpenAiClient`] speaks the
//! OpenAI-compatible `/v1/chat/completions` protocol over `reqwest`.
//!
//! Failures are never retried here. Transport errors and non-2xx statuses
//! become [`Error::RemoteCall`]; a 2xx body without `choices[0].message.content`
//! becomes [`Error::MalformedResponse`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Everything needed for one completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Remote model that turns a prompt into a text completion.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Send one request and return the raw completion text.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
///
/// Requires the `OPENAI_API_KEY` environment variable unless constructed
/// with [`OpenAiClient::with_api_key`].
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAiClient {
    /// Build a client from `[llm]` settings and `OPENAI_API_KEY`.
    pub fn from_env(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            config: config.clone(),
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = CompletionBody {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.user.clone(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::RemoteCall(format!(
                "{} returned {}: {}",
                self.config.api_url, status, body_text
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("completion envelope: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::MalformedResponse("completion has no message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        let config = LlmConfig {
            api_url: format!("{}/v1/chat/completions", server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        };
        OpenAiClient::with_api_key(&config, "test-key").unwrap()
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "response_format": {"type": "json_object"},
                "max_tokens": 4096
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"events\": []}"}}]
            })))
            .mount(&server)
            .await;

        let out = client_for(&server)
            .complete(&ChatRequest::new("sys", "user"))
            .await
            .unwrap();
        assert_eq!(out, "{\"events\": []}");
    }

    #[tokio::test]
    async fn http_error_is_remote_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&ChatRequest::new("sys", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteCall(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&ChatRequest::new("sys", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_remote_call() {
        let config = LlmConfig {
            api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = OpenAiClient::with_api_key(&config, "k").unwrap();
        let err = client
            .complete(&ChatRequest::new("sys", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteCall(_)));
    }
}
