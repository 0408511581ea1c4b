//! Completion client
//!
//! [`TextGenerator`] is the seam between the creator and the language model.
//! [`OpenAiClient`] talks to an OpenAI-compatible chat-completion endpoint.
//! One request per call; nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::AiAutomationConfig;
use crate::config_flow::ApiKeyValidator;
use crate::error::{GeneratorError, GeneratorResult};
use crate::prompt::ChatMessage;

/// One chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Prompt in, text out
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Raw text of the first completion
    async fn generate(&self, request: &CompletionRequest) -> GeneratorResult<String>;

    /// Whether credentials are present
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<Model>,
}

#[derive(Debug, Deserialize)]
struct Model {
    id: String,
}

/// Client for the OpenAI chat-completion API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> GeneratorResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &AiAutomationConfig) -> GeneratorResult<Self> {
        Self::new(
            config.base_url.clone(),
            config.openai_api_key.clone(),
            config.timeout(),
        )
    }

    fn api_key(&self) -> GeneratorResult<&str> {
        self.api_key.as_deref().ok_or(GeneratorError::NotConfigured)
    }

    async fn check_status(response: reqwest::Response) -> GeneratorResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Completion API returned HTTP {}", status.as_u16());
        Err(GeneratorError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Ids of the models the key can use
    pub async fn list_models(&self) -> GeneratorResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(self.api_key()?)
            .send()
            .await?;
        let text = Self::check_status(response).await?.text().await?;
        let models: ModelList = serde_json::from_str(&text)
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &CompletionRequest) -> GeneratorResult<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(request)
            .send()
            .await?;
        let text = Self::check_status(response).await?.text().await?;

        let completion: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GeneratorError::EmptyResponse)?;

        debug!("Completion returned {} characters", content.len());
        Ok(content)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Validates keys by listing models with them
#[derive(Debug, Clone)]
pub struct OpenAiKeyValidator {
    base_url: String,
    timeout: Option<Duration>,
}

impl OpenAiKeyValidator {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AiAutomationConfig) -> Self {
        Self::new(config.base_url.clone(), config.timeout())
    }
}

#[async_trait]
impl ApiKeyValidator for OpenAiKeyValidator {
    async fn validate_api_key(&self, api_key: &str) -> bool {
        let client =
            match OpenAiClient::new(self.base_url.clone(), Some(api_key.to_string()), self.timeout) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Failed to validate OpenAI API key: {}", e);
                    return false;
                }
            };
        match client.list_models().await {
            Ok(models) => {
                debug!("API key can use {} models", models.len());
                true
            }
            Err(e) => {
                warn!("Failed to validate OpenAI API key: {}", e);
                false
            }
        }
    }
}
