//! Language-model and embedding backends.
//!
//! Two capability traits sit at this seam: [`LanguageModel`] for prompt-driven
//! text generation and [`Embedder`] for turning text into vectors. Both are
//! plain HTTP clients over reqwest; the pipeline and the index only ever see
//! the traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, ConfigError};

/// Default request timeout for generation and embedding calls.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("backend returned no usable content")]
    EmptyResponse,
    #[error("unsupported backend: {0}")]
    Unsupported(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Prompt-driven text generation: one system instruction, one user message,
/// one prose response.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Model identifier, for logging.
    fn model_id(&self) -> &str;
}

/// Text-to-vector embedding. The same handle must be used at index time and
/// query time; mixing embedding models silently corrupts ranking.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Surface HTTP-level failures as typed API errors with the backend's own
/// message where one is present.
async fn check_status(resp: reqwest::Response) -> Result<Value, LlmError> {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await?;
    if status >= 400 {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::Api { status, message });
    }
    Ok(body)
}

fn parse_chat_content(body: &Value) -> Result<String, LlmError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .ok_or(LlmError::EmptyResponse)
}

fn parse_embedding(body: &Value) -> Result<Vec<f32>, LlmError> {
    let values = body["data"][0]["embedding"]
        .as_array()
        .ok_or(LlmError::EmptyResponse)?;
    let vector: Vec<f32> = values
        .iter()
        .filter_map(|v| v.as_f64())
        .map(|v| v as f32)
        .collect();
    if vector.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(vector)
}

/// Client for any OpenAI-compatible endpoint (OpenAI itself, Ollama, Groq,
/// vLLM, …). Implements both generation and embeddings, since these servers
/// expose `/v1/chat/completions` and `/v1/embeddings` side by side.
pub struct OpenAiCompatibleModel {
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            api_key,
            client: http_client(timeout)?,
        })
    }

    /// Handle used purely for embeddings.
    pub fn embeddings(
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let embedding_model = embedding_model.into();
        Self::new(
            base_url,
            embedding_model.clone(),
            embedding_model,
            api_key,
            timeout,
        )
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": DEFAULT_MAX_TOKENS,
            "temperature": DEFAULT_TEMPERATURE,
        });
        let resp = self.auth(self.client.post(&url)).json(&body).send().await?;
        let json = check_status(resp).await?;
        parse_chat_content(&json)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": &self.embedding_model,
            "input": [text],
        });
        let resp = self.auth(self.client.post(&url)).json(&body).send().await?;
        let json = check_status(resp).await?;
        parse_embedding(&json)
    }
}

/// Client for the Anthropic Messages API (claude-*). Generation only;
/// Anthropic does not offer an embeddings endpoint.
pub struct AnthropicModel {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicModel {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": &self.model,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "max_tokens": DEFAULT_MAX_TOKENS,
        });
        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;
        let json = check_status(resp).await?;
        json["content"]
            .as_array()
            .and_then(|blocks| blocks.first())
            .and_then(|b| b["text"].as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// One generation handle plus one embedding handle, built once at startup and
/// shared by reference everywhere.
#[derive(Clone)]
pub struct ModelHandles {
    pub language: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
}

impl ModelHandles {
    /// Build both handles from configuration. The embedder always speaks to
    /// an OpenAI-compatible endpoint, whichever provider generates text.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        let language: Arc<dyn LanguageModel> = match config.llm.provider.as_str() {
            "openai" => Arc::new(OpenAiCompatibleModel::new(
                &config.llm.base_url,
                &config.llm.model,
                &config.embedding.model,
                config.api.openai_key.clone(),
                timeout,
            )?),
            "anthropic" => {
                let key = config
                    .api
                    .anthropic_key
                    .clone()
                    .ok_or_else(|| ConfigError::MissingApiKey("anthropic".to_string()))?;
                Arc::new(AnthropicModel::new(key, &config.llm.model, timeout)?)
            }
            other => return Err(LlmError::Unsupported(other.to_string())),
        };
        Ok(Self {
            language,
            embedder: Self::embedder_from_config(config)?,
        })
    }

    /// Just the embedding handle, for flows that never generate text.
    pub fn embedder_from_config(config: &Config) -> Result<Arc<dyn Embedder>, LlmError> {
        Ok(Arc::new(OpenAiCompatibleModel::embeddings(
            &config.embedding.base_url,
            &config.embedding.model,
            config.api.openai_key.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )?))
    }
}
