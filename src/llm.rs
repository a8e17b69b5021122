//! Minimal client for an OpenAI-compatible chat-completion endpoint (Ollama, vLLM, OpenAI).
//!
//! `ChatBackend` is the transport seam; `ResponseGenerator` layers generation
//! defaults and response decoding (plain text or leniently parsed JSON) on top.
//! Calls are instrumented and log model names, latencies and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::LlmSettings;
use crate::error::GenerationError;
use crate::jsonfix::parse_lenient;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
  #[default]
  Json,
  Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { System, User, Assistant }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
  pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
}

/// Process-wide generation parameters. Loaded from `[generation]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
  pub model: String,
  pub format: ResponseFormat,
  pub temperature: f32,
  pub max_tokens: u32,
  pub top_p: f32,
  pub frequency_penalty: f32,
  pub presence_penalty: f32,
  pub num_predict: u32,
  pub num_ctx: u32,
  pub repeat_penalty: f32,
  pub top_k: u32,
}

impl Default for GenerationOptions {
  fn default() -> Self {
    Self {
      model: "qwen2.5:3b".into(),
      format: ResponseFormat::Json,
      temperature: 0.2,
      max_tokens: 1500,
      top_p: 0.95,
      frequency_penalty: 0.2,
      presence_penalty: 0.1,
      num_predict: 1500,
      num_ctx: 2048,
      repeat_penalty: 1.15,
      top_k: 30,
    }
  }
}

/// Per-call overrides; `None` keeps the process default.
#[derive(Clone, Debug, Default)]
pub struct GenerationOverrides {
  pub model: Option<String>,
  pub format: Option<ResponseFormat>,
  pub temperature: Option<f32>,
  pub max_tokens: Option<u32>,
  pub top_p: Option<f32>,
  pub frequency_penalty: Option<f32>,
  pub presence_penalty: Option<f32>,
}

impl GenerationOverrides {
  pub fn text() -> Self { Self { format: Some(ResponseFormat::Text), ..Default::default() } }
  pub fn json() -> Self { Self { format: Some(ResponseFormat::Json), ..Default::default() } }

  pub fn with_temperature(mut self, t: f32) -> Self {
    self.temperature = Some(t);
    self
  }

  pub fn resolve(&self, base: &GenerationOptions) -> GenerationOptions {
    let mut o = base.clone();
    if let Some(m) = &self.model { o.model = m.clone(); }
    if let Some(f) = self.format { o.format = f; }
    if let Some(t) = self.temperature { o.temperature = t; }
    if let Some(n) = self.max_tokens {
      o.max_tokens = n;
      o.num_predict = n;
    }
    if let Some(p) = self.top_p { o.top_p = p; }
    if let Some(p) = self.frequency_penalty { o.frequency_penalty = p; }
    if let Some(p) = self.presence_penalty { o.presence_penalty = p; }
    o
  }
}

/// One chat-completion round trip returning the raw assistant text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
  async fn complete(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
  pub client: reqwest::Client,
  pub base_url: String,
  api_key: Option<String>,
}

impl OpenAiCompatClient {
  pub fn new(settings: &LlmSettings) -> Result<Self, GenerationError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .map_err(|e| GenerationError::Transport(e.to_string()))?;
    Ok(Self {
      client,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
    })
  }
}

#[async_trait]
impl ChatBackend for OpenAiCompatClient {
  #[instrument(level = "info", skip(self, messages, options), fields(model = %options.model, format = ?options.format, n_messages = messages.len()))]
  async fn complete(&self, messages: &[ChatMessage], options: &GenerationOptions) -> Result<String, GenerationError> {
    let url = format!("{}/v1/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: &options.model,
      messages,
      format: options.format,
      stream: false,
      temperature: options.temperature,
      max_tokens: options.max_tokens,
      top_p: options.top_p,
      frequency_penalty: options.frequency_penalty,
      presence_penalty: options.presence_penalty,
      num_predict: options.num_predict,
      num_ctx: options.num_ctx,
      repeat_penalty: options.repeat_penalty,
      top_k: options.top_k,
    };

    let start = Instant::now();
    let mut builder = self.client.post(&url)
      .header(USER_AGENT, "codecheck-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    if let Some(key) = &self.api_key {
      builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
    }
    let res = builder.json(&req).send().await
      .map_err(|e| GenerationError::Transport(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      if let Some(msg) = extract_api_error(&body) {
        warn!(status = status.as_u16(), error = %msg, "LLM endpoint returned an error body");
      }
      return Err(GenerationError::Http {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
      });
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| GenerationError::UnexpectedShape(format!("invalid completion body: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();
    info!(elapsed_ms = start.elapsed().as_millis() as u64, response_len = text.len(), "LLM completion received");
    Ok(text)
  }
}

/// Decoded model output plus the raw completion it came from.
#[derive(Clone, Debug)]
pub struct Generated<T> {
  pub data: T,
  pub raw_text: String,
}

/// Chat backend plus default options; the single entry point for LLM calls.
#[derive(Clone)]
pub struct ResponseGenerator {
  backend: Arc<dyn ChatBackend>,
  defaults: GenerationOptions,
}

impl ResponseGenerator {
  pub fn new(backend: Arc<dyn ChatBackend>, defaults: GenerationOptions) -> Self {
    Self { backend, defaults }
  }

  /// Run one completion and decode it according to the resolved format.
  /// `format=text` only decodes into string-like targets.
  pub async fn generate<T: DeserializeOwned>(
    &self,
    messages: &[ChatMessage],
    overrides: &GenerationOverrides,
  ) -> Result<Generated<T>, GenerationError> {
    let options = overrides.resolve(&self.defaults);
    let raw_text = self.backend.complete(messages, &options).await?;
    if raw_text.trim().is_empty() {
      return Err(GenerationError::EmptyCompletion);
    }

    let data = match options.format {
      ResponseFormat::Json => parse_lenient::<T>(&raw_text)?,
      ResponseFormat::Text => serde_json::from_value::<T>(serde_json::Value::String(raw_text.clone()))
        .map_err(|e| GenerationError::UnexpectedShape(format!("text output cannot be decoded: {e}")))?,
    };
    debug!(target: "codecheck_backend", format = ?options.format, raw_len = raw_text.len(), "Generation decoded");
    Ok(Generated { data, raw_text })
  }

  /// Plain-text completion, returned unmodified.
  pub async fn generate_text(&self, messages: &[ChatMessage], overrides: GenerationOverrides) -> Result<String, GenerationError> {
    let overrides = GenerationOverrides { format: Some(ResponseFormat::Text), ..overrides };
    Ok(self.generate::<String>(messages, &overrides).await?.data)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
  model: &'a str,
  messages: &'a [ChatMessage],
  format: ResponseFormat,
  stream: bool,
  temperature: f32,
  max_tokens: u32,
  top_p: f32,
  frequency_penalty: f32,
  presence_penalty: f32,
  num_predict: u32,
  num_ctx: u32,
  repeat_penalty: f32,
  top_k: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
