//! Minimal OpenAI-compatible client for the two model services the engine uses.
//!
//! We call chat.completions in strict JSON-object mode (question generation) and
//! /embeddings with a fixed dimension (retrieval, ingestion, maintenance jobs).
//! Calls are instrumented and log model names, latencies and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::provider::{Embedder, Generator, EMBEDDING_DIM};

const CLIENT_AGENT: &str = "qsource/0.1";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub question_model: String,
  pub embedding_model: String,
  pub temperature: f32,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let question_model =
      std::env::var("OPENAI_QUESTION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let embedding_model =
      std::env::var("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".into());

    // Generation batches are long; give them room.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(90))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, question_model, embedding_model, temperature: 0.7 })
  }

  async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response, ServiceError> {
    let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
    let res = self.client.post(&url)
      .header(USER_AGENT, CLIENT_AGENT)
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(body).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(ServiceError::Status { service: "OpenAI", status, message });
    }
    Ok(res)
  }

  /// JSON-object chat completion; returns the raw message content.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.question_model, prompt_len = user.len()))]
  async fn chat_json(&self, system: &str, user: &str) -> Result<String, ServiceError> {
    let start = Instant::now();
    let req = ChatCompletionRequest {
      model: self.question_model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let body: ChatCompletionResponse = self.post("/chat/completions", &req).await?
      .json().await?;
    if let Some(usage) = &body.usage {
      info!(target: "qsource", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| ServiceError::Decode("chat completion without content".into()))?;
    info!(target: "qsource", elapsed = ?start.elapsed(), response_len = text.len(), "Chat completion done");
    Ok(text)
  }

  #[instrument(level = "debug", skip(self, text), fields(model = %self.embedding_model, text_len = text.len()))]
  async fn embedding(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
    let req = EmbeddingRequest {
      model: self.embedding_model.clone(),
      input: text.to_string(),
      dimensions: EMBEDDING_DIM,
    };
    let body: EmbeddingResponse = self.post("/embeddings", &req).await?
      .json().await?;
    let vector = body.data.into_iter().next()
      .map(|d| d.embedding)
      .ok_or_else(|| ServiceError::Decode("embedding response without data".into()))?;
    if vector.len() != EMBEDDING_DIM {
      return Err(ServiceError::Decode(format!(
        "embedding has {} dimensions, expected {}",
        vector.len(),
        EMBEDDING_DIM
      )));
    }
    Ok(vector)
  }
}

#[async_trait]
impl Generator for OpenAI {
  async fn generate(&self, system: &str, prompt: &str) -> Result<String, ServiceError> {
    self.chat_json(system, prompt).await
  }
}

#[async_trait]
impl Embedder for OpenAI {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
    self.embedding(text).await
  }
}

// --- Wire types ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
  r#type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct EmbeddingRequest {
  model: String,
  input: String,
  dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

/// Try to extract a clean error message from an OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
