//! Model service seams: embedding and generative text.
//!
//! The engine only sees these traits; `openai::OpenAI` implements both over HTTP,
//! `Disabled` stands in when no API key is configured.

use async_trait::async_trait;

use crate::error::ServiceError;

/// Dimension of every stored embedding.
pub const EMBEDDING_DIM: usize = 768;

#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

#[async_trait]
pub trait Generator: Send + Sync {
  /// Run one JSON-mode completion and return the raw response text.
  async fn generate(&self, system: &str, prompt: &str) -> Result<String, ServiceError>;
}

/// Placeholder for both services when the process runs without credentials.
/// Every call fails with `Unavailable`, which the pipeline degrades around.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disabled;

#[async_trait]
impl Embedder for Disabled {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
    Err(ServiceError::Unavailable("embedding service (OPENAI_API_KEY not set)".into()))
  }
}

#[async_trait]
impl Generator for Disabled {
  async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, ServiceError> {
    Err(ServiceError::Unavailable("generative service (OPENAI_API_KEY not set)".into()))
  }
}
