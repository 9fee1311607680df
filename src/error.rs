//! Error types for the sourcing engine and its collaborators.
//!
//! Three layers:
//!   - `ServiceError`: a collaborator (store, embedding or generative service) failed.
//!   - `PayloadError`: generated text could not be read as a question batch.
//!   - `SourcingError`: the request itself must abort (the only errors a caller ever sees).

use thiserror::Error;

/// Failure of an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("Service not configured: {0}")]
  Unavailable(String),

  #[error("Transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("{service} HTTP {status}: {message}")]
  Status { service: &'static str, status: u16, message: String },

  #[error("Unexpected response: {0}")]
  Decode(String),

  #[error("Store error: {0}")]
  Store(String),
}

/// Generated text that does not match the expected batch shapes.
#[derive(Debug, Error)]
pub enum PayloadError {
  #[error("Invalid JSON: {0}")]
  InvalidJson(#[from] serde_json::Error),

  #[error("Schema mismatch: {0}")]
  SchemaMismatch(String),
}

/// Fatal request errors.
#[derive(Debug, Error)]
pub enum SourcingError {
  #[error("Topic not found: {0}")]
  TopicNotFound(String),

  #[error("Failed to persist the scoped question set: {0}")]
  Bridge(#[source] ServiceError),

  #[error("Store unavailable: {0}")]
  Store(#[from] ServiceError),
}
