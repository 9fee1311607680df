//! Relational and vector store seams.
//!
//! Implementations return rows in insertion order. `memory::MemoryStore` backs
//! every trait for the standalone service and for tests.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{BankQuestion, NewBankQuestion, NewScopedQuestion, ScopedQuestion, TopicNode};
use crate::error::ServiceError;

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait TopicStore: Send + Sync {
  async fn topic(&self, id: &str) -> Result<Option<TopicNode>, ServiceError>;
  async fn mastery_level(&self, learner_id: &str, topic_id: &str) -> Result<Option<u8>, ServiceError>;
}

/// Canonical question bank.
#[async_trait]
pub trait BankStore: Send + Sync {
  async fn insert_bank(&self, rows: Vec<NewBankQuestion>) -> Result<Vec<BankQuestion>, ServiceError>;
  /// Store the embedding and flip the row to `completed`.
  async fn set_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<(), ServiceError>;
  async fn mark_embedding_failed(&self, id: Uuid) -> Result<(), ServiceError>;
  async fn failed_embeddings(&self, limit: usize) -> Result<Vec<BankQuestion>, ServiceError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
  /// Nearest bank rows with cosine similarity >= `min_similarity`, closest first,
  /// paired with their cosine distance.
  async fn search(
    &self,
    query: &[f32],
    min_similarity: f32,
    max_results: usize,
  ) -> Result<Vec<(BankQuestion, f32)>, ServiceError>;
}

/// Per-topic working sets.
#[async_trait]
pub trait ScopedStore: Send + Sync {
  async fn list_for_topic(&self, topic_id: &str) -> Result<Vec<ScopedQuestion>, ServiceError>;
  async fn insert_scoped(&self, rows: Vec<NewScopedQuestion>) -> Result<Vec<ScopedQuestion>, ServiceError>;
  /// Rows without a canonical link, oldest first, leaving out `skip`.
  async fn unlinked(&self, limit: usize, skip: &HashSet<Uuid>) -> Result<Vec<ScopedQuestion>, ServiceError>;
  async fn link_canonical(&self, id: Uuid, bank_id: Uuid) -> Result<(), ServiceError>;
}
