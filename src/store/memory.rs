//! In-memory store backing every store trait.
//!
//! Holds:
//!   - the topic catalog and learner mastery levels
//!   - the canonical bank (insertion ordered) with brute-force cosine search
//!   - the per-topic scoped working sets

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
  BankQuestion, EmbeddingStatus, NewBankQuestion, NewScopedQuestion, ScopedQuestion, TopicNode,
};
use crate::error::ServiceError;
use crate::store::{BankStore, ScopedStore, TopicStore, VectorStore};

#[derive(Default)]
pub struct MemoryStore {
  topics: RwLock<HashMap<String, TopicNode>>,
  mastery: RwLock<HashMap<(String, String), u8>>,
  bank: RwLock<Vec<BankQuestion>>,
  scoped: RwLock<Vec<ScopedQuestion>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub async fn put_topic(&self, node: TopicNode) {
    self.topics.write().await.insert(node.id.clone(), node);
  }

  pub async fn put_mastery(&self, learner_id: &str, topic_id: &str, level: u8) {
    self.mastery
      .write()
      .await
      .insert((learner_id.to_string(), topic_id.to_string()), level);
  }

  pub async fn bank_snapshot(&self) -> Vec<BankQuestion> {
    self.bank.read().await.clone()
  }

  pub async fn scoped_snapshot(&self) -> Vec<ScopedQuestion> {
    self.scoped.read().await.clone()
  }
}

/// 1 - cosine similarity; orthogonal or degenerate vectors give 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 1.0;
  }
  let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    na += x * x;
    nb += y * y;
  }
  if na == 0.0 || nb == 0.0 {
    return 1.0;
  }
  1.0 - dot / (na.sqrt() * nb.sqrt())
}

#[async_trait]
impl TopicStore for MemoryStore {
  async fn topic(&self, id: &str) -> Result<Option<TopicNode>, ServiceError> {
    Ok(self.topics.read().await.get(id).cloned())
  }

  async fn mastery_level(&self, learner_id: &str, topic_id: &str) -> Result<Option<u8>, ServiceError> {
    let key = (learner_id.to_string(), topic_id.to_string());
    Ok(self.mastery.read().await.get(&key).copied())
  }
}

#[async_trait]
impl BankStore for MemoryStore {
  #[instrument(level = "debug", skip_all, fields(rows = rows.len()))]
  async fn insert_bank(&self, rows: Vec<NewBankQuestion>) -> Result<Vec<BankQuestion>, ServiceError> {
    let inserted: Vec<BankQuestion> = rows
      .into_iter()
      .map(|row| {
        let embedding_status = if row.embedding.is_some() {
          EmbeddingStatus::Completed
        } else {
          EmbeddingStatus::Pending
        };
        BankQuestion {
          id: Uuid::new_v4(),
          statement: row.draft.statement,
          kind: row.draft.kind,
          difficulty: row.draft.difficulty,
          content: row.draft.content,
          commentary: row.draft.commentary,
          topics: row.topics,
          provenance: row.provenance,
          embedding: row.embedding,
          embedding_status,
        }
      })
      .collect();
    self.bank.write().await.extend(inserted.iter().cloned());
    Ok(inserted)
  }

  async fn set_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<(), ServiceError> {
    let mut bank = self.bank.write().await;
    let row = bank
      .iter_mut()
      .find(|q| q.id == id)
      .ok_or_else(|| ServiceError::Store(format!("bank row {id} not found")))?;
    row.embedding = Some(embedding);
    row.embedding_status = EmbeddingStatus::Completed;
    Ok(())
  }

  async fn mark_embedding_failed(&self, id: Uuid) -> Result<(), ServiceError> {
    let mut bank = self.bank.write().await;
    let row = bank
      .iter_mut()
      .find(|q| q.id == id)
      .ok_or_else(|| ServiceError::Store(format!("bank row {id} not found")))?;
    row.embedding_status = EmbeddingStatus::Failed;
    Ok(())
  }

  async fn failed_embeddings(&self, limit: usize) -> Result<Vec<BankQuestion>, ServiceError> {
    Ok(self.bank
      .read()
      .await
      .iter()
      .filter(|q| q.embedding_status == EmbeddingStatus::Failed)
      .take(limit)
      .cloned()
      .collect())
  }
}

#[async_trait]
impl VectorStore for MemoryStore {
  #[instrument(level = "debug", skip(self, query), fields(dim = query.len()))]
  async fn search(
    &self,
    query: &[f32],
    min_similarity: f32,
    max_results: usize,
  ) -> Result<Vec<(BankQuestion, f32)>, ServiceError> {
    let max_distance = 1.0 - min_similarity;
    let bank = self.bank.read().await;
    let mut hits: Vec<(BankQuestion, f32)> = bank
      .iter()
      .filter_map(|q| {
        let d = cosine_distance(query, q.embedding.as_deref()?);
        (d <= max_distance).then(|| (q.clone(), d))
      })
      .collect();
    hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(max_results);
    debug!(target: "sourcing", scanned = bank.len(), hits = hits.len(), "Vector search complete");
    Ok(hits)
  }
}

#[async_trait]
impl ScopedStore for MemoryStore {
  async fn list_for_topic(&self, topic_id: &str) -> Result<Vec<ScopedQuestion>, ServiceError> {
    Ok(self.scoped
      .read()
      .await
      .iter()
      .filter(|q| q.topic_id == topic_id)
      .cloned()
      .collect())
  }

  #[instrument(level = "debug", skip_all, fields(rows = rows.len()))]
  async fn insert_scoped(&self, rows: Vec<NewScopedQuestion>) -> Result<Vec<ScopedQuestion>, ServiceError> {
    let inserted: Vec<ScopedQuestion> = rows
      .into_iter()
      .map(|row| ScopedQuestion {
        id: Uuid::new_v4(),
        topic_id: row.topic_id,
        statement: row.draft.statement,
        kind: row.draft.kind,
        difficulty: row.draft.difficulty,
        content: row.draft.content,
        commentary: row.draft.commentary,
        reward: row.reward,
        original_question_id: row.original_question_id,
      })
      .collect();
    self.scoped.write().await.extend(inserted.iter().cloned());
    Ok(inserted)
  }

  async fn unlinked(&self, limit: usize, skip: &HashSet<Uuid>) -> Result<Vec<ScopedQuestion>, ServiceError> {
    Ok(self.scoped
      .read()
      .await
      .iter()
      .filter(|q| q.original_question_id.is_none() && !skip.contains(&q.id))
      .take(limit)
      .cloned()
      .collect())
  }

  async fn link_canonical(&self, id: Uuid, bank_id: Uuid) -> Result<(), ServiceError> {
    let mut scoped = self.scoped.write().await;
    let row = scoped
      .iter_mut()
      .find(|q| q.id == id)
      .ok_or_else(|| ServiceError::Store(format!("scoped row {id} not found")))?;
    row.original_question_id = Some(bank_id);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, Provenance, QuestionContent, QuestionDraft, QuestionKind};

  fn draft(statement: &str) -> QuestionDraft {
    QuestionDraft {
      statement: statement.into(),
      kind: QuestionKind::TrueFalse,
      difficulty: Difficulty::Easy,
      content: QuestionContent::default(),
      commentary: String::new(),
    }
  }

  fn bank_row(statement: &str, embedding: Option<Vec<f32>>) -> NewBankQuestion {
    NewBankQuestion {
      draft: draft(statement),
      topics: vec!["t".into()],
      provenance: Provenance::AiAutoGen,
      embedding,
    }
  }

  #[test]
  fn cosine_distance_basics() {
    assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
    assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
  }

  #[tokio::test]
  async fn search_filters_by_similarity_and_orders_by_distance() {
    let store = MemoryStore::new();
    store
      .insert_bank(vec![
        bank_row("far", Some(vec![0.0, 1.0])),
        bank_row("near", Some(vec![1.0, 0.1])),
        bank_row("exact", Some(vec![1.0, 0.0])),
        bank_row("unembedded", None),
      ])
      .await
      .unwrap();

    let hits = store.search(&[1.0, 0.0], 0.75, 10).await.unwrap();
    let names: Vec<&str> = hits.iter().map(|(q, _)| q.statement.as_str()).collect();
    assert_eq!(names, vec!["exact", "near"]);

    let limited = store.search(&[1.0, 0.0], 0.75, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
  }

  #[tokio::test]
  async fn embedding_status_transitions() {
    let store = MemoryStore::new();
    let rows = store.insert_bank(vec![bank_row("q", None)]).await.unwrap();
    assert_eq!(rows[0].embedding_status, EmbeddingStatus::Pending);

    store.mark_embedding_failed(rows[0].id).await.unwrap();
    assert_eq!(store.failed_embeddings(50).await.unwrap().len(), 1);

    store.set_embedding(rows[0].id, vec![0.5; 3]).await.unwrap();
    assert!(store.failed_embeddings(50).await.unwrap().is_empty());
    assert_eq!(store.bank_snapshot().await[0].embedding_status, EmbeddingStatus::Completed);
  }

  #[tokio::test]
  async fn scoped_linking() {
    let store = MemoryStore::new();
    let rows = store
      .insert_scoped(vec![NewScopedQuestion {
        topic_id: "t1".into(),
        draft: draft("legacy"),
        reward: 10,
        original_question_id: None,
      }])
      .await
      .unwrap();
    assert_eq!(store.unlinked(20, &HashSet::new()).await.unwrap().len(), 1);
    assert!(store.unlinked(20, &HashSet::from([rows[0].id])).await.unwrap().is_empty());

    let bank_id = Uuid::new_v4();
    store.link_canonical(rows[0].id, bank_id).await.unwrap();
    assert!(store.unlinked(20, &HashSet::new()).await.unwrap().is_empty());
    assert_eq!(store.list_for_topic("t1").await.unwrap()[0].original_question_id, Some(bank_id));
    assert!(store.link_canonical(Uuid::new_v4(), bank_id).await.is_err());
  }
}
