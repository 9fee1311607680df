//! Maintenance jobs keeping the bank's vector index complete.
//!
//! Both jobs are batch-bounded and idempotent: re-running picks up whatever
//! the previous run left behind. Per-item failures are logged and skipped.
//! Legacy rows that fail to migrate are deferred until every other unlinked
//! row has been tried, so a stubborn batch cannot stall the backfill.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::domain::{NewBankQuestion, Provenance, QuestionDraft, ScopedQuestion};
use crate::error::ServiceError;
use crate::provider::Embedder;
use crate::store::{BankStore, ScopedStore, TopicStore};

/// Tag used when a legacy row's topic no longer resolves.
pub const FALLBACK_TOPIC_TAG: &str = "General";

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
  pub message: String,
  pub migrated: usize,
  pub total: usize,
  pub failed: usize,
  pub failed_ids: Vec<Uuid>,
  /// Nothing was left to migrate when the run started.
  pub done: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
  pub message: String,
  pub retried: usize,
  pub total: usize,
  pub failed: usize,
  pub failed_ids: Vec<Uuid>,
}

pub struct MaintenanceJobs {
  topics: Arc<dyn TopicStore>,
  bank: Arc<dyn BankStore>,
  scoped: Arc<dyn ScopedStore>,
  embedder: Arc<dyn Embedder>,
  settings: JobsConfig,
  /// Legacy rows that failed during the current pass.
  deferred: Mutex<HashSet<Uuid>>,
}

impl MaintenanceJobs {
  pub fn new(
    topics: Arc<dyn TopicStore>,
    bank: Arc<dyn BankStore>,
    scoped: Arc<dyn ScopedStore>,
    embedder: Arc<dyn Embedder>,
    settings: JobsConfig,
  ) -> Self {
    Self { topics, bank, scoped, embedder, settings, deferred: Mutex::new(HashSet::new()) }
  }

  /// Backfill one batch of legacy scoped rows into the bank and link them.
  #[instrument(level = "info", skip(self), fields(batch = self.settings.migration_batch))]
  pub async fn migrate_legacy(&self) -> Result<MigrationSummary, ServiceError> {
    let mut deferred = self.deferred.lock().await;
    let mut legacy = self.scoped.unlinked(self.settings.migration_batch, &deferred).await?;
    if legacy.is_empty() && !deferred.is_empty() {
      info!(target: "sourcing", deferred = deferred.len(), "Pass finished; retrying deferred legacy rows");
      deferred.clear();
      legacy = self.scoped.unlinked(self.settings.migration_batch, &deferred).await?;
    }
    if legacy.is_empty() {
      info!(target: "sourcing", "No legacy rows left to migrate");
      return Ok(MigrationSummary {
        message: "Migration complete: no unlinked questions left".into(),
        migrated: 0,
        total: 0,
        failed: 0,
        failed_ids: Vec::new(),
        done: true,
      });
    }

    let total = legacy.len();
    let mut migrated = 0;
    let mut failed_ids = Vec::new();
    for row in &legacy {
      match self.migrate_one(row).await {
        Ok(bank_id) => {
          migrated += 1;
          info!(target: "sourcing", scoped_id = %row.id, %bank_id, "Legacy row migrated");
        }
        Err(e) => {
          warn!(target: "sourcing", scoped_id = %row.id, error = %e, "Legacy row migration failed; skipping");
          failed_ids.push(row.id);
          deferred.insert(row.id);
        }
      }
    }

    Ok(MigrationSummary {
      message: format!("Migrated {migrated} of {total} legacy questions"),
      migrated,
      total,
      failed: failed_ids.len(),
      failed_ids,
      done: false,
    })
  }

  async fn migrate_one(&self, row: &ScopedQuestion) -> Result<Uuid, ServiceError> {
    let tag = match self.topics.topic(&row.topic_id).await {
      Ok(Some(node)) => node.title,
      Ok(None) => FALLBACK_TOPIC_TAG.to_string(),
      Err(e) => {
        warn!(target: "sourcing", topic_id = %row.topic_id, error = %e, "Topic lookup failed; using fallback tag");
        FALLBACK_TOPIC_TAG.to_string()
      }
    };
    let embedding = self.embedder.embed(&row.statement).await?;
    let inserted = self
      .bank
      .insert_bank(vec![NewBankQuestion {
        draft: QuestionDraft::from(row),
        topics: vec![tag],
        provenance: Provenance::MigrationLegacy,
        embedding: Some(embedding),
      }])
      .await?;
    let bank_id = inserted
      .first()
      .map(|q| q.id)
      .ok_or_else(|| ServiceError::Store("bank insert returned no row".into()))?;
    self.scoped.link_canonical(row.id, bank_id).await?;
    Ok(bank_id)
  }

  /// Recompute embeddings for one batch of `failed` bank rows.
  #[instrument(level = "info", skip(self), fields(batch = self.settings.repair_batch))]
  pub async fn repair_embeddings(&self) -> Result<RepairSummary, ServiceError> {
    let rows = self.bank.failed_embeddings(self.settings.repair_batch).await?;
    let total = rows.len();
    let mut retried = 0;
    let mut failed_ids = Vec::new();

    for row in &rows {
      let outcome = match self.embedder.embed(&row.statement).await {
        Ok(vector) => self.bank.set_embedding(row.id, vector).await,
        Err(e) => Err(e),
      };
      match outcome {
        Ok(()) => retried += 1,
        Err(e) => {
          warn!(target: "sourcing", bank_id = %row.id, error = %e, "Embedding repair failed; row stays failed");
          failed_ids.push(row.id);
        }
      }
    }

    info!(target: "sourcing", total, retried, failed = failed_ids.len(), "Embedding repair run finished");
    Ok(RepairSummary {
      message: if total == 0 {
        "No failed embeddings to repair".into()
      } else {
        format!("Repaired {retried} of {total} embeddings")
      },
      retried,
      total,
      failed: failed_ids.len(),
      failed_ids,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{
    Difficulty, EmbeddingStatus, NewScopedQuestion, NodeKind, QuestionContent, QuestionKind, TopicNode,
  };
  use crate::store::MemoryStore;
  use async_trait::async_trait;

  /// Fails for statements containing "poison".
  struct PickyEmbedder;

  #[async_trait]
  impl Embedder for PickyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
      if text.contains("poison") {
        Err(ServiceError::Decode("bad input".into()))
      } else {
        Ok(vec![1.0, 0.0])
      }
    }
  }

  fn legacy(topic_id: &str, statement: &str) -> NewScopedQuestion {
    NewScopedQuestion {
      topic_id: topic_id.into(),
      draft: QuestionDraft {
        statement: statement.into(),
        kind: QuestionKind::TrueFalse,
        difficulty: Difficulty::Medium,
        content: QuestionContent::default(),
        commentary: String::new(),
      },
      reward: 10,
      original_question_id: None,
    }
  }

  fn jobs(store: &Arc<MemoryStore>, settings: JobsConfig) -> MaintenanceJobs {
    MaintenanceJobs::new(store.clone(), store.clone(), store.clone(), Arc::new(PickyEmbedder), settings)
  }

  #[tokio::test]
  async fn migration_links_rows_and_skips_failures() {
    let store = Arc::new(MemoryStore::new());
    store
      .put_topic(TopicNode {
        id: "hf".into(),
        title: "Heart Failure".into(),
        context: String::new(),
        parent_id: None,
        kind: NodeKind::Module,
      })
      .await;
    store
      .insert_scoped(vec![legacy("hf", "first"), legacy("gone", "second"), legacy("hf", "poison")])
      .await
      .unwrap();

    let summary = jobs(&store, JobsConfig::default()).migrate_legacy().await.unwrap();
    assert_eq!((summary.migrated, summary.total, summary.failed), (2, 3, 1));
    assert!(!summary.done);

    let bank = store.bank_snapshot().await;
    assert_eq!(bank[0].topics, vec!["Heart Failure".to_string()]);
    assert_eq!(bank[1].topics, vec![FALLBACK_TOPIC_TAG.to_string()]);
    assert!(bank.iter().all(|q| q.provenance == Provenance::MigrationLegacy));
    assert!(bank.iter().all(|q| q.embedding_status == EmbeddingStatus::Completed));

    let scoped = store.scoped_snapshot().await;
    assert_eq!(scoped[0].original_question_id, Some(bank[0].id));
    assert_eq!(scoped[2].original_question_id, None);
    assert_eq!(summary.failed_ids, vec![scoped[2].id]);
  }

  #[tokio::test]
  async fn migration_reports_done_when_nothing_is_unlinked() {
    let store = Arc::new(MemoryStore::new());
    let summary = jobs(&store, JobsConfig::default()).migrate_legacy().await.unwrap();
    assert!(summary.done);
    assert_eq!(summary.total, 0);
  }

  #[tokio::test]
  async fn migration_respects_batch_limit() {
    let store = Arc::new(MemoryStore::new());
    store
      .insert_scoped((0..5).map(|i| legacy("hf", &format!("q{i}"))).collect())
      .await
      .unwrap();
    let settings = JobsConfig { migration_batch: 2, repair_batch: 50 };
    let summary = jobs(&store, settings).migrate_legacy().await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(store.unlinked(10, &HashSet::new()).await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn failing_rows_do_not_block_later_rows() {
    let store = Arc::new(MemoryStore::new());
    store
      .insert_scoped(vec![legacy("hf", "poison a"), legacy("hf", "poison b"), legacy("hf", "fine")])
      .await
      .unwrap();
    let jobs = jobs(&store, JobsConfig { migration_batch: 2, repair_batch: 50 });

    let first = jobs.migrate_legacy().await.unwrap();
    assert_eq!((first.migrated, first.failed), (0, 2));

    let second = jobs.migrate_legacy().await.unwrap();
    assert_eq!((second.migrated, second.total), (1, 1));
    assert_eq!(store.scoped_snapshot().await[2].original_question_id, Some(store.bank_snapshot().await[0].id));

    // A new pass starts over with the rows that failed before.
    let third = jobs.migrate_legacy().await.unwrap();
    assert_eq!((third.migrated, third.failed), (0, 2));
    assert!(!third.done);
  }

  #[tokio::test]
  async fn repair_completes_recoverable_rows_only() {
    let store = Arc::new(MemoryStore::new());
    let rows = store
      .insert_bank(
        ["fine", "poison"]
          .iter()
          .map(|s| NewBankQuestion {
            draft: QuestionDraft {
              statement: s.to_string(),
              kind: QuestionKind::TrueFalse,
              difficulty: Difficulty::Easy,
              content: QuestionContent::default(),
              commentary: String::new(),
            },
            topics: vec![],
            provenance: Provenance::AiAutoGen,
            embedding: None,
          })
          .collect(),
      )
      .await
      .unwrap();
    for r in &rows {
      store.mark_embedding_failed(r.id).await.unwrap();
    }

    let summary = jobs(&store, JobsConfig::default()).repair_embeddings().await.unwrap();
    assert_eq!((summary.retried, summary.total, summary.failed), (1, 2, 1));
    let still_failed = store.failed_embeddings(10).await.unwrap();
    assert_eq!(still_failed.len(), 1);
    assert_eq!(still_failed[0].statement, "poison");
  }
}
