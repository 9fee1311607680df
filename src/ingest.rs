//! Bank ingestion and the out-of-band vectorizer.
//!
//! Accepted drafts are bulk-inserted into the canonical bank as `ai_auto_gen`.
//! Each inserted row is handed to the `EmbeddingQueue`, a bounded channel drained
//! by one worker task. A row whose embedding cannot be computed (or that cannot be
//! queued) is marked `failed`; the repair job picks it up later.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{BankQuestion, NewBankQuestion, Provenance, QuestionDraft};
use crate::planner::Slot;
use crate::provider::Embedder;
use crate::store::BankStore;

/// Work item for the vectorizer.
#[derive(Clone, Debug)]
pub struct EmbeddingJob {
  pub bank_id: Uuid,
  pub text: String,
}

/// Sending half of the vectorizer. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingQueue {
  tx: mpsc::Sender<EmbeddingJob>,
  bank: Arc<dyn BankStore>,
}

impl EmbeddingQueue {
  /// Spawn the worker. The worker exits once every queue handle is dropped and
  /// the backlog is drained, so awaiting the handle flushes pending jobs.
  pub fn spawn(embedder: Arc<dyn Embedder>, bank: Arc<dyn BankStore>, capacity: usize) -> (Self, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_worker(rx, embedder, bank.clone()));
    (Self { tx, bank }, handle)
  }

  /// Hand a row to the worker without waiting. A full or closed queue marks the row failed.
  pub async fn enqueue(&self, job: EmbeddingJob) {
    let bank_id = job.bank_id;
    if let Err(e) = self.tx.try_send(job) {
      warn!(target: "sourcing", %bank_id, error = %e, "Embedding queue rejected job; marking row failed");
      if let Err(e) = self.bank.mark_embedding_failed(bank_id).await {
        error!(target: "sourcing", %bank_id, error = %e, "Could not mark embedding failed");
      }
    }
  }
}

async fn run_worker(mut rx: mpsc::Receiver<EmbeddingJob>, embedder: Arc<dyn Embedder>, bank: Arc<dyn BankStore>) {
  info!(target: "sourcing", "Embedding worker started");
  while let Some(job) = rx.recv().await {
    match embedder.embed(&job.text).await {
      Ok(vector) => match bank.set_embedding(job.bank_id, vector).await {
        Ok(()) => debug!(target: "sourcing", bank_id = %job.bank_id, "Embedding stored"),
        Err(e) => {
          error!(target: "sourcing", bank_id = %job.bank_id, error = %e, "Embedding write failed; marking row failed");
          if let Err(e) = bank.mark_embedding_failed(job.bank_id).await {
            error!(target: "sourcing", bank_id = %job.bank_id, error = %e, "Could not mark embedding failed");
          }
        }
      },
      Err(e) => {
        warn!(target: "sourcing", bank_id = %job.bank_id, error = %e, "Embedding failed; left for repair job");
        if let Err(e) = bank.mark_embedding_failed(job.bank_id).await {
          error!(target: "sourcing", bank_id = %job.bank_id, error = %e, "Could not mark embedding failed");
        }
      }
    }
  }
  info!(target: "sourcing", "Embedding worker stopped");
}

/// A draft ready for the bridge, linked to its bank row when ingestion succeeded.
#[derive(Clone, Debug)]
pub struct LinkedDraft {
  pub slot: Slot,
  pub draft: QuestionDraft,
  pub bank_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct BankIngestor {
  bank: Arc<dyn BankStore>,
  queue: EmbeddingQueue,
}

impl BankIngestor {
  pub fn new(bank: Arc<dyn BankStore>, queue: EmbeddingQueue) -> Self {
    Self { bank, queue }
  }

  /// Insert accepted drafts. Never fails: on insert failure the drafts pass
  /// through without a canonical id.
  #[instrument(level = "info", skip(self, accepted), fields(items = accepted.len(), %topic_tag))]
  pub async fn ingest(&self, accepted: Vec<(Slot, QuestionDraft)>, topic_tag: &str) -> Vec<LinkedDraft> {
    if accepted.is_empty() {
      return Vec::new();
    }
    let rows: Vec<NewBankQuestion> = accepted
      .iter()
      .map(|(_, draft)| NewBankQuestion {
        draft: draft.clone(),
        topics: vec![topic_tag.to_string()],
        provenance: Provenance::AiAutoGen,
        embedding: None,
      })
      .collect();

    let inserted = match self.bank.insert_bank(rows).await {
      Ok(rows) => rows,
      Err(e) => {
        error!(target: "sourcing", error = %e, "Bank insert failed; using generated content without canonical ids");
        Vec::new()
      }
    };
    if !inserted.is_empty() && inserted.len() < accepted.len() {
      warn!(target: "sourcing", inserted = inserted.len(), expected = accepted.len(), "Partial bank insert");
    }

    for row in &inserted {
      self.queue.enqueue(EmbeddingJob { bank_id: row.id, text: row.statement.clone() }).await;
    }

    let ids = link_rows(&accepted, &inserted);
    accepted
      .into_iter()
      .zip(ids)
      .map(|((slot, draft), bank_id)| LinkedDraft { slot, draft, bank_id })
      .collect()
  }
}

/// Pair each returned bank row with the first unclaimed draft of identical content.
/// Drafts the store did not return stay unlinked.
fn link_rows(drafts: &[(Slot, QuestionDraft)], inserted: &[BankQuestion]) -> Vec<Option<Uuid>> {
  let mut ids: Vec<Option<Uuid>> = vec![None; drafts.len()];
  for row in inserted {
    let free = drafts.iter().zip(&ids).position(|((_, d), id)| {
      id.is_none() && d.statement == row.statement && d.kind == row.kind && d.difficulty == row.difficulty
    });
    match free {
      Some(i) => ids[i] = Some(row.id),
      None => warn!(target: "sourcing", bank_id = %row.id, "Inserted bank row matches no draft; left unlinked"),
    }
  }
  ids
}
