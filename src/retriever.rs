//! Semantic retrieval + rerank over the canonical bank.
//!
//! Flow: embed search text -> vector search (similarity floor) -> lexical overlap
//! against topic/parent title tokens -> composite score -> sort descending.
//! Any failure yields zero candidates; the caller then generates everything.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::domain::BankQuestion;
use crate::error::ServiceError;
use crate::provider::Embedder;
use crate::store::VectorStore;

/// Bank row decorated with retrieval scores. Lives for one request.
#[derive(Clone, Debug)]
pub struct Candidate {
  pub question: BankQuestion,
  pub distance: f32,
  pub keyword_score: f32,
  pub rerank_score: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct RetrievalSettings {
  pub count: usize,
  pub min_similarity: f32,
  pub distance_weight: f32,
  pub keyword_weight: f32,
}

impl Default for RetrievalSettings {
  fn default() -> Self {
    Self { count: 18, min_similarity: 0.75, distance_weight: 0.7, keyword_weight: 0.3 }
  }
}

#[derive(Clone)]
pub struct Retriever {
  embedder: Arc<dyn Embedder>,
  vectors: Arc<dyn VectorStore>,
  settings: RetrievalSettings,
}

impl Retriever {
  pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>, settings: RetrievalSettings) -> Self {
    Self { embedder, vectors, settings }
  }

  /// Ranked candidates for `search_text`; empty on any collaborator failure.
  #[instrument(level = "info", skip(self, search_text, keywords), fields(query_len = search_text.len(), count = self.settings.count))]
  pub async fn retrieve(&self, search_text: &str, keywords: &[String]) -> Vec<Candidate> {
    match self.try_retrieve(search_text, keywords).await {
      Ok(c) => {
        debug!(target: "sourcing", candidates = c.len(), "Retrieval complete");
        c
      }
      Err(e) => {
        warn!(target: "sourcing", error = %e, "Retrieval failed; treating as zero candidates");
        Vec::new()
      }
    }
  }

  async fn try_retrieve(&self, search_text: &str, keywords: &[String]) -> Result<Vec<Candidate>, ServiceError> {
    let query = self.embedder.embed(search_text).await?;
    let matches = self
      .vectors
      .search(&query, self.settings.min_similarity, self.settings.count)
      .await?;
    Ok(rerank(matches, keywords, &self.settings))
  }
}

/// Count of keywords (> 3 chars) found in the statement, normalized by statement length.
pub fn keyword_score(statement: &str, keywords: &[String]) -> f32 {
  let len = statement.chars().count();
  if len == 0 {
    return 0.0;
  }
  let lower = statement.to_lowercase();
  let hits = keywords
    .iter()
    .filter(|kw| kw.chars().count() > 3 && lower.contains(kw.as_str()))
    .count();
  hits as f32 / (len as f32 / 100.0).sqrt()
}

/// Score and sort. Stable: equal scores keep vector-store order.
pub fn rerank(matches: Vec<(BankQuestion, f32)>, keywords: &[String], settings: &RetrievalSettings) -> Vec<Candidate> {
  let mut scored: Vec<Candidate> = matches
    .into_iter()
    .map(|(question, distance)| {
      let distance = distance.max(0.0);
      let keyword_score = keyword_score(&question.statement, keywords);
      let rerank_score =
        settings.distance_weight * (1.0 / (1.0 + distance)) + settings.keyword_weight * keyword_score;
      Candidate { question, distance, keyword_score, rerank_score }
    })
    .collect();
  scored.sort_by(|a, b| b.rerank_score.partial_cmp(&a.rerank_score).unwrap_or(std::cmp::Ordering::Equal));
  scored
}
