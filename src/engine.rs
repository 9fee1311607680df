//! The sourcing engine: one request in, one scoped question set out.
//!
//! Pipeline:
//!   cache check -> plan -> compile context -> retrieve + rerank -> fill slots
//!   -> generate residual -> quality gate -> bank ingestion -> scope bridge
//!
//! Only an unknown topic, a store failure while reading the request's own
//! inputs, or a failed bridge insert abort the request. Every other stage
//! degrades and the pipeline continues with what it has.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bridge::ScopeBridge;
use crate::config::{EngineConfig, Prompts};
use crate::context::{compile, CompiledContext};
use crate::domain::{Difficulty, Mode, QuestionDraft, QuestionKind, ScopedQuestion, TopicNode};
use crate::error::SourcingError;
use crate::generation::{GenerationBrief, GenerationFallback};
use crate::ingest::{BankIngestor, EmbeddingQueue, LinkedDraft};
use crate::planner::{plan, PlanRequest, Recipe};
use crate::provider::{Embedder, Generator};
use crate::quality::{validate_batch, RetryReason, RetrySlot};
use crate::retriever::{RetrievalSettings, Retriever};
use crate::slots::fill_slots;
use crate::store::{BankStore, ScopedStore, TopicStore, VectorStore};

/// Source label for a set served from the topic's existing working set.
pub const SOURCE_CACHE: &str = "scoped_cache";
pub const SOURCE_BANK: &str = "bank";
pub const SOURCE_GENERATED: &str = "generated";
pub const SOURCE_HYBRID: &str = "hybrid";
/// Nothing could be produced for any slot.
pub const SOURCE_UNFILLED: &str = "unfilled";

/// Every external collaborator the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
  pub topics: Arc<dyn TopicStore>,
  pub bank: Arc<dyn BankStore>,
  pub vectors: Arc<dyn VectorStore>,
  pub scoped: Arc<dyn ScopedStore>,
  pub embedder: Arc<dyn Embedder>,
  pub generator: Arc<dyn Generator>,
}

#[derive(Clone, Debug)]
pub struct SourceRequest {
  pub topic_id: String,
  pub mode: Mode,
  /// Explicit gaps. When present the cache check is skipped.
  pub needed_difficulties: Option<Vec<Difficulty>>,
  pub forced_kinds: Option<Vec<QuestionKind>>,
  pub learner_id: Option<String>,
}

impl SourceRequest {
  pub fn new(topic_id: impl Into<String>, mode: Mode) -> Self {
    Self {
      topic_id: topic_id.into(),
      mode,
      needed_difficulties: None,
      forced_kinds: None,
      learner_id: None,
    }
  }

  fn has_explicit_gaps(&self) -> bool {
    self.needed_difficulties.as_ref().is_some_and(|n| !n.is_empty())
  }
}

#[derive(Clone, Debug)]
pub struct SourceResult {
  pub success: bool,
  pub count: usize,
  pub items: Vec<ScopedQuestion>,
  pub from_cache: bool,
  pub source: String,
  /// Slots left open, with enough metadata to retry them precisely.
  pub retry: Vec<RetrySlot>,
  /// Slots that ended the request with no content.
  pub abandoned: usize,
}

impl SourceResult {
  fn cached(items: Vec<ScopedQuestion>) -> Self {
    Self {
      success: true,
      count: items.len(),
      items,
      from_cache: true,
      source: SOURCE_CACHE.into(),
      retry: Vec::new(),
      abandoned: 0,
    }
  }
}

pub struct SourcingEngine {
  topics: Arc<dyn TopicStore>,
  scoped: Arc<dyn ScopedStore>,
  retriever: Retriever,
  generation: GenerationFallback,
  ingestor: BankIngestor,
  bridge: ScopeBridge,
  search_ceiling: usize,
}

impl SourcingEngine {
  pub fn new(collab: Collaborators, config: &EngineConfig, prompts: Prompts, queue: EmbeddingQueue) -> Self {
    let retrieval = RetrievalSettings {
      count: config.retrieval_count,
      min_similarity: config.min_similarity,
      distance_weight: config.distance_weight,
      keyword_weight: config.keyword_weight,
    };
    Self {
      retriever: Retriever::new(collab.embedder.clone(), collab.vectors.clone(), retrieval),
      generation: GenerationFallback::new(collab.generator.clone(), prompts, config.batch_size),
      ingestor: BankIngestor::new(collab.bank.clone(), queue),
      bridge: ScopeBridge::new(collab.scoped.clone()),
      topics: collab.topics,
      scoped: collab.scoped,
      search_ceiling: config.search_ceiling,
    }
  }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(topic_id = %req.topic_id, mode = req.mode.as_str(), explicit_gaps = req.has_explicit_gaps())
  )]
  pub async fn source(&self, req: &SourceRequest) -> Result<SourceResult, SourcingError> {
    let node = self
      .topics
      .topic(&req.topic_id)
      .await?
      .ok_or_else(|| SourcingError::TopicNotFound(req.topic_id.clone()))?;

    let existing = self.scoped.list_for_topic(&node.id).await?;
    if !req.has_explicit_gaps() && !existing.is_empty() {
      info!(target: "sourcing", topic_id = %node.id, count = existing.len(), "Serving existing scoped set");
      return Ok(SourceResult::cached(existing));
    }
    // Bank rows already linked into this topic are never picked again.
    let mut used: HashSet<Uuid> = existing.iter().filter_map(|q| q.original_question_id).collect();

    let recipe = plan(&PlanRequest {
      mode: Some(req.mode),
      needed: req.needed_difficulties.clone(),
      forced_kinds: req.forced_kinds.clone(),
      mastery: self.mastery_for(req).await,
    });
    debug!(target: "sourcing", slots = recipe.len(), difficulties = ?recipe.difficulties(), kinds = ?recipe.kinds, "Recipe planned");

    let parent = self.parent_of(&node).await;
    let ctx: CompiledContext = compile(&node, parent.as_ref(), self.search_ceiling);

    let candidates = self.retriever.retrieve(&ctx.search_text, &ctx.keywords).await;
    let top_distance = candidates.iter().map(|c| c.distance).reduce(f32::min);
    let fill = fill_slots(&candidates, &recipe, &mut used);
    let cache_fills = fill.filled.len();

    let brief = GenerationBrief { topic: node.title.clone(), grounding: ctx.grounding.clone(), mode: req.mode };
    let generated = self.generation.generate(&fill.residual, &brief).await;
    let produced = generated.len();
    let mut ledger = missing_slots(&fill.residual, &generated);
    let report = validate_batch(generated, &fill.residual.kinds);
    ledger.extend(report.rejected);
    ledger.sort_by_key(|r| r.index);
    let accepted = report.accepted.len();

    let mut items: Vec<LinkedDraft> = fill
      .filled
      .into_iter()
      .map(|f| LinkedDraft {
        slot: f.slot,
        draft: QuestionDraft::from(&f.candidate.question),
        bank_id: Some(f.candidate.question.id),
      })
      .collect();
    items.extend(self.ingestor.ingest(report.accepted, &node.title).await);

    let abandoned = recipe.len() - cache_fills - accepted;
    let source = source_label(cache_fills, accepted);

    info!(
      target: "sourcing",
      topic_id = %node.id,
      recipe = recipe.len(),
      candidates = candidates.len(),
      cache_hits = cache_fills,
      hit_rate = cache_fills as f32 / recipe.len().max(1) as f32,
      top1_distance = ?top_distance,
      generated = produced,
      validation_passed = report.stats.passed,
      validation_failed = report.stats.failed,
      warnings = report.stats.warnings,
      abandoned,
      source,
      "Sourcing report"
    );

    if items.is_empty() {
      warn!(target: "sourcing", topic_id = %node.id, slots = recipe.len(), "No slot could be filled; nothing persisted");
      return Ok(SourceResult {
        success: false,
        count: 0,
        items: Vec::new(),
        from_cache: false,
        source: source.into(),
        retry: ledger,
        abandoned,
      });
    }

    let persisted = self.bridge.persist(&node.id, items).await?;
    Ok(SourceResult {
      success: true,
      count: persisted.len(),
      items: persisted,
      from_cache: false,
      source: source.into(),
      retry: ledger,
      abandoned,
    })
  }

  /// Learner mastery, standard mode only. Lookup failures fall back to the default mixture.
  async fn mastery_for(&self, req: &SourceRequest) -> Option<u8> {
    if req.mode != Mode::Standard || req.has_explicit_gaps() {
      return None;
    }
    let learner = req.learner_id.as_deref()?;
    match self.topics.mastery_level(learner, &req.topic_id).await {
      Ok(level) => level,
      Err(e) => {
        warn!(target: "sourcing", %learner, error = %e, "Mastery lookup failed; using default mixture");
        None
      }
    }
  }

  async fn parent_of(&self, node: &TopicNode) -> Option<TopicNode> {
    let parent_id = node.parent_id.as_deref()?;
    match self.topics.topic(parent_id).await {
      Ok(parent) => parent,
      Err(e) => {
        warn!(target: "sourcing", %parent_id, error = %e, "Parent lookup failed; compiling without parent");
        None
      }
    }
  }
}

/// Residual slots the generator returned nothing for.
fn missing_slots<T>(residual: &Recipe, generated: &[(crate::planner::Slot, T)]) -> Vec<RetrySlot> {
  let returned: HashSet<usize> = generated.iter().map(|(s, _)| s.index).collect();
  residual
    .slots
    .iter()
    .filter(|s| !returned.contains(&s.index))
    .map(|s| RetrySlot { index: s.index, expected_difficulty: s.difficulty, reason: RetryReason::Missing })
    .collect()
}

fn source_label(cache_fills: usize, accepted: usize) -> &'static str {
  match (cache_fills > 0, accepted > 0) {
    (true, true) => SOURCE_HYBRID,
    (true, false) => SOURCE_BANK,
    (false, true) => SOURCE_GENERATED,
    (false, false) => SOURCE_UNFILLED,
  }
}
