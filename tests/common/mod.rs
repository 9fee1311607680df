#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use qsource::config::{EngineConfig, JobsConfig, Prompts};
use qsource::domain::{
  AnswerOption, BankQuestion, Difficulty, NewBankQuestion, NewScopedQuestion, NodeKind, Provenance,
  QuestionContent, QuestionDraft, QuestionKind, ScopedQuestion, TopicNode,
};
use qsource::engine::{Collaborators, SourcingEngine};
use qsource::error::ServiceError;
use qsource::ingest::EmbeddingQueue;
use qsource::jobs::MaintenanceJobs;
use qsource::provider::{Embedder, Generator};
use qsource::store::{BankStore, MemoryStore, ScopedStore};

pub const TOPIC_ID: &str = "hf";
pub const TOPIC_TITLE: &str = "Heart Failure";

pub const COMMENTARY: &str = "Correct answer: A. Justification: loop diuretics act on the thick ascending limb \
  of the loop of Henle and give the fastest and strongest natriuresis for congestion relief; thiazides act \
  distally with a weaker effect and nitrates alone do not remove volume.";

pub fn topic() -> TopicNode {
  TopicNode {
    id: TOPIC_ID.into(),
    title: TOPIC_TITLE.into(),
    context: "OBJECTIVE: Manage acute decompensated heart failure.\nESSENTIAL CONTENT:\n- Loop diuretics\n- Natriuretic peptides\n".into(),
    parent_id: None,
    kind: NodeKind::Module,
  }
}

pub async fn seeded_store() -> Arc<MemoryStore> {
  let store = Arc::new(MemoryStore::new());
  store.put_topic(topic()).await;
  store
}

fn options() -> Vec<AnswerOption> {
  [
    ("A", "Loop diuretics such as furosemide", true),
    ("B", "Thiazide diuretics given alone", false),
    ("C", "Non-dihydropyridine calcium blockers", false),
    ("D", "Sublingual short-acting nitrates only", false),
  ]
  .into_iter()
  .map(|(id, text, is_correct)| AnswerOption { id: id.into(), text: text.into(), is_correct })
  .collect()
}

/// A multiple-choice body that passes the quality gate at any difficulty.
pub fn valid_draft(n: usize, difficulty: Difficulty) -> QuestionDraft {
  QuestionDraft {
    statement: format!(
      "Case {n}: an older adult with orthopnoea, bilateral crackles and raised jugular pressure needs rapid decongestion. Which drug class comes first?"
    ),
    kind: QuestionKind::MultipleChoice,
    difficulty,
    content: QuestionContent { options: options(), ..Default::default() },
    commentary: COMMENTARY.into(),
  }
}

/// Defects a scripted item can carry.
#[derive(Clone, Copy, Debug)]
pub enum Flaw {
  ShortStatement,
  TwoCorrect,
  WrongDifficulty,
}

/// Answers every prompt with one valid item per requested difficulty.
pub struct ScriptedGenerator {
  pub calls: AtomicUsize,
  /// Item position (within a call) and the defect it carries.
  flaw_at: Option<(usize, Flaw)>,
  /// Calls asking for exactly this many items fail.
  fail_when_count: Option<usize>,
  fail_all: bool,
}

impl ScriptedGenerator {
  pub fn valid() -> Self {
    Self { calls: AtomicUsize::new(0), flaw_at: None, fail_when_count: None, fail_all: false }
  }

  pub fn with_flaw(position: usize, flaw: Flaw) -> Self {
    Self { flaw_at: Some((position, flaw)), ..Self::valid() }
  }

  pub fn failing_chunks_of(count: usize) -> Self {
    Self { fail_when_count: Some(count), ..Self::valid() }
  }

  pub fn failing() -> Self {
    Self { fail_all: true, ..Self::valid() }
  }

  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

pub fn requested_difficulties(prompt: &str) -> Vec<String> {
  prompt
    .lines()
    .find_map(|l| l.trim().strip_prefix("Difficulties (in order):"))
    .map(|rest| rest.split(',').map(|d| d.trim().to_string()).filter(|d| !d.is_empty()).collect())
    .unwrap_or_default()
}

fn scripted_item(n: usize, difficulty: &str, flaw: Option<Flaw>) -> Value {
  let parsed = Difficulty::parse(difficulty).unwrap_or(Difficulty::Medium);
  let draft = valid_draft(n, parsed);
  let mut item = json!({
    "statement": draft.statement,
    "kind": "multiple_choice",
    "difficulty": difficulty,
    "content": { "options": draft.content.options },
    "commentary": draft.commentary,
  });
  match flaw {
    Some(Flaw::ShortStatement) => item["statement"] = json!("Which drug?"),
    Some(Flaw::TwoCorrect) => item["content"]["options"][1]["isCorrect"] = json!(true),
    Some(Flaw::WrongDifficulty) => {
      item["difficulty"] = json!(if parsed == Difficulty::Hard { "easy" } else { "hard" })
    }
    None => {}
  }
  item
}

#[async_trait]
impl Generator for ScriptedGenerator {
  async fn generate(&self, _system: &str, prompt: &str) -> Result<String, ServiceError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    let difficulties = requested_difficulties(prompt);
    if self.fail_all || self.fail_when_count == Some(difficulties.len()) {
      return Err(ServiceError::Status { service: "fake", status: 503, message: "overloaded".into() });
    }
    let items: Vec<Value> = difficulties
      .iter()
      .enumerate()
      .map(|(i, d)| {
        let flaw = self.flaw_at.filter(|(pos, _)| *pos == i).map(|(_, f)| f);
        scripted_item(call * 100 + i, d, flaw)
      })
      .collect();
    Ok(json!({ "questions": items }).to_string())
  }
}

/// Same unit vector for every text, so every embedded bank row is a perfect match.
pub struct ConstantEmbedder;

#[async_trait]
impl Embedder for ConstantEmbedder {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
    Ok(vec![1.0, 0.0, 0.0])
  }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
    Err(ServiceError::Unavailable("embedding service down".into()))
  }
}

/// Memory store whose bank or scoped inserts can be made to fail.
pub struct FlakyStore {
  pub inner: Arc<MemoryStore>,
  pub fail_bank_insert: bool,
  pub fail_scoped_insert: bool,
}

#[async_trait]
impl BankStore for FlakyStore {
  async fn insert_bank(&self, rows: Vec<NewBankQuestion>) -> Result<Vec<BankQuestion>, ServiceError> {
    if self.fail_bank_insert {
      return Err(ServiceError::Store("bank unavailable".into()));
    }
    self.inner.insert_bank(rows).await
  }
  async fn set_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<(), ServiceError> {
    self.inner.set_embedding(id, embedding).await
  }
  async fn mark_embedding_failed(&self, id: Uuid) -> Result<(), ServiceError> {
    self.inner.mark_embedding_failed(id).await
  }
  async fn failed_embeddings(&self, limit: usize) -> Result<Vec<BankQuestion>, ServiceError> {
    self.inner.failed_embeddings(limit).await
  }
}

#[async_trait]
impl ScopedStore for FlakyStore {
  async fn list_for_topic(&self, topic_id: &str) -> Result<Vec<ScopedQuestion>, ServiceError> {
    self.inner.list_for_topic(topic_id).await
  }
  async fn insert_scoped(&self, rows: Vec<NewScopedQuestion>) -> Result<Vec<ScopedQuestion>, ServiceError> {
    if self.fail_scoped_insert {
      return Err(ServiceError::Store("scoped table locked".into()));
    }
    self.inner.insert_scoped(rows).await
  }
  async fn unlinked(&self, limit: usize, skip: &HashSet<Uuid>) -> Result<Vec<ScopedQuestion>, ServiceError> {
    self.inner.unlinked(limit, skip).await
  }
  async fn link_canonical(&self, id: Uuid, bank_id: Uuid) -> Result<(), ServiceError> {
    self.inner.link_canonical(id, bank_id).await
  }
}

pub struct EngineParts {
  pub bank: Arc<dyn BankStore>,
  pub scoped: Arc<dyn ScopedStore>,
  pub embedder: Arc<dyn Embedder>,
  pub generator: Arc<dyn Generator>,
  pub batch_size: usize,
}

impl EngineParts {
  pub fn new(store: &Arc<MemoryStore>, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
    Self { bank: store.clone(), scoped: store.clone(), embedder, generator, batch_size: 5 }
  }
}

pub fn engine(store: &Arc<MemoryStore>, parts: EngineParts) -> SourcingEngine {
  let (queue, _worker) = EmbeddingQueue::spawn(parts.embedder.clone(), parts.bank.clone(), 64);
  let collab = Collaborators {
    topics: store.clone(),
    bank: parts.bank,
    vectors: store.clone(),
    scoped: parts.scoped,
    embedder: parts.embedder,
    generator: parts.generator,
  };
  let config = EngineConfig { batch_size: parts.batch_size, ..Default::default() };
  SourcingEngine::new(collab, &config, Prompts::default(), queue)
}

pub fn jobs(store: &Arc<MemoryStore>, embedder: Arc<dyn Embedder>) -> MaintenanceJobs {
  MaintenanceJobs::new(store.clone(), store.clone(), store.clone(), embedder, JobsConfig::default())
}

/// Put embedded bank rows of the given difficulties in the store.
pub async fn seed_bank(store: &MemoryStore, difficulties: &[Difficulty]) -> Vec<BankQuestion> {
  let rows = difficulties
    .iter()
    .enumerate()
    .map(|(i, d)| NewBankQuestion {
      draft: valid_draft(1000 + i, *d),
      topics: vec![TOPIC_TITLE.into()],
      provenance: Provenance::AiAutoGen,
      embedding: Some(vec![1.0, 0.0, 0.0]),
    })
    .collect();
  store.insert_bank(rows).await.expect("seed bank")
}
