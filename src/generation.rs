//! Generation fallback: synthesizes content for the slots retrieval could not fill.
//!
//! The residual recipe is split into fixed-size chunks (slot order preserved), one
//! generative call per chunk, all issued concurrently and awaited together. A chunk
//! whose call or parse fails contributes nothing; its siblings are unaffected.
//! Items map to their chunk's slots by position and never exceed the chunk size.

use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{GeneratedQuestion, Mode, QuestionKind};
use crate::error::PayloadError;
use crate::planner::{Recipe, Slot};
use crate::provider::Generator;
use crate::util::{fill_template, trunc_for_log};

const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// What the prompt needs to know about the topic.
#[derive(Clone, Debug)]
pub struct GenerationBrief {
  pub topic: String,
  pub grounding: String,
  pub mode: Mode,
}

/// The three shapes a generative response may take.
#[derive(Debug)]
pub enum GeneratedPayload {
  /// `[ {...}, {...} ]`
  Batch(Vec<GeneratedQuestion>),
  /// `{ "questions": [ ... ] }`
  Wrapped(Vec<GeneratedQuestion>),
  /// `{ "statement": ..., ... }`
  Single(GeneratedQuestion),
}

impl GeneratedPayload {
  /// Classify raw response text. Markdown code fences are tolerated.
  pub fn parse(text: &str) -> Result<Self, PayloadError> {
    let value: Value = serde_json::from_str(strip_fences(text))?;
    match value {
      Value::Array(items) => Ok(GeneratedPayload::Batch(items_from(items)?)),
      Value::Object(mut map) => match map.remove("questions") {
        Some(Value::Array(items)) => Ok(GeneratedPayload::Wrapped(items_from(items)?)),
        Some(other) => Err(PayloadError::SchemaMismatch(format!(
          "\"questions\" must be an array, got {}",
          json_type(&other)
        ))),
        None => Ok(GeneratedPayload::Single(serde_json::from_value(Value::Object(map))?)),
      },
      other => Err(PayloadError::SchemaMismatch(format!(
        "expected an array or an object, got {}",
        json_type(&other)
      ))),
    }
  }

  pub fn into_items(self) -> Vec<GeneratedQuestion> {
    match self {
      GeneratedPayload::Batch(items) | GeneratedPayload::Wrapped(items) => items,
      GeneratedPayload::Single(item) => vec![item],
    }
  }
}

fn items_from(values: Vec<Value>) -> Result<Vec<GeneratedQuestion>, PayloadError> {
  values
    .into_iter()
    .enumerate()
    .map(|(i, v)| match v {
      Value::Object(_) => Ok(serde_json::from_value(v)?),
      other => Err(PayloadError::SchemaMismatch(format!("item {i} is {}, not an object", json_type(&other)))),
    })
    .collect()
}

fn json_type(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

fn strip_fences(text: &str) -> &str {
  let t = text.trim();
  let t = t.strip_prefix("```json").or_else(|| t.strip_prefix("```")).unwrap_or(t);
  t.strip_suffix("```").unwrap_or(t).trim()
}

/// JSON shape shown to the model for each allowed kind.
fn shape_for(kind: QuestionKind) -> &'static str {
  match kind {
    QuestionKind::MultipleChoice => r#"multiple_choice:
{"statement": "...", "kind": "multiple_choice", "difficulty": "...", "commentary": "Correct answer: B. Justification: ...",
 "content": {"options": [{"id": "A", "text": "...", "isCorrect": false}, {"id": "B", "text": "...", "isCorrect": true},
                         {"id": "C", "text": "...", "isCorrect": false}, {"id": "D", "text": "...", "isCorrect": false}]}}"#,
    QuestionKind::TrueFalse => r#"true_false (isCorrect reflects the truth of the statement):
{"statement": "A complete claim to judge.", "kind": "true_false", "difficulty": "...", "commentary": "...",
 "content": {"options": [{"id": "true", "text": "True", "isCorrect": true}, {"id": "false", "text": "False", "isCorrect": false}]}}"#,
    QuestionKind::FillGap => r#"fill_gap (one gap marked ___, 3 plausible distractors from the same semantic field, no synonyms of the answer):
{"statement": "Sentence with a ___ gap.", "kind": "fill_gap", "difficulty": "...", "commentary": "...",
 "content": {"text_start": "...", "text_end": "...", "correct_answer": "Answer",
             "options": ["Answer", "Distractor 1", "Distractor 2", "Distractor 3"]}}"#,
  }
}

fn mode_style(mode: Mode) -> &'static str {
  match mode {
    Mode::LiveQuiz => "live quiz: short, direct statements (max 120 characters) and short options",
    Mode::Boss => "boss round: hard items must be multidisciplinary and demanding",
    Mode::Standard => "standard: detailed statements focused on applied reasoning",
  }
}

#[derive(Clone)]
pub struct GenerationFallback {
  generator: Arc<dyn Generator>,
  prompts: Prompts,
  batch_size: usize,
}

impl GenerationFallback {
  pub fn new(generator: Arc<dyn Generator>, prompts: Prompts, batch_size: usize) -> Self {
    Self { generator, prompts, batch_size: batch_size.max(1) }
  }

  /// Build one prompt per chunk. Correct-option positions are drawn here.
  pub fn chunk_prompts(&self, residual: &Recipe, brief: &GenerationBrief) -> Vec<(Vec<Slot>, String)> {
    let kinds = residual.kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
    let shapes = residual.kinds.iter().map(|k| shape_for(*k)).collect::<Vec<_>>().join("\n\n");
    let grounding = if brief.grounding.trim().is_empty() { "(none provided)" } else { brief.grounding.as_str() };
    let mut rng = rand::thread_rng();

    residual
      .slots
      .chunks(self.batch_size)
      .map(|chunk| {
        let difficulties = chunk.iter().map(|s| s.difficulty.as_str()).collect::<Vec<_>>().join(", ");
        let positions = chunk
          .iter()
          .map(|_| OPTION_LETTERS[rng.gen_range(0..OPTION_LETTERS.len())].to_string())
          .collect::<Vec<_>>()
          .join(", ");
        let count = chunk.len().to_string();
        let prompt = fill_template(
          &self.prompts.question_user_template,
          &[
            ("topic", brief.topic.as_str()),
            ("grounding", grounding),
            ("count", count.as_str()),
            ("difficulties", difficulties.as_str()),
            ("kinds", kinds.as_str()),
            ("positions", positions.as_str()),
            ("mode_style", mode_style(brief.mode)),
            ("shapes", shapes.as_str()),
          ],
        );
        (chunk.to_vec(), prompt)
      })
      .collect()
  }

  /// Generate items for every residual slot. Output length <= residual length.
  #[instrument(level = "info", skip(self, residual, brief), fields(slots = residual.len(), batch = self.batch_size, mode = brief.mode.as_str()))]
  pub async fn generate(&self, residual: &Recipe, brief: &GenerationBrief) -> Vec<(Slot, GeneratedQuestion)> {
    if residual.is_empty() {
      return Vec::new();
    }
    let chunks = self.chunk_prompts(residual, brief);
    let chunk_count = chunks.len();

    let calls = chunks
      .into_iter()
      .enumerate()
      .map(|(n, (slots, prompt))| self.run_chunk(n, slots, prompt));
    let merged: Vec<(Slot, GeneratedQuestion)> = join_all(calls).await.into_iter().flatten().collect();

    info!(target: "sourcing", chunks = chunk_count, requested = residual.len(), produced = merged.len(), "Generation fallback settled");
    merged
  }

  async fn run_chunk(&self, n: usize, slots: Vec<Slot>, prompt: String) -> Vec<(Slot, GeneratedQuestion)> {
    let start = std::time::Instant::now();
    let text = match self.generator.generate(&self.prompts.question_system, &prompt).await {
      Ok(t) => t,
      Err(e) => {
        error!(target: "sourcing", chunk = n, slots = slots.len(), elapsed = ?start.elapsed(), error = %e, "Generation call failed; chunk yields nothing");
        return Vec::new();
      }
    };
    let items = match GeneratedPayload::parse(&text) {
      Ok(p) => p.into_items(),
      Err(e) => {
        warn!(target: "sourcing", chunk = n, error = %e, body = %trunc_for_log(&text, 200), "Unreadable generation payload; chunk yields nothing");
        return Vec::new();
      }
    };
    if items.len() != slots.len() {
      warn!(target: "sourcing", chunk = n, expected = slots.len(), got = items.len(), "Generated item count differs from chunk size");
    }
    info!(target: "sourcing", chunk = n, items = items.len(), elapsed = ?start.elapsed(), "Chunk generated");
    slots.into_iter().zip(items).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;
  use crate::error::ServiceError;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use Difficulty::{Easy, Hard, Medium};

  /// Answers each prompt with `count` bare items, failing prompts that ask for `fail_count` items.
  struct CountingGenerator {
    calls: AtomicUsize,
    fail_count: Option<usize>,
  }

  fn requested_count(prompt: &str) -> usize {
    prompt
      .split("EXACTLY ")
      .nth(1)
      .and_then(|rest| rest.split_whitespace().next())
      .and_then(|n| n.parse().ok())
      .unwrap_or(0)
  }

  #[async_trait]
  impl Generator for CountingGenerator {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String, ServiceError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let n = requested_count(prompt);
      if Some(n) == self.fail_count {
        return Err(ServiceError::Unavailable("down".into()));
      }
      let items: Vec<String> = (0..n).map(|i| format!(r#"{{"statement": "item {i}"}}"#)).collect();
      Ok(format!("[{}]", items.join(",")))
    }
  }

  fn fallback(fail_count: Option<usize>) -> (Arc<CountingGenerator>, GenerationFallback) {
    let g = Arc::new(CountingGenerator { calls: AtomicUsize::new(0), fail_count });
    let f = GenerationFallback::new(g.clone(), Prompts::default(), 5);
    (g, f)
  }

  fn brief() -> GenerationBrief {
    GenerationBrief { topic: "Heart Failure".into(), grounding: String::new(), mode: Mode::Standard }
  }

  #[test]
  fn payload_shapes() {
    assert_eq!(GeneratedPayload::parse(r#"[{"statement": "a"}, {"statement": "b"}]"#).unwrap().into_items().len(), 2);
    assert!(matches!(
      GeneratedPayload::parse(r#"{"questions": [{"statement": "a"}]}"#).unwrap(),
      GeneratedPayload::Wrapped(ref v) if v.len() == 1
    ));
    let single = GeneratedPayload::parse("```json\n{\"statement\": \"a\", \"q_type\": \"true_false\"}\n```").unwrap();
    let items = single.into_items();
    assert_eq!(items[0].kind.as_deref(), Some("true_false"));
  }

  #[test]
  fn payload_schema_mismatch() {
    assert!(matches!(GeneratedPayload::parse("42"), Err(PayloadError::SchemaMismatch(_))));
    assert!(matches!(GeneratedPayload::parse(r#"["a"]"#), Err(PayloadError::SchemaMismatch(_))));
    assert!(matches!(GeneratedPayload::parse(r#"{"questions": "none"}"#), Err(PayloadError::SchemaMismatch(_))));
    assert!(matches!(GeneratedPayload::parse("not json"), Err(PayloadError::InvalidJson(_))));
  }

  #[test]
  fn prompts_are_chunked_in_slot_order() {
    let (_, f) = fallback(None);
    let recipe = Recipe::new(vec![Easy, Easy, Medium, Medium, Hard, Hard, Hard], vec![QuestionKind::MultipleChoice]);
    let chunks = f.chunk_prompts(&recipe, &brief());
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].0.len(), 5);
    assert_eq!(chunks[1].0[0].index, 5);
    assert!(chunks[0].1.contains("Difficulties (in order): easy, easy, medium, medium, hard"));
    assert!(chunks[1].1.contains("EXACTLY 2 items"));
    assert!(chunks[0].1.contains("multiple_choice:"));
    assert!(!chunks[0].1.contains("fill_gap ("));
  }

  #[tokio::test]
  async fn failed_chunk_does_not_abort_siblings() {
    let (g, f) = fallback(Some(2));
    let recipe = Recipe::new(vec![Medium; 7], QuestionKind::objective());
    let out = f.generate(&recipe, &brief()).await;
    assert_eq!(g.calls.load(Ordering::SeqCst), 2);
    assert_eq!(out.len(), 5);
    let indices: Vec<usize> = out.iter().map(|(s, _)| s.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn empty_residual_skips_generation() {
    let (g, f) = fallback(None);
    let out = f.generate(&Recipe::new(vec![], QuestionKind::objective()), &brief()).await;
    assert!(out.is_empty());
    assert_eq!(g.calls.load(Ordering::SeqCst), 0);
  }
}
