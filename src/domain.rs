//! Domain models: topic hierarchy, difficulty/kind vocabularies, bank and scoped questions.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Difficulty label of a recipe slot or a question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }

  /// Lenient parse used on model output (case and whitespace tolerant).
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }

  /// Reward weight granted for answering a question of this difficulty.
  pub fn reward(self) -> u32 {
    match self {
      Difficulty::Hard => 20,
      _ => 10,
    }
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Question formats the engine knows how to source and validate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  MultipleChoice,
  TrueFalse,
  FillGap,
}

impl QuestionKind {
  pub fn as_str(self) -> &'static str {
    match self {
      QuestionKind::MultipleChoice => "multiple_choice",
      QuestionKind::TrueFalse => "true_false",
      QuestionKind::FillGap => "fill_gap",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "multiple_choice" => Some(QuestionKind::MultipleChoice),
      "true_false" => Some(QuestionKind::TrueFalse),
      "fill_gap" | "fill_gap_select" => Some(QuestionKind::FillGap),
      _ => None,
    }
  }

  /// Objective formats, usable in every mode.
  pub fn objective() -> Vec<QuestionKind> {
    vec![QuestionKind::MultipleChoice, QuestionKind::TrueFalse, QuestionKind::FillGap]
  }
}

impl fmt::Display for QuestionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Generation mode requested by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  Standard,
  Boss,
  LiveQuiz,
}

impl Mode {
  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Standard => "standard",
      Mode::Boss => "boss",
      Mode::LiveQuiz => "live_quiz",
    }
  }
}

/// Position of a node in the curriculum hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Area,
  Theme,
  #[default]
  Module,
  Objective,
}

/// Hierarchical content unit. Read-only input to a sourcing request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicNode {
  pub id: String,
  pub title: String,
  /// Free-text pedagogical context; also the grounding material for generation.
  #[serde(default)]
  pub context: String,
  #[serde(default)]
  pub parent_id: Option<String>,
  #[serde(default)]
  pub kind: NodeKind,
}

/// One answer option. Accepts a bare string (fill-gap style) or a full object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawOption")]
pub struct AnswerOption {
  pub id: String,
  pub text: String,
  #[serde(rename = "isCorrect")]
  pub is_correct: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
  Text(String),
  Full {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    text: String,
    #[serde(default, rename = "isCorrect", alias = "is_correct")]
    is_correct: bool,
  },
}

impl From<RawOption> for AnswerOption {
  fn from(raw: RawOption) -> Self {
    match raw {
      RawOption::Text(text) => AnswerOption { id: String::new(), text, is_correct: false },
      RawOption::Full { id, text, is_correct } => {
        // Models occasionally emit boolean ids for true/false items.
        let id = match id {
          Some(serde_json::Value::String(s)) => s,
          Some(serde_json::Value::Bool(b)) => b.to_string(),
          Some(other) => other.to_string(),
          None => String::new(),
        };
        AnswerOption { id, text, is_correct }
      }
    }
  }
}

/// Kind-specific structured content of a question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionContent {
  #[serde(default)]
  pub options: Vec<AnswerOption>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correct_answer: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text_start: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text_end: Option<String>,
}

impl QuestionContent {
  pub fn correct_count(&self) -> usize {
    self.options.iter().filter(|o| o.is_correct).count()
  }
}

/// Where a bank row came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
  AiAutoGen,
  MigrationLegacy,
  Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
  Pending,
  Completed,
  Failed,
}

/// Canonical question shared across all scopes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BankQuestion {
  pub id: Uuid,
  pub statement: String,
  pub kind: QuestionKind,
  pub difficulty: Difficulty,
  pub content: QuestionContent,
  pub commentary: String,
  pub topics: Vec<String>,
  pub provenance: Provenance,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub embedding: Option<Vec<f32>>,
  pub embedding_status: EmbeddingStatus,
}

/// Insert shape for the bank. Rows with an embedding are stored as `completed`.
#[derive(Clone, Debug)]
pub struct NewBankQuestion {
  pub draft: QuestionDraft,
  pub topics: Vec<String>,
  pub provenance: Provenance,
  pub embedding: Option<Vec<f32>>,
}

/// Per-topic working copy served to learners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScopedQuestion {
  pub id: Uuid,
  pub topic_id: String,
  pub statement: String,
  pub kind: QuestionKind,
  pub difficulty: Difficulty,
  pub content: QuestionContent,
  pub commentary: String,
  pub reward: u32,
  #[serde(default)]
  pub original_question_id: Option<Uuid>,
}

#[derive(Clone, Debug)]
pub struct NewScopedQuestion {
  pub topic_id: String,
  pub draft: QuestionDraft,
  pub reward: u32,
  pub original_question_id: Option<Uuid>,
}

/// A fully typed question body, either reused from the bank or admitted by the quality gate.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionDraft {
  pub statement: String,
  pub kind: QuestionKind,
  pub difficulty: Difficulty,
  pub content: QuestionContent,
  pub commentary: String,
}

impl From<&BankQuestion> for QuestionDraft {
  fn from(q: &BankQuestion) -> Self {
    QuestionDraft {
      statement: q.statement.clone(),
      kind: q.kind,
      difficulty: q.difficulty,
      content: q.content.clone(),
      commentary: q.commentary.clone(),
    }
  }
}

impl From<&ScopedQuestion> for QuestionDraft {
  fn from(q: &ScopedQuestion) -> Self {
    QuestionDraft {
      statement: q.statement.clone(),
      kind: q.kind,
      difficulty: q.difficulty,
      content: q.content.clone(),
      commentary: q.commentary.clone(),
    }
  }
}

/// Raw item as returned by the generative service. Every field is optional so
/// that incomplete items reach the quality gate instead of failing the parse.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GeneratedQuestion {
  #[serde(default)]
  pub statement: Option<String>,
  #[serde(default, alias = "q_type", alias = "type")]
  pub kind: Option<String>,
  #[serde(default)]
  pub difficulty: Option<String>,
  #[serde(default)]
  pub content: QuestionContent,
  #[serde(default)]
  pub commentary: Option<String>,
}

impl GeneratedQuestion {
  /// Typed view of the item; `None` when a required field is missing or unknown.
  pub fn to_draft(&self) -> Option<QuestionDraft> {
    let statement = self.statement.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    Some(QuestionDraft {
      statement: statement.to_string(),
      kind: QuestionKind::parse(self.kind.as_deref()?)?,
      difficulty: Difficulty::parse(self.difficulty.as_deref()?)?,
      content: self.content.clone(),
      commentary: self.commentary.clone().unwrap_or_default(),
    })
  }
}
