//! Loading service configuration (engine tunables, prompts, job limits, topic catalog) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::NodeKind;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub jobs: JobsConfig,
  #[serde(default)]
  pub topics: Vec<TopicCfg>,
  #[serde(default)]
  pub mastery: Vec<MasteryCfg>,
}

/// Sourcing pipeline tunables.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Candidates requested from the vector store; larger than a recipe for rerank headroom.
  pub retrieval_count: usize,
  /// Single similarity floor for every retrieval (cosine similarity).
  pub min_similarity: f32,
  /// Residual slots per generative call.
  pub batch_size: usize,
  pub embedding_queue_capacity: usize,
  pub distance_weight: f32,
  pub keyword_weight: f32,
  /// Character ceiling of the compiled search text.
  pub search_ceiling: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      retrieval_count: 18,
      min_similarity: 0.75,
      batch_size: 5,
      embedding_queue_capacity: 256,
      distance_weight: 0.7,
      keyword_weight: 0.3,
      search_ceiling: 800,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
  pub migration_batch: usize,
  pub repair_batch: usize,
}

impl Default for JobsConfig {
  fn default() -> Self {
    Self { migration_batch: 20, repair_batch: 50 }
  }
}

/// Topic catalog entry.
#[derive(Clone, Debug, Deserialize)]
pub struct TopicCfg {
  pub id: String,
  pub title: String,
  #[serde(default)] pub context: String,
  #[serde(default)] pub parent: Option<String>,
  #[serde(default)] pub kind: NodeKind,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MasteryCfg {
  pub learner: String,
  pub topic: String,
  pub level: u8,
}

/// Prompts used for question generation. Override in TOML to tune tone or taxonomy.
/// Placeholders: {topic} {grounding} {count} {difficulties} {kinds} {mode_style} {positions} {shapes}
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub question_system: String,
  pub question_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You are the question generation engine of a study platform. Respond ONLY with strict JSON.\n\
        Difficulty taxonomy, apply it per item:\n\
        - easy: purely conceptual (definitions, mechanisms, structures). No scenarios or case stories.\n\
        - medium: bridge questions. A one-sentence scenario or isolated finding linking theory to practice.\n\
        - hard: full case vignettes with history and relevant findings, requiring multi-step reasoning."
        .into(),
      question_user_template: "Topic: {topic}\n\
        Grounding material (authoritative, prefer it over your own knowledge):\n{grounding}\n\n\
        Generate EXACTLY {count} items, one per line of the list below and in that order.\n\
        Difficulties (in order): {difficulties}\n\
        Allowed kinds: {kinds}\n\
        Correct option position per item (multiple_choice only): {positions}\n\
        Style: {mode_style}\n\n\
        Rules:\n\
        - Every item declares the exact difficulty requested for its position.\n\
        - multiple_choice has exactly 4 options with ids A, B, C, D and exactly ONE option with isCorrect=true.\n\
        - Never use \"all of the above\" or \"none of the above\". Avoid negative framing such as EXCEPT or \"is not\".\n\
        - Statements: easy 40-220 characters, medium/hard 90-450, fill_gap 30-300.\n\
        - commentary (at least 180 characters) starts with \"Correct answer: <id>.\" followed by \"Justification: ...\" and explains why the other options are wrong.\n\n\
        Return a JSON object {\"questions\": [...]} using these shapes:\n{shapes}"
        .into(),
    }
  }
}

/// Attempt to load `AppConfig` from QSOURCE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("QSOURCE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "qsource", %path, topics = cfg.topics.len(), "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "qsource", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "qsource", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
