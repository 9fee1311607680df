//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve the engine and its callers independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, Mode, QuestionKind, ScopedQuestion};
use crate::engine::{SourceRequest, SourceResult};
use crate::quality::RetrySlot;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIn {
    pub topic_id: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub needed_difficulties: Option<Vec<Difficulty>>,
    #[serde(default)]
    pub forced_kinds: Option<Vec<QuestionKind>>,
    #[serde(default)]
    pub learner_id: Option<String>,
}

fn default_mode() -> Mode {
    Mode::Standard
}

impl From<SourceIn> for SourceRequest {
    fn from(body: SourceIn) -> Self {
        SourceRequest {
            topic_id: body.topic_id,
            mode: body.mode,
            needed_difficulties: body.needed_difficulties,
            forced_kinds: body.forced_kinds,
            learner_id: body.learner_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOut {
    pub success: bool,
    pub count: usize,
    pub items: Vec<ScopedQuestionOut>,
    pub from_cache: bool,
    pub source: String,
    pub retry: Vec<RetrySlot>,
    pub abandoned: usize,
}

impl From<SourceResult> for SourceOut {
    fn from(r: SourceResult) -> Self {
        SourceOut {
            success: r.success,
            count: r.count,
            items: r.items.into_iter().map(ScopedQuestionOut::from).collect(),
            from_cache: r.from_cache,
            source: r.source,
            retry: r.retry,
            abandoned: r.abandoned,
        }
    }
}

/// Wire view of a scoped question.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedQuestionOut {
    pub id: String,
    pub topic_id: String,
    pub statement: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub difficulty: Difficulty,
    pub content: crate::domain::QuestionContent,
    pub commentary: String,
    pub reward: u32,
    pub original_question_id: Option<String>,
}

impl From<ScopedQuestion> for ScopedQuestionOut {
    fn from(q: ScopedQuestion) -> Self {
        ScopedQuestionOut {
            id: q.id.to_string(),
            topic_id: q.topic_id,
            statement: q.statement,
            kind: q.kind,
            difficulty: q.difficulty,
            content: q.content,
            commentary: q.commentary,
            reward: q.reward,
            original_question_id: q.original_question_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}
