//! Quality gate for generated questions.
//!
//! Each check carries a severity. Only `Critical` rejects; `Warning`/`Info`
//! pass with a note. Rejected items land in a retry ledger with their recipe
//! slot index and expected difficulty so the caller can re-request exactly those.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::{Difficulty, GeneratedQuestion, QuestionDraft, QuestionKind};
use crate::planner::Slot;

const COMMENTARY_MIN_CHARS: usize = 180;
const OPTION_MIN_CHARS: usize = 12;
const MCQ_OPTIONS: usize = 4;
const FILL_GAP_MIN_OPTIONS: usize = 4;
const ALLOWED_OPTION_IDS: [&str; 6] = ["A", "B", "C", "D", "TRUE", "FALSE"];

static ALL_NONE_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(?:all|none)\s+of\s+the\s+(?:above|previous)\b|todas\s+(?:as\s+)?(?:anteriores|acima)|nenhuma\s+das\s+anteriores")
    .expect("static regex")
});
static CORRECT_MARKER_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)(?:correct\s+answer|resposta\s+correta)\s*:").expect("static regex"));
static JUSTIFICATION_MARKER_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)(?:justification|justificativa)\s*:").expect("static regex"));
static NEGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\bexcept\b|\bis\s+not\b|\bincorrect\b|\bexceto\b|\bnão\s+é\b|\bincorret[oa]\b").expect("static regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Info,
  Warning,
  Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
  pub valid: bool,
  pub severity: Severity,
  pub issues: Vec<String>,
}

#[derive(Default)]
struct Findings {
  severity: Option<Severity>,
  issues: Vec<String>,
}

impl Findings {
  fn flag(&mut self, severity: Severity, issue: impl Into<String>) {
    self.issues.push(issue.into());
    self.severity = Some(self.severity.map_or(severity, |s| s.max(severity)));
  }

  fn verdict(self) -> Verdict {
    let severity = self.severity.unwrap_or(Severity::Info);
    Verdict { valid: severity != Severity::Critical, severity, issues: self.issues }
  }
}

/// Inclusive statement length band for a (difficulty, kind) pair.
pub fn statement_band(difficulty: Difficulty, kind: QuestionKind) -> (usize, usize) {
  match (kind, difficulty) {
    (QuestionKind::FillGap, _) => (30, 300),
    (_, Difficulty::Easy) => (40, 220),
    (_, Difficulty::Medium | Difficulty::Hard) => (90, 450),
  }
}

/// Run every check against one generated item.
pub fn validate_question(q: &GeneratedQuestion, expected: Option<Difficulty>) -> Verdict {
  let mut f = Findings::default();

  let statement = q.statement.as_deref().map(str::trim).unwrap_or_default();
  let kind_raw = q.kind.as_deref().map(str::trim).unwrap_or_default();
  let difficulty_raw = q.difficulty.as_deref().map(str::trim).unwrap_or_default();
  if statement.is_empty() || kind_raw.is_empty() || difficulty_raw.is_empty() {
    f.flag(Severity::Critical, "Missing required fields (statement, kind, difficulty)");
    return f.verdict();
  }
  let Some(kind) = QuestionKind::parse(kind_raw) else {
    f.flag(Severity::Critical, format!("Unsupported question kind '{kind_raw}'"));
    return f.verdict();
  };
  let Some(difficulty) = Difficulty::parse(difficulty_raw) else {
    f.flag(Severity::Critical, format!("Unknown difficulty '{difficulty_raw}'"));
    return f.verdict();
  };

  let (min, max) = statement_band(difficulty, kind);
  let len = statement.chars().count();
  if len < min {
    f.flag(Severity::Critical, format!("Statement too short ({len} chars, min {min} for {difficulty})"));
  }
  if len > max {
    f.flag(Severity::Warning, format!("Statement too long ({len} chars, max {max})"));
  }

  match kind {
    QuestionKind::MultipleChoice => check_multiple_choice(q, &mut f),
    QuestionKind::TrueFalse => check_true_false(q, &mut f),
    QuestionKind::FillGap => check_fill_gap(q, &mut f),
  }

  let commentary = q.commentary.as_deref().unwrap_or_default();
  let commentary_len = commentary.trim().chars().count();
  if commentary_len < COMMENTARY_MIN_CHARS {
    f.flag(
      Severity::Critical,
      format!("Commentary too short ({commentary_len} chars, min {COMMENTARY_MIN_CHARS})"),
    );
  }
  if !commentary.is_empty()
    && (!CORRECT_MARKER_RE.is_match(commentary) || !JUSTIFICATION_MARKER_RE.is_match(commentary))
  {
    f.flag(Severity::Warning, "Commentary misses the \"Correct answer:\" or \"Justification:\" marker");
  }

  if let Some(expected) = expected {
    if expected != difficulty {
      f.flag(Severity::Critical, format!("Wrong difficulty (expected {expected}, got {difficulty})"));
    }
  }

  if NEGATIVE_RE.is_match(statement) {
    f.flag(Severity::Warning, "Avoid negative framing in the statement (EXCEPT, is not, ...)");
  }

  f.verdict()
}

fn check_multiple_choice(q: &GeneratedQuestion, f: &mut Findings) {
  let options = &q.content.options;
  if options.len() != MCQ_OPTIONS {
    f.flag(Severity::Critical, format!("Multiple choice needs exactly 4 options (has {})", options.len()));
  }
  let correct = q.content.correct_count();
  if correct != 1 {
    f.flag(Severity::Critical, format!("Exactly one option must be correct (has {correct})"));
  }

  let short = options.iter().filter(|o| o.text.trim().chars().count() < OPTION_MIN_CHARS).count();
  if short > 0 {
    f.flag(Severity::Warning, format!("{short} option(s) shorter than {OPTION_MIN_CHARS} chars"));
  }

  let mut seen = HashSet::new();
  if !options.iter().all(|o| seen.insert(o.text.trim().to_lowercase())) {
    f.flag(Severity::Critical, "Duplicate option text");
  }

  if options.iter().any(|o| ALL_NONE_RE.is_match(&o.text)) {
    f.flag(Severity::Warning, "Avoid \"all of the above\" / \"none of the above\" options");
  }

  let invalid: Vec<&str> = options
    .iter()
    .filter(|o| !ALLOWED_OPTION_IDS.contains(&o.id.trim().to_ascii_uppercase().as_str()))
    .map(|o| o.id.as_str())
    .collect();
  if !invalid.is_empty() {
    f.flag(Severity::Critical, format!("Invalid option ids: {}", invalid.join(", ")));
  }
}

fn check_true_false(q: &GeneratedQuestion, f: &mut Findings) {
  let options = &q.content.options;
  if options.len() != 2 || q.content.correct_count() != 1 {
    f.flag(Severity::Critical, "True/false needs two options with exactly one correct");
  }
}

fn check_fill_gap(q: &GeneratedQuestion, f: &mut Findings) {
  if q.content.correct_answer.as_deref().map_or(true, |a| a.trim().is_empty()) {
    f.flag(Severity::Critical, "Fill-gap item needs a correct_answer");
  }
  if q.content.options.len() < FILL_GAP_MIN_OPTIONS {
    f.flag(Severity::Critical, "Fill-gap item needs at least 4 options (answer + 3 distractors)");
  }
}

/// A recipe slot that still needs content, with the reason it is open.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySlot {
  pub index: usize,
  pub expected_difficulty: Difficulty,
  pub reason: RetryReason,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryReason {
  /// The quality gate rejected the generated item.
  Rejected { issues: Vec<String> },
  /// No item came back for the slot (call or parse failure, short batch).
  Missing,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchStats {
  pub total: usize,
  pub passed: usize,
  pub failed: usize,
  pub warnings: usize,
  pub critical_issues: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct BatchReport {
  pub accepted: Vec<(Slot, QuestionDraft)>,
  pub rejected: Vec<RetrySlot>,
  pub stats: BatchStats,
}

/// Validate items against the difficulty of the slot each was generated for
/// and the kinds the recipe allows.
pub fn validate_batch(items: Vec<(Slot, GeneratedQuestion)>, allowed: &[QuestionKind]) -> BatchReport {
  let mut report = BatchReport::default();
  report.stats.total = items.len();

  for (slot, q) in items {
    let mut verdict = validate_question(&q, Some(slot.difficulty));
    if let Some(kind) = q.kind.as_deref().and_then(QuestionKind::parse) {
      if !allowed.contains(&kind) {
        verdict.valid = false;
        verdict.severity = Severity::Critical;
        verdict.issues.push(format!("Kind '{kind}' is not allowed for this request"));
      }
    }
    match q.to_draft().filter(|_| verdict.valid) {
      Some(draft) => {
        if verdict.severity == Severity::Warning {
          report.stats.warnings += 1;
        }
        report.accepted.push((slot, draft));
      }
      None => {
        report.stats.critical_issues.extend(verdict.issues.iter().cloned());
        report.rejected.push(RetrySlot {
          index: slot.index,
          expected_difficulty: slot.difficulty,
          reason: RetryReason::Rejected { issues: verdict.issues },
        });
      }
    }
  }

  report.stats.passed = report.accepted.len();
  report.stats.failed = report.rejected.len();
  report
}
