//! Context compilation: turns a topic node (and its parent) into
//!   (a) a bounded search string for semantic retrieval, and
//!   (b) the grounding text handed verbatim to the generation prompt.
//!
//! Extraction is marker-driven ("OBJECTIVE:", "ESSENTIAL CONTENT:", "RED FLAGS:",
//! Portuguese spellings included) and falls back to the first substantial line plus
//! any bullets. It never fails; the worst case is the title alone.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::TopicNode;

/// Contexts shorter than this carry no extractable structure.
const MIN_STRUCTURED_CONTEXT: usize = 100;
const OBJECTIVE_MAX_CHARS: usize = 100;
const ESSENTIAL_BULLETS: usize = 3;
const RED_FLAG_BULLETS: usize = 2;
const SUBSTANTIAL_LINE: usize = 20;

static OBJECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(?:OBJECTIVE|OBJETIVO)S?\b[:\s]*").expect("static regex")
});
static ESSENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(?:ESSENTIAL\s+CONTENT|CONTE[ÚU]DO\s+ESSENCIAL)\b[^:\n]*:?").expect("static regex")
});
static RED_FLAGS_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\bRED\s+FLAGS?\b[^:\n]*:?").expect("static regex")
});
static SECTION_STOP_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(?:ESSENTIAL\s+CONTENT|CONTE[ÚU]DO|RED\s+FLAGS?)\b").expect("static regex")
});
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-•*]\s+(.+)$").expect("static regex"));

/// Output of the compiler.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledContext {
  /// Search text for the embedding service, at most `ceiling` chars.
  pub search_text: String,
  /// Full free-text context of the node, used as generation grounding.
  pub grounding: String,
  /// Lexical tokens (node + parent titles) used by the reranker.
  pub keywords: Vec<String>,
}

/// Compile search + grounding text for `node`.
pub fn compile(node: &TopicNode, parent: Option<&TopicNode>, ceiling: usize) -> CompiledContext {
  let mut query = node.title.trim().to_string();
  if let Some(p) = parent.filter(|p| !p.title.trim().is_empty()) {
    query.push_str(&format!(" ({})", p.title.trim()));
  }

  let context = node.context.as_str();
  if context.chars().count() >= MIN_STRUCTURED_CONTEXT {
    for part in extract_passages(context) {
      query.push_str(" | ");
      query.push_str(&part);
    }
  }

  CompiledContext {
    search_text: truncate_chars(&query, ceiling),
    grounding: node.context.clone(),
    keywords: title_keywords(node, parent),
  }
}

/// Extract up to three labelled passages. Structured markers first, heuristics second.
fn extract_passages(context: &str) -> Vec<String> {
  let mut parts = Vec::new();

  let objective = objective_passage(context);
  let essential = bullets_after(&ESSENTIAL_RE, context, ESSENTIAL_BULLETS);
  let red_flags = bullets_after(&RED_FLAGS_RE, context, RED_FLAG_BULLETS);

  if objective.is_none() && essential.is_empty() {
    if let Some(line) = context.lines().map(str::trim).find(|l| l.chars().count() > SUBSTANTIAL_LINE) {
      parts.push(format!("OBJECTIVE: {}", truncate_chars(strip_bullet(line), OBJECTIVE_MAX_CHARS)));
    }
    let bullets: Vec<String> = context
      .lines()
      .filter_map(|l| BULLET_RE.captures(l).map(|c| c[1].trim().to_string()))
      .take(ESSENTIAL_BULLETS)
      .collect();
    if !bullets.is_empty() {
      parts.push(format!("ESSENTIAL: {}", bullets.join("; ")));
    }
  } else {
    if let Some(o) = objective {
      parts.push(format!("OBJECTIVE: {}", o));
    }
    if !essential.is_empty() {
      parts.push(format!("ESSENTIAL: {}", essential.join("; ")));
    }
  }

  if !red_flags.is_empty() {
    parts.push(format!("RED FLAGS: {}", red_flags.join("; ")));
  }
  parts
}

/// Text following the objective marker, on the same line or the next non-empty one,
/// cut at the next section marker.
fn objective_passage(context: &str) -> Option<String> {
  let m = OBJECTIVE_RE.find(context)?;
  let rest = &context[m.end()..];
  let line = rest.lines().map(str::trim).find(|l| !l.is_empty())?;
  let line = match SECTION_STOP_RE.find(line) {
    Some(stop) => line[..stop.start()].trim(),
    None => line,
  };
  if line.is_empty() {
    return None;
  }
  Some(truncate_chars(line, OBJECTIVE_MAX_CHARS))
}

/// Consecutive bullet lines after a section marker (blank lines allowed before the first).
fn bullets_after(marker: &Regex, context: &str, limit: usize) -> Vec<String> {
  let Some(m) = marker.find(context) else { return Vec::new() };
  let mut out = Vec::new();
  for line in context[m.end()..].lines() {
    if line.trim().is_empty() {
      if out.is_empty() { continue; }
      break;
    }
    match BULLET_RE.captures(line) {
      Some(c) => out.push(c[1].trim().to_string()),
      None => break,
    }
    if out.len() == limit {
      break;
    }
  }
  out
}

fn strip_bullet(line: &str) -> &str {
  line.trim_start_matches(['-', '•', '*']).trim_start()
}

/// Lowercased title tokens longer than three characters, deduplicated.
pub fn title_keywords(node: &TopicNode, parent: Option<&TopicNode>) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  let titles = std::iter::once(node.title.as_str()).chain(parent.map(|p| p.title.as_str()));
  for title in titles {
    for token in title.split_whitespace() {
      let token: String = token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
      if token.chars().count() > 3 && !out.contains(&token) {
        out.push(token);
      }
    }
  }
  out
}

/// Char-boundary safe truncation.
pub fn truncate_chars(s: &str, max: usize) -> String {
  s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::NodeKind;

  fn node(title: &str, context: &str) -> TopicNode {
    TopicNode {
      id: "n1".into(),
      title: title.into(),
      context: context.into(),
      parent_id: None,
      kind: NodeKind::Objective,
    }
  }

  #[test]
  fn short_context_degrades_to_titles() {
    let parent = node("Cardiology", "");
    let out = compile(&node("Heart Failure", "tiny"), Some(&parent), 800);
    assert_eq!(out.search_text, "Heart Failure (Cardiology)");
    assert_eq!(out.grounding, "tiny");
  }

  #[test]
  fn structured_markers_are_extracted() {
    let ctx = "OBJECTIVE: Recognise decompensated heart failure at the bedside\n\
               ESSENTIAL CONTENT:\n\
               - NYHA functional classes\n\
               - Congestion signs\n\
               - BNP interpretation\n\
               - Diuretic titration\n\
               RED FLAGS:\n\
               - Cardiogenic shock\n\
               - Flash pulmonary oedema\n\
               - Arrhythmia\n";
    let out = compile(&node("Heart Failure", ctx), None, 800);
    assert_eq!(
      out.search_text,
      "Heart Failure | OBJECTIVE: Recognise decompensated heart failure at the bedside \
       | ESSENTIAL: NYHA functional classes; Congestion signs; BNP interpretation \
       | RED FLAGS: Cardiogenic shock; Flash pulmonary oedema"
    );
  }

  #[test]
  fn portuguese_markers_are_recognised() {
    let ctx = "OBJETIVO: Identificar sinais de insuficiência cardíaca descompensada no pronto-socorro\n\
               CONTEÚDO ESSENCIAL:\n- Classes NYHA\n- Sinais de congestão\n";
    let out = compile(&node("IC", ctx), None, 800);
    assert!(out.search_text.contains("OBJECTIVE: Identificar sinais"));
    assert!(out.search_text.contains("ESSENTIAL: Classes NYHA; Sinais de congestão"));
  }

  #[test]
  fn unstructured_context_uses_fallback() {
    let ctx = "short\nThe renin-angiotensin system regulates blood pressure and volume.\n\
               * Angiotensin II vasoconstriction\n* Aldosterone sodium retention\nmore free text here";
    let out = compile(&node("RAAS", ctx), None, 800);
    assert!(out.search_text.starts_with("RAAS | OBJECTIVE: The renin-angiotensin system"));
    assert!(out.search_text.ends_with("ESSENTIAL: Angiotensin II vasoconstriction; Aldosterone sodium retention"));
  }

  #[test]
  fn search_text_respects_ceiling() {
    let ctx = format!("OBJECTIVE: {}\n", "x".repeat(500));
    let out = compile(&node("Title", &ctx), None, 40);
    assert_eq!(out.search_text.chars().count(), 40);
  }

  #[test]
  fn keywords_skip_short_tokens() {
    let parent = node("Acute Care", "");
    let kw = title_keywords(&node("Sepsis and the ICU", ""), Some(&parent));
    assert_eq!(kw, vec!["sepsis", "acute", "care"]);
  }
}
