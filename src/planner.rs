//! Recipe planning: how many questions of which difficulty and kind a request needs.

use crate::domain::{Difficulty, Mode, QuestionKind};

use Difficulty::{Easy, Hard, Medium};

/// One slot of a recipe. `index` is the position in the original recipe and
/// survives when the recipe shrinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
  pub index: usize,
  pub difficulty: Difficulty,
}

/// Ordered slots still to fill, plus the kinds allowed to fill them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipe {
  pub slots: Vec<Slot>,
  pub kinds: Vec<QuestionKind>,
}

impl Recipe {
  pub fn new(difficulties: Vec<Difficulty>, kinds: Vec<QuestionKind>) -> Self {
    let slots = difficulties
      .into_iter()
      .enumerate()
      .map(|(index, difficulty)| Slot { index, difficulty })
      .collect();
    Self { slots, kinds }
  }

  pub fn len(&self) -> usize { self.slots.len() }

  pub fn is_empty(&self) -> bool { self.slots.is_empty() }

  pub fn difficulties(&self) -> Vec<Difficulty> {
    self.slots.iter().map(|s| s.difficulty).collect()
  }

  pub fn allows(&self, kind: QuestionKind) -> bool {
    self.kinds.contains(&kind)
  }
}

/// Inputs to the planner. `needed` short-circuits every template.
#[derive(Clone, Debug, Default)]
pub struct PlanRequest {
  pub mode: Option<Mode>,
  pub needed: Option<Vec<Difficulty>>,
  pub forced_kinds: Option<Vec<QuestionKind>>,
  pub mastery: Option<u8>,
}

/// Difficulty mixture for `standard` mode by learner mastery.
/// Unknown mastery uses the level-2 mixture.
pub fn mastery_mixture(level: Option<u8>) -> Vec<Difficulty> {
  match level {
    Some(0) => vec![Easy, Easy, Easy, Medium, Medium],
    Some(1) => vec![Easy, Easy, Medium, Medium, Hard],
    Some(2) | None => vec![Easy, Medium, Medium, Hard, Hard],
    Some(_) => vec![Medium, Medium, Hard, Hard, Hard],
  }
}

/// Build the recipe for a request. Always non-empty.
pub fn plan(req: &PlanRequest) -> Recipe {
  let mode = req.mode.unwrap_or(Mode::Standard);
  let explicit = req.needed.as_ref().filter(|n| !n.is_empty()).cloned();

  let (template, kinds) = match mode {
    Mode::Boss => {
      let mut d = vec![Medium; 5];
      d.extend([Hard; 5]);
      (d, QuestionKind::objective())
    }
    Mode::LiveQuiz => (vec![Medium, Medium, Hard, Hard, Hard], vec![QuestionKind::MultipleChoice]),
    Mode::Standard => {
      let kinds = req
        .forced_kinds
        .as_ref()
        .filter(|k| !k.is_empty())
        .cloned()
        .unwrap_or_else(QuestionKind::objective);
      // Mastery is only consulted when the caller did not already name the gaps.
      let mixture = if explicit.is_some() { Vec::new() } else { mastery_mixture(req.mastery) };
      (mixture, kinds)
    }
  };

  Recipe::new(explicit.unwrap_or(template), kinds)
}
