//! Greedy slot filling from ranked candidates.

use std::collections::HashSet;

use uuid::Uuid;

use crate::planner::{Recipe, Slot};
use crate::retriever::Candidate;

/// A slot bound to a reused bank question.
#[derive(Clone, Debug)]
pub struct FilledSlot {
  pub slot: Slot,
  pub candidate: Candidate,
}

#[derive(Clone, Debug)]
pub struct FillOutcome {
  pub filled: Vec<FilledSlot>,
  /// Unfilled slots, original order and indices preserved.
  pub residual: Recipe,
}

/// For each slot in order, take the first candidate with the slot's difficulty,
/// an allowed kind and an unused id. Earlier slots get first pick.
pub fn fill_slots(candidates: &[Candidate], recipe: &Recipe, used: &mut HashSet<Uuid>) -> FillOutcome {
  let mut filled = Vec::new();
  let mut open = Vec::new();

  for slot in &recipe.slots {
    let pick = candidates.iter().find(|c| {
      c.question.difficulty == slot.difficulty
        && recipe.allows(c.question.kind)
        && !used.contains(&c.question.id)
    });
    match pick {
      Some(c) => {
        used.insert(c.question.id);
        filled.push(FilledSlot { slot: *slot, candidate: c.clone() });
      }
      None => open.push(*slot),
    }
  }

  FillOutcome {
    filled,
    residual: Recipe { slots: open, kinds: recipe.kinds.clone() },
  }
}
