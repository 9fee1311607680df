//! Scope bridge: materialize the request's final set as scoped rows.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::domain::{NewScopedQuestion, ScopedQuestion};
use crate::error::SourcingError;
use crate::ingest::LinkedDraft;
use crate::store::ScopedStore;

pub struct ScopeBridge {
  scoped: Arc<dyn ScopedStore>,
}

impl ScopeBridge {
  pub fn new(scoped: Arc<dyn ScopedStore>) -> Self {
    Self { scoped }
  }

  /// Insert one scoped row per item in recipe order. Reward follows difficulty;
  /// items with a bank row keep it as their canonical link.
  #[instrument(level = "info", skip(self, items), fields(%topic_id, items = items.len()))]
  pub async fn persist(&self, topic_id: &str, mut items: Vec<LinkedDraft>) -> Result<Vec<ScopedQuestion>, SourcingError> {
    items.sort_by_key(|i| i.slot.index);
    let rows: Vec<NewScopedQuestion> = items
      .into_iter()
      .map(|item| NewScopedQuestion {
        topic_id: topic_id.to_string(),
        reward: item.draft.difficulty.reward(),
        draft: item.draft,
        original_question_id: item.bank_id,
      })
      .collect();

    let inserted = self.scoped.insert_scoped(rows).await.map_err(|e| {
      error!(target: "sourcing", %topic_id, error = %e, "Scoped insert failed");
      SourcingError::Bridge(e)
    })?;
    info!(target: "sourcing", %topic_id, rows = inserted.len(), "Scoped set persisted");
    Ok(inserted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, QuestionContent, QuestionDraft, QuestionKind};
  use crate::planner::Slot;
  use crate::store::MemoryStore;
  use uuid::Uuid;

  fn item(index: usize, difficulty: Difficulty, bank_id: Option<Uuid>) -> LinkedDraft {
    LinkedDraft {
      slot: Slot { index, difficulty },
      draft: QuestionDraft {
        statement: format!("item {index}"),
        kind: QuestionKind::MultipleChoice,
        difficulty,
        content: QuestionContent::default(),
        commentary: String::new(),
      },
      bank_id,
    }
  }

  #[tokio::test]
  async fn rows_follow_recipe_order_and_reward_rule() {
    let store = Arc::new(MemoryStore::new());
    let bank_id = Uuid::new_v4();
    let bridge = ScopeBridge::new(store.clone());
    let rows = bridge
      .persist("hf", vec![item(2, Difficulty::Hard, None), item(0, Difficulty::Easy, Some(bank_id)), item(1, Difficulty::Medium, None)])
      .await
      .unwrap();

    let statements: Vec<_> = rows.iter().map(|r| r.statement.as_str()).collect();
    assert_eq!(statements, vec!["item 0", "item 1", "item 2"]);
    assert_eq!(rows.iter().map(|r| r.reward).collect::<Vec<_>>(), vec![10, 10, 20]);
    assert_eq!(rows[0].original_question_id, Some(bank_id));
    assert_eq!(store.scoped_snapshot().await.len(), 3);
  }
}
