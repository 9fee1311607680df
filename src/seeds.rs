//! Built-in demo catalog so the service is usable without a TOML config.

use crate::domain::{NodeKind, TopicNode};

fn node(id: &str, title: &str, parent: Option<&str>, kind: NodeKind, context: &str) -> TopicNode {
  TopicNode {
    id: id.into(),
    title: title.into(),
    context: context.into(),
    parent_id: parent.map(Into::into),
    kind,
  }
}

/// A small cardiology branch: area -> theme -> module -> objective.
pub fn seed_topics() -> Vec<TopicNode> {
  vec![
    node("internal-medicine", "Internal Medicine", None, NodeKind::Area, ""),
    node("cardiology", "Cardiology", Some("internal-medicine"), NodeKind::Theme, ""),
    node(
      "heart-failure",
      "Heart Failure",
      Some("cardiology"),
      NodeKind::Module,
      "OBJECTIVE: Recognize and manage acute decompensated and chronic heart failure in adults.\n\
       ESSENTIAL CONTENT:\n\
       - Classification by ejection fraction and NYHA functional class\n\
       - Loop diuretics for congestion and the four pillars of HFrEF therapy\n\
       - Natriuretic peptides in diagnosis and follow-up\n\
       - Precipitating factors of decompensation\n\
       RED FLAGS:\n\
       - Cardiogenic shock with hypoperfusion\n\
       - Acute pulmonary oedema with respiratory failure",
    ),
    node(
      "hf-acute-management",
      "Acute Decompensation Management",
      Some("heart-failure"),
      NodeKind::Objective,
      "Initial approach to the congested patient: oxygen targets, intravenous loop diuretics, \
       vasodilators when blood pressure allows, and criteria for inotropes or ICU admission.",
    ),
    node(
      "atrial-fibrillation",
      "Atrial Fibrillation",
      Some("cardiology"),
      NodeKind::Module,
      "OBJECTIVE: Choose rate or rhythm control and stratify thromboembolic risk.\n\
       ESSENTIAL CONTENT:\n\
       - CHA2DS2-VASc and bleeding risk scores\n\
       - Beta blockers and calcium channel blockers for rate control\n\
       - Indications for electrical cardioversion",
    ),
  ]
}
