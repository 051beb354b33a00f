//! Lesson catalog: validated lessons by id, in authoring order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::LessonCfg;
use crate::domain::MicroLesson;

#[derive(Clone, Debug, Default)]
pub struct LessonCatalog {
  by_id: HashMap<String, Arc<MicroLesson>>,
  order: Vec<String>,
}

impl LessonCatalog {
  /// Build from config entries. Lessons that fail validation are logged and
  /// left out; the first entry for an id wins.
  #[instrument(level = "info", skip_all, fields(entries = entries.len()))]
  pub fn from_configs(entries: Vec<LessonCfg>) -> Self {
    let mut catalog = Self::default();
    for cfg in entries {
      let id = cfg.id.clone();
      if catalog.by_id.contains_key(&id) {
        info!(target: "lesson", %id, "Lesson id already present; keeping the first definition");
        continue;
      }
      match cfg.into_lesson() {
        Ok(lesson) => catalog.insert(lesson),
        Err(e) => {
          error!(target: "lesson", %id, error = %e, "Skipping lesson: invalid definition");
        }
      }
    }
    catalog
  }

  pub fn insert(&mut self, lesson: MicroLesson) {
    let id = lesson.id.clone();
    if self.by_id.insert(id.clone(), Arc::new(lesson)).is_none() {
      self.order.push(id);
    }
  }

  pub fn get(&self, id: &str) -> Option<Arc<MicroLesson>> {
    self.by_id.get(id).cloned()
  }

  pub fn lessons(&self) -> Vec<Arc<MicroLesson>> {
    self.order.iter().filter_map(|id| self.by_id.get(id).cloned()).collect()
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rubric::Criterion;

  fn cfg(id: &str, weights: &[f64]) -> LessonCfg {
    LessonCfg {
      id: id.into(),
      title: id.into(),
      character: "Maya".into(),
      skill_focus: "skill".into(),
      starting_stage: None,
      context: serde_json::Value::Null,
      criteria: weights
        .iter()
        .enumerate()
        .map(|(i, w)| Criterion::new(format!("c{i}"), "", *w))
        .collect(),
      normalize_weights: false,
      retry: Default::default(),
    }
  }

  #[test]
  fn invalid_rubric_blocks_the_lesson() {
    let catalog = LessonCatalog::from_configs(vec![
      cfg("good", &[0.5, 0.5]),
      cfg("bad", &[0.3, 0.3, 0.3]),
    ]);
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("good").is_some());
    assert!(catalog.get("bad").is_none());
  }

  #[test]
  fn first_definition_wins_and_order_is_kept() {
    let mut second = cfg("a", &[1.0]);
    second.title = "shadowed".into();
    let catalog = LessonCatalog::from_configs(vec![cfg("b", &[1.0]), cfg("a", &[1.0]), second]);
    let ids: Vec<String> = catalog.lessons().iter().map(|l| l.id.clone()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(catalog.get("a").unwrap().title, "a");
  }
}
