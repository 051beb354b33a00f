//! Toolkit shelf: turns mastery events into saved toolkit items.
//!
//! One item per (learner, skill). A later, better score updates the item in place.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::MasteryEvent;

#[derive(Clone, Debug, Serialize)]
pub struct ToolkitItem {
  pub id: String,
  pub learner_id: String,
  pub skill_focus: String,
  pub name: String,
  pub description: String,
  pub best_score: f64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct ToolkitShelf {
  items: Arc<RwLock<HashMap<String, Vec<ToolkitItem>>>>,
}

impl ToolkitShelf {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn apply(&self, event: &MasteryEvent) -> ToolkitItem {
    let now = Utc::now();
    let mut items = self.items.write().await;
    let shelf = items.entry(event.learner_id.clone()).or_default();
    if let Some(item) = shelf.iter_mut().find(|i| i.skill_focus == event.skill_focus) {
      item.best_score = item.best_score.max(event.best_score);
      item.description = describe(&item.skill_focus, item.best_score);
      item.updated_at = now;
      return item.clone();
    }
    let item = ToolkitItem {
      id: Uuid::new_v4().to_string(),
      learner_id: event.learner_id.clone(),
      skill_focus: event.skill_focus.clone(),
      name: format!("{} toolkit", event.lesson_title),
      description: describe(&event.skill_focus, event.best_score),
      best_score: event.best_score,
      created_at: now,
      updated_at: now,
    };
    shelf.push(item.clone());
    item
  }

  pub async fn items(&self, learner_id: &str) -> Vec<ToolkitItem> {
    self.items.read().await.get(learner_id).cloned().unwrap_or_default()
  }

  /// Consume mastery events until the engine goes away.
  pub fn spawn_listener(&self, mut events: broadcast::Receiver<MasteryEvent>) -> tokio::task::JoinHandle<()> {
    let shelf = self.clone();
    tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(event) => {
            let item = shelf.apply(&event).await;
            info!(target: "lyra_mentor", learner_id = %item.learner_id, skill = %item.skill_focus, item_id = %item.id, "Toolkit item saved");
          }
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(target: "lyra_mentor", skipped, "Toolkit listener lagged; events dropped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }
}

fn describe(skill_focus: &str, best_score: f64) -> String {
  format!("Mastered '{}' with a best score of {:.1}/10.", skill_focus, best_score)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn event(learner: &str, skill: &str, score: f64) -> MasteryEvent {
    MasteryEvent {
      learner_id: learner.into(),
      skill_focus: skill.into(),
      lesson_title: "Subject Line Mastery".into(),
      best_score: score,
      first_time: true,
    }
  }

  #[tokio::test]
  async fn one_item_per_skill() {
    let shelf = ToolkitShelf::new();
    let first = shelf.apply(&event("ana", "subject-lines", 8.6)).await;
    let again = shelf.apply(&event("ana", "subject-lines", 9.3)).await;
    assert_eq!(first.id, again.id);
    assert_eq!(again.best_score, 9.3);
    assert!(again.description.contains("9.3/10"));
    assert_eq!(shelf.items("ana").await[0].description, again.description);
    shelf.apply(&event("ana", "donor-thanks", 8.8)).await;

    assert_eq!(shelf.items("ana").await.len(), 2);
    assert!(shelf.items("ben").await.is_empty());
  }

  #[tokio::test]
  async fn listener_saves_broadcast_events() {
    let shelf = ToolkitShelf::new();
    let (tx, rx) = broadcast::channel(8);
    let handle = shelf.spawn_listener(rx);
    tx.send(event("ana", "subject-lines", 9.0)).unwrap();
    drop(tx);
    handle.await.unwrap();
    let items = shelf.items("ana").await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Subject Line Mastery toolkit");
  }
}
