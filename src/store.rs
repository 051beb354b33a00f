//! Persistence collaborator: where attempts and mastery records go.
//!
//! The engine only needs append + load. `MemoryStore` keeps everything in
//! process; a hosted backend would implement the same trait.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{Attempt, SkillMasteryRecord};
use crate::error::Result;

pub trait RecordStore: Send + Sync {
  fn save_attempt(&self, learner_id: &str, attempt: &Attempt) -> impl Future<Output = Result<()>> + Send;

  /// Attempts for one learner in one lesson, ordered by attempt number.
  fn load_attempts(&self, learner_id: &str, lesson_id: &str) -> impl Future<Output = Result<Vec<Attempt>>> + Send;

  fn save_mastery(&self, learner_id: &str, record: &SkillMasteryRecord) -> impl Future<Output = Result<()>> + Send;

  fn load_mastery(&self, learner_id: &str) -> impl Future<Output = Result<Vec<SkillMasteryRecord>>> + Send;
}

type LessonKey = (String, String);

#[derive(Clone, Default)]
pub struct MemoryStore {
  attempts: Arc<RwLock<HashMap<LessonKey, Vec<Attempt>>>>,
  mastery: Arc<RwLock<HashMap<String, HashMap<String, SkillMasteryRecord>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl RecordStore for MemoryStore {
  #[instrument(level = "debug", skip(self, attempt), fields(lesson_id = %attempt.lesson_id, attempt_number = attempt.attempt_number))]
  async fn save_attempt(&self, learner_id: &str, attempt: &Attempt) -> Result<()> {
    let key = (learner_id.to_string(), attempt.lesson_id.clone());
    self.attempts.write().await.entry(key).or_default().push(attempt.clone());
    debug!(target: "lesson", "Attempt stored");
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn load_attempts(&self, learner_id: &str, lesson_id: &str) -> Result<Vec<Attempt>> {
    let key = (learner_id.to_string(), lesson_id.to_string());
    let mut out = self.attempts.read().await.get(&key).cloned().unwrap_or_default();
    out.sort_by_key(|a| a.attempt_number);
    Ok(out)
  }

  #[instrument(level = "debug", skip(self, record), fields(skill = %record.skill_focus))]
  async fn save_mastery(&self, learner_id: &str, record: &SkillMasteryRecord) -> Result<()> {
    self
      .mastery
      .write()
      .await
      .entry(learner_id.to_string())
      .or_default()
      .insert(record.skill_focus.clone(), record.clone());
    Ok(())
  }

  #[instrument(level = "debug", skip(self))]
  async fn load_mastery(&self, learner_id: &str) -> Result<Vec<SkillMasteryRecord>> {
    let guard = self.mastery.read().await;
    Ok(guard.get(learner_id).map(|m| m.values().cloned().collect()).unwrap_or_default())
  }
}
