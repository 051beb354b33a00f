//! Append-only attempt log for one learner, keyed by lesson id.
//!
//! The tracker does no locking of its own; the engine serializes writes per
//! (learner, lesson) before they reach it.

use std::collections::HashMap;

use tracing::error;

use crate::domain::Attempt;
use crate::error::{EngineError, Result};

#[derive(Debug, Default)]
pub struct AttemptTracker {
  by_lesson: HashMap<String, Vec<Attempt>>,
}

impl AttemptTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail unless `attempt` can be appended: numbers must be strictly
  /// increasing per lesson.
  pub fn check_next(&self, attempt: &Attempt) -> Result<()> {
    let last = self.latest(&attempt.lesson_id).map(|a| a.attempt_number).unwrap_or(0);
    if attempt.attempt_number <= last {
      error!(
        target: "lesson",
        lesson_id = %attempt.lesson_id,
        attempt_number = attempt.attempt_number,
        last_recorded = last,
        "Rejected duplicate attempt number"
      );
      return Err(EngineError::DuplicateAttemptNumber {
        lesson_id: attempt.lesson_id.clone(),
        attempt_number: attempt.attempt_number,
      });
    }
    Ok(())
  }

  pub fn record(&mut self, attempt: Attempt) -> Result<()> {
    self.check_next(&attempt)?;
    self.by_lesson.entry(attempt.lesson_id.clone()).or_default().push(attempt);
    Ok(())
  }

  /// Move every log from `other` in, after the attempts already held.
  /// Used to install a lesson replayed into a scratch tracker.
  pub fn merge(&mut self, other: AttemptTracker) {
    for (lesson_id, log) in other.by_lesson {
      self.by_lesson.entry(lesson_id).or_default().extend(log);
    }
  }

  /// `1 + count of prior attempts` for the lesson.
  pub fn next_attempt_number(&self, lesson_id: &str) -> u32 {
    self.count(lesson_id) as u32 + 1
  }

  pub fn latest(&self, lesson_id: &str) -> Option<&Attempt> {
    self.by_lesson.get(lesson_id).and_then(|log| log.last())
  }

  pub fn attempts(&self, lesson_id: &str) -> &[Attempt] {
    self.by_lesson.get(lesson_id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn count(&self, lesson_id: &str) -> usize {
    self.by_lesson.get(lesson_id).map_or(0, Vec::len)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use chrono::Utc;

  use super::*;
  use crate::domain::{AttemptScores, Stage};

  fn attempt(lesson_id: &str, n: u32) -> Attempt {
    Attempt {
      id: format!("{lesson_id}-{n}"),
      lesson_id: lesson_id.into(),
      stage: Stage::MultipleChoice,
      submission_text: "draft".into(),
      attempt_number: n,
      scores: AttemptScores { overall: 5.0, criteria: BTreeMap::new() },
      passed: false,
      feedback: vec![],
      timestamp: Utc::now(),
    }
  }

  #[test]
  fn attempt_numbers_start_at_one_and_increase() {
    let mut tracker = AttemptTracker::new();
    assert_eq!(tracker.next_attempt_number("l1"), 1);
    assert!(tracker.latest("l1").is_none());

    tracker.record(attempt("l1", 1)).unwrap();
    assert_eq!(tracker.next_attempt_number("l1"), 2);
    assert_eq!(tracker.latest("l1").unwrap().id, "l1-1");
  }

  #[test]
  fn reused_number_is_rejected_and_history_kept() {
    let mut tracker = AttemptTracker::new();
    tracker.record(attempt("l1", 1)).unwrap();
    let err = tracker.record(attempt("l1", 1)).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateAttemptNumber { attempt_number: 1, .. }));
    assert_eq!(tracker.count("l1"), 1);
    assert_eq!(tracker.latest("l1").unwrap().id, "l1-1");
  }

  #[test]
  fn check_next_does_not_append() {
    let mut tracker = AttemptTracker::new();
    tracker.record(attempt("l1", 1)).unwrap();
    assert!(tracker.check_next(&attempt("l1", 2)).is_ok());
    assert!(tracker.check_next(&attempt("l1", 1)).is_err());
    assert_eq!(tracker.count("l1"), 1);
  }

  #[test]
  fn merge_installs_replayed_lessons() {
    let mut tracker = AttemptTracker::new();
    tracker.record(attempt("l1", 1)).unwrap();
    let mut scratch = AttemptTracker::new();
    scratch.record(attempt("l2", 1)).unwrap();
    scratch.record(attempt("l2", 2)).unwrap();
    tracker.merge(scratch);
    assert_eq!(tracker.count("l1"), 1);
    assert_eq!(tracker.next_attempt_number("l2"), 3);
  }

  #[test]
  fn lessons_are_independent() {
    let mut tracker = AttemptTracker::new();
    tracker.record(attempt("l1", 1)).unwrap();
    tracker.record(attempt("l1", 2)).unwrap();
    tracker.record(attempt("l2", 1)).unwrap();
    assert_eq!(tracker.next_attempt_number("l1"), 3);
    assert_eq!(tracker.next_attempt_number("l2"), 2);
    assert_eq!(tracker.attempts("l1").len(), 2);
    assert!(tracker.attempts("l3").is_empty());
  }
}
