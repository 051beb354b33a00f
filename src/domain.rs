//! Domain models used by the engine: stages, lessons, attempts, and mastery.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rubric::Rubric;

/// Scaffolding stage of a lesson, from most guided to most open.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  MultipleChoice,
  FillInBlank,
  GuidedTemplate,
  FreeFormWithHints,
}

impl Stage {
  pub const ORDER: [Stage; 4] = [
    Stage::MultipleChoice,
    Stage::FillInBlank,
    Stage::GuidedTemplate,
    Stage::FreeFormWithHints,
  ];

  /// The following stage, or None after `FreeFormWithHints`.
  pub fn next(self) -> Option<Stage> {
    Stage::ORDER.get(self as usize + 1).copied()
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Stage::MultipleChoice => "multiple_choice",
      Stage::FillInBlank => "fill_in_blank",
      Stage::GuidedTemplate => "guided_template",
      Stage::FreeFormWithHints => "free_form_with_hints",
    }
  }
}

impl Default for Stage {
  fn default() -> Self { Stage::MultipleChoice }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where a learner stands in one lesson.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum Progress {
  Stage(Stage),
  Complete,
}

impl Progress {
  pub fn stage(self) -> Option<Stage> {
    match self {
      Progress::Stage(s) => Some(s),
      Progress::Complete => None,
    }
  }

  pub fn is_complete(self) -> bool {
    matches!(self, Progress::Complete)
  }
}

impl fmt::Display for Progress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Progress::Stage(s) => s.fmt(f),
      Progress::Complete => f.write_str("complete"),
    }
  }
}

/// Retry bookkeeping authored per lesson.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
  /// None means unlimited attempts.
  #[serde(default)]
  pub max_attempts: Option<u32>,
  /// One hint per consecutive failure at the current stage.
  #[serde(default)]
  pub hint_progression: Vec<String>,
  #[serde(default)]
  pub fallback_guidance: Option<String>,
}

impl RetryPolicy {
  /// Hint for the n-th consecutive failure (1-based).
  pub fn hint_for_failure(&self, consecutive_failures: usize) -> Option<String> {
    if consecutive_failures == 0 {
      return None;
    }
    self
      .hint_progression
      .get(consecutive_failures - 1)
      .cloned()
      .or_else(|| self.fallback_guidance.clone())
  }
}

/// A single-skill practice lesson. Read-only once loaded.
#[derive(Clone, Debug, Serialize)]
pub struct MicroLesson {
  pub id: String,
  pub title: String,
  pub character: String,
  pub skill_focus: String,
  pub scaffolding_stage: Stage,
  pub rubric: Rubric,
  /// Opaque to the engine; handed to the judge as-is.
  pub context: serde_json::Value,
  pub retry: RetryPolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AttemptScores {
  pub overall: f64,
  pub criteria: BTreeMap<String, f64>,
}

/// One scored submission. Append-only; never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attempt {
  pub id: String,
  pub lesson_id: String,
  pub stage: Stage,
  pub submission_text: String,
  pub attempt_number: u32,
  pub scores: AttemptScores,
  pub passed: bool,
  pub feedback: Vec<String>,
  pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SkillMasteryRecord {
  pub skill_focus: String,
  pub best_score: f64,
  pub mastered_at: Option<DateTime<Utc>>,
}

/// Emitted whenever a mastery record is created or improved.
#[derive(Clone, Debug, Serialize)]
pub struct MasteryEvent {
  pub learner_id: String,
  pub skill_focus: String,
  pub lesson_title: String,
  pub best_score: f64,
  pub first_time: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stage_order_is_fixed() {
    let mut walked = vec![Stage::MultipleChoice];
    while let Some(n) = walked.last().copied().and_then(Stage::next) {
      walked.push(n);
    }
    assert_eq!(walked, Stage::ORDER.to_vec());
  }

  #[test]
  fn progress_serializes_tagged() {
    let json = serde_json::to_value(Progress::Stage(Stage::FillInBlank)).unwrap();
    assert_eq!(json, serde_json::json!({ "state": "stage", "stage": "fill_in_blank" }));
    let json = serde_json::to_value(Progress::Complete).unwrap();
    assert_eq!(json, serde_json::json!({ "state": "complete" }));
  }

  #[test]
  fn hints_progress_then_fall_back() {
    let retry = RetryPolicy {
      max_attempts: None,
      hint_progression: vec!["first".into(), "second".into()],
      fallback_guidance: Some("together".into()),
    };
    assert_eq!(retry.hint_for_failure(0), None);
    assert_eq!(retry.hint_for_failure(1).as_deref(), Some("first"));
    assert_eq!(retry.hint_for_failure(2).as_deref(), Some("second"));
    assert_eq!(retry.hint_for_failure(3).as_deref(), Some("together"));
    assert_eq!(RetryPolicy::default().hint_for_failure(1), None);
  }
}
