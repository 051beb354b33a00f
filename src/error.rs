//! Error taxonomy for the practice engine and its judgment boundary.

use thiserror::Error;

use crate::domain::{Progress, Stage};

#[derive(Error, Debug)]
pub enum EngineError {
  /// Authoring defect. The lesson must not be served.
  #[error("Invalid rubric: {0}")]
  InvalidRubric(String),

  #[error("Missing score for criterion '{0}'")]
  MissingCriterion(String),

  #[error("Submission is empty")]
  EmptySubmission,

  /// Transient judge failure. Never recorded as a failing attempt.
  #[error("Evaluation unavailable: {0}")]
  EvaluationUnavailable(String),

  #[error("Submitted for stage {submitted} but the lesson is at {current}")]
  StageMismatch { submitted: Stage, current: Progress },

  #[error("Attempt #{attempt_number} is already recorded for lesson '{lesson_id}'")]
  DuplicateAttemptNumber { lesson_id: String, attempt_number: u32 },

  #[error("Unknown lesson: {0}")]
  UnknownLesson(String),

  #[error("Retry limit of {max_attempts} attempts reached for lesson '{lesson_id}'")]
  RetryLimitReached { lesson_id: String, max_attempts: u32 },

  #[error("Record store error: {0}")]
  Store(String),
}

impl EngineError {
  /// Stable snake_case label used on the wire and in logs.
  pub fn kind(&self) -> &'static str {
    match self {
      EngineError::InvalidRubric(_) => "invalid_rubric",
      EngineError::MissingCriterion(_) => "missing_criterion",
      EngineError::EmptySubmission => "empty_submission",
      EngineError::EvaluationUnavailable(_) => "evaluation_unavailable",
      EngineError::StageMismatch { .. } => "stage_mismatch",
      EngineError::DuplicateAttemptNumber { .. } => "duplicate_attempt_number",
      EngineError::UnknownLesson(_) => "unknown_lesson",
      EngineError::RetryLimitReached { .. } => "retry_limit_reached",
      EngineError::Store(_) => "store",
    }
  }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures reported by a judgment collaborator.
#[derive(Error, Debug)]
pub enum JudgeError {
  #[error("Transport error: {0}")]
  Transport(String),

  #[error("Judge HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Malformed judgment: {0}")]
  Malformed(String),
}

impl From<reqwest::Error> for JudgeError {
  fn from(e: reqwest::Error) -> Self {
    JudgeError::Transport(e.to_string())
  }
}

impl From<serde_json::Error> for JudgeError {
  fn from(e: serde_json::Error) -> Self {
    JudgeError::Malformed(e.to_string())
  }
}
