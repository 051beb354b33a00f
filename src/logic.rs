//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Listing and describing lessons
//!   - Submitting attempts (scoring, progression, mastery)
//!   - Progress queries and the "try another" restart
//!   - Mastery and toolkit queries

use tracing::{debug, instrument};

use crate::domain::Stage;
use crate::error::{EngineError, Result};
use crate::protocol::{to_out, AttemptOut, LessonOut, MasteryOut, ProgressOut, ToolkitOut};
use crate::state::AppState;

pub fn list_lessons(state: &AppState) -> Vec<LessonOut> {
  state.engine.catalog().lessons().iter().map(|l| to_out(l)).collect()
}

pub fn get_lesson(state: &AppState, lesson_id: &str) -> Result<LessonOut> {
  state
    .engine
    .catalog()
    .get(lesson_id)
    .map(|l| to_out(&l))
    .ok_or_else(|| EngineError::UnknownLesson(lesson_id.to_string()))
}

#[instrument(level = "info", skip_all, fields(%learner_id, %lesson_id, %stage, submission_len = submission.len()))]
pub async fn submit_attempt(
  state: &AppState,
  learner_id: &str,
  lesson_id: &str,
  stage: Stage,
  submission: &str,
) -> Result<AttemptOut> {
  let outcome = state.engine.submit(learner_id, lesson_id, stage, submission).await?;
  Ok(AttemptOut::from(outcome))
}

#[instrument(level = "debug", skip(state))]
pub async fn get_progress(state: &AppState, learner_id: &str, lesson_id: &str) -> Result<ProgressOut> {
  let attempt_count = state.engine.attempts(learner_id, lesson_id).await?.len();
  let latest_attempt = state.engine.latest_attempt(learner_id, lesson_id).await?;
  let progress = state.engine.current_stage(learner_id, lesson_id).await?;
  debug!(target: "lesson", %progress, attempt_count, "Progress read");
  Ok(ProgressOut {
    lesson_id: lesson_id.to_string(),
    progress,
    attempt_count,
    latest_attempt,
  })
}

#[instrument(level = "info", skip(state))]
pub async fn restart_lesson(state: &AppState, learner_id: &str, lesson_id: &str) -> Result<ProgressOut> {
  state.engine.restart(learner_id, lesson_id).await?;
  get_progress(state, learner_id, lesson_id).await
}

#[instrument(level = "debug", skip(state))]
pub async fn get_mastery(state: &AppState, learner_id: &str, skill_focus: Option<&str>) -> Result<MasteryOut> {
  let records = state.engine.mastery_records(learner_id).await?;
  let mastered = match skill_focus {
    Some(skill) => Some(state.engine.is_mastered(learner_id, skill).await?),
    None => None,
  };
  Ok(MasteryOut { learner_id: learner_id.to_string(), records, mastered })
}

#[instrument(level = "debug", skip(state))]
pub async fn get_toolkit(state: &AppState, learner_id: &str) -> ToolkitOut {
  let items = state.toolkit.items(learner_id).await;
  ToolkitOut { learner_id: learner_id.to_string(), items }
}
