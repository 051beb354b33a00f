//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument};

use crate::error::EngineError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

pub fn status_for(e: &EngineError) -> StatusCode {
  match e {
    EngineError::EmptySubmission => StatusCode::UNPROCESSABLE_ENTITY,
    EngineError::StageMismatch { .. } => StatusCode::CONFLICT,
    EngineError::UnknownLesson(_) => StatusCode::NOT_FOUND,
    EngineError::EvaluationUnavailable(_) | EngineError::MissingCriterion(_) => StatusCode::SERVICE_UNAVAILABLE,
    EngineError::RetryLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
    EngineError::InvalidRubric(_)
    | EngineError::DuplicateAttemptNumber { .. }
    | EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for EngineError {
  fn into_response(self) -> Response {
    let status = status_for(&self);
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
      error!(target: "lyra_mentor", error = %self, "Request failed");
    }
    let body = ErrorOut { error: self.kind().into(), message: self.to_string() };
    (status, Json(body)).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    judge: state.engine.judge_name(),
    lessons: state.engine.catalog().len(),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_lessons(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(list_lessons(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_lesson(
  State(state): State<Arc<AppState>>,
  Path(lesson_id): Path<String>,
) -> Result<Json<LessonOut>, EngineError> {
  get_lesson(&state, &lesson_id).map(Json)
}

#[instrument(level = "info", skip(state, body), fields(learner_id = %body.learner_id, lesson_id = %body.lesson_id, stage = %body.stage, submission_len = body.submission.len()))]
pub async fn http_post_attempt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AttemptIn>,
) -> Result<Json<AttemptOut>, EngineError> {
  let out = submit_attempt(&state, &body.learner_id, &body.lesson_id, body.stage, &body.submission).await?;
  info!(
    target: "lesson",
    lesson_id = %body.lesson_id,
    passed = out.attempt.passed,
    overall = %format!("{:.1}", out.attempt.scores.overall),
    progress = %out.progress,
    "HTTP attempt evaluated"
  );
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(learner_id = %q.learner_id, lesson_id = %q.lesson_id))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProgressQuery>,
) -> Result<Json<ProgressOut>, EngineError> {
  get_progress(&state, &q.learner_id, &q.lesson_id).await.map(Json)
}

#[instrument(level = "info", skip(state, body), fields(learner_id = %body.learner_id, lesson_id = %body.lesson_id))]
pub async fn http_post_restart(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProgressQuery>,
) -> Result<Json<ProgressOut>, EngineError> {
  restart_lesson(&state, &body.learner_id, &body.lesson_id).await.map(Json)
}

#[instrument(level = "info", skip(state), fields(learner_id = %q.learner_id))]
pub async fn http_get_mastery(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LearnerQuery>,
) -> Result<Json<MasteryOut>, EngineError> {
  get_mastery(&state, &q.learner_id, q.skill_focus.as_deref()).await.map(Json)
}

#[instrument(level = "info", skip(state), fields(learner_id = %q.learner_id))]
pub async fn http_get_toolkit(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LearnerQuery>,
) -> impl IntoResponse {
  Json(get_toolkit(&state, &q.learner_id).await)
}
