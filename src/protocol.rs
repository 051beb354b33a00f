//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Attempt, MicroLesson, Progress, SkillMasteryRecord, Stage};
use crate::engine::SubmitOutcome;
use crate::error::EngineError;
use crate::progression::Transition;
use crate::rubric::Criterion;
use crate::toolkit::ToolkitItem;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    ListLessons,
    SubmitAttempt {
        #[serde(rename = "learnerId")]
        learner_id: String,
        #[serde(rename = "lessonId")]
        lesson_id: String,
        stage: Stage,
        submission: String,
    },
    GetProgress {
        #[serde(rename = "learnerId")]
        learner_id: String,
        #[serde(rename = "lessonId")]
        lesson_id: String,
    },
    Restart {
        #[serde(rename = "learnerId")]
        learner_id: String,
        #[serde(rename = "lessonId")]
        lesson_id: String,
    },
    GetMastery {
        #[serde(rename = "learnerId")]
        learner_id: String,
        #[serde(rename = "skillFocus", default)]
        skill_focus: Option<String>,
    },
    /// Drops the in-flight submission, if any.
    Cancel,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Lessons {
        lessons: Vec<LessonOut>,
    },
    AttemptResult {
        result: AttemptOut,
    },
    Progress {
        progress: ProgressOut,
    },
    Mastery {
        mastery: MasteryOut,
    },
    Cancelled,
    Error {
        error: String,
        message: String,
    },
}

impl From<&EngineError> for ServerWsMessage {
    fn from(e: &EngineError) -> Self {
        ServerWsMessage::Error { error: e.kind().into(), message: e.to_string() }
    }
}

/// DTO used by both WS and HTTP for lesson delivery.
#[derive(Debug, Serialize)]
pub struct LessonOut {
    pub id: String,
    pub title: String,
    pub character: String,
    pub skill_focus: String,
    pub starting_stage: Stage,
    pub criteria: Vec<CriterionOut>,
    pub context: serde_json::Value,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CriterionOut {
    pub name: String,
    pub description: String,
    pub weight: f64,
}

impl From<&Criterion> for CriterionOut {
    fn from(c: &Criterion) -> Self {
        Self { name: c.name.clone(), description: c.description.clone(), weight: c.weight }
    }
}

/// Convert a `MicroLesson` (internal) to the public DTO. Heuristic keywords stay private.
pub fn to_out(l: &MicroLesson) -> LessonOut {
    LessonOut {
        id: l.id.clone(),
        title: l.title.clone(),
        character: l.character.clone(),
        skill_focus: l.skill_focus.clone(),
        starting_stage: l.scaffolding_stage,
        criteria: l.rubric.criteria().iter().map(CriterionOut::from).collect(),
        context: l.context.clone(),
        max_attempts: l.retry.max_attempts,
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptOut {
    pub attempt: Attempt,
    pub transition: Transition,
    pub progress: Progress,
    pub hint: Option<String>,
    pub mastery: Option<SkillMasteryRecord>,
}

impl From<SubmitOutcome> for AttemptOut {
    fn from(o: SubmitOutcome) -> Self {
        Self {
            attempt: o.attempt,
            transition: o.transition,
            progress: o.progress,
            hint: o.hint,
            mastery: o.mastery,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressOut {
    pub lesson_id: String,
    pub progress: Progress,
    pub attempt_count: usize,
    pub latest_attempt: Option<Attempt>,
}

#[derive(Debug, Serialize)]
pub struct MasteryOut {
    pub learner_id: String,
    pub records: Vec<SkillMasteryRecord>,
    /// Set when the query named a skill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mastered: Option<bool>,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptIn {
    pub learner_id: String,
    pub lesson_id: String,
    pub stage: Stage,
    pub submission: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub learner_id: String,
    pub lesson_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerQuery {
    pub learner_id: String,
    #[serde(default)]
    pub skill_focus: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToolkitOut {
    pub learner_id: String,
    pub items: Vec<ToolkitItem>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub judge: &'static str,
    pub lessons: usize,
}
