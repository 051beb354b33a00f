//! Scores one submission against one lesson's rubric.
//!
//! The judge supplies raw per-criterion numbers; everything after that is
//! deterministic: clamping, weighting, pass/fail, and feedback.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{Attempt, AttemptScores, MicroLesson, Stage};
use crate::error::{EngineError, Result};
use crate::judge::Judge;
use crate::rubric::MAX_SCORE;

/// Absorbs float noise from weighted sums sitting on a threshold.
const THRESHOLD_EPSILON: f64 = 1e-9;

pub fn meets(score: f64, threshold: f64) -> bool {
  score + THRESHOLD_EPSILON >= threshold
}

#[derive(Clone, Copy, Debug)]
pub struct ScoringPolicy {
  pub pass_threshold: f64,
  pub needs_improvement_cutoff: f64,
}

impl Default for ScoringPolicy {
  fn default() -> Self {
    Self { pass_threshold: 7.5, needs_improvement_cutoff: 7.5 }
  }
}

pub struct Scorer<J> {
  judge: J,
  policy: ScoringPolicy,
}

impl<J: Judge> Scorer<J> {
  pub fn new(judge: J, policy: ScoringPolicy) -> Self {
    Self { judge, policy }
  }

  pub fn judge(&self) -> &J {
    &self.judge
  }

  /// Produce a fully populated, not yet recorded, `Attempt`.
  #[instrument(level = "info", skip_all, fields(lesson_id = %lesson.id, %stage, attempt_number = attempt_number, submission_len = submission.len()))]
  pub async fn score(
    &self,
    lesson: &MicroLesson,
    stage: Stage,
    submission: &str,
    attempt_number: u32,
  ) -> Result<Attempt> {
    let text = submission.trim();
    if text.is_empty() {
      return Err(EngineError::EmptySubmission);
    }

    let criteria = lesson.rubric.criteria();
    let judgment = self
      .judge
      .evaluate(criteria, text, &lesson.context)
      .await
      .map_err(|e| {
        warn!(target: "lesson", judge = self.judge.name(), error = %e, "Judge failed");
        EngineError::EvaluationUnavailable(e.to_string())
      })?;

    let mut scores = BTreeMap::new();
    for c in criteria {
      let raw = match judgment.scores.get(&c.name) {
        Some(v) => *v,
        None => {
          let missing = EngineError::MissingCriterion(c.name.clone());
          warn!(target: "lesson", judge = self.judge.name(), error = %missing, "Incomplete judgment");
          return Err(EngineError::EvaluationUnavailable(missing.to_string()));
        }
      };
      if !raw.is_finite() {
        return Err(EngineError::EvaluationUnavailable(format!(
          "non-numeric score for criterion '{}'",
          c.name
        )));
      }
      scores.insert(c.name.clone(), raw.clamp(0.0, MAX_SCORE));
    }

    let overall = lesson.rubric.weighted_score(&scores)?;
    let passed = meets(overall, self.policy.pass_threshold);

    let feedback: Vec<String> = criteria
      .iter()
      .filter(|c| !meets(scores[&c.name], self.policy.needs_improvement_cutoff))
      .map(|c| {
        judgment.remarks.get(&c.name).cloned().unwrap_or_else(|| {
          format!("{} needs work ({:.1}/10): {}", c.name, scores[&c.name], c.description)
        })
      })
      .collect();

    debug!(target: "lesson", overall = %format!("{:.2}", overall), passed, remarks = feedback.len(), "Submission scored");

    Ok(Attempt {
      id: Uuid::new_v4().to_string(),
      lesson_id: lesson.id.clone(),
      stage,
      submission_text: text.to_string(),
      attempt_number,
      scores: AttemptScores { overall, criteria: scores },
      passed,
      feedback,
      timestamp: Utc::now(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::RetryPolicy;
  use crate::judge::testing::StubJudge;
  use crate::judge::Judgment;
  use crate::rubric::{Criterion, Rubric};

  fn lesson(criteria: Vec<Criterion>) -> MicroLesson {
    MicroLesson {
      id: "subject-line-mastery".into(),
      title: "Subject Line Mastery".into(),
      character: "Maya".into(),
      skill_focus: "subject-lines".into(),
      scaffolding_stage: Stage::MultipleChoice,
      rubric: Rubric::new(criteria).unwrap(),
      context: serde_json::Value::Null,
      retry: RetryPolicy::default(),
    }
  }

  fn single() -> MicroLesson {
    lesson(vec![Criterion::new("Clarity", "Says what happened", 1.0)])
  }

  #[tokio::test]
  async fn pass_threshold_is_inclusive() {
    let judge = StubJudge::new();
    judge.push_scores(&[("Clarity", 7.5)]);
    judge.push_scores(&[("Clarity", 7.49)]);
    let scorer = Scorer::new(judge, ScoringPolicy::default());
    let l = single();

    let at = scorer.score(&l, Stage::MultipleChoice, "hello", 1).await.unwrap();
    assert_eq!(at.scores.overall, 7.5);
    assert!(at.passed);

    let below = scorer.score(&l, Stage::MultipleChoice, "hello", 2).await.unwrap();
    assert!(!below.passed);
  }

  #[tokio::test]
  async fn empty_submission_never_reaches_judge() {
    let judge = StubJudge::new();
    let scorer = Scorer::new(judge.clone(), ScoringPolicy::default());
    let l = single();

    assert!(matches!(scorer.score(&l, Stage::MultipleChoice, "", 1).await, Err(EngineError::EmptySubmission)));
    assert!(matches!(scorer.score(&l, Stage::MultipleChoice, "   \n", 1).await, Err(EngineError::EmptySubmission)));
    assert_eq!(judge.call_count(), 0);
  }

  #[tokio::test]
  async fn judge_failure_is_unavailable_not_failing() {
    let judge = StubJudge::new();
    judge.push_failure("connection reset");
    let scorer = Scorer::new(judge, ScoringPolicy::default());
    let err = scorer.score(&single(), Stage::MultipleChoice, "hello", 1).await.unwrap_err();
    assert!(matches!(err, EngineError::EvaluationUnavailable(_)));
  }

  #[tokio::test]
  async fn incomplete_judgment_is_unavailable() {
    let judge = StubJudge::new();
    judge.push_scores(&[("Clarity", 9.0)]);
    let scorer = Scorer::new(judge, ScoringPolicy::default());
    let l = lesson(vec![Criterion::new("Clarity", "", 0.5), Criterion::new("Urgency", "", 0.5)]);
    match scorer.score(&l, Stage::MultipleChoice, "hello", 1).await {
      Err(EngineError::EvaluationUnavailable(msg)) => assert!(msg.contains("Urgency")),
      other => panic!("expected EvaluationUnavailable, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn non_finite_score_is_unavailable() {
    let judge = StubJudge::new();
    judge.push_scores(&[("Clarity", f64::NAN)]);
    let scorer = Scorer::new(judge, ScoringPolicy::default());
    let err = scorer.score(&single(), Stage::MultipleChoice, "hello", 1).await.unwrap_err();
    assert!(matches!(err, EngineError::EvaluationUnavailable(_)));
  }

  #[tokio::test]
  async fn feedback_covers_each_weak_criterion_in_rubric_order() {
    let judge = StubJudge::new();
    let mut j = Judgment::default();
    j.scores.insert("Clarity".into(), 9.0);
    j.scores.insert("Urgency".into(), 5.0);
    j.scores.insert("Personalization".into(), 6.0);
    j.remarks.insert("Personalization".into(), "Address the donor by name.".into());
    judge.push_judgment(j);
    let scorer = Scorer::new(judge, ScoringPolicy::default());
    let l = lesson(vec![
      Criterion::new("Clarity", "Says what happened", 0.5),
      Criterion::new("Urgency", "Gives a reason to open now", 0.3),
      Criterion::new("Personalization", "Speaks to the reader", 0.2),
    ]);

    let at = scorer.score(&l, Stage::GuidedTemplate, "  Our month in review ", 4).await.unwrap();
    assert_eq!(at.feedback.len(), 2);
    assert!(at.feedback[0].starts_with("Urgency"));
    assert_eq!(at.feedback[1], "Address the donor by name.");
    assert_eq!(at.submission_text, "Our month in review");
    assert_eq!(at.stage, Stage::GuidedTemplate);
    assert_eq!(at.attempt_number, 4);
  }

  #[tokio::test]
  async fn out_of_range_scores_are_clamped() {
    let judge = StubJudge::new();
    judge.push_scores(&[("Clarity", 12.0)]);
    let scorer = Scorer::new(judge, ScoringPolicy::default());
    let at = scorer.score(&single(), Stage::MultipleChoice, "hello", 1).await.unwrap();
    assert_eq!(at.scores.criteria["Clarity"], MAX_SCORE);
    assert_eq!(at.scores.overall, MAX_SCORE);
  }
}
