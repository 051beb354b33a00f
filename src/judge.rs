//! Judgment collaborators: map a submission to per-criterion scores.
//!
//! The scorer only sees the `Judge` trait. Two implementations ship:
//!   - `HeuristicJudge`: deterministic keyword/shape rules, no network
//!   - `OpenAiJudge` (see `openai.rs`): chat-completions in JSON mode
//!
//! `AnyJudge` picks one at startup depending on OPENAI_API_KEY.

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::JudgeError;
use crate::openai::OpenAiJudge;
use crate::rubric::{Criterion, MAX_SCORE};

/// Raw output of a judge, before weighting.
#[derive(Clone, Debug, Default)]
pub struct Judgment {
  pub scores: BTreeMap<String, f64>,
  /// Optional remark per criterion; the scorer templates missing ones.
  pub remarks: BTreeMap<String, String>,
}

pub trait Judge: Send + Sync {
  /// Score `submission` against each criterion on the 0-10 scale.
  fn evaluate(
    &self,
    criteria: &[Criterion],
    submission: &str,
    context: &serde_json::Value,
  ) -> impl Future<Output = Result<Judgment, JudgeError>> + Send;

  fn name(&self) -> &'static str;
}

/// Keyword and shape heuristics, in the spirit of the subject-line tester.
#[derive(Clone, Debug, Default)]
pub struct HeuristicJudge;

const BASE_SCORE: f64 = 5.0;
const KEYWORD_BONUS: f64 = 2.0;

impl HeuristicJudge {
  /// Score one criterion; returns the score and an optional remark.
  pub fn score_criterion(&self, criterion: &Criterion, submission: &str) -> (f64, Option<String>) {
    let lower = submission.to_lowercase();
    let mut score = BASE_SCORE;
    let mut notes: Vec<String> = vec![];

    if !criterion.keywords.is_empty() {
      let hits: Vec<&String> = criterion
        .keywords
        .iter()
        .filter(|k| lower.contains(&k.to_lowercase()))
        .collect();
      score += KEYWORD_BONUS * hits.len() as f64;
      if hits.is_empty() {
        notes.push(format!("Try working in: {}", criterion.keywords.join(", ")));
      }
    }

    let words = submission.split_whitespace().count();
    if words >= 4 { score += 1.0; } else { notes.push("Add more context".into()); }
    if submission.chars().any(|c| c.is_ascii_digit()) { score += 1.0; }

    let letters: Vec<char> = submission.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 3 && letters.iter().all(|c| c.is_uppercase()) {
      score -= 2.0;
      notes.push("Avoid ALL CAPS".into());
    }
    if submission.matches('!').count() > 1 {
      score -= 1.0;
      notes.push("Too many exclamation marks".into());
    }

    let score = score.clamp(0.0, MAX_SCORE);
    let remark = if notes.is_empty() {
      None
    } else {
      Some(format!("{}: {}", criterion.name, notes.join("; ")))
    };
    (score, remark)
  }
}

impl Judge for HeuristicJudge {
  async fn evaluate(
    &self,
    criteria: &[Criterion],
    submission: &str,
    _context: &serde_json::Value,
  ) -> Result<Judgment, JudgeError> {
    let mut judgment = Judgment::default();
    for c in criteria {
      let (score, remark) = self.score_criterion(c, submission);
      judgment.scores.insert(c.name.clone(), score);
      if let Some(r) = remark {
        judgment.remarks.insert(c.name.clone(), r);
      }
    }
    Ok(judgment)
  }

  fn name(&self) -> &'static str { "heuristic" }
}

/// Judge selected at startup.
#[derive(Clone)]
pub enum AnyJudge {
  Heuristic(HeuristicJudge),
  OpenAi(OpenAiJudge),
}

impl Judge for AnyJudge {
  async fn evaluate(
    &self,
    criteria: &[Criterion],
    submission: &str,
    context: &serde_json::Value,
  ) -> Result<Judgment, JudgeError> {
    match self {
      AnyJudge::Heuristic(j) => j.evaluate(criteria, submission, context).await,
      AnyJudge::OpenAi(j) => j.evaluate(criteria, submission, context).await,
    }
  }

  fn name(&self) -> &'static str {
    match self {
      AnyJudge::Heuristic(j) => j.name(),
      AnyJudge::OpenAi(j) => j.name(),
    }
  }
}

#[cfg(test)]
pub mod testing {
  //! Test doubles shared by the engine tests.

  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  use super::*;

  /// Replays queued judgments in order and counts calls.
  #[derive(Clone, Default)]
  pub struct StubJudge {
    pub calls: Arc<AtomicUsize>,
    queue: Arc<Mutex<Vec<Result<Judgment, String>>>>,
    delay: Option<Duration>,
  }

  impl StubJudge {
    pub fn new() -> Self { Self::default() }

    pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = Some(delay);
      self
    }

    pub fn push_scores(&self, pairs: &[(&str, f64)]) {
      let scores = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
      self.queue.lock().unwrap().insert(0, Ok(Judgment { scores, remarks: BTreeMap::new() }));
    }

    pub fn push_judgment(&self, judgment: Judgment) {
      self.queue.lock().unwrap().insert(0, Ok(judgment));
    }

    pub fn push_failure(&self, message: &str) {
      self.queue.lock().unwrap().insert(0, Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Judge for StubJudge {
    async fn evaluate(
      &self,
      _criteria: &[Criterion],
      _submission: &str,
      _context: &serde_json::Value,
    ) -> Result<Judgment, JudgeError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if let Some(d) = self.delay {
        tokio::time::sleep(d).await;
      }
      let next = self.queue.lock().unwrap().pop();
      match next {
        Some(Ok(j)) => Ok(j),
        Some(Err(m)) => Err(JudgeError::Transport(m)),
        None => Err(JudgeError::Malformed("stub queue is empty".into())),
      }
    }

    fn name(&self) -> &'static str { "stub" }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keywords_raise_the_score() {
    let judge = HeuristicJudge;
    let c = Criterion::new("Urgency", "Creates urgency", 1.0).with_keywords(&["today", "this month"]);
    let (with, remark) = judge.score_criterion(&c, "Your Impact: 500 Families Fed This Month");
    assert!(remark.is_none());
    let (without, remark) = judge.score_criterion(&c, "Your impact on local families");
    assert!(with > without);
    assert!(remark.unwrap().contains("today"));
  }

  #[test]
  fn shouting_is_penalised() {
    let judge = HeuristicJudge;
    let c = Criterion::new("Clarity", "", 1.0);
    let (calm, _) = judge.score_criterion(&c, "Help us feed families this week");
    let (loud, remark) = judge.score_criterion(&c, "HELP US FEED FAMILIES NOW!!");
    assert!(calm > loud);
    let remark = remark.unwrap();
    assert!(remark.contains("ALL CAPS"));
    assert!(remark.contains("exclamation"));
  }

  #[tokio::test]
  async fn heuristic_scores_every_criterion() {
    let criteria = vec![
      Criterion::new("Clarity", "", 0.5),
      Criterion::new("Urgency", "", 0.3),
      Criterion::new("Personalization", "", 0.2).with_keywords(&["[first name]", "you"]),
    ];
    let j = HeuristicJudge
      .evaluate(&criteria, "[First Name], your gift fed 500 families", &serde_json::Value::Null)
      .await
      .unwrap();
    assert_eq!(j.scores.len(), 3);
    assert!(j.scores.values().all(|s| (0.0..=MAX_SCORE).contains(s)));
    assert_eq!(j.scores["Personalization"], 10.0);
  }
}
