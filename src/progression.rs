//! Stage progression for one learner in one lesson.
//!
//! Strictly forward: a pass advances exactly one stage, a fail stays put,
//! and nothing ever moves back except an explicit `restart`.

use serde::Serialize;

use crate::domain::{Attempt, Progress, Stage};
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
  Advanced { from: Stage, to: Stage },
  Retry { stage: Stage },
  Completed { from: Stage },
}

#[derive(Clone, Debug)]
pub struct StageMachine {
  start: Stage,
  current: Progress,
  /// Failures since the last pass or restart.
  consecutive_failures: usize,
}

impl StageMachine {
  pub fn new(start: Stage) -> Self {
    Self { start, current: Progress::Stage(start), consecutive_failures: 0 }
  }

  pub fn current(&self) -> Progress {
    self.current
  }

  pub fn consecutive_failures(&self) -> usize {
    self.consecutive_failures
  }

  /// Reject a submission aimed at any stage but the current one.
  pub fn check(&self, submitted: Stage) -> Result<()> {
    match self.current.stage() {
      Some(s) if s == submitted => Ok(()),
      _ => Err(EngineError::StageMismatch { submitted, current: self.current }),
    }
  }

  pub fn apply(&mut self, attempt: &Attempt) -> Result<Transition> {
    self.check(attempt.stage)?;
    let from = attempt.stage;
    if !attempt.passed {
      self.consecutive_failures += 1;
      return Ok(Transition::Retry { stage: from });
    }
    self.consecutive_failures = 0;
    Ok(match from.next() {
      Some(to) => {
        self.current = Progress::Stage(to);
        Transition::Advanced { from, to }
      }
      None => {
        self.current = Progress::Complete;
        Transition::Completed { from }
      }
    })
  }

  /// Explicit "try another": back to the starting stage.
  pub fn restart(&mut self) {
    self.current = Progress::Stage(self.start);
    self.consecutive_failures = 0;
  }
}
