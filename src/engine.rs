//! The practice engine: single source of truth for lesson progress.
//!
//! An `Engine` owns the lesson catalog, the scorer, per-learner state, the
//! record store, and the mastery event channel. Callers construct one and
//! share it (typically behind `Arc` in `AppState`).
//!
//! Concurrency:
//!   - one async gate per (learner, lesson) serializes submissions end to end
//!   - learner state sits behind an RwLock that is never held across the judge call
//!   - different lessons and learners score in parallel
//!
//! Nothing is committed until the judge has answered, so a timed-out or
//! dropped `submit` during judging leaves no trace. Once judged, the commit
//! (store write, history, stage, mastery) runs on its own task that keeps the
//! gate, so dropping `submit` at that point still lets it finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn, Instrument, Span};

use crate::catalog::LessonCatalog;
use crate::config::EngineCfg;
use crate::domain::{Attempt, MasteryEvent, MicroLesson, Progress, SkillMasteryRecord, Stage};
use crate::error::{EngineError, Result};
use crate::judge::Judge;
use crate::mastery::MasteryAggregator;
use crate::progression::{StageMachine, Transition};
use crate::scorer::{Scorer, ScoringPolicy};
use crate::store::RecordStore;
use crate::tracker::AttemptTracker;

const EVENT_BUFFER: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct EnginePolicy {
  pub scoring: ScoringPolicy,
  pub mastery_threshold: f64,
  pub evaluation_timeout: Option<Duration>,
}

impl Default for EnginePolicy {
  fn default() -> Self {
    Self::from(&EngineCfg::default())
  }
}

impl From<&EngineCfg> for EnginePolicy {
  fn from(cfg: &EngineCfg) -> Self {
    Self {
      scoring: ScoringPolicy {
        pass_threshold: cfg.pass_threshold,
        needs_improvement_cutoff: cfg.needs_improvement_cutoff,
      },
      mastery_threshold: cfg.mastery_threshold,
      evaluation_timeout: cfg.evaluation_timeout(),
    }
  }
}

/// Result of one recorded submission.
#[derive(Clone, Debug, Serialize)]
pub struct SubmitOutcome {
  pub attempt: Attempt,
  pub transition: Transition,
  pub progress: Progress,
  /// Retry hint when the attempt failed.
  pub hint: Option<String>,
  /// Set when this attempt created or improved a mastery record.
  pub mastery: Option<SkillMasteryRecord>,
}

struct LearnerState {
  tracker: AttemptTracker,
  /// A lesson is hydrated once it has a machine here.
  stages: HashMap<String, StageMachine>,
  mastery: MasteryAggregator,
}

impl LearnerState {
  fn new(mastery: MasteryAggregator) -> Self {
    Self { tracker: AttemptTracker::new(), stages: HashMap::new(), mastery }
  }
}

type SessionKey = (String, String);
type Learners = Arc<RwLock<HashMap<String, LearnerState>>>;

pub struct Engine<J, S> {
  catalog: LessonCatalog,
  scorer: Scorer<J>,
  store: S,
  policy: EnginePolicy,
  learners: Learners,
  gates: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
  events: broadcast::Sender<MasteryEvent>,
}

impl<J: Judge, S: RecordStore + Clone + 'static> Engine<J, S> {
  pub fn new(catalog: LessonCatalog, judge: J, store: S, policy: EnginePolicy) -> Self {
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    Self {
      catalog,
      scorer: Scorer::new(judge, policy.scoring),
      store,
      policy,
      learners: Arc::new(RwLock::new(HashMap::new())),
      gates: Mutex::new(HashMap::new()),
      events,
    }
  }

  pub fn catalog(&self) -> &LessonCatalog {
    &self.catalog
  }

  pub fn judge_name(&self) -> &'static str {
    self.scorer.judge().name()
  }

  /// Mastery events for the toolkit export collaborator.
  pub fn subscribe(&self) -> broadcast::Receiver<MasteryEvent> {
    self.events.subscribe()
  }

  /// Score and record one submission for the learner's current stage.
  #[instrument(level = "info", skip(self, submission), fields(submission_len = submission.len()))]
  pub async fn submit(
    &self,
    learner_id: &str,
    lesson_id: &str,
    stage: Stage,
    submission: &str,
  ) -> Result<SubmitOutcome> {
    let lesson = self.lesson(lesson_id)?;
    let serialized = self.gate(learner_id, &lesson.id).await.lock_owned().await;
    self.hydrate_lesson(learner_id, &lesson, true).await?;

    let attempt_number = {
      let learners = self.learners.read().await;
      let state = learner_state(&learners, learner_id)?;
      let machine = lesson_machine(state, &lesson.id)?;
      machine.check(stage)?;
      if let Some(max) = lesson.retry.max_attempts {
        if machine.consecutive_failures() >= max as usize {
          info!(target: "lesson", %learner_id, %lesson_id, max, "Retry limit reached");
          return Err(EngineError::RetryLimitReached { lesson_id: lesson.id.clone(), max_attempts: max });
        }
      }
      state.tracker.next_attempt_number(&lesson.id)
    };

    let scoring = self.scorer.score(&lesson, stage, submission, attempt_number);
    let attempt = match self.policy.evaluation_timeout {
      Some(limit) => match tokio::time::timeout(limit, scoring).await {
        Ok(result) => result?,
        Err(_) => {
          warn!(target: "lesson", %learner_id, %lesson_id, ?limit, "Judge timed out");
          return Err(EngineError::EvaluationUnavailable(format!("judge timed out after {limit:?}")));
        }
      },
      None => scoring.await?,
    };

    let commit = Commit {
      learners: self.learners.clone(),
      store: self.store.clone(),
      events: self.events.clone(),
      learner_id: learner_id.to_string(),
      lesson: lesson.clone(),
      attempt: attempt.clone(),
    };
    let committed = tokio::spawn(
      async move {
        let _serialized = serialized;
        commit.run().await
      }
      .instrument(Span::current()),
    )
    .await
    .map_err(|e| EngineError::Store(format!("commit task failed: {e}")))??;

    info!(
      target: "lesson",
      %learner_id,
      %lesson_id,
      attempt_number,
      overall = %format!("{:.2}", attempt.scores.overall),
      passed = attempt.passed,
      transition = ?committed.transition,
      "Attempt recorded"
    );
    if committed.progress.is_complete() {
      info!(target: "lesson", %learner_id, %lesson_id, attempts = attempt_number, "Lesson completed");
    }

    Ok(SubmitOutcome {
      attempt,
      transition: committed.transition,
      progress: committed.progress,
      hint: committed.hint,
      mastery: committed.mastery,
    })
  }

  pub async fn current_stage(&self, learner_id: &str, lesson_id: &str) -> Result<Progress> {
    let (lesson, hydrated) = self.touch(learner_id, lesson_id).await?;
    if !hydrated {
      return Ok(Progress::Stage(lesson.scaffolding_stage));
    }
    let learners = self.learners.read().await;
    let state = learner_state(&learners, learner_id)?;
    Ok(lesson_machine(state, &lesson.id)?.current())
  }

  pub async fn latest_attempt(&self, learner_id: &str, lesson_id: &str) -> Result<Option<Attempt>> {
    let (lesson, hydrated) = self.touch(learner_id, lesson_id).await?;
    if !hydrated {
      return Ok(None);
    }
    let learners = self.learners.read().await;
    Ok(learner_state(&learners, learner_id)?.tracker.latest(&lesson.id).cloned())
  }

  pub async fn attempts(&self, learner_id: &str, lesson_id: &str) -> Result<Vec<Attempt>> {
    let (lesson, hydrated) = self.touch(learner_id, lesson_id).await?;
    if !hydrated {
      return Ok(Vec::new());
    }
    let learners = self.learners.read().await;
    Ok(learner_state(&learners, learner_id)?.tracker.attempts(&lesson.id).to_vec())
  }

  /// Explicit "try another": back to the lesson's starting stage, history kept.
  #[instrument(level = "info", skip(self))]
  pub async fn restart(&self, learner_id: &str, lesson_id: &str) -> Result<Progress> {
    let lesson = self.lesson(lesson_id)?;
    let gate = self.gate(learner_id, &lesson.id).await;
    let _serialized = gate.lock().await;
    self.hydrate_lesson(learner_id, &lesson, true).await?;

    let mut learners = self.learners.write().await;
    let machine = learners
      .get_mut(learner_id)
      .and_then(|s| s.stages.get_mut(&lesson.id))
      .ok_or_else(|| not_hydrated(&lesson.id))?;
    machine.restart();
    info!(target: "lesson", %learner_id, %lesson_id, "Lesson restarted");
    Ok(machine.current())
  }

  pub async fn is_mastered(&self, learner_id: &str, skill_focus: &str) -> Result<bool> {
    if !self.hydrate_learner(learner_id, false).await? {
      return Ok(false);
    }
    let learners = self.learners.read().await;
    Ok(learner_state(&learners, learner_id)?.mastery.is_mastered(skill_focus))
  }

  pub async fn mastery_records(&self, learner_id: &str) -> Result<Vec<SkillMasteryRecord>> {
    if !self.hydrate_learner(learner_id, false).await? {
      return Ok(Vec::new());
    }
    let learners = self.learners.read().await;
    Ok(learner_state(&learners, learner_id)?.mastery.records())
  }

  // --- internals ---

  fn lesson(&self, lesson_id: &str) -> Result<Arc<MicroLesson>> {
    self.catalog.get(lesson_id).ok_or_else(|| EngineError::UnknownLesson(lesson_id.to_string()))
  }

  async fn gate(&self, learner_id: &str, lesson_id: &str) -> Arc<Mutex<()>> {
    let mut gates = self.gates.lock().await;
    // Drop gates no caller holds any more.
    gates.retain(|_, g| Arc::strong_count(g) > 1);
    gates
      .entry((learner_id.to_string(), lesson_id.to_string()))
      .or_default()
      .clone()
  }

  /// Resolve the lesson and load its state if the store has any, for read
  /// queries. The flag is false for a learner the engine has never seen.
  async fn touch(&self, learner_id: &str, lesson_id: &str) -> Result<(Arc<MicroLesson>, bool)> {
    let lesson = self.lesson(lesson_id)?;
    let hydrated = {
      let learners = self.learners.read().await;
      learners.get(learner_id).is_some_and(|s| s.stages.contains_key(&lesson.id))
    };
    if hydrated {
      return Ok((lesson, true));
    }
    let gate = self.gate(learner_id, &lesson.id).await;
    let _serialized = gate.lock().await;
    let hydrated = self.hydrate_lesson(learner_id, &lesson, false).await?;
    Ok((lesson, hydrated))
  }

  /// Load the learner's mastery records on first touch. Without `create`, a
  /// learner with nothing stored gets no state. Returns whether state exists.
  async fn hydrate_learner(&self, learner_id: &str, create: bool) -> Result<bool> {
    if self.learners.read().await.contains_key(learner_id) {
      return Ok(true);
    }
    let stored = self.store.load_mastery(learner_id).await?;
    if stored.is_empty() && !create {
      return Ok(false);
    }
    let threshold = self.policy.mastery_threshold;
    self.learners.write().await.entry(learner_id.to_string()).or_insert_with(|| {
      debug!(target: "lesson", %learner_id, mastery_records = stored.len(), "Learner hydrated");
      LearnerState::new(MasteryAggregator::with_records(threshold, stored))
    });
    Ok(true)
  }

  /// Replay stored attempts through a scratch tracker and stage machine, and
  /// install both only when the whole replay succeeds.
  /// Callers hold the (learner, lesson) gate.
  async fn hydrate_lesson(&self, learner_id: &str, lesson: &MicroLesson, create: bool) -> Result<bool> {
    let known = self.hydrate_learner(learner_id, create).await?;
    if known {
      let learners = self.learners.read().await;
      if learner_state(&learners, learner_id)?.stages.contains_key(&lesson.id) {
        return Ok(true);
      }
    }

    let stored = self.store.load_attempts(learner_id, &lesson.id).await?;
    if !known && stored.is_empty() {
      return Ok(false);
    }

    let mut machine = StageMachine::new(lesson.scaffolding_stage);
    let mut replayed = AttemptTracker::new();
    for attempt in stored {
      // Attempts made before an unpersisted restart no longer line up.
      if machine.check(attempt.stage).is_ok() {
        machine.apply(&attempt)?;
      }
      replayed.record(attempt)?;
    }
    let count = replayed.count(&lesson.id);

    let threshold = self.policy.mastery_threshold;
    let mut learners = self.learners.write().await;
    let state = learners
      .entry(learner_id.to_string())
      .or_insert_with(|| LearnerState::new(MasteryAggregator::new(threshold)));
    if !state.stages.contains_key(&lesson.id) {
      debug!(target: "lesson", %learner_id, lesson_id = %lesson.id, replayed = count, progress = %machine.current(), "Lesson hydrated");
      state.tracker.merge(replayed);
      state.stages.insert(lesson.id.clone(), machine);
    }
    Ok(true)
  }
}

/// Everything `submit` writes once the judge has answered.
struct Commit<S> {
  learners: Learners,
  store: S,
  events: broadcast::Sender<MasteryEvent>,
  learner_id: String,
  lesson: Arc<MicroLesson>,
  attempt: Attempt,
}

struct Committed {
  transition: Transition,
  progress: Progress,
  hint: Option<String>,
  mastery: Option<SkillMasteryRecord>,
}

impl<S: RecordStore> Commit<S> {
  /// Validate, persist, then apply in memory, all under the learner write
  /// lock. A mastery record reaches the aggregator and the event channel only
  /// after the store accepted it.
  async fn run(self) -> Result<Committed> {
    let Commit { learners, store, events, learner_id, lesson, attempt } = self;

    let (committed, mastered) = {
      let mut learners = learners.write().await;
      let state = learners.get_mut(&learner_id).ok_or_else(|| no_state(&learner_id))?;
      state.tracker.check_next(&attempt)?;
      lesson_machine(state, &lesson.id)?.check(attempt.stage)?;

      store.save_attempt(&learner_id, &attempt).await?;
      state.tracker.record(attempt.clone())?;
      let machine = state.stages.get_mut(&lesson.id).ok_or_else(|| not_hydrated(&lesson.id))?;
      let transition = machine.apply(&attempt)?;
      let progress = machine.current();
      let hint = if attempt.passed {
        None
      } else {
        lesson.retry.hint_for_failure(machine.consecutive_failures())
      };

      let mut mastered = None;
      if attempt.passed {
        if let Some((record, first_time)) = state.mastery.candidate(&lesson.skill_focus, attempt.scores.overall) {
          if let Err(e) = store.save_mastery(&learner_id, &record).await {
            error!(target: "lesson", %learner_id, skill = %record.skill_focus, error = %e, "Failed to persist mastery record");
            return Err(e);
          }
          state.mastery.install(record.clone());
          mastered = Some((record, first_time));
        }
      }
      (Committed { transition, progress, hint, mastery: None }, mastered)
    };

    let Some((record, first_time)) = mastered else {
      return Ok(committed);
    };
    info!(target: "lesson", %learner_id, skill = %record.skill_focus, best_score = record.best_score, first_time, "Skill mastered");
    let event = MasteryEvent {
      learner_id,
      skill_focus: record.skill_focus.clone(),
      lesson_title: lesson.title.clone(),
      best_score: record.best_score,
      first_time,
    };
    // No subscribers is fine.
    let _ = events.send(event);
    Ok(Committed { mastery: Some(record), ..committed })
  }
}

fn no_state(learner_id: &str) -> EngineError {
  EngineError::Store(format!("no state for learner '{learner_id}'"))
}

fn not_hydrated(lesson_id: &str) -> EngineError {
  EngineError::Store(format!("lesson '{lesson_id}' not hydrated"))
}

fn learner_state<'a>(learners: &'a HashMap<String, LearnerState>, learner_id: &str) -> Result<&'a LearnerState> {
  learners.get(learner_id).ok_or_else(|| no_state(learner_id))
}

fn lesson_machine<'a>(state: &'a LearnerState, lesson_id: &str) -> Result<&'a StageMachine> {
  state.stages.get(lesson_id).ok_or_else(|| not_hydrated(lesson_id))
}
