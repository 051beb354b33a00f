//! Loading mentor configuration (engine thresholds, judge prompts, lesson bank) from TOML.
//!
//! See `MentorConfig`, `EngineCfg`, `Prompts`, and `LessonCfg` for the expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{MicroLesson, RetryPolicy, Stage};
use crate::error::Result;
use crate::rubric::{Criterion, Rubric};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MentorConfig {
  #[serde(default)]
  pub engine: EngineCfg,
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub lessons: Vec<LessonCfg>,
}

/// Tunable engine thresholds. All scores are on the 0-10 scale.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineCfg {
  pub pass_threshold: f64,
  pub mastery_threshold: f64,
  pub needs_improvement_cutoff: f64,
  /// 0 disables the timeout.
  pub evaluation_timeout_secs: u64,
}

impl Default for EngineCfg {
  fn default() -> Self {
    Self {
      pass_threshold: 7.5,
      mastery_threshold: 8.5,
      needs_improvement_cutoff: 7.5,
      evaluation_timeout_secs: 20,
    }
  }
}

impl EngineCfg {
  pub fn evaluation_timeout(&self) -> Option<Duration> {
    (self.evaluation_timeout_secs > 0).then(|| Duration::from_secs(self.evaluation_timeout_secs))
  }
}

/// Prompts used by the OpenAI judge.
/// You can override them in TOML if you need to tune tone/strictness.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub judge_system: String,
  pub judge_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      judge_system: "You are a supportive but rigorous writing coach for nonprofit professionals. Score learner work against a rubric. Respond ONLY with strict JSON.".into(),
      judge_user_template: "Rubric criteria (JSON): {criteria_json}\nLesson context (JSON): {context_json}\nLearner submission: {submission}\n\nReturn JSON {\"scores\": {<criterion name>: number}, \"remarks\": {<criterion name>: string}}. Score every criterion from 0 to 10 using the exact criterion names. Give a remark (one short, actionable sentence) for each criterion scored below 7.5.".into(),
    }
  }
}

/// Lesson entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct LessonCfg {
  pub id: String,
  pub title: String,
  #[serde(default)] pub character: String,
  pub skill_focus: String,
  #[serde(default)] pub starting_stage: Option<Stage>,
  #[serde(default)] pub context: serde_json::Value,
  pub criteria: Vec<Criterion>,
  /// Rescale weights instead of rejecting a rubric that does not sum to 1.0.
  #[serde(default)] pub normalize_weights: bool,
  #[serde(default)] pub retry: RetryPolicy,
}

impl LessonCfg {
  /// Validate the rubric and build the lesson.
  pub fn into_lesson(self) -> Result<MicroLesson> {
    let rubric = if self.normalize_weights {
      Rubric::normalized(self.criteria)?
    } else {
      Rubric::new(self.criteria)?
    };
    Ok(MicroLesson {
      id: self.id,
      title: self.title,
      character: self.character,
      skill_focus: self.skill_focus,
      scaffolding_stage: self.starting_stage.unwrap_or_default(),
      rubric,
      context: self.context,
      retry: self.retry,
    })
  }
}

/// Attempt to load `MentorConfig` from MENTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_mentor_config_from_env() -> Option<MentorConfig> {
  let path = std::env::var("MENTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<MentorConfig>(&s) {
      Ok(cfg) => {
        info!(target: "lyra_mentor", %path, lessons = cfg.lessons.len(), "Loaded mentor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lyra_mentor", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lyra_mentor", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::EngineError;

  const SAMPLE: &str = r#"
[engine]
pass_threshold = 7.0
evaluation_timeout_secs = 0

[[lessons]]
id = "thank-you-notes"
title = "Thank-You Notes"
character = "Maya"
skill_focus = "donor-thanks"
starting_stage = "fill_in_blank"
context = { audience = "donors", tone = "warm" }

[[lessons.criteria]]
name = "Warmth"
description = "Feels personal and grateful"
weight = 0.7
keywords = ["thank", "grateful"]

[[lessons.criteria]]
name = "Specificity"
weight = 0.3

[lessons.retry]
max_attempts = 3
hint_progression = ["Name the gift", "Name the impact"]
fallback_guidance = "Let's build it step by step."
"#;

  #[test]
  fn parses_full_config() {
    let cfg: MentorConfig = toml::from_str(SAMPLE).unwrap();
    assert_eq!(cfg.engine.pass_threshold, 7.0);
    assert_eq!(cfg.engine.mastery_threshold, 8.5);
    assert_eq!(cfg.engine.evaluation_timeout(), None);
    assert!(cfg.prompts.judge_user_template.contains("{criteria_json}"));

    let lesson = cfg.lessons[0].clone().into_lesson().unwrap();
    assert_eq!(lesson.scaffolding_stage, Stage::FillInBlank);
    assert_eq!(lesson.rubric.criteria().len(), 2);
    assert_eq!(lesson.rubric.criteria()[0].keywords, vec!["thank", "grateful"]);
    assert_eq!(lesson.context["tone"], "warm");
    assert_eq!(lesson.retry.max_attempts, Some(3));
  }

  #[test]
  fn defaults_apply_without_sections() {
    let cfg: MentorConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.engine.pass_threshold, 7.5);
    assert_eq!(cfg.engine.evaluation_timeout(), Some(Duration::from_secs(20)));
    assert!(cfg.lessons.is_empty());
  }

  #[test]
  fn bad_weights_fail_unless_normalized() {
    let mut cfg: MentorConfig = toml::from_str(SAMPLE).unwrap();
    let mut lesson = cfg.lessons.remove(0);
    lesson.criteria[0].weight = 0.3;
    assert!(matches!(lesson.clone().into_lesson(), Err(EngineError::InvalidRubric(_))));

    lesson.normalize_weights = true;
    let built = lesson.into_lesson().unwrap();
    assert!((built.rubric.criteria()[0].weight - 0.5).abs() < 1e-9);
  }
}
