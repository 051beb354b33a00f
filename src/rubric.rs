//! Weighted rubric: the criteria a submission is judged against.
//!
//! A `Rubric` is a pure data holder. Per-criterion judgment happens in a
//! `Judge`; the rubric only validates its weights and folds criterion scores
//! into one weighted overall on the 0-10 scale.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tolerance applied to the weight-sum check.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Upper bound of every score in the engine.
pub const MAX_SCORE: f64 = 10.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub weight: f64,
  /// Only read by the heuristic judge.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub keywords: Vec<String>,
}

impl Criterion {
  pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
    Self { name: name.into(), description: description.into(), weight, keywords: Vec::new() }
  }

  pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
    self.keywords = keywords.iter().map(|k| k.to_string()).collect();
    self
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Rubric {
  criteria: Vec<Criterion>,
}

impl Rubric {
  /// Build a rubric, rejecting weights that do not sum to 1.0.
  pub fn new(criteria: Vec<Criterion>) -> Result<Self> {
    check_shape(&criteria)?;
    let sum: f64 = criteria.iter().map(|c| c.weight).sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
      return Err(EngineError::InvalidRubric(format!(
        "criterion weights sum to {sum}, expected 1.0"
      )));
    }
    Ok(Self { criteria })
  }

  /// Build a rubric, rescaling weights so they sum to 1.0.
  pub fn normalized(mut criteria: Vec<Criterion>) -> Result<Self> {
    check_shape(&criteria)?;
    let sum: f64 = criteria.iter().map(|c| c.weight).sum();
    if sum <= 0.0 {
      return Err(EngineError::InvalidRubric("criterion weights sum to zero".into()));
    }
    for c in &mut criteria {
      c.weight /= sum;
    }
    Ok(Self { criteria })
  }

  pub fn criteria(&self) -> &[Criterion] {
    &self.criteria
  }

  /// `Σ weight_i * score_i`, clamped to [0, 10].
  ///
  /// Every rubric criterion must be present in `scores`; names not in the
  /// rubric are ignored.
  pub fn weighted_score(&self, scores: &BTreeMap<String, f64>) -> Result<f64> {
    let mut total = 0.0;
    for c in &self.criteria {
      let score = scores
        .get(&c.name)
        .ok_or_else(|| EngineError::MissingCriterion(c.name.clone()))?;
      total += c.weight * score;
    }
    Ok(total.clamp(0.0, MAX_SCORE))
  }
}

fn check_shape(criteria: &[Criterion]) -> Result<()> {
  if criteria.is_empty() {
    return Err(EngineError::InvalidRubric("rubric has no criteria".into()));
  }
  let mut seen = HashSet::new();
  for c in criteria {
    if !c.weight.is_finite() || c.weight < 0.0 {
      return Err(EngineError::InvalidRubric(format!(
        "criterion '{}' has invalid weight {}",
        c.name, c.weight
      )));
    }
    if !seen.insert(c.name.as_str()) {
      return Err(EngineError::InvalidRubric(format!("duplicate criterion '{}'", c.name)));
    }
  }
  Ok(())
}
