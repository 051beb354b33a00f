//! Cross-lesson skill mastery for one learner, keyed by skill focus.

use std::collections::HashMap;

use chrono::Utc;

use crate::domain::SkillMasteryRecord;
use crate::scorer::meets;

#[derive(Debug)]
pub struct MasteryAggregator {
  threshold: f64,
  records: HashMap<String, SkillMasteryRecord>,
}

impl MasteryAggregator {
  pub fn new(threshold: f64) -> Self {
    Self { threshold, records: HashMap::new() }
  }

  /// Seed from previously stored records (hydration).
  pub fn with_records(threshold: f64, stored: Vec<SkillMasteryRecord>) -> Self {
    let mut agg = Self::new(threshold);
    agg.records = stored.into_iter().map(|r| (r.skill_focus.clone(), r)).collect();
    agg
  }

  /// The record `score` would create or improve, if it reaches the threshold
  /// and beats the stored best, with whether it is the first for this skill.
  /// Nothing changes until `install`.
  pub fn candidate(&self, skill_focus: &str, score: f64) -> Option<(SkillMasteryRecord, bool)> {
    if !meets(score, self.threshold) {
      return None;
    }
    let first_time = match self.records.get(skill_focus) {
      Some(existing) if score <= existing.best_score => return None,
      Some(_) => false,
      None => true,
    };
    let record = SkillMasteryRecord {
      skill_focus: skill_focus.to_string(),
      best_score: score,
      mastered_at: Some(Utc::now()),
    };
    Some((record, first_time))
  }

  pub fn install(&mut self, record: SkillMasteryRecord) {
    self.records.insert(record.skill_focus.clone(), record);
  }

  pub fn is_mastered(&self, skill_focus: &str) -> bool {
    self.record(skill_focus).is_some_and(|r| r.mastered_at.is_some())
  }

  pub fn record(&self, skill_focus: &str) -> Option<&SkillMasteryRecord> {
    self.records.get(skill_focus)
  }

  /// All records, sorted by skill for stable output.
  pub fn records(&self) -> Vec<SkillMasteryRecord> {
    let mut out: Vec<_> = self.records.values().cloned().collect();
    out.sort_by(|a, b| a.skill_focus.cmp(&b.skill_focus));
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pass(agg: &mut MasteryAggregator, skill: &str, score: f64) -> Option<(SkillMasteryRecord, bool)> {
    let (record, first) = agg.candidate(skill, score)?;
    agg.install(record.clone());
    Some((record, first))
  }

  #[test]
  fn below_threshold_does_not_master() {
    let mut agg = MasteryAggregator::new(8.5);
    assert!(pass(&mut agg, "subject-lines", 8.2).is_none());
    assert!(!agg.is_mastered("subject-lines"));
  }

  #[test]
  fn threshold_is_inclusive() {
    let mut agg = MasteryAggregator::new(8.5);
    let (record, first) = pass(&mut agg, "subject-lines", 8.5).unwrap();
    assert!(first);
    assert_eq!(record.best_score, 8.5);
    assert!(agg.is_mastered("subject-lines"));
  }

  #[test]
  fn candidate_alone_changes_nothing() {
    let agg = MasteryAggregator::new(8.5);
    assert!(agg.candidate("subject-lines", 9.0).is_some());
    assert!(!agg.is_mastered("subject-lines"));
    assert!(agg.records().is_empty());
  }

  #[test]
  fn best_score_never_decreases() {
    let mut agg = MasteryAggregator::new(8.5);
    pass(&mut agg, "subject-lines", 9.4).unwrap();
    let mastered_at = agg.record("subject-lines").unwrap().mastered_at;

    assert!(pass(&mut agg, "subject-lines", 8.9).is_none());
    assert!(pass(&mut agg, "subject-lines", 9.4).is_none());
    let r = agg.record("subject-lines").unwrap();
    assert_eq!(r.best_score, 9.4);
    assert_eq!(r.mastered_at, mastered_at);

    let (improved, first) = pass(&mut agg, "subject-lines", 9.8).unwrap();
    assert!(!first);
    assert_eq!(improved.best_score, 9.8);
  }

  #[test]
  fn hydrated_records_count_as_mastered() {
    let stored = vec![SkillMasteryRecord {
      skill_focus: "donor-thanks".into(),
      best_score: 9.0,
      mastered_at: Some(Utc::now()),
    }];
    let mut agg = MasteryAggregator::with_records(8.5, stored);
    assert!(agg.is_mastered("donor-thanks"));
    assert!(pass(&mut agg, "donor-thanks", 8.7).is_none());
    assert_eq!(agg.records().len(), 1);
  }
}
