//! Built-in lessons that guarantee the service is useful without external config.

use crate::config::LessonCfg;
use crate::domain::{RetryPolicy, Stage};
use crate::rubric::Criterion;

pub fn seed_lessons() -> Vec<LessonCfg> {
  vec![
    LessonCfg {
      id: "subject-line-mastery".into(),
      title: "Subject Line Mastery".into(),
      character: "Maya".into(),
      skill_focus: "subject-lines".into(),
      starting_stage: Some(Stage::MultipleChoice),
      context: serde_json::json!({
        "organization": "Hope Gardens Community Center",
        "situation": "Announcing the results of the biggest food drive ever",
        "audience": "donors",
      }),
      criteria: vec![
        Criterion::new("Clarity", "The reader knows what the email is about at a glance", 0.5)
          .with_keywords(&["impact", "families", "fed", "results", "update"]),
        Criterion::new("Urgency", "Gives a reason to open the email now", 0.3)
          .with_keywords(&["today", "tonight", "this month", "this week", "deadline", "last chance"]),
        Criterion::new("Personalization", "Speaks directly to the recipient", 0.2)
          .with_keywords(&["[first name]", "[name]", "you", "your"]),
      ],
      normalize_weights: false,
      retry: RetryPolicy {
        max_attempts: None,
        hint_progression: vec![
          "Lead with the outcome the reader cares about.".into(),
          "Add a time cue so the email feels timely.".into(),
          "Address the reader directly with 'you' or their name.".into(),
        ],
        fallback_guidance: Some("Try the template: '[First Name], your gift did X this month'.".into()),
      },
    },
    LessonCfg {
      id: "maya-multi-stakeholder-email".into(),
      title: "Maya's Triple Email Challenge".into(),
      character: "Maya".into(),
      skill_focus: "stakeholder-emails".into(),
      starting_stage: Some(Stage::MultipleChoice),
      context: serde_json::json!({
        "organization": "Hope Gardens Community Center",
        "stakeholders": ["major donors", "weekly volunteers", "board members"],
        "constraint": "Board meeting is tomorrow, donors expect updates today",
      }),
      criteria: vec![
        Criterion::new("Prompt Effectiveness", "How well the prompt guides AI to produce appropriate content", 0.4)
          .with_keywords(&["audience", "tone", "context", "goal"]),
        Criterion::new("Stakeholder Appropriateness", "How well the output matches each audience's needs and relationship", 0.3)
          .with_keywords(&["donor", "volunteer", "board"]),
        Criterion::new("Communication Strategy", "Understanding of why different approaches work for different stakeholders", 0.3)
          .with_keywords(&["because", "so that", "motivate", "relationship"]),
      ],
      normalize_weights: false,
      retry: RetryPolicy {
        max_attempts: Some(3),
        hint_progression: vec![
          "Consider what motivates each stakeholder group.".into(),
          "Think about the relationship level and communication style.".into(),
          "Focus on giving AI specific context about your organization and situation.".into(),
        ],
        fallback_guidance: Some("Let's work together to build a prompt step by step.".into()),
      },
    },
  ]
}
