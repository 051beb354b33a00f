//! Minimal OpenAI-compatible judge.
//!
//! We only call chat.completions and always request a strict JSON object.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key or the learner's submission text.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::error::JudgeError;
use crate::judge::{Judge, Judgment};
use crate::rubric::Criterion;
use crate::util::{fill_template, trunc_for_log};

const MAX_ERROR_BODY: usize = 300;

#[derive(Clone)]
pub struct OpenAiJudge {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub prompts: Prompts,
}

impl OpenAiJudge {
  /// Construct the judge if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    // Generous transport ceiling; the engine applies the evaluation timeout.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, prompts })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, JudgeError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "lyra-mentor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, MAX_ERROR_BODY));
      return Err(JudgeError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    Ok(serde_json::from_str::<T>(&text)?)
  }
}

impl Judge for OpenAiJudge {
  #[instrument(level = "info", skip_all, fields(criteria = criteria.len(), submission_len = submission.len()))]
  async fn evaluate(
    &self,
    criteria: &[Criterion],
    submission: &str,
    context: &serde_json::Value,
  ) -> Result<Judgment, JudgeError> {
    let criteria_json = serde_json::to_string(&criteria_for_prompt(criteria))?;
    let context_json = serde_json::to_string(context)?;
    let user = fill_template(
      &self.prompts.judge_user_template,
      &[
        ("criteria_json", &criteria_json),
        ("submission", submission),
        ("context_json", &context_json),
      ],
    );

    let start = Instant::now();
    let result = self.chat_json::<RawJudgment>(&self.prompts.judge_system, &user, 0.2).await;
    let elapsed = start.elapsed();
    match result {
      Ok(raw) => {
        info!(?elapsed, scored = raw.scores.len(), "Judgment received");
        Ok(raw.into_judgment())
      }
      Err(e) => {
        error!(?elapsed, error = %e, "Judgment call failed");
        Err(e)
      }
    }
  }

  fn name(&self) -> &'static str { "openai" }
}

/// Only name and description reach the model; keywords stay local.
fn criteria_for_prompt(criteria: &[Criterion]) -> Vec<PromptCriterion<'_>> {
  criteria
    .iter()
    .map(|c| PromptCriterion { name: &c.name, description: &c.description })
    .collect()
}

#[derive(Serialize)]
struct PromptCriterion<'a> { name: &'a str, description: &'a str }

/// Shape we ask the model for.
#[derive(Deserialize)]
struct RawJudgment {
  scores: BTreeMap<String, f64>,
  #[serde(default)] remarks: BTreeMap<String, String>,
}

impl RawJudgment {
  fn into_judgment(self) -> Judgment {
    let remarks = self.remarks.into_iter().filter(|(_, r)| !r.trim().is_empty()).collect();
    Judgment { scores: self.scores, remarks }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_judgment_drops_blank_remarks() {
    let raw: RawJudgment = serde_json::from_str(
      r#"{"scores":{"Clarity":9,"Urgency":6.5},"remarks":{"Clarity":"  ","Urgency":"Say when."}}"#,
    )
    .unwrap();
    let j = raw.into_judgment();
    assert_eq!(j.scores["Urgency"], 6.5);
    assert!(!j.remarks.contains_key("Clarity"));
    assert_eq!(j.remarks["Urgency"], "Say when.");
  }

  #[test]
  fn remarks_are_optional() {
    let raw: RawJudgment = serde_json::from_str(r#"{"scores":{"Clarity":7}}"#).unwrap();
    assert!(raw.into_judgment().remarks.is_empty());
  }

  #[test]
  fn prompt_criteria_omit_keywords() {
    let criteria = vec![Criterion::new("Clarity", "Plain language", 1.0).with_keywords(&["impact"])];
    let json = serde_json::to_string(&criteria_for_prompt(&criteria)).unwrap();
    assert_eq!(json, r#"[{"name":"Clarity","description":"Plain language"}]"#);
  }

  #[test]
  fn extracts_error_message() {
    let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("<html>"), None);
  }
}
