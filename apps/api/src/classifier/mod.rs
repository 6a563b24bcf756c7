/// Classifier — the single point of entry for all Claude API calls in Beacon.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All LLM interactions MUST go through this module.
///
/// Model: claude-sonnet-4-5 (hardcoded — do not make configurable to prevent drift)
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::prompts::{TRIAGE_PROMPT, TRIAGE_SYSTEM};
use crate::sources::SourceKind;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in Beacon.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 1024;
const MAX_RETRIES: u32 = 3;
/// How much of the message body the fallback summary keeps.
const FALLBACK_SUMMARY_LEN: usize = 140;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Classifier returned empty content")]
    EmptyContent,
}

/// Structured triage record for one message. Opaque to the pipeline — it is
/// persisted as-is onto the work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub classification: String,
    pub summary: String,
    #[serde(default)]
    pub action_items: Vec<String>,
    pub sentiment: String,
    pub urgency_score: i32,
    pub effort_estimate: String,
    pub deadline: String,
    #[serde(default)]
    pub context_tags: Vec<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
    pub business_impact: String,
    #[serde(default)]
    pub follow_up_needed: bool,
}

impl Analysis {
    /// Safe default used when the model's output cannot be parsed. The item
    /// still lands on the dashboard; it just lands unclassified.
    pub fn fallback(content: &str) -> Self {
        let summary: String = content.chars().take(FALLBACK_SUMMARY_LEN).collect();
        Self {
            classification: "unclassified".to_string(),
            summary,
            action_items: vec![],
            sentiment: "neutral".to_string(),
            urgency_score: 3,
            effort_estimate: "unknown".to_string(),
            deadline: "none".to_string(),
            context_tags: vec![],
            stakeholders: vec![],
            business_impact: "unknown".to_string(),
            follow_up_needed: false,
        }
    }
}

/// The classification collaborator. The pipeline only sees this trait;
/// tests swap in a scripted fake.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        content: &str,
        source: SourceKind,
    ) -> Result<Analysis, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl ApiResponse {
    /// Extracts the text content from the first text block.
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Production classifier backed by the Anthropic Messages API.
/// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
#[derive(Clone)]
pub struct AnthropicClassifier {
    client: Client,
    api_key: String,
}

impl AnthropicClassifier {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    async fn call(&self, prompt: &str, system: &str) -> Result<ApiResponse, ClassifierError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<ClassifierError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Classifier call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ClassifierError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Anthropic API returned {}: {}", status, body);
                last_error = Some(ClassifierError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(ClassifierError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let api_response: ApiResponse = response
                .json()
                .await
                .map_err(ClassifierError::Http)?;

            debug!(
                "Classifier call succeeded: input_tokens={}, output_tokens={}",
                api_response.usage.input_tokens, api_response.usage.output_tokens
            );

            return Ok(api_response);
        }

        Err(last_error.unwrap_or(ClassifierError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl Classifier for AnthropicClassifier {
    async fn classify(
        &self,
        content: &str,
        source: SourceKind,
    ) -> Result<Analysis, ClassifierError> {
        let prompt = TRIAGE_PROMPT
            .replace("{source}", source.as_str())
            .replace("{content}", content);
        let response = self.call(&prompt, TRIAGE_SYSTEM).await?;
        let text = response.text().ok_or(ClassifierError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        match serde_json::from_str::<Analysis>(text) {
            Ok(analysis) => Ok(sanitize(analysis)),
            Err(e) => {
                // A malformed record downgrades the item, not the run.
                warn!("Classifier returned unparseable JSON ({e}); using fallback record");
                Ok(Analysis::fallback(content))
            }
        }
    }
}

/// Clamps model output into the ranges storage expects.
fn sanitize(mut analysis: Analysis) -> Analysis {
    analysis.urgency_score = analysis.urgency_score.clamp(1, 5);
    analysis
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_analysis_parses_full_record() {
        let analysis: Analysis = serde_json::from_str(
            r#"{
                "classification": "urgent",
                "summary": "Prod deploy is blocked on a failing migration",
                "action_items": ["Roll back migration 0042"],
                "sentiment": "negative",
                "urgency_score": 5,
                "effort_estimate": "medium",
                "deadline": "today",
                "context_tags": ["deploy", "database"],
                "stakeholders": ["oncall"],
                "business_impact": "high",
                "follow_up_needed": true
            }"#,
        )
        .unwrap();
        assert_eq!(analysis.classification, "urgent");
        assert_eq!(analysis.urgency_score, 5);
        assert!(analysis.follow_up_needed);
    }

    #[test]
    fn test_analysis_list_fields_default_when_missing() {
        let analysis: Analysis = serde_json::from_str(
            r#"{
                "classification": "fyi",
                "summary": "Newsletter",
                "sentiment": "neutral",
                "urgency_score": 1,
                "effort_estimate": "quick",
                "deadline": "none",
                "business_impact": "low"
            }"#,
        )
        .unwrap();
        assert!(analysis.action_items.is_empty());
        assert!(analysis.context_tags.is_empty());
        assert!(!analysis.follow_up_needed);
    }

    #[test]
    fn test_sanitize_clamps_urgency() {
        let mut analysis = Analysis::fallback("x");
        analysis.urgency_score = 11;
        assert_eq!(sanitize(analysis).urgency_score, 5);
        let mut analysis = Analysis::fallback("x");
        analysis.urgency_score = 0;
        assert_eq!(sanitize(analysis).urgency_score, 1);
    }

    #[test]
    fn test_fallback_truncates_summary() {
        let long = "a".repeat(500);
        let fallback = Analysis::fallback(&long);
        assert_eq!(fallback.summary.len(), 140);
        assert_eq!(fallback.classification, "unclassified");
        assert_eq!(fallback.urgency_score, 3);
    }
}
