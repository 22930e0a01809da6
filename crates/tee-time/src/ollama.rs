//! Tee sheet analysis through an Ollama model.
//!
//! Builds a prompt around the captured markup, calls `/api/generate` under a
//! bounded retry policy, and turns the untrusted response into a
//! [`TeeSheetAnalysis`]. Only exhausting the retries is an error; a response
//! that cannot be parsed degrades to an empty payload with a fallback summary.

use crate::error::{AgentError, AgentResult};
use crate::models::{Snapshot, TeeSheetAnalysis, TeeTimeSlot};
use crate::response::{parse_model_payload, ModelPayload};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default model server inside the cluster.
pub const DEFAULT_BASE_URL: &str = "http://ollama.ollama.svc.cluster.local:11434";
pub const DEFAULT_MODEL: &str = "gemma3:12b";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Character caps on the excerpts embedded in the prompt.
pub const MAX_HTML_CHARS: usize = 30_000;
pub const MAX_TEXT_CHARS: usize = 20_000;

/// Bounded exponential backoff for the generate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(2u32.pow(exp))
            .min(self.max_backoff)
    }
}

/// Connection settings for the model server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OllamaConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    /// Provenance tag recorded on every analysis.
    pub fn provenance(&self) -> String {
        format!("ollama:{}", self.model)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Value,
}

/// Client for the Ollama generate endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build Ollama client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Interpret one snapshot.
    pub async fn analyse_snapshot(&self, snapshot: &Snapshot) -> AgentResult<TeeSheetAnalysis> {
        let date_iso = snapshot.date_iso();
        let prompt = build_prompt(snapshot);

        info!(model = %self.config.model, date_iso = %date_iso, "ollama.request.start");
        let raw = self.generate_with_retry(&date_iso, &prompt).await?;
        let raw = raw.trim().to_string();
        debug!(
            preview = %raw.chars().take(200).collect::<String>(),
            total_length = raw.len(),
            "ollama.response"
        );

        let payload = match parse_model_payload(&raw) {
            Ok(payload) => payload,
            Err(reason) => {
                warn!(date_iso = %date_iso, reason = %reason, "ollama.json_decode_failed");
                ModelPayload::default()
            }
        };

        Ok(build_analysis(snapshot, payload, self.config.provenance(), raw))
    }

    async fn generate_with_retry(&self, date_iso: &str, prompt: &str) -> AgentResult<String> {
        let policy = self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        date_iso = %date_iso,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %format!("{e:#}"),
                        "ollama.request.retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(AgentError::Analysis {
                        date: date_iso.to_string(),
                        attempts: attempt,
                        message: format!("{e:#}"),
                    });
                }
            }
        }
    }

    /// A single generate call.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response: GenerateResponse = self
            .http
            .post(self.config.generate_url())
            .json(&body)
            .send()
            .await
            .context("request to Ollama failed")?
            .error_for_status()
            .context("Ollama returned an error status")?
            .json()
            .await
            .context("could not decode Ollama response")?;

        Ok(match response.response {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt sent to the model for one snapshot.
pub fn build_prompt(snapshot: &Snapshot) -> String {
    let html = truncate_chars(&snapshot.html_fragment, MAX_HTML_CHARS);
    let text = truncate_chars(&snapshot.text_fragment, MAX_TEXT_CHARS);

    format!(
        r#"You are an assistant that extracts tee time availability from BRS Golf
tee sheet markup. Only respond with valid JSON matching this schema:
{{
  "summary": string,
  "tee_times": [
    {{
      "time": "HH:MM",
      "status": string,
      "available_slots": integer | null,
      "is_bookable": boolean,
      "notes": string | null
    }}
  ],
  "warnings": [string, ...]
}}

Requirements:
- Keep "summary" under 160 characters.
- Include tee times that look bookable or notable; omit completed slots.
- Use warnings for login problems, competitions, or unexpected layouts.
- If no tee times are visible, return an empty list and explain in summary.

Context:
- Date: {date} ({day})
- Source URL: {url}

Tee sheet HTML:
```html
{html}
```

Tee sheet visible text:
```
{text}
```"#,
        date = snapshot.date_iso(),
        day = snapshot.day_name(),
        url = snapshot.url,
    )
}

/// Assemble the analysis, filling in a summary when the model gave none.
pub fn build_analysis(
    snapshot: &Snapshot,
    payload: ModelPayload,
    model_used: String,
    raw_response: String,
) -> TeeSheetAnalysis {
    let date_iso = snapshot.date_iso();
    let day_name = snapshot.day_name();
    let summary = payload.summary.unwrap_or_else(|| {
        fallback_summary(&payload.tee_times, &payload.warnings, day_name, &date_iso)
    });

    TeeSheetAnalysis {
        date_iso,
        day_name: day_name.to_string(),
        summary,
        tee_times: payload.tee_times,
        warnings: payload.warnings,
        source_url: snapshot.url.clone(),
        model_used,
        model_raw_response: raw_response,
    }
}

/// Deterministic summary used when the model omits one.
pub fn fallback_summary(
    tee_times: &[TeeTimeSlot],
    warnings: &[String],
    day_name: &str,
    date_iso: &str,
) -> String {
    if tee_times.is_empty() {
        return match warnings.first() {
            Some(first) => {
                format!("No tee times parsed for {day_name} {date_iso}; warnings: {first}")
            }
            None => format!("No tee times parsed for {day_name} {date_iso}."),
        };
    }

    let bookable = tee_times.iter().filter(|slot| slot.is_bookable).count();
    if bookable > 0 {
        format!("{bookable} bookable tee time(s) found for {day_name} {date_iso}.")
    } else {
        format!("Tee sheet analysed for {day_name} {date_iso}; no bookable slots identified.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_window::TargetDate;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot() -> Snapshot {
        Snapshot {
            target: TargetDate::new(NaiveDate::from_ymd_opt(2026, 10, 31).unwrap()),
            url: "https://members.brsgolf.com/club/tee-sheet/1/2026/10/31".to_string(),
            html_fragment: "<tr><td>08:10</td><td>Available</td></tr>".to_string(),
            text_fragment: "08:10 Available".to_string(),
        }
    }

    fn slot(time: &str, bookable: bool) -> TeeTimeSlot {
        TeeTimeSlot {
            time: time.to_string(),
            status: "Available".to_string(),
            available_slots: None,
            is_bookable: bookable,
            notes: None,
        }
    }

    fn fast_client(server: &MockServer) -> OllamaClient {
        let config = OllamaConfig::new(server.uri(), "gemma3:12b").with_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        });
        OllamaClient::new(config).unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(8));
    }

    #[test]
    fn test_prompt_embeds_context() {
        let prompt = build_prompt(&snapshot());
        assert!(prompt.contains("- Date: 2026-10-31 (Saturday)"));
        assert!(prompt.contains("- Source URL: https://members.brsgolf.com/club/tee-sheet/1/2026/10/31"));
        assert!(prompt.contains("<td>08:10</td>"));
        assert!(prompt.starts_with("You are an assistant"));
    }

    #[test]
    fn test_prompt_truncates_by_characters() {
        let mut snap = snapshot();
        snap.html_fragment = "é".repeat(MAX_HTML_CHARS + 50);
        snap.text_fragment = "t".repeat(MAX_TEXT_CHARS + 50);
        let prompt = build_prompt(&snap);
        assert_eq!(prompt.matches('é').count(), MAX_HTML_CHARS);
        assert!(!prompt.contains(&"t".repeat(MAX_TEXT_CHARS + 1)));
    }

    #[test]
    fn test_fallback_summary_with_warning() {
        let summary = fallback_summary(&[], &["login issue".to_string()], "Saturday", "2026-10-31");
        assert_eq!(
            summary,
            "No tee times parsed for Saturday 2026-10-31; warnings: login issue"
        );
    }

    #[test]
    fn test_fallback_summary_variants() {
        assert_eq!(
            fallback_summary(&[], &[], "Friday", "2026-10-30"),
            "No tee times parsed for Friday 2026-10-30."
        );
        assert_eq!(
            fallback_summary(&[slot("08:10", true), slot("08:20", false)], &[], "Friday", "2026-10-30"),
            "1 bookable tee time(s) found for Friday 2026-10-30."
        );
        assert_eq!(
            fallback_summary(&[slot("08:10", false)], &[], "Friday", "2026-10-30"),
            "Tee sheet analysed for Friday 2026-10-30; no bookable slots identified."
        );
    }

    #[tokio::test]
    async fn test_analyse_well_formed_response() {
        let server = MockServer::start().await;
        let model_text = json!({
            "summary": "One bookable time.",
            "tee_times": [{"time": "08:10", "status": "Available", "available_slots": 4, "is_bookable": true}],
            "warnings": []
        })
        .to_string();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "gemma3:12b",
                "stream": false,
                "options": {"temperature": 0.2}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": model_text })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = fast_client(&server).analyse_snapshot(&snapshot()).await.unwrap();
        assert_eq!(analysis.summary, "One bookable time.");
        assert_eq!(analysis.tee_times.len(), 1);
        assert_eq!(analysis.model_used, "ollama:gemma3:12b");
        assert_eq!(analysis.day_name, "Saturday");
        assert_eq!(analysis.date_iso, "2026-10-31");
    }

    #[tokio::test]
    async fn test_malformed_response_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "  Sorry, I cannot read this page.  " })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let analysis = fast_client(&server).analyse_snapshot(&snapshot()).await.unwrap();
        assert!(analysis.tee_times.is_empty());
        assert_eq!(analysis.summary, "No tee times parsed for Saturday 2026-10-31.");
        assert_eq!(analysis.model_raw_response, "Sorry, I cannot read this page.");
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "{}" })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = fast_client(&server).analyse_snapshot(&snapshot()).await.unwrap();
        assert_eq!(analysis.summary, "No tee times parsed for Saturday 2026-10-31.");
    }

    #[tokio::test]
    async fn test_retry_exhaustion_makes_exactly_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(3)
            .mount(&server)
            .await;

        let err = fast_client(&server)
            .analyse_snapshot(&snapshot())
            .await
            .unwrap_err();
        match err {
            AgentError::Analysis { date, attempts, .. } => {
                assert_eq!(date, "2026-10-31");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(3)
            .mount(&server)
            .await;

        let err = fast_client(&server).analyse_snapshot(&snapshot()).await.unwrap_err();
        assert_eq!(err.stage(), Some(crate::models::Stage::Analysis));
    }
}
