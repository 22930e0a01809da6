//! Telegram delivery of tee sheet analyses.

use crate::error::{AgentError, AgentResult};
use crate::models::{TeeSheetAnalysis, TeeTimeSlot};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bot credentials and destination chat.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: SecretString,
    pub chat_id: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: SecretString, chat_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token,
            chat_id: chat_id.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token.expose_secret()
        )
    }

    /// Endpoint with the token masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!("{}/bot<redacted>/sendMessage", self.api_base.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Sends one message per analysis. No retries.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AgentError::Configuration(format!("failed to build Telegram client: {e}"))
            })?;
        Ok(Self { http, config })
    }

    pub async fn deliver(&self, analysis: &TeeSheetAnalysis) -> AgentResult<()> {
        let text = format_message(analysis);
        self.send_text(&analysis.date_iso, &text).await
    }

    /// Post `text` to the configured chat; `date` labels any error.
    pub async fn send_text(&self, date: &str, text: &str) -> AgentResult<()> {
        let payload = SendMessage {
            chat_id: &self.config.chat_id,
            text,
            disable_web_page_preview: true,
        };

        info!(url = %self.config.redacted_url(), date_iso = %date, "telegram.send.start");

        let response = self
            .http
            .post(self.config.send_message_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors embed the request URL, which carries the token
                let message = e.without_url().to_string();
                error!(date_iso = %date, error = %message, "telegram.send.failed");
                AgentError::Delivery {
                    date: date.to_string(),
                    status: None,
                    body: message,
                }
            })?;

        let status = response.status();
        if status.is_success() {
            info!(date_iso = %date, "telegram.send.success");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(date_iso = %date, status_code = status.as_u16(), body = %body, "telegram.send.failed");
        Err(AgentError::Delivery {
            date: date.to_string(),
            status: Some(status.as_u16()),
            body,
        })
    }
}

/// Human-friendly message body.
pub fn format_message(analysis: &TeeSheetAnalysis) -> String {
    let mut lines = vec![
        format!("{} ({})", analysis.day_name, analysis.date_iso),
        analysis.summary.clone(),
        String::new(),
    ];

    if analysis.tee_times.is_empty() {
        lines.push("No tee times parsed.".to_string());
    } else {
        lines.push("Tee times:".to_string());
        lines.extend(analysis.tee_times.iter().map(|s| format!("- {}", format_slot(s))));
    }

    if !analysis.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        lines.extend(analysis.warnings.iter().map(|w| format!("- {w}")));
    }

    lines.push(String::new());
    lines.push(format!("Source: {}", analysis.source_url));
    lines.push(format!("(Model: {})", analysis.model_used));

    lines.join("\n").trim().to_string()
}

/// One tee time as a single line.
pub fn format_slot(slot: &TeeTimeSlot) -> String {
    let mut pieces = vec![slot.time.clone(), slot.status.clone()];
    if let Some(count) = slot.available_slots {
        let label = if count == 1 { "slot" } else { "slots" };
        pieces.push(format!("{count} {label}"));
    }
    if let Some(notes) = slot.notes.as_deref().filter(|n| !n.is_empty()) {
        pieces.push(notes.to_string());
    }
    if slot.is_bookable && !slot.status.to_lowercase().contains("book") {
        pieces.push("Bookable".to_string());
    }
    pieces.join(" — ")
}
