//! Error taxonomy for a tee sheet run.
//!
//! Fatal errors (`Configuration`, `Browser`, `Authentication`) abort the whole
//! run. The remaining variants are isolated to one target date: the agent
//! records them as a failed [`Outcome`](crate::models::Outcome) and moves on.

use crate::models::Stage;

/// Errors that can occur while selecting, fetching, analysing or delivering tee sheets.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser session failed: {0:#}")]
    Browser(anyhow::Error),

    #[error("Login failed: {0}")]
    Authentication(String),

    #[error("Failed to fetch tee sheet for {date}: {error:#}")]
    Fetch { date: String, error: anyhow::Error },

    #[error("Ollama analysis failed for {date} after {attempts} attempt(s): {message}")]
    Analysis {
        date: String,
        attempts: u32,
        message: String,
    },

    #[error("Telegram send failed for {date}{}: {body}", status_suffix(.status))]
    Delivery {
        date: String,
        status: Option<u16>,
        body: String,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with {code}"),
        None => String::new(),
    }
}

impl AgentError {
    /// Pipeline stage an isolated error belongs to; `None` for fatal errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AgentError::Fetch { .. } => Some(Stage::Fetch),
            AgentError::Analysis { .. } => Some(Stage::Analysis),
            AgentError::Delivery { .. } => Some(Stage::Delivery),
            AgentError::Configuration(_)
            | AgentError::Browser(_)
            | AgentError::Authentication(_) => None,
        }
    }

    /// Whether this error aborts the run instead of a single target.
    pub fn is_fatal(&self) -> bool {
        self.stage().is_none()
    }
}

/// Convenience result type.
pub type AgentResult<T> = Result<T, AgentError>;
