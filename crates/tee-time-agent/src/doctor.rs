//! Environment readiness check.

use crate::config::Settings;
use std::fmt;
use std::path::{Path, PathBuf};
use tee_time::renderer::chromium::find_chromium;
use tee_time::AgentResult;

/// One line of the doctor report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn problem(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.ok { "[OK]" } else { "[!!]" };
        write!(f, "{mark} {}", self.message)
    }
}

/// Evaluate configuration and browser availability.
pub fn diagnose(settings: &AgentResult<Settings>, chromium: Option<PathBuf>) -> Vec<Check> {
    let mut checks = Vec::new();

    match settings {
        Ok(s) => {
            checks.push(Check::ok(format!(
                "Configuration loaded (club {}, course {}, environment {})",
                s.club_slug, s.course_id, s.environment
            )));
            checks.push(Check::ok(format!(
                "Ollama: {} using {}",
                s.ollama_base_url, s.ollama_model
            )));
            checks.push(Check::ok(format!("Telegram chat: {}", s.telegram_chat_id)));
        }
        Err(e) => checks.push(Check::problem(e.to_string())),
    }

    match chromium {
        Some(path) => checks.push(Check::ok(format!("Chromium found: {}", path.display()))),
        None => checks.push(Check::problem(
            "Chromium NOT found. Set CHROMIUM_PATH or install google-chrome/chromium.",
        )),
    }

    checks
}

pub fn is_ready(checks: &[Check]) -> bool {
    checks.iter().all(|c| c.ok)
}

/// Print the readiness report. Returns whether everything passed.
pub fn run(env_file: Option<&Path>) -> bool {
    println!("Tee Time Agent Doctor");
    println!("=====================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let settings = Settings::load(env_file);
    let explicit = settings.as_ref().ok().and_then(|s| s.chromium_path.clone());
    let checks = diagnose(&settings, find_chromium(explicit.as_deref()));
    for check in &checks {
        println!("{check}");
    }

    println!();
    let ready = is_ready(&checks);
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_time::AgentError;

    #[test]
    fn test_missing_configuration_is_not_ready() {
        let settings = Err(AgentError::Configuration("BRS_USERNAME must be set".into()));
        let checks = diagnose(&settings, Some(PathBuf::from("/usr/bin/chromium")));
        assert!(!is_ready(&checks));
        assert_eq!(
            checks[0].to_string(),
            "[!!] Configuration error: BRS_USERNAME must be set"
        );
        assert_eq!(checks[1].to_string(), "[OK] Chromium found: /usr/bin/chromium");
    }

    #[test]
    fn test_missing_chromium_is_not_ready() {
        let settings = Err(AgentError::Configuration("x".into()));
        let checks = diagnose(&settings, None);
        assert!(checks.last().unwrap().to_string().starts_with("[!!] Chromium NOT found"));
    }
}
