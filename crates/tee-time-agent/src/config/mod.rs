//! Configuration loading and resolution.
//!
//! Every setting comes from the process environment layered over an optional
//! `.env` file; the process environment wins. A `TEE_AGENT_`-prefixed variable
//! wins over the bare name, and empty values count as unset.

use secrecy::SecretString;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tee_time::ollama::{self, OllamaConfig};
use tee_time::session::{self, PortalConfig};
use tee_time::telegram::{self, TelegramConfig};
use tee_time::{
    AgentError, AgentResult, ChromiumLauncher, OllamaClient, TeeTimeAgent, TelegramClient,
    DEFAULT_LOOKAHEAD_DAYS,
};

/// Env file read when no explicit path is given. A missing file is fine.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Prefix that overrides the bare variable name.
pub const ENV_PREFIX: &str = "TEE_AGENT_";

pub const DEFAULT_COURSE_ID: &str = "1";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 45;
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Runtime settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub username: String,
    pub password: SecretString,
    pub club_slug: String,
    pub course_id: String,
    pub base_url: String,
    pub login_url: Option<String>,
    pub headless: bool,
    pub timeout: Duration,
    pub chromium_path: Option<String>,
    pub telegram_bot_token: SecretString,
    pub telegram_chat_id: String,
    pub telegram_api_base: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub lookahead_days: u32,
    /// Free-form deployment tag attached to logs.
    pub environment: String,
}

struct Source<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn get(&self, name: &str) -> Option<String> {
        let prefixed = format!("{ENV_PREFIX}{name}");
        (self.lookup)(&prefixed)
            .or_else(|| (self.lookup)(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> AgentResult<String> {
        self.get(name)
            .ok_or_else(|| AgentError::Configuration(format!("{name} must be set")))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn number<T: std::str::FromStr>(&self, name: &str, default: T) -> AgentResult<T> {
        match self.get(name) {
            Some(raw) => raw.parse().map_err(|_| {
                AgentError::Configuration(format!("{name} must be a valid number, got {raw:?}"))
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &str, default: bool) -> AgentResult<bool> {
        match self.get(name) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AgentError::Configuration(format!("{name} must be a boolean, got {raw:?}"))
            }),
            None => Ok(default),
        }
    }
}

/// Parse `true/false/1/0/yes/no`, case-insensitively.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Settings {
    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };

        let timeout_seconds: u64 = src.number("TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS)?;
        if timeout_seconds == 0 {
            return Err(AgentError::Configuration(
                "TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            username: src.required("BRS_USERNAME")?,
            password: SecretString::from(src.required("BRS_PASSWORD")?),
            club_slug: src.required("CLUB_SLUG")?,
            course_id: src.or("COURSE_ID", DEFAULT_COURSE_ID),
            base_url: src.or("BASE_URL", session::DEFAULT_BASE_URL),
            login_url: src.get("LOGIN_URL"),
            headless: src.flag("HEADLESS", true)?,
            timeout: Duration::from_secs(timeout_seconds),
            chromium_path: src.get("CHROMIUM_PATH"),
            telegram_bot_token: SecretString::from(src.required("TELEGRAM_BOT_TOKEN")?),
            telegram_chat_id: src.required("TELEGRAM_CHAT_ID")?,
            telegram_api_base: src.or("TELEGRAM_API_BASE", telegram::DEFAULT_API_BASE),
            ollama_base_url: src.or("OLLAMA_BASE_URL", ollama::DEFAULT_BASE_URL),
            ollama_model: src.or("OLLAMA_MODEL", ollama::DEFAULT_MODEL),
            lookahead_days: src.number("LOOKAHEAD_DAYS", DEFAULT_LOOKAHEAD_DAYS)?,
            environment: src.or("ENVIRONMENT", DEFAULT_ENVIRONMENT),
        })
    }

    /// Load settings for the binary: the process environment over `env_file`,
    /// or over `./.env` when it exists.
    pub fn load(env_file: Option<&Path>) -> AgentResult<Self> {
        let file_vars = match env_file {
            Some(path) => read_env_file(path)?,
            None => read_env_file_if_present(Path::new(DEFAULT_ENV_FILE))?,
        };
        Self::from_layers(&file_vars, |name| std::env::var(name).ok())
    }

    /// Resolve settings with `lookup` taking precedence over `file_vars`.
    pub fn from_layers<F>(file_vars: &HashMap<String, String>, lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|name| lookup(name).or_else(|| file_vars.get(name).cloned()))
    }

    pub fn portal_config(&self) -> PortalConfig {
        PortalConfig {
            base_url: self.base_url.clone(),
            club_slug: self.club_slug.clone(),
            course_id: self.course_id.clone(),
            login_url: self.login_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig::new(&self.ollama_base_url, &self.ollama_model)
    }

    pub fn telegram_config(&self) -> TelegramConfig {
        TelegramConfig::new(self.telegram_bot_token.clone(), &self.telegram_chat_id)
            .with_api_base(&self.telegram_api_base)
    }

    pub fn launcher(&self) -> ChromiumLauncher {
        ChromiumLauncher::new(self.headless, self.chromium_path.clone())
    }

    /// Wire the pipeline with the Chromium launcher and HTTP clients.
    pub fn build_agent(&self) -> AgentResult<TeeTimeAgent> {
        Ok(TeeTimeAgent::new(
            Arc::new(self.portal_config()),
            Arc::new(self.launcher()),
            OllamaClient::new(self.ollama_config())?,
            TelegramClient::new(self.telegram_config())?,
        ))
    }
}

/// Parse a `.env` file into a map without touching the process environment.
pub fn read_env_file(path: &Path) -> AgentResult<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        AgentError::Configuration(format!("could not read {}: {e}", path.display()))
    })?;
    collect_entries(path, iter)
}

/// Like [`read_env_file`], but a missing file yields an empty map. Unreadable
/// or malformed files are still errors.
pub fn read_env_file_if_present(path: &Path) -> AgentResult<HashMap<String, String>> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => collect_entries(path, iter),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(AgentError::Configuration(format!(
            "could not read {}: {e}",
            path.display()
        ))),
    }
}

fn collect_entries<I>(path: &Path, iter: I) -> AgentResult<HashMap<String, String>>
where
    I: Iterator<Item = dotenvy::Result<(String, String)>>,
{
    iter.map(|item| {
        item.map_err(|e| {
            AgentError::Configuration(format!("invalid entry in {}: {e}", path.display()))
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required() -> HashMap<String, String> {
        vars(&[
            ("BRS_USERNAME", "member"),
            ("BRS_PASSWORD", "hunter2"),
            ("CLUB_SLUG", "royalexample"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100"),
        ])
    }

    fn load(map: &HashMap<String, String>) -> AgentResult<Settings> {
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&required()).unwrap();
        assert_eq!(settings.course_id, "1");
        assert_eq!(settings.base_url, "https://members.brsgolf.com");
        assert!(settings.headless);
        assert_eq!(settings.timeout, Duration::from_secs(45));
        assert_eq!(settings.ollama_model, "gemma3:12b");
        assert_eq!(
            settings.ollama_base_url,
            "http://ollama.ollama.svc.cluster.local:11434"
        );
        assert_eq!(settings.telegram_api_base, "https://api.telegram.org");
        assert_eq!(settings.lookahead_days, 10);
        assert_eq!(settings.environment, "production");
        assert_eq!(settings.login_url, None);
        assert_eq!(
            settings.portal_config().login_url(),
            "https://members.brsgolf.com/royalexample/login"
        );
    }

    #[test]
    fn test_missing_required_is_configuration_error() {
        let mut map = required();
        map.remove("CLUB_SLUG");
        let err = load(&map).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(ref m) if m.contains("CLUB_SLUG")));
    }

    #[test]
    fn test_blank_value_counts_as_unset() {
        let mut map = required();
        map.insert("TELEGRAM_CHAT_ID".into(), "   ".into());
        assert!(load(&map).is_err());
    }

    #[test]
    fn test_prefixed_name_wins() {
        let mut map = required();
        map.insert("OLLAMA_MODEL".into(), "llama3".into());
        map.insert("TEE_AGENT_OLLAMA_MODEL".into(), "qwen2.5:14b".into());
        assert_eq!(load(&map).unwrap().ollama_model, "qwen2.5:14b");
    }

    #[test]
    fn test_booleans_and_numbers() {
        let mut map = required();
        map.insert("HEADLESS".into(), "No".into());
        map.insert("TIMEOUT_SECONDS".into(), "90".into());
        map.insert("LOOKAHEAD_DAYS".into(), "7".into());
        let settings = load(&map).unwrap();
        assert!(!settings.headless);
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert_eq!(settings.lookahead_days, 7);

        map.insert("TIMEOUT_SECONDS".into(), "soon".into());
        assert!(load(&map).is_err());
        map.insert("TIMEOUT_SECONDS".into(), "0".into());
        assert!(load(&map).is_err());
        map.insert("TIMEOUT_SECONDS".into(), "45".into());
        map.insert("HEADLESS".into(), "maybe".into());
        assert!(load(&map).is_err());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let settings = load(&required()).unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("123:abc"));
        assert_eq!(settings.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool(""), None);
    }
}
