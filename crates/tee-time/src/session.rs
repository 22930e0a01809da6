//! Logged-in browser session for the tee sheet portal.
//!
//! A [`TeeSheetBrowser`] owns one browser process and one page for the whole
//! run. Construction opens nothing; [`TeeSheetBrowser::open`] launches the
//! browser and logs in exactly once, then [`TeeSheetBrowser::snapshot_for_date`]
//! can be called once per target date. [`TeeSheetBrowser::close`] releases the
//! page before the browser process and is safe to call more than once.

use crate::date_window::TargetDate;
use crate::error::{AgentError, AgentResult};
use crate::models::Snapshot;
use crate::renderer::{Launcher, RenderContext, Renderer};
use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default portal base URL.
pub const DEFAULT_BASE_URL: &str = "https://members.brsgolf.com";

pub const USERNAME_SELECTOR: &str = r#"input[name="login_form[username]"]"#;
pub const PASSWORD_SELECTOR: &str = r#"input[name="login_form[password]"]"#;
pub const SUBMIT_SELECTOR: &str = r#"button[name="login_form[login]"], button[type="submit"]"#;

/// Container the client-side app renders the tee sheet into.
pub const TEE_SHEET_SELECTOR: &str = "table.border-collapse";

/// Regions whose text is captured when the tee sheet table is missing.
const FALLBACK_TEXT_SELECTORS: [&str; 2] = ["main", "body"];

/// Portal coordinates and credentials.
#[derive(Debug)]
pub struct PortalConfig {
    pub base_url: String,
    pub club_slug: String,
    pub course_id: String,
    /// Explicit login URL; derived from the base URL and club when unset.
    pub login_url: Option<String>,
    pub username: String,
    pub password: SecretString,
    /// Bound for login, navigation and idle waits.
    pub timeout: Duration,
}

impl PortalConfig {
    pub fn login_url(&self) -> String {
        match &self.login_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}/login",
                self.base_url.trim_end_matches('/'),
                self.club_slug
            ),
        }
    }

    /// Tee sheet URL for a specific date.
    pub fn tee_sheet_url(&self, target: &TargetDate) -> String {
        format!(
            "{}/{}/tee-sheet/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.club_slug,
            self.course_id,
            target.value().format("%Y/%m/%d")
        )
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Fixed pauses that let client-rendered content appear.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    /// Pause after the login page loads, before typing credentials.
    pub login_settle: Duration,
    /// Pause after a tee sheet goes idle, before reading the table.
    pub render_settle: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            login_settle: Duration::from_millis(500),
            render_settle: Duration::from_millis(750),
        }
    }
}

/// Lifecycle of a [`TeeSheetBrowser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Authenticating,
    Ready,
    Fetching,
    Closed,
}

/// A logged-in portal session shared by every target of a run.
pub struct TeeSheetBrowser {
    config: Arc<PortalConfig>,
    launcher: Arc<dyn Launcher>,
    timings: SessionTimings,
    state: SessionState,
    renderer: Option<Box<dyn Renderer>>,
    page: Option<Box<dyn RenderContext>>,
}

impl TeeSheetBrowser {
    /// Create an unstarted session. No browser is launched yet.
    pub fn new(config: Arc<PortalConfig>, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            timings: SessionTimings::default(),
            state: SessionState::Unstarted,
            renderer: None,
            page: None,
        }
    }

    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Launch the browser and log in.
    ///
    /// Any failure releases whatever was acquired and leaves the session
    /// `Closed`; the caller must treat it as fatal for the run.
    pub async fn open(&mut self) -> AgentResult<()> {
        if self.state != SessionState::Unstarted {
            return Err(AgentError::Browser(anyhow::anyhow!(
                "session cannot be opened from state {:?}",
                self.state
            )));
        }
        self.state = SessionState::Authenticating;

        match self.start().await {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    async fn start(&mut self) -> AgentResult<()> {
        let renderer = self.launcher.launch().await.map_err(AgentError::Browser)?;
        let page = renderer.new_context().await;
        self.renderer = Some(renderer);
        self.page = Some(page.map_err(AgentError::Browser)?);
        self.login().await
    }

    async fn login(&mut self) -> AgentResult<()> {
        let login_url = self.config.login_url();
        let timeout_ms = self.config.timeout_ms();
        let page = self
            .page
            .as_mut()
            .ok_or_else(|| AgentError::Browser(anyhow::anyhow!("page has not been initialised")))?;

        info!(url = %login_url, "login.start");
        let auth_err = |step: &str, e: anyhow::Error| {
            AgentError::Authentication(format!("{step}: {e:#}"))
        };

        page.navigate(&login_url, timeout_ms)
            .await
            .map_err(|e| auth_err("could not load login page", e))?;
        tokio::time::sleep(self.timings.login_settle).await;

        page.fill(USERNAME_SELECTOR, &self.config.username)
            .await
            .map_err(|e| auth_err("could not enter username", e))?;
        page.fill(PASSWORD_SELECTOR, self.config.password.expose_secret())
            .await
            .map_err(|e| auth_err("could not enter password", e))?;
        page.click(SUBMIT_SELECTOR)
            .await
            .map_err(|e| auth_err("could not submit login form", e))?;

        match page.wait_for_idle(timeout_ms).await {
            Ok(true) => {}
            Ok(false) => debug!(timeout_ms, "login.idle_timeout"),
            Err(e) => debug!(error = %e, "login.idle_wait_failed"),
        }

        let current_url = page
            .current_url()
            .await
            .map_err(|e| auth_err("could not read post-login URL", e))?;

        if current_url.to_lowercase().contains("login") {
            error!(current_url = %current_url, "login.failed");
            return Err(AgentError::Authentication(
                "still on login page after submission".to_string(),
            ));
        }

        info!(redirected_to = %current_url, "login.complete");
        Ok(())
    }

    /// Navigate to a tee sheet and capture the key markup.
    ///
    /// Errors are returned as [`AgentError::Fetch`] for the caller to isolate;
    /// the session stays usable for the next date.
    pub async fn snapshot_for_date(
        &mut self,
        target: &TargetDate,
        url: &str,
    ) -> AgentResult<Snapshot> {
        if self.state != SessionState::Ready {
            return Err(AgentError::Fetch {
                date: target.iso(),
                error: anyhow::anyhow!("session is not ready (state {:?})", self.state),
            });
        }

        self.state = SessionState::Fetching;
        let result = self.capture(target, url).await;
        self.state = SessionState::Ready;

        result.map_err(|error| AgentError::Fetch {
            date: target.iso(),
            error,
        })
    }

    async fn capture(&mut self, target: &TargetDate, url: &str) -> anyhow::Result<Snapshot> {
        let timeout_ms = self.config.timeout_ms();
        let render_settle = self.timings.render_settle;
        let page = self.page.as_mut().context("page has not been initialised")?;
        let date_iso = target.iso();

        info!(url = %url, date_iso = %date_iso, "teesheet.load.start");
        page.navigate(url, timeout_ms).await?;

        match page.wait_for_idle(timeout_ms).await {
            Ok(true) => {}
            Ok(false) => debug!(url = %url, timeout_ms, "teesheet.idle_timeout"),
            Err(e) => debug!(url = %url, error = %e, "teesheet.idle_wait_failed"),
        }

        tokio::time::sleep(render_settle).await;

        let (html_fragment, text_fragment) = match page.element_html(TEE_SHEET_SELECTOR).await? {
            Some(html) => {
                let text = page
                    .element_text(TEE_SHEET_SELECTOR)
                    .await?
                    .unwrap_or_default();
                (html, text)
            }
            None => {
                warn!(url = %url, "teesheet.table_missing");
                let html = page.page_html().await?;
                let mut text = String::new();
                for selector in FALLBACK_TEXT_SELECTORS {
                    if let Some(found) = page.element_text(selector).await? {
                        text = found;
                        break;
                    }
                }
                (html, text)
            }
        };

        info!(url = %url, date_iso = %date_iso, "teesheet.load.success");

        Ok(Snapshot {
            target: *target,
            url: url.to_string(),
            html_fragment,
            text_fragment,
        })
    }

    /// Release the page, then the browser process. Idempotent.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "session.page_close_failed");
            }
        }
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.shutdown().await {
                warn!(error = %e, "session.browser_shutdown_failed");
            }
        }
        self.state = SessionState::Closed;
        debug!("session.closed");
    }
}

impl Drop for TeeSheetBrowser {
    fn drop(&mut self) {
        if self.renderer.is_some() || self.page.is_some() {
            warn!(state = ?self.state, "session.dropped_unclosed");
        }
    }
}
