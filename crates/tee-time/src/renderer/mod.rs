//! Renderer abstraction for browser-based page access.
//!
//! Defines the `Launcher`, `Renderer` and `RenderContext` traits that abstract
//! over the browser engine (currently Chromium via chromiumoxide). The tee
//! sheet session only talks to these traits, so tests can drive it with an
//! in-memory browser.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Starts a browser engine for one run.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch a fresh browser process.
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(self: Box<Self>) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) holding cookies and the active page.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Best-effort wait for the page to go quiet.
    ///
    /// Returns `Ok(false)` when the timeout elapsed first; callers treat that
    /// as non-fatal.
    async fn wait_for_idle(&mut self, timeout_ms: u64) -> Result<bool>;
    /// Type `value` into the first element matching `selector`.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<()>;
    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<()>;
    /// Get the current URL.
    async fn current_url(&self) -> Result<String>;
    /// Inner HTML of the first element matching `selector`, if any.
    async fn element_html(&self, selector: &str) -> Result<Option<String>>;
    /// Rendered text of the first element matching `selector`, if any.
    async fn element_text(&self, selector: &str) -> Result<Option<String>>;
    /// Get the full page HTML.
    async fn page_html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
