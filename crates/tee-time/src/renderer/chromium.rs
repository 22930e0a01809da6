//! Chromium-based renderer using chromiumoxide.

use super::{Launcher, NavigationResult, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Environment variable pointing at a Chromium/Chrome executable.
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

/// Poll interval while waiting for the page to settle.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&str>) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(p) = explicit {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. CHROMIUM_PATH env
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.cache/tee-time-agent/chromium/
    if let Some(cache) = dirs::cache_dir() {
        let root = cache.join("tee-time-agent/chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                root.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                root.join("chrome"),
            ]
        } else {
            vec![root.join("chrome-linux64/chrome"), root.join("chrome")]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches a Chromium process per run.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    pub headless: bool,
    pub chromium_path: Option<String>,
}

impl ChromiumLauncher {
    pub fn new(headless: bool, chromium_path: Option<String>) -> Self {
        Self {
            headless,
            chromium_path,
        }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        let renderer = ChromiumRenderer::new(self.headless, self.chromium_path.as_deref()).await?;
        Ok(Box::new(renderer))
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance.
    pub async fn new(headless: bool, chromium_path: Option<&str>) -> Result<Self> {
        let chrome_path = find_chromium(chromium_path)
            .context("Chromium not found. Set CHROMIUM_PATH or install google-chrome/chromium.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP connection until the browser goes away
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::debug!(headless, "chromium.launched");

        Ok(Self {
            browser,
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let ChromiumRenderer {
            mut browser,
            handler,
            ..
        } = *self;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        closed.context("failed to close Chromium")?;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Evaluate `body` against the first element matching `selector`.
    async fn query(&self, selector: &str, body: &str) -> Result<Option<String>> {
        #[derive(serde::Deserialize)]
        struct Found {
            found: bool,
            value: String,
        }

        let selector = serde_json::to_string(selector)?;
        let found: Found = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 return el ? {{ found: true, value: String({body}) }} : {{ found: false, value: '' }}; }})()"
            ))
            .await?;
        Ok(found.found.then_some(found.value))
    }

    async fn settle(&self) -> Result<()> {
        let _ = self.page.wait_for_navigation().await;
        loop {
            let ready: String = self.eval("document.readyState".to_string()).await?;
            if ready == "complete" {
                break;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
        // Treat the network as idle once no new resources load across a poll window
        let count_js = "performance.getEntriesByType('resource').length".to_string();
        let mut last: u64 = self.eval(count_js.clone()).await?;
        loop {
            tokio::time::sleep(IDLE_POLL * 2).await;
            let now: u64 = self.eval(count_js.clone()).await?;
            if now == last {
                return Ok(());
            }
            last = now;
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn wait_for_idle(&mut self, timeout_ms: u64) -> Result<bool> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.settle()).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches {selector}"))?;
        element
            .click()
            .await
            .with_context(|| format!("failed to focus {selector}"))?
            .type_str(value)
            .await
            .with_context(|| format!("failed to type into {selector}"))?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches {selector}"))?
            .click()
            .await
            .with_context(|| format!("failed to click {selector}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn element_html(&self, selector: &str) -> Result<Option<String>> {
        self.query(selector, "el.innerHTML").await
    }

    async fn element_text(&self, selector: &str) -> Result<Option<String>> {
        self.query(selector, "el.innerText").await
    }

    async fn page_html(&self) -> Result<String> {
        self.eval("document.documentElement.outerHTML".to_string())
            .await
            .context("failed to get HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
