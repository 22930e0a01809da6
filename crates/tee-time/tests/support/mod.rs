//! In-memory browser used by the integration tests.
//!
//! Every launcher, renderer and page shares one [`BrowserLog`] so tests can
//! assert what the session did after the run.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tee_time::renderer::{Launcher, NavigationResult, RenderContext, Renderer};

/// Tee sheet markup served for one URL.
#[derive(Debug, Clone)]
pub struct FakePage {
    /// Inner HTML of `table.border-collapse`; `None` renders a page without the table.
    pub table_html: Option<String>,
    pub table_text: String,
    pub main_text: Option<String>,
    pub body_text: String,
}

impl FakePage {
    pub fn with_table(html: &str, text: &str) -> Self {
        Self {
            table_html: Some(html.to_string()),
            table_text: text.to_string(),
            main_text: None,
            body_text: text.to_string(),
        }
    }

    pub fn without_table(main_text: Option<&str>, body_text: &str) -> Self {
        Self {
            table_html: None,
            table_text: String::new(),
            main_text: main_text.map(str::to_string),
            body_text: body_text.to_string(),
        }
    }
}

/// Everything the fake browser observed.
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub launches: usize,
    pub contexts_created: usize,
    /// `(context id, url)` per navigation, in order.
    pub navigations: Vec<(usize, String)>,
    pub filled: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub contexts_closed: usize,
    pub shutdowns: usize,
    /// Close events in order: `"page"` or `"browser"`.
    pub release_order: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct Script {
    launch_fails: bool,
    post_login_url: String,
    failing_urls: HashSet<String>,
    pages: HashMap<String, FakePage>,
}

/// Scripted launcher; clone it to keep a handle on the shared log.
#[derive(Clone)]
pub struct FakeBrowser {
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<BrowserLog>>,
}

impl FakeBrowser {
    /// A browser whose login redirects to `post_login_url`.
    pub fn new(post_login_url: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                post_login_url: post_login_url.to_string(),
                ..Script::default()
            })),
            log: Arc::new(Mutex::new(BrowserLog::default())),
        }
    }

    pub fn serve(self, url: &str, page: FakePage) -> Self {
        self.script.lock().unwrap().pages.insert(url.to_string(), page);
        self
    }

    pub fn fail_navigation(self, url: &str) -> Self {
        self.script.lock().unwrap().failing_urls.insert(url.to_string());
        self
    }

    pub fn fail_launch(self) -> Self {
        self.script.lock().unwrap().launch_fails = true;
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, BrowserLog> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl Launcher for FakeBrowser {
    async fn launch(&self) -> Result<Box<dyn Renderer>> {
        if self.script.lock().unwrap().launch_fails {
            bail!("Chromium not found");
        }
        self.log.lock().unwrap().launches += 1;
        Ok(Box::new(FakeRenderer {
            browser: self.clone(),
            active: Arc::new(Mutex::new(0)),
        }))
    }
}

struct FakeRenderer {
    browser: FakeBrowser,
    active: Arc<Mutex<usize>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let id = {
            let mut log = self.browser.log.lock().unwrap();
            log.contexts_created += 1;
            log.contexts_created
        };
        *self.active.lock().unwrap() += 1;
        Ok(Box::new(FakeContext {
            id,
            browser: self.browser.clone(),
            active: Arc::clone(&self.active),
            current_url: "about:blank".to_string(),
        }))
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        let mut log = self.browser.log.lock().unwrap();
        log.shutdowns += 1;
        log.release_order.push("browser");
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        *self.active.lock().unwrap()
    }
}

struct FakeContext {
    id: usize,
    browser: FakeBrowser,
    active: Arc<Mutex<usize>>,
    current_url: String,
}

impl FakeContext {
    fn page(&self) -> Option<FakePage> {
        self.browser
            .script
            .lock()
            .unwrap()
            .pages
            .get(&self.current_url)
            .cloned()
    }
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        self.browser
            .log
            .lock()
            .unwrap()
            .navigations
            .push((self.id, url.to_string()));
        if self.browser.script.lock().unwrap().failing_urls.contains(url) {
            bail!("navigation timed out after {timeout_ms}ms");
        }
        self.current_url = url.to_string();
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn wait_for_idle(&mut self, _timeout_ms: u64) -> Result<bool> {
        Ok(true)
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        self.browser
            .log
            .lock()
            .unwrap()
            .filled
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        self.browser.log.lock().unwrap().clicks.push(selector.to_string());
        self.current_url = self.browser.script.lock().unwrap().post_login_url.clone();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current_url.clone())
    }

    async fn element_html(&self, selector: &str) -> Result<Option<String>> {
        Ok(match selector {
            "table.border-collapse" => self.page().and_then(|p| p.table_html),
            _ => None,
        })
    }

    async fn element_text(&self, selector: &str) -> Result<Option<String>> {
        let Some(page) = self.page() else {
            return Ok(None);
        };
        Ok(match selector {
            "table.border-collapse" => page.table_html.as_ref().map(|_| page.table_text.clone()),
            "main" => page.main_text,
            "body" => Some(page.body_text),
            _ => None,
        })
    }

    async fn page_html(&self) -> Result<String> {
        let body = self.page().map(|p| p.body_text).unwrap_or_default();
        Ok(format!("<html><body>{body}</body></html>"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        *self.active.lock().unwrap() -= 1;
        let mut log = self.browser.log.lock().unwrap();
        log.contexts_closed += 1;
        log.release_order.push("page");
        Ok(())
    }
}

pub const BASE_URL: &str = "https://members.example.test";
pub const CLUB: &str = "royalexample";

/// Portal settings pointing at the fake browser's URLs.
pub fn portal() -> tee_time::session::PortalConfig {
    tee_time::session::PortalConfig {
        base_url: BASE_URL.to_string(),
        club_slug: CLUB.to_string(),
        course_id: "1".to_string(),
        login_url: None,
        username: "member@example.test".to_string(),
        password: secrecy::SecretString::from("correct horse"),
        timeout: std::time::Duration::from_secs(5),
    }
}

/// Timings without the settle pauses.
pub fn instant_timings() -> tee_time::session::SessionTimings {
    tee_time::session::SessionTimings {
        login_settle: std::time::Duration::ZERO,
        render_settle: std::time::Duration::ZERO,
    }
}

pub fn login_url() -> String {
    format!("{BASE_URL}/{CLUB}/login")
}

pub fn home_url() -> String {
    format!("{BASE_URL}/{CLUB}/home")
}

pub fn target(year: i32, month: u32, day: u32) -> tee_time::date_window::TargetDate {
    tee_time::date_window::TargetDate::new(
        chrono::NaiveDate::from_ymd_opt(year, month, day).unwrap(),
    )
}
