//! Tee time agent library: logs into a BRS Golf tee sheet, has a local Ollama
//! model structure the availability, and posts one Telegram message per date.

pub mod agent;
pub mod date_window;
pub mod error;
pub mod models;
pub mod ollama;
pub mod progress;
pub mod renderer;
pub mod response;
pub mod session;
pub mod telegram;

pub use agent::TeeTimeAgent;
pub use date_window::{compute_target_dates, resolve_targets, TargetDate, DEFAULT_LOOKAHEAD_DAYS};
pub use error::{AgentError, AgentResult};
pub use models::{
    FailureRecord, Outcome, RunReport, RunStatus, Snapshot, Stage, TeeSheetAnalysis, TeeTimeSlot,
};
pub use ollama::{OllamaClient, OllamaConfig, RetryPolicy};
pub use renderer::chromium::ChromiumLauncher;
pub use renderer::{Launcher, RenderContext, Renderer};
pub use session::{PortalConfig, SessionState, SessionTimings, TeeSheetBrowser};
pub use telegram::{TelegramClient, TelegramConfig};
