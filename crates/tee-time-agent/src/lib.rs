//! Tee time agent runner: configuration, logging and the commands behind the
//! `tee-time-agent` binary.

pub mod config;
pub mod doctor;
pub mod logging;
pub mod run_cmd;

pub use config::Settings;
