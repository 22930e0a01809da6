//! Target date selection for the tee sheet booking window.
//!
//! The portal opens bookings a fixed number of days ahead. A run looks at
//! exactly `today + lookahead` and only proceeds when that date falls on a
//! Friday, Saturday or Sunday. A forced date bypasses the weekday filter.

use crate::error::{AgentError, AgentResult};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of days between "today" and the inspected tee sheet.
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 10;

/// A calendar date the agent should inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetDate(NaiveDate);

impl TargetDate {
    pub fn new(value: NaiveDate) -> Self {
        Self(value)
    }

    /// The underlying calendar date.
    pub fn value(&self) -> NaiveDate {
        self.0
    }

    /// `YYYY-MM-DD`.
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Long form, e.g. `Saturday 31 October 2026`.
    pub fn verbose(&self) -> String {
        self.0.format("%A %d %B %Y").to_string()
    }

    /// English weekday name, `Monday` through `Sunday`.
    pub fn day_name(&self) -> &'static str {
        match self.0.weekday() {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    /// Friday, Saturday and Sunday count as the weekend here.
    pub fn is_weekend(&self) -> bool {
        matches!(self.0.weekday(), Weekday::Fri | Weekday::Sat | Weekday::Sun)
    }
}

impl fmt::Display for TargetDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.day_name(), self.iso())
    }
}

/// Dates to inspect for an automatic run.
///
/// Computes `today + lookahead_days` once and returns it only when it is a
/// weekend day (Fri/Sat/Sun); otherwise the result is empty.
pub fn compute_target_dates(today: NaiveDate, lookahead_days: u32) -> Vec<TargetDate> {
    let Some(value) = today.checked_add_days(Days::new(u64::from(lookahead_days))) else {
        return Vec::new();
    };
    let target = TargetDate::new(value);
    if target.is_weekend() {
        vec![target]
    } else {
        Vec::new()
    }
}

/// Parse a forced date in strict `YYYY-MM-DD` form. Anything else, including
/// unpadded fields, a sign or surrounding whitespace, is a configuration error.
pub fn parse_forced_date(raw: &str) -> AgentResult<TargetDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(TargetDate::new)
        .filter(|target| target.iso() == raw)
        .ok_or_else(|| AgentError::Configuration(format!("invalid --force-date: {raw}")))
}

/// Determine which dates to inspect, honouring an optional forced date.
pub fn resolve_targets(
    force_date: Option<&str>,
    today: NaiveDate,
    lookahead_days: u32,
) -> AgentResult<Vec<TargetDate>> {
    match force_date {
        Some(raw) => Ok(vec![parse_forced_date(raw)?]),
        None => Ok(compute_target_dates(today, lookahead_days)),
    }
}
