//! Timer record and its validation rules

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TimerError};

/// Category assigned when none is given
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Lifecycle status of a single countdown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Paused,
    Running,
    Completed,
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TimerStatus::Paused => "paused",
            TimerStatus::Running => "running",
            TimerStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// A single countdown timer as stored and serialized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// Original countdown length in seconds
    pub duration: u64,
    /// Seconds left, never above `duration`
    pub remaining_time: u64,
    pub status: TimerStatus,
    #[serde(default)]
    pub halfway_alert: bool,
    /// Whether the halfway event was already emitted in this countdown cycle
    #[serde(default)]
    pub halfway_alert_fired: bool,
    pub created_at: DateTime<Utc>,
}

/// What a single tick did to a running timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    HalfwayReached,
    Completed,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Map an empty or whitespace category onto the default one
pub fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => default_category(),
    }
}

impl Timer {
    /// Create a paused timer with a full countdown ahead of it
    pub fn create(
        name: &str,
        duration: u64,
        category: Option<&str>,
        halfway_alert: bool,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TimerError::InvalidInput("name must not be empty".to_string()));
        }
        if duration == 0 {
            return Err(TimerError::InvalidInput(
                "duration must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: normalize_category(category),
            duration,
            remaining_time: duration,
            status: TimerStatus::Paused,
            halfway_alert,
            halfway_alert_fired: false,
            created_at: Utc::now(),
        })
    }

    /// Elapsed fraction of the duration, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.duration == 0 {
            return 1.0;
        }
        1.0 - self.remaining_time as f64 / self.duration as f64
    }

    /// Remaining time as zero-padded `mm:ss`
    pub fn format_remaining(&self) -> String {
        format_seconds(self.remaining_time)
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        self.status == TimerStatus::Completed
    }

    /// Restore the full countdown and clear the halfway marker
    pub fn reset(&mut self) {
        self.remaining_time = self.duration;
        self.status = TimerStatus::Paused;
        self.halfway_alert_fired = false;
    }

    /// Advance a running timer by one second.
    ///
    /// Returns `None` when the timer is not running. Completion wins over the
    /// halfway crossing when both happen on the same tick.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        if self.status != TimerStatus::Running || self.remaining_time == 0 {
            return None;
        }

        self.remaining_time -= 1;

        if self.remaining_time == 0 {
            self.status = TimerStatus::Completed;
            return Some(TickOutcome::Completed);
        }

        if self.halfway_alert && !self.halfway_alert_fired && self.halfway_crossed() {
            self.halfway_alert_fired = true;
            return Some(TickOutcome::HalfwayReached);
        }

        Some(TickOutcome::Advanced)
    }

    // progress >= 0.5 in integer arithmetic
    fn halfway_crossed(&self) -> bool {
        let elapsed = self.duration - self.remaining_time;
        elapsed.saturating_mul(2) >= self.duration
    }

    /// Repair a record read from storage so the status invariants hold.
    ///
    /// Returns `false` if the record cannot describe a valid timer at all.
    pub fn normalize(&mut self) -> bool {
        if self.duration == 0 || self.name.trim().is_empty() {
            return false;
        }

        self.category = normalize_category(Some(self.category.as_str()));
        self.remaining_time = self.remaining_time.min(self.duration);

        if self.remaining_time == 0 {
            self.status = TimerStatus::Completed;
        } else if self.status == TimerStatus::Completed {
            self.status = TimerStatus::Paused;
        }

        if self.remaining_time == self.duration {
            self.halfway_alert_fired = false;
        }

        true
    }
}

/// Format whole seconds as `mm:ss`; minutes keep growing past 99
pub fn format_seconds(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
