//! State management module
//!
//! This module contains the timer record, the authoritative timer store and
//! the daemon-level state shared with the HTTP layer.

pub mod timer;
pub mod store;
pub mod app_state;

// Re-export main types
pub use timer::{format_seconds, normalize_category, TickOutcome, Timer, TimerStatus, DEFAULT_CATEGORY};
pub use store::{Subscriber, Subscription, TimerStore};
pub use app_state::AppState;
