//! Background tasks module
//!
//! This module contains the periodic driver that ticks running timers.

pub mod scheduler;

// Re-export main types
pub use scheduler::{EventListener, ListenerId, TimerEvent, TimerScheduler};
