//! Timer operations module
//!
//! This module contains the operation surface external callers use to manage
//! timers.

pub mod timer_service;

// Re-export main types
pub use timer_service::TimerService;
