//! timerd - a persistent multi-timer countdown engine
//!
//! This library manages independent countdown timers: creation, categories,
//! start/pause/reset, a shared one-second scheduler with completion and
//! halfway events, and durable JSON persistence across restarts.

pub mod config;
pub mod error;
pub mod state;
pub mod persistence;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{PersistenceError, TimerError};
pub use state::{AppState, Timer, TimerStatus, TimerStore};
pub use services::TimerService;
pub use tasks::{TimerEvent, TimerScheduler};
pub use api::create_router;
pub use utils::signals::shutdown_signal;
