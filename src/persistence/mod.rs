//! Durable storage for the timer collection
//!
//! The engine only talks to storage through [`PersistenceAdapter`], which moves
//! the whole collection as one serialized JSON document.

pub mod file;
pub mod memory;

use tracing::warn;

use crate::{error::PersistenceError, state::Timer};

pub use file::JsonFileAdapter;
pub use memory::MemoryAdapter;

/// Narrow load/save contract implemented by storage backends
pub trait PersistenceAdapter: Send + Sync {
    /// Read the last saved document, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<String>, PersistenceError>;

    /// Replace the stored document
    fn save(&self, serialized: &str) -> Result<(), PersistenceError>;
}

/// Serialize timers as a pretty-printed JSON array
pub fn encode(timers: &[Timer]) -> Result<String, PersistenceError> {
    serde_json::to_string_pretty(timers).map_err(PersistenceError::Encode)
}

/// Parse a stored JSON array of timers, repairing or dropping bad records
pub fn decode(serialized: &str) -> Result<Vec<Timer>, PersistenceError> {
    if serialized.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<Timer> = serde_json::from_str(serialized).map_err(PersistenceError::Corrupt)?;
    let mut timers: Vec<Timer> = Vec::with_capacity(records.len());

    for mut timer in records {
        if !timer.normalize() {
            warn!("Dropping invalid stored timer {} ({:?})", timer.id, timer.name);
            continue;
        }
        if timers.iter().any(|t| t.id == timer.id) {
            warn!("Dropping duplicate stored timer {}", timer.id);
            continue;
        }
        timers.push(timer);
    }

    Ok(timers)
}
