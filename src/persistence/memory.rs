//! In-process storage, mostly for tests and embedding

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use super::PersistenceAdapter;
use crate::error::PersistenceError;

/// Keeps the last saved document in memory.
///
/// Failures can be switched on to exercise the engine's recovery paths.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    content: Mutex<Option<String>>,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a previously saved document
    pub fn with_content(content: impl Into<String>) -> Self {
        let adapter = Self::default();
        *adapter.content.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.into());
        adapter
    }

    pub fn content(&self) -> Option<String> {
        self.content.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("load disabled".to_string()));
        }
        Ok(self.content())
    }

    fn save(&self, serialized: &str) -> Result<(), PersistenceError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("save disabled".to_string()));
        }
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = Some(serialized.to_string());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
