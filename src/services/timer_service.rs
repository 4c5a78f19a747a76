//! Public operation surface over the store and scheduler

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    error::{PersistenceError, Result, TimerError},
    persistence,
    state::{normalize_category, Subscription, Timer, TimerStatus, TimerStore},
    tasks::{ListenerId, TimerEvent, TimerScheduler},
};

/// Timer operations used by UI layers.
///
/// Every operation is a single store mutation, so callers never observe a
/// half-applied change.
pub struct TimerService {
    store: Arc<TimerStore>,
    scheduler: TimerScheduler,
}

impl TimerService {
    pub fn new(store: Arc<TimerStore>) -> Self {
        let scheduler = TimerScheduler::new(Arc::clone(&store));
        Self { store, scheduler }
    }

    pub fn store(&self) -> &TimerStore {
        &self.store
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    /// Validate and add a new paused timer
    pub fn add_timer(
        &self,
        name: &str,
        duration: u64,
        category: Option<&str>,
        halfway_alert: bool,
    ) -> Result<Timer> {
        let timer = Timer::create(name, duration, category, halfway_alert)?;
        self.store.add(timer)
    }

    pub fn start_timer(&self, id: &str) -> Result<Timer> {
        let timer = self.store.mutate(id, |timer| match timer.status {
            TimerStatus::Completed => Err(TimerError::InvalidTransition {
                id: timer.id.clone(),
                status: timer.status,
                action: "start",
            }),
            _ => {
                timer.status = TimerStatus::Running;
                Ok(())
            }
        })?;
        debug!("Started timer {} at {}", timer.id, timer.format_remaining());
        Ok(timer)
    }

    pub fn pause_timer(&self, id: &str) -> Result<Timer> {
        let timer = self.store.mutate(id, |timer| match timer.status {
            TimerStatus::Completed => Err(TimerError::InvalidTransition {
                id: timer.id.clone(),
                status: timer.status,
                action: "pause",
            }),
            _ => {
                timer.status = TimerStatus::Paused;
                Ok(())
            }
        })?;
        debug!("Paused timer {} at {}", timer.id, timer.format_remaining());
        Ok(timer)
    }

    /// Restore the full countdown from any status
    pub fn reset_timer(&self, id: &str) -> Result<Timer> {
        let timer = self.store.mutate(id, |timer| {
            timer.reset();
            Ok(())
        })?;
        debug!("Reset timer {}", timer.id);
        Ok(timer)
    }

    /// Delete a timer; a running one simply stops being ticked
    pub fn delete_timer(&self, id: &str) -> Result<Timer> {
        self.store.remove(id)
    }

    pub fn get_timer(&self, id: &str) -> Result<Timer> {
        self.store.get(id)
    }

    pub fn list_timers(&self) -> Vec<Timer> {
        self.store.snapshot()
    }

    /// Serialized collection for writing to an export file
    pub fn export_snapshot(&self) -> Result<String, PersistenceError> {
        persistence::encode(&self.store.snapshot())
    }

    /// Categories with their timer counts, in first-seen order
    pub fn categories(&self) -> Vec<(String, usize)> {
        let mut categories: Vec<(String, usize)> = Vec::new();
        for timer in self.store.snapshot() {
            match categories.iter().position(|(name, _)| *name == timer.category) {
                Some(index) => categories[index].1 += 1,
                None => categories.push((timer.category, 1)),
            }
        }
        categories
    }

    pub fn timers_in(&self, category: &str) -> Vec<Timer> {
        let category = normalize_category(Some(category));
        self.store
            .snapshot()
            .into_iter()
            .filter(|t| t.category == category)
            .collect()
    }

    /// Start every non-completed timer in a category
    pub fn start_category(&self, category: &str) -> Result<Vec<Timer>> {
        self.apply_to_category(category, "start", |t| !t.is_completed(), |s, id| s.start_timer(id))
    }

    /// Pause every running timer in a category
    pub fn pause_category(&self, category: &str) -> Result<Vec<Timer>> {
        self.apply_to_category(category, "pause", Timer::is_running, |s, id| s.pause_timer(id))
    }

    /// Reset every timer in a category
    pub fn reset_category(&self, category: &str) -> Result<Vec<Timer>> {
        self.apply_to_category(category, "reset", |_| true, |s, id| s.reset_timer(id))
    }

    fn apply_to_category<P, F>(
        &self,
        category: &str,
        action: &str,
        eligible: P,
        operation: F,
    ) -> Result<Vec<Timer>>
    where
        P: Fn(&Timer) -> bool,
        F: Fn(&Self, &str) -> Result<Timer>,
    {
        let mut updated = Vec::new();

        for timer in self.timers_in(category).iter().filter(|&t| eligible(t)) {
            match operation(self, &timer.id) {
                Ok(timer) => updated.push(timer),
                // changed concurrently (deleted or completed); skip it
                Err(TimerError::NotFound(_)) | Err(TimerError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!("Applied {} to {} timers in {:?}", action, updated.len(), category);
        Ok(updated)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Timer]) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.store.unsubscribe(subscription)
    }

    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TimerEvent) + Send + Sync + 'static,
    {
        self.scheduler.on_event(listener)
    }

    pub fn events(&self) -> broadcast::Receiver<TimerEvent> {
        self.scheduler.events()
    }

    /// Stop ticking and write the collection out once more
    pub fn shutdown(&self) -> Result<(), PersistenceError> {
        self.scheduler.stop();
        self.store.flush()
    }
}
