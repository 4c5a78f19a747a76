//! Authoritative in-memory timer collection

use std::{
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::{debug, info, warn};

use super::Timer;
use crate::{
    error::{PersistenceError, Result, TimerError},
    persistence::{self, PersistenceAdapter},
};

/// Oldest warnings are dropped past this many
const MAX_WARNINGS: usize = 50;

/// Callback receiving the full collection after every mutation
pub type Subscriber = Arc<dyn Fn(&[Timer]) + Send + Sync>;

/// Handle returned by [`TimerStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Owns the timer collection and serializes every change to it.
///
/// Each mutation runs as one critical section: apply, persist the whole
/// collection and queue the new snapshot. Subscribers are called after the
/// collection lock is released, one snapshot at a time in mutation order, so
/// they may read from or mutate the store themselves.
pub struct TimerStore {
    timers: Mutex<Vec<Timer>>,
    adapter: Arc<dyn PersistenceAdapter>,
    subscribers: Mutex<Vec<(Subscription, Subscriber)>>,
    pending: Mutex<VecDeque<Vec<Timer>>>,
    delivering: AtomicBool,
    next_subscription: AtomicU64,
    warnings: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TimerStore {
    /// Create an empty store backed by `adapter`
    pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            timers: Mutex::new(Vec::new()),
            adapter,
            subscribers: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            delivering: AtomicBool::new(false),
            next_subscription: AtomicU64::new(1),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Replace the collection with what the adapter holds.
    ///
    /// A storage failure leaves the collection empty and is recorded as a
    /// warning instead of being returned.
    pub fn load(&self) -> Vec<Timer> {
        let loaded = self
            .adapter
            .load()
            .and_then(|content| match content {
                Some(content) => persistence::decode(&content),
                None => Ok(Vec::new()),
            });

        let timers = match loaded {
            Ok(timers) => {
                info!("Loaded {} timers from storage", timers.len());
                timers
            }
            Err(e) => {
                self.record_warning(format!("Failed to load timers, starting empty: {}", e));
                Vec::new()
            }
        };

        let mut guard = lock(&self.timers);
        *guard = timers;
        guard.clone()
    }

    /// Copy of the whole collection in insertion order
    pub fn snapshot(&self) -> Vec<Timer> {
        lock(&self.timers).clone()
    }

    pub fn get(&self, id: &str) -> Result<Timer> {
        lock(&self.timers)
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| TimerError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        lock(&self.timers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of running timers, in collection order
    pub fn running_ids(&self) -> Vec<String> {
        lock(&self.timers)
            .iter()
            .filter(|t| t.is_running())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Apply `updater` to one timer.
    ///
    /// The updater works on a draft; if it returns an error nothing changes.
    pub fn mutate<F>(&self, id: &str, updater: F) -> Result<Timer>
    where
        F: FnOnce(&mut Timer) -> Result<()>,
    {
        let mut timers = lock(&self.timers);

        let index = timers
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TimerError::NotFound(id.to_string()))?;

        let mut draft = timers[index].clone();
        updater(&mut draft)?;
        timers[index] = draft.clone();

        self.commit(&timers);
        drop(timers);

        self.notify();
        Ok(draft)
    }

    /// Append a new timer
    pub fn add(&self, timer: Timer) -> Result<Timer> {
        let mut timers = lock(&self.timers);

        if timers.iter().any(|t| t.id == timer.id) {
            return Err(TimerError::InvalidInput(format!(
                "timer id {} already exists",
                timer.id
            )));
        }

        timers.push(timer.clone());
        self.commit(&timers);
        drop(timers);

        self.notify();

        info!("Added timer {} ({:?}, {}s)", timer.id, timer.name, timer.duration);
        Ok(timer)
    }

    /// Delete a timer, returning its last state
    pub fn remove(&self, id: &str) -> Result<Timer> {
        let mut timers = lock(&self.timers);

        let index = timers
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TimerError::NotFound(id.to_string()))?;
        let removed = timers.remove(index);

        self.commit(&timers);
        drop(timers);

        self.notify();

        info!("Removed timer {} ({:?})", removed.id, removed.name);
        Ok(removed)
    }

    /// Save the current collection outside of any mutation
    pub fn flush(&self) -> Result<(), PersistenceError> {
        let timers = lock(&self.timers);
        let serialized = persistence::encode(&timers)?;
        self.adapter.save(&serialized)
    }

    /// Register a listener for post-mutation snapshots
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[Timer]) + Send + Sync + 'static,
    {
        let subscription = Subscription(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((subscription, Arc::new(callback)));
        debug!("Added store subscriber {:?}", subscription);
        subscription
    }

    /// Remove a listener; returns `false` if it was already gone
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(s, _)| *s != subscription);
        subscribers.len() != before
    }

    /// Recoverable problems seen so far, oldest first
    pub fn warnings(&self) -> Vec<String> {
        lock(&self.warnings).clone()
    }

    pub fn clear_warnings(&self) {
        lock(&self.warnings).clear();
    }

    fn record_warning(&self, message: String) {
        warn!("{}", message);
        let mut warnings = lock(&self.warnings);
        if warnings.len() >= MAX_WARNINGS {
            warnings.remove(0);
        }
        warnings.push(message);
    }

    // Persist and queue the snapshot; the caller still holds the collection lock.
    fn commit(&self, timers: &[Timer]) {
        match persistence::encode(timers).and_then(|s| self.adapter.save(&s)) {
            Ok(()) => {}
            Err(e) => self.record_warning(format!("Failed to save timers: {}", e)),
        }

        lock(&self.pending).push_back(timers.to_vec());
    }

    // Drain queued snapshots to subscribers. Only one caller delivers at a
    // time; a mutation made while delivering is picked up by that caller.
    fn notify(&self) {
        loop {
            if self
                .delivering
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = lock(&self.pending).pop_front();
                let Some(snapshot) = next else { break };
                self.deliver(&snapshot);
            }

            self.delivering.store(false, Ordering::Release);

            // a snapshot queued between the last pop and the release
            if lock(&self.pending).is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, timers: &[Timer]) {
        let subscribers: Vec<Subscriber> = lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(timers))).is_err() {
                warn!("Store subscriber panicked; continuing with the rest");
            }
        }
    }
}
