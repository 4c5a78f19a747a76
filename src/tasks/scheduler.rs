//! Shared one-second driver that advances every running timer

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    error::TimerError,
    state::{TickOutcome, Timer, TimerStore},
};

/// Capacity of the async event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Notification emitted while ticking
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "timer", rename_all = "camelCase")]
pub enum TimerEvent {
    Completed(Timer),
    HalfwayReached(Timer),
}

impl TimerEvent {
    pub fn timer(&self) -> &Timer {
        match self {
            TimerEvent::Completed(timer) | TimerEvent::HalfwayReached(timer) => timer,
        }
    }

    /// Short name used for event streams
    pub fn name(&self) -> &'static str {
        match self {
            TimerEvent::Completed(_) => "completed",
            TimerEvent::HalfwayReached(_) => "halfway",
        }
    }
}

/// Synchronous event listener
pub type EventListener = Arc<dyn Fn(&TimerEvent) + Send + Sync>;

/// Handle returned by [`TimerScheduler::on_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct SchedulerCore {
    store: Arc<TimerStore>,
    listeners: Mutex<Vec<(ListenerId, EventListener)>>,
    next_listener: AtomicU64,
    events_tx: broadcast::Sender<TimerEvent>,
}

/// Single source of ticking for all timers.
///
/// One periodic task drives every running timer, so timers started together
/// stay in step. The driver only reaches timers through [`TimerStore::mutate`].
pub struct TimerScheduler {
    core: Arc<SchedulerCore>,
    period: Duration,
    driver: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TimerScheduler {
    /// Scheduler ticking once per second
    pub fn new(store: Arc<TimerStore>) -> Self {
        Self::with_period(store, Duration::from_secs(1))
    }

    /// Scheduler with a custom driver period; each driver firing is one tick
    pub fn with_period(store: Arc<TimerStore>, period: Duration) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            core: Arc::new(SchedulerCore {
                store,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                events_tx,
            }),
            period,
            driver: Mutex::new(None),
        }
    }

    /// Spawn the periodic driver unless one is already running.
    ///
    /// Must be called from within a tokio runtime. Returns `true` if a new
    /// driver was started.
    pub fn start(&self) -> bool {
        let mut driver = lock(&self.driver);
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Scheduler already running");
            return false;
        }

        let core = Arc::clone(&self.core);
        let period = self.period;
        *driver = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                core.tick();
            }
        }));

        info!("Scheduler started ({:?} period)", period);
        true
    }

    /// Halt the driver; returns `true` if one was running
    pub fn stop(&self) -> bool {
        match lock(&self.driver).take() {
            Some(handle) => {
                handle.abort();
                info!("Scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.driver)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Advance every running timer by one second and deliver resulting events
    pub fn tick(&self) -> Vec<TimerEvent> {
        self.core.tick()
    }

    /// Register a synchronous listener, called in processing order within a tick
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TimerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.core.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.core.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns `false` if it was already gone
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.core.listeners);
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    /// Receiver for async consumers; slow receivers lose the oldest events
    pub fn events(&self) -> broadcast::Receiver<TimerEvent> {
        self.core.events_tx.subscribe()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.driver).take() {
            handle.abort();
        }
    }
}

impl SchedulerCore {
    fn tick(&self) -> Vec<TimerEvent> {
        let running = self.store.running_ids();
        if running.is_empty() {
            return Vec::new();
        }

        debug!("Tick over {} running timers", running.len());
        let mut events = Vec::new();

        for id in running {
            let mut outcome = None;
            let result = self.store.mutate(&id, |timer| {
                outcome = timer.tick();
                match outcome {
                    Some(_) => Ok(()),
                    // no commit for a timer that stopped running meanwhile
                    None => Err(TimerError::InvalidTransition {
                        id: timer.id.clone(),
                        status: timer.status,
                        action: "tick",
                    }),
                }
            });

            let timer = match result {
                Ok(timer) => timer,
                // deleted or paused between the snapshot and the mutation
                Err(TimerError::NotFound(_)) | Err(TimerError::InvalidTransition { .. }) => {
                    continue
                }
                Err(e) => {
                    warn!("Failed to advance timer {}: {}", id, e);
                    continue;
                }
            };

            let event = match outcome {
                Some(TickOutcome::Completed) => {
                    info!("Timer {} ({:?}) completed", timer.id, timer.name);
                    TimerEvent::Completed(timer)
                }
                Some(TickOutcome::HalfwayReached) => {
                    info!("Timer {} ({:?}) reached halfway", timer.id, timer.name);
                    TimerEvent::HalfwayReached(timer)
                }
                _ => continue,
            };

            self.deliver(&event);
            events.push(event);
        }

        events
    }

    fn deliver(&self, event: &TimerEvent) {
        let listeners: Vec<EventListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!("Event listener panicked on {} event", event.name());
            }
        }

        // no receivers is fine
        let _ = self.events_tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{persistence::MemoryAdapter, state::TimerStatus};

    fn setup() -> (Arc<TimerStore>, TimerScheduler) {
        let store = Arc::new(TimerStore::new(Arc::new(MemoryAdapter::new())));
        let scheduler = TimerScheduler::new(Arc::clone(&store));
        (store, scheduler)
    }

    fn add_running(store: &TimerStore, duration: u64, halfway_alert: bool) -> Timer {
        let timer = store
            .add(Timer::create("T", duration, None, halfway_alert).unwrap())
            .unwrap();
        store
            .mutate(&timer.id, |t| {
                t.status = TimerStatus::Running;
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn tick_decrements_only_running_timers() {
        let (store, scheduler) = setup();
        let running = add_running(&store, 5, false);
        let paused = store.add(Timer::create("P", 5, None, false).unwrap()).unwrap();

        assert!(scheduler.tick().is_empty());

        assert_eq!(store.get(&running.id).unwrap().remaining_time, 4);
        assert_eq!(store.get(&paused.id).unwrap().remaining_time, 5);
    }

    #[test]
    fn completion_is_emitted_exactly_once() {
        let (store, scheduler) = setup();
        let timer = add_running(&store, 1, false);

        let events = scheduler.tick();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TimerEvent::Completed(t) if t.id == timer.id));

        let done = store.get(&timer.id).unwrap();
        assert_eq!(done.remaining_time, 0);
        assert_eq!(done.status, TimerStatus::Completed);

        assert!(scheduler.tick().is_empty());
    }

    #[test]
    fn halfway_event_fires_once_for_ten_second_timer() {
        let (store, scheduler) = setup();
        add_running(&store, 10, true);

        let halfway: Vec<usize> = (1..=6)
            .filter(|_| {
                scheduler
                    .tick()
                    .iter()
                    .any(|e| matches!(e, TimerEvent::HalfwayReached(_)))
            })
            .collect();

        assert_eq!(halfway, vec![5]);
    }

    #[test]
    fn listeners_receive_events_in_processing_order() {
        let (store, scheduler) = setup();
        let first = add_running(&store, 1, false);
        let second = add_running(&store, 1, false);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scheduler.on_event(move |event| sink.lock().unwrap().push(event.timer().id.clone()));

        scheduler.tick();
        assert_eq!(*seen.lock().unwrap(), vec![first.id, second.id]);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_tick() {
        let (store, scheduler) = setup();
        add_running(&store, 1, false);
        add_running(&store, 1, false);

        scheduler.on_event(|_| panic!("alert widget crashed"));
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = scheduler.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(scheduler.tick().len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(store.snapshot().iter().all(|t| t.is_completed()));

        assert!(scheduler.remove_listener(id));
        assert!(!scheduler.remove_listener(id));
    }

    #[test]
    fn timer_paused_mid_tick_is_not_saved_again() {
        let adapter = Arc::new(MemoryAdapter::new());
        let store = Arc::new(TimerStore::new(adapter.clone()));
        let scheduler = TimerScheduler::new(Arc::clone(&store));
        let a = add_running(&store, 10, false);
        let b = add_running(&store, 10, false);

        // pause B as soon as A's tick is committed
        let handle = Arc::downgrade(&store);
        let b_id = b.id.clone();
        store.subscribe(move |timers| {
            let Some(store) = handle.upgrade() else { return };
            if timers.iter().any(|t| t.id == b_id && t.is_running()) {
                store
                    .mutate(&b_id, |t| {
                        t.status = TimerStatus::Paused;
                        Ok(())
                    })
                    .unwrap();
            }
        });

        let saves = adapter.save_count();
        scheduler.tick();

        assert_eq!(store.get(&a.id).unwrap().remaining_time, 9);
        let b = store.get(&b.id).unwrap();
        assert_eq!(b.status, TimerStatus::Paused);
        assert_eq!(b.remaining_time, 10);
        // A's tick and the pause; nothing for B's skipped tick
        assert_eq!(adapter.save_count(), saves + 2);
    }

    #[tokio::test]
    async fn broadcast_receivers_get_events() {
        let (store, scheduler) = setup();
        let mut rx = scheduler.events();
        let timer = add_running(&store, 1, false);

        scheduler.tick();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "completed");
        assert_eq!(event.timer().id, timer.id);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_releases_driver() {
        let (store, scheduler) = setup();
        let timer = add_running(&store, 100, false);

        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 97);

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 97);

        assert!(scheduler.start());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.get(&timer.id).unwrap().remaining_time, 95);
    }
}
