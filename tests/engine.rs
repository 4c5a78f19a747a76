use std::sync::{Arc, Mutex};

use timerd::{
    persistence::{JsonFileAdapter, MemoryAdapter},
    state::{TimerStatus, TimerStore},
    TimerEvent, TimerService,
};

fn memory_service() -> TimerService {
    let store = Arc::new(TimerStore::new(Arc::new(MemoryAdapter::new())));
    TimerService::new(store)
}

fn assert_invariants(service: &TimerService) {
    for timer in service.list_timers() {
        assert!(timer.remaining_time <= timer.duration, "{:?}", timer);
        assert_eq!(timer.status == TimerStatus::Completed, timer.remaining_time == 0, "{:?}", timer);
        if timer.remaining_time == timer.duration {
            assert!(!timer.halfway_alert_fired, "{:?}", timer);
        }
    }
}

#[test]
fn tea_timer_runs_to_completion() {
    let service = memory_service();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    service.on_event(move |event| sink.lock().unwrap().push(event.clone()));

    let tea = service.add_timer("Tea", 180, Some("Kitchen"), true).unwrap();
    service.start_timer(&tea.id).unwrap();

    for _ in 0..90 {
        service.scheduler().tick();
        assert_invariants(&service);
    }
    let half = service.get_timer(&tea.id).unwrap();
    assert_eq!(half.remaining_time, 90);
    assert_eq!(half.format_remaining(), "01:30");
    {
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], TimerEvent::HalfwayReached(t) if t.id == tea.id));
    }

    for _ in 0..90 {
        service.scheduler().tick();
        assert_invariants(&service);
    }
    let done = service.get_timer(&tea.id).unwrap();
    assert_eq!(done.remaining_time, 0);
    assert_eq!(done.status, TimerStatus::Completed);
    assert_eq!(done.progress(), 1.0);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[1], TimerEvent::Completed(t) if t.id == tea.id));
}

#[test]
fn timers_tick_independently() {
    let service = memory_service();
    let short = service.add_timer("Short", 3, None, false).unwrap();
    let long = service.add_timer("Long", 10, None, true).unwrap();
    let idle = service.add_timer("Idle", 10, None, false).unwrap();
    service.start_timer(&short.id).unwrap();
    service.start_timer(&long.id).unwrap();

    for step in 0..12 {
        service.scheduler().tick();
        assert_invariants(&service);
        if step == 5 {
            service.reset_timer(&long.id).unwrap();
            service.start_timer(&long.id).unwrap();
        }
    }

    assert!(service.get_timer(&short.id).unwrap().is_completed());
    assert_eq!(service.get_timer(&long.id).unwrap().remaining_time, 4);
    assert!(service.get_timer(&long.id).unwrap().halfway_alert_fired);
    assert_eq!(service.get_timer(&idle.id).unwrap().remaining_time, 10);
}

#[test]
fn halfway_fires_again_after_reset() {
    let service = memory_service();
    let timer = service.add_timer("Bread", 4, None, true).unwrap();
    let mut halfway = 0;

    for _ in 0..2 {
        service.start_timer(&timer.id).unwrap();
        for _ in 0..3 {
            halfway += service
                .scheduler()
                .tick()
                .iter()
                .filter(|e| matches!(e, TimerEvent::HalfwayReached(_)))
                .count();
        }
        service.reset_timer(&timer.id).unwrap();
    }

    assert_eq!(halfway, 2);
}

#[test]
fn timers_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timers.json");

    let before = {
        let store = Arc::new(TimerStore::new(Arc::new(JsonFileAdapter::new(&path))));
        store.load();
        let service = TimerService::new(store);
        let tea = service.add_timer("Tea", 10, Some("Kitchen"), true).unwrap();
        service.add_timer("Nap", 1200, None, false).unwrap();
        service.start_timer(&tea.id).unwrap();
        for _ in 0..6 {
            service.scheduler().tick();
        }
        service.list_timers()
    };

    let store = Arc::new(TimerStore::new(Arc::new(JsonFileAdapter::new(&path))));
    let after = store.load();

    assert_eq!(after, before);
    assert!(store.warnings().is_empty());
    assert_eq!(after[0].remaining_time, 4);
    assert_eq!(after[0].status, TimerStatus::Running);
    assert!(after[0].halfway_alert_fired);
}

#[test]
fn export_matches_persisted_document() {
    let adapter = Arc::new(MemoryAdapter::new());
    let service = TimerService::new(Arc::new(TimerStore::new(adapter.clone())));
    service.add_timer("Tea", 180, Some("Kitchen"), true).unwrap();
    service.add_timer("Nap", 60, None, false).unwrap();

    assert_eq!(service.export_snapshot().unwrap(), adapter.content().unwrap());
}

#[test]
fn unreadable_storage_does_not_abort_startup() {
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.set_fail_load(true);
    let store = Arc::new(TimerStore::new(adapter.clone()));

    assert!(store.load().is_empty());
    assert_eq!(store.warnings().len(), 1);

    let service = TimerService::new(store);
    adapter.set_fail_save(true);
    let timer = service.add_timer("Tea", 10, None, false).unwrap();
    assert_eq!(service.get_timer(&timer.id).unwrap().name, "Tea");
    assert_eq!(service.store().warnings().len(), 2);
}
