use chrono::{Duration, TimeZone, Utc};
use crowd_vision::{
    EngineConfig, EngineError, FrameResult, IngestWorker, MemoryEventLog, Point, SharedState,
    SystemAction, TrackedDetection, Zone,
};
use std::sync::Arc;

fn engine() -> (Arc<SharedState>, Arc<MemoryEventLog>) {
    let zone = Zone::new(
        "Lobby",
        vec![
            Point::new(0.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(200.0, 200.0),
            Point::new(0.0, 200.0),
        ],
    )
    .unwrap()
    .with_threshold(2);
    let config = EngineConfig {
        frame_width: 320,
        frame_height: 240,
        zones: vec![zone.into()],
        ..EngineConfig::default()
    };
    let log = Arc::new(MemoryEventLog::default());
    let state = SharedState::with_sink(&config, log.clone()).unwrap();
    (Arc::new(state), log)
}

fn frame(second: i64, people: &[(u64, f64, f64)]) -> FrameResult {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    FrameResult::new(
        people
            .iter()
            .map(|&(id, x, y)| TrackedDetection::at(id, Point::new(x, y)))
            .collect(),
        base + Duration::seconds(second),
    )
}

#[tokio::test]
async fn frames_are_applied_in_order_and_broadcast() {
    let (state, _) = engine();
    let worker = IngestWorker::spawn(Arc::clone(&state), 4);
    let mut updates = worker.subscribe();

    worker.submit(frame(0, &[(1, 10.0, 10.0)])).await.unwrap();
    worker
        .submit(frame(1, &[(1, 10.0, 10.0), (2, 50.0, 50.0)]))
        .await
        .unwrap();
    worker.submit(frame(2, &[(3, 300.0, 10.0)])).await.unwrap();

    let first = updates.recv().await.unwrap();
    assert_eq!(first.snapshot.total_count, 1);
    assert!(first.alerts.is_empty());

    let second = updates.recv().await.unwrap();
    assert_eq!(second.snapshot.zone_count("Lobby"), 2);
    assert_eq!(second.alerts.len(), 1);

    let third = updates.recv().await.unwrap();
    assert_eq!(third.snapshot.zone_count("Lobby"), 0);

    assert_eq!(worker.shutdown().await.unwrap(), 3);
    assert_eq!(state.history(None, None).len(), 3);
    assert_eq!(state.zone_stats()["Lobby"].total_visitors, 2);
    assert!(!state.is_detection_running());
}

#[tokio::test]
async fn full_queue_drops_and_reports() {
    let (state, log) = engine();
    let worker = IngestWorker::spawn(Arc::clone(&state), 1);

    // The worker task cannot run before this task yields, so the queue stays full.
    worker.try_submit(frame(0, &[(1, 10.0, 10.0)])).unwrap();
    let dropped = worker.try_submit(frame(1, &[(2, 10.0, 10.0)]));
    assert!(matches!(dropped, Err(EngineError::QueueFull)));

    assert_eq!(worker.shutdown().await.unwrap(), 1);
    assert_eq!(state.current_count(), 1);
    let events = log.system_events(10);
    assert!(events.iter().any(|e| e.action == SystemAction::FrameDropped));
}

#[tokio::test]
async fn shutdown_drains_accepted_frames() {
    let (state, _) = engine();
    let worker = IngestWorker::spawn(Arc::clone(&state), 16);
    for second in 0..10 {
        worker.submit(frame(second, &[(second as u64, 10.0, 10.0)])).await.unwrap();
    }
    assert_eq!(worker.shutdown().await.unwrap(), 10);
    assert_eq!(state.zone_stats()["Lobby"].total_visitors, 10);
    assert!(state.last_update().is_some());
}
