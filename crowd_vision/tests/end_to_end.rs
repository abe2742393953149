use chrono::{DateTime, Duration, TimeZone, Utc};
use crowd_vision::{
    AlertKind, AlertQuery, EngineConfig, MemoryEventLog, Point, SharedState, SystemAction,
    TrackedDetection, Zone, ZoneDefinition, ZoneStats,
};
use std::io::Write;
use std::num::NonZeroU32;
use std::sync::Arc;

fn at(second: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(second)
}

fn square(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Zone {
    Zone::new(
        name,
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ],
    )
    .unwrap()
}

fn engine(zones: Vec<Zone>) -> (SharedState, Arc<MemoryEventLog>) {
    let config = EngineConfig {
        frame_width: 640,
        frame_height: 480,
        zones: zones.into_iter().map(ZoneDefinition::from).collect(),
        ..EngineConfig::default()
    };
    let log = Arc::new(MemoryEventLog::default());
    (SharedState::with_sink(&config, log.clone()).unwrap(), log)
}

#[test]
fn entry_zone_scenario() {
    let entry = square("Entry", 100.0, 100.0, 300.0, 300.0).with_threshold(1);
    let (state, log) = engine(vec![entry]);

    state.ingest([TrackedDetection::at(1, Point::new(150.0, 150.0))], at(0));

    assert_eq!(state.current_count(), 1);
    assert_eq!(
        state.zone_stats()["Entry"],
        ZoneStats {
            current_count: 1,
            total_visitors: 1
        }
    );
    let alerts = log.alerts(&AlertQuery::default());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertKind::Zone);
    assert_eq!(alerts[0].zone_name.as_deref(), Some("Entry"));
    assert_eq!(alerts[0].threshold, 1);
    assert_eq!(alerts[0].actual_count, 1);

    let json = serde_json::to_value(&alerts[0]).unwrap();
    assert_eq!(json["alert_type"], "zone");
    assert_eq!(json["acknowledged"], false);
}

#[test]
fn zones_json_drives_a_session() {
    let mut config = EngineConfig::default();
    config.zones = EngineConfig::parse_zones_json(
        r#"{"zones": [
            {"name": "Entry", "points": [[0,0],[100,0],[100,100],[0,100]], "threshold": 2},
            {"name": "Exit", "points": [[200,0],[300,0],[300,100],[200,100]], "enabled": false}
        ]}"#,
    )
    .unwrap();
    let log = Arc::new(MemoryEventLog::default());
    let state = SharedState::with_sink(&config, log.clone()).unwrap();

    // Two people walk through Entry then stand in the disabled Exit.
    let walk = [
        vec![(1, 10.0, 10.0)],
        vec![(1, 50.0, 50.0), (2, 20.0, 20.0)],
        vec![(1, 250.0, 50.0), (2, 90.0, 90.0)],
        vec![(1, 250.0, 50.0), (2, 260.0, 60.0)],
    ];
    for (i, frame) in walk.iter().enumerate() {
        let detections = frame
            .iter()
            .map(|&(id, x, y)| TrackedDetection::at(id, Point::new(x, y)));
        state.ingest(detections, at(i as i64));
    }

    let stats = state.zone_stats();
    assert_eq!(stats["Entry"].total_visitors, 2);
    assert_eq!(stats["Entry"].current_count, 0);
    assert_eq!(stats["Exit"].total_visitors, 0);
    assert_eq!(log.alerts(&AlertQuery::default()).len(), 1);

    let history = state.history(Some(at(1)), Some(at(2)));
    let entry: Vec<_> = history.iter().map(|s| s.zone_count("Entry")).collect();
    assert_eq!(entry, vec![2, 1]);

    // Enabling Exit makes it count from the next frame on.
    state.set_zone_enabled("Exit", true).unwrap();
    state.ingest(
        [
            TrackedDetection::at(1, Point::new(250.0, 50.0)),
            TrackedDetection::at(2, Point::new(260.0, 60.0)),
        ],
        at(4),
    );
    assert_eq!(
        state.zone_stats()["Exit"],
        ZoneStats {
            current_count: 2,
            total_visitors: 2
        }
    );
}

#[test]
fn bad_zone_in_file_is_skipped_and_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"zones": [
            {{"name": "Entry", "points": [[0,0],[100,0],[100,100],[0,100]], "threshold": 1}},
            {{"name": "Broken", "points": [[0,0],[10,10]]}},
            {{"name": "Lobby", "points": [[0,0],[50,0],[50,50]], "threshold": 0}}
        ]}}"#
    )
    .unwrap();
    let mut config = EngineConfig::default();
    config.load_zones_json(file.path()).unwrap();
    let log = Arc::new(MemoryEventLog::default());
    let state = SharedState::with_sink(&config, log.clone()).unwrap();

    let names: Vec<_> = state.zones().into_iter().map(|z| z.name).collect();
    assert_eq!(names, vec!["Entry"]);
    let rejected: Vec<_> = log
        .system_events(10)
        .into_iter()
        .filter(|e| e.action == SystemAction::ZoneRejected)
        .map(|e| e.details)
        .collect();
    assert_eq!(rejected.len(), 2);
    assert!(rejected.iter().any(|d| d.contains("Broken")));
    assert!(rejected.iter().any(|d| d.contains("Lobby")));

    // The surviving zone still counts and alerts.
    let report = state.ingest([TrackedDetection::at(1, Point::new(50.0, 50.0))], at(0));
    assert_eq!(report.snapshot.zone_count("Entry"), 1);
    assert_eq!(report.alerts.len(), 1);
}

#[test]
fn admin_actions_are_logged_as_events() {
    let (state, log) = engine(vec![square("Hall", 0.0, 0.0, 50.0, 50.0)]);
    state.ingest([TrackedDetection::at(1, Point::new(5.0, 5.0))], at(0));

    state.set_zone_threshold("Hall", NonZeroU32::new(4)).unwrap();
    state.reset_visitors(Some("Hall")).unwrap();
    state.reset_heatmap();
    state.clear_history();
    state.remove_zone("Hall").unwrap();

    let actions: Vec<_> = log
        .system_events(10)
        .into_iter()
        .rev()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            SystemAction::ThresholdChanged,
            SystemAction::VisitorsReset,
            SystemAction::HeatmapReset,
            SystemAction::HistoryCleared,
            SystemAction::ZoneRemoved,
        ]
    );
}

#[test]
fn acknowledged_alert_keeps_its_identity() {
    let (state, log) = engine(vec![]);
    state.set_global_threshold(NonZeroU32::new(1).unwrap());
    let report = state.ingest([TrackedDetection::at(1, Point::new(5.0, 5.0))], at(0));
    let id = report.alerts[0].id;

    assert!(log.acknowledge(id, "supervisor"));
    let stored = log.alerts(&AlertQuery {
        alert_type: Some(AlertKind::Global),
        ..AlertQuery::default()
    });
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].acknowledged_by.as_deref(), Some("supervisor"));
}
