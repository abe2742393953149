use chrono::{Duration, TimeZone, Utc};
use crowd_vision::core_modules::alert::AlertEngine;
use crowd_vision::core_modules::heatmap::HeatAccumulator;
use crowd_vision::core_modules::history::{HistoryBuffer, Snapshot};
use crowd_vision::core_modules::visitor_ledger::VisitorLedger;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::num::NonZeroU32;

fn snapshot(second: i64, total: usize) -> Snapshot {
    Snapshot {
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(second),
        total_count: total,
        per_zone_count: BTreeMap::new(),
    }
}

proptest! {
    #[test]
    fn history_holds_the_most_recent_c(capacity in 1usize..50, appends in 0usize..200) {
        let mut history = HistoryBuffer::new(capacity);
        for i in 0..appends {
            history.append(snapshot(i as i64, i));
            prop_assert!(history.len() <= capacity);
        }

        let kept: Vec<usize> = history.iter().map(|s| s.total_count).collect();
        let expected: Vec<usize> = (appends.saturating_sub(capacity)..appends).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn observing_repeatedly_equals_observing_once(
        observations in prop::collection::vec((0u8..4, 0u64..20, 1usize..5), 0..60)
    ) {
        let mut repeated = VisitorLedger::new();
        let mut once = VisitorLedger::new();
        for &(zone, identity, times) in &observations {
            let zone = format!("z{zone}");
            for _ in 0..times {
                repeated.observe(&zone, identity);
            }
            once.observe(&zone, identity);
        }
        for zone in 0..4 {
            let zone = format!("z{zone}");
            prop_assert_eq!(repeated.count(&zone), once.count(&zone));
            prop_assert_eq!(repeated.visitors(&zone), once.visitors(&zone));
        }
    }

    #[test]
    fn alerts_fire_only_on_rising_edges(
        threshold in 1u32..10,
        counts in prop::collection::vec(0usize..15, 0..80)
    ) {
        let mut engine = AlertEngine::new();
        let threshold = NonZeroU32::new(threshold).unwrap();
        let limit = threshold.get() as usize;
        let mut previous_breached = false;

        for (i, &count) in counts.iter().enumerate() {
            let raised = engine.evaluate(
                &snapshot(i as i64, count),
                threshold,
                Vec::<(&str, NonZeroU32)>::new(),
            );
            let breached = count >= limit;
            let expected = usize::from(breached && !previous_breached);
            prop_assert_eq!(raised.len(), expected);
            previous_breached = breached;
        }
    }

    #[test]
    fn heat_never_decreases_between_resets(
        points in prop::collection::vec((-50.0f64..150.0, -50.0f64..150.0, -1.0f32..3.0), 0..100)
    ) {
        let mut heat = HeatAccumulator::new(100, 100, 7, 7).unwrap();
        let mut before = heat.snapshot();
        for &(x, y, weight) in &points {
            heat.add(x, y, weight);
            let after = heat.snapshot();
            prop_assert!(after.cells.iter().zip(&before.cells).all(|(a, b)| a >= b));
            before = after;
        }
        heat.reset();
        prop_assert!(heat.snapshot().cells.iter().all(|&v| v == 0.0));
    }
}
