// THEORY:
// The `AlertEngine` decides when a crowd count deserves a human's attention. It watches one
// "source" for the whole frame (the global head count) plus one source per zone that has a
// threshold, and raises an `AlertRecord` when a source crosses its threshold.
//
// Key architectural principles:
// 1.  **Edge Triggering**: Each source is a two-state machine, `Below` and `Breached`. Only
//     the `Below -> Breached` edge produces a record. A crowd that stays over the limit for
//     ten minutes is one alert, not six hundred; once it drops back under, the source re-arms
//     silently and the next crossing is a new episode.
// 2.  **Independent Sources**: Global and zone sources never influence each other, so a
//     single frame may raise several records at once.
// 3.  **Forward-Only Thresholds**: Thresholds are read at evaluation time. Changing one
//     affects the next frame only; history is never re-evaluated.
// 4.  **Self-Pruning**: A zone that is disabled, loses its threshold or is deleted drops out
//     of the state map, and starts from `Below` if it comes back.

use crate::core_modules::history::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

/// Default occupancy at which the whole frame breaches.
pub const DEFAULT_GLOBAL_THRESHOLD: NonZeroU32 = match NonZeroU32::new(50) {
    Some(v) => v,
    None => unreachable!(),
};

/// What an alert state machine is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertSource {
    Global,
    Zone(String),
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSource::Global => write!(f, "global"),
            AlertSource::Zone(name) => write!(f, "zone:{name}"),
        }
    }
}

// Serialized as its display string so it can key a JSON object.
impl Serialize for AlertSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertState {
    #[default]
    Below,
    Breached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Global,
    Zone,
}

/// A breach event, created once per `Below -> Breached` transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Sequence number, unique for the lifetime of the engine.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertKind,
    pub zone_name: Option<String>,
    pub threshold: u32,
    pub actual_count: usize,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn source(&self) -> AlertSource {
        match (&self.alert_type, &self.zone_name) {
            (AlertKind::Zone, Some(name)) => AlertSource::Zone(name.clone()),
            _ => AlertSource::Global,
        }
    }
}

/// Latest evaluation of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertSourceStatus {
    pub state: AlertState,
    pub threshold: u32,
    pub actual_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    sources: BTreeMap<AlertSource, AlertSourceStatus>,
    next_id: u64,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates a fresh snapshot against the global threshold and the given zone thresholds.
    /// `zone_thresholds` should list only enabled zones that have a threshold.
    pub fn evaluate<'a>(
        &mut self,
        snapshot: &Snapshot,
        global_threshold: NonZeroU32,
        zone_thresholds: impl IntoIterator<Item = (&'a str, NonZeroU32)>,
    ) -> Vec<AlertRecord> {
        let mut raised = Vec::new();
        let mut live = Vec::new();

        if self.step(AlertSource::Global, global_threshold, snapshot.total_count) {
            raised.push(self.record(snapshot, AlertKind::Global, None, global_threshold));
        }

        for (zone, threshold) in zone_thresholds {
            let source = AlertSource::Zone(zone.to_string());
            live.push(source.clone());
            if self.step(source, threshold, snapshot.zone_count(zone)) {
                raised.push(self.record(
                    snapshot,
                    AlertKind::Zone,
                    Some(zone.to_string()),
                    threshold,
                ));
            }
        }

        self.sources.retain(|source, _| match source {
            AlertSource::Global => true,
            AlertSource::Zone(_) => live.contains(source),
        });

        raised
    }

    /// Advances one state machine. Returns true on a `Below -> Breached` edge.
    fn step(&mut self, source: AlertSource, threshold: NonZeroU32, actual: usize) -> bool {
        let status = self.sources.entry(source).or_insert(AlertSourceStatus {
            state: AlertState::Below,
            threshold: threshold.get(),
            actual_count: 0,
        });
        status.threshold = threshold.get();
        status.actual_count = actual;

        let breached = actual >= threshold.get() as usize;
        match (status.state, breached) {
            (AlertState::Below, true) => {
                status.state = AlertState::Breached;
                true
            }
            (AlertState::Breached, false) => {
                status.state = AlertState::Below;
                false
            }
            _ => false,
        }
    }

    fn record(
        &mut self,
        snapshot: &Snapshot,
        alert_type: AlertKind,
        zone_name: Option<String>,
        threshold: NonZeroU32,
    ) -> AlertRecord {
        self.next_id += 1;
        let actual_count = match &zone_name {
            Some(zone) => snapshot.zone_count(zone),
            None => snapshot.total_count,
        };
        AlertRecord {
            id: self.next_id,
            timestamp: snapshot.timestamp,
            alert_type,
            zone_name,
            threshold: threshold.get(),
            actual_count,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    pub fn status(&self) -> BTreeMap<AlertSource, AlertSourceStatus> {
        self.sources.clone()
    }

    pub fn state_of(&self, source: &AlertSource) -> Option<AlertState> {
        self.sources.get(source).map(|s| s.state)
    }

    /// Drops the state of a zone source so its next evaluation starts from `Below`.
    pub fn forget_zone(&mut self, zone: &str) {
        self.sources.remove(&AlertSource::Zone(zone.to_string()));
    }
}
