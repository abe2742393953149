// THEORY:
// The `shared_state` module is the top-level API of the engine and its single source of truth.
// It takes the per-frame output of an external person tracker and folds it into everything a
// dashboard wants to know: who is where right now, how many different people have visited each
// zone, how the counts evolved, where people tend to stand, and when a limit was crossed.
//
// Key architectural principles:
// 1.  **One Writer, Many Readers**: All mutable state lives in one `Inner` struct behind a
//     `parking_lot::RwLock`. `ingest` and every admin operation take the write lock exactly
//     once; every accessor takes the read lock exactly once and returns owned data. A reader
//     therefore sees either the state before a frame or the state after it, never a mix.
// 2.  **Short Critical Sections**: Validation, quality filtering and point-in-polygon tests run
//     before the write lock is taken, against a copy-on-write `RegistryView`. If an admin edit
//     slipped in between (the registry generation moved), membership is recomputed against the
//     current registry while holding the lock, so one frame always uses one registry state.
// 3.  **No I/O Under the Lock**: Alerts and system events are collected while the lock is held
//     and handed to the `EventSink` only after it has been released.
// 4.  **Geometry Every Frame**: Occupancy is recomputed from scratch for each frame. There is
//     no per-identity membership cache that could drift from the polygons.

use crate::config::EngineConfig;
use crate::core_modules::alert::{AlertEngine, AlertRecord, AlertSource, AlertSourceStatus};
use crate::core_modules::detection::{DetectionFilter, Identity, TrackedDetection};
use crate::core_modules::geometry::Point;
use crate::core_modules::heatmap::{HeatAccumulator, HeatmapSnapshot};
use crate::core_modules::history::{HistoryBuffer, Snapshot};
use crate::core_modules::visitor_ledger::VisitorLedger;
use crate::core_modules::zone::{RegistryView, UpsertOutcome, Zone, ZoneRegistry};
use crate::error::{EngineError, Result, ValidationError};
use crate::event_log::{EventSink, SystemAction, SystemEvent, TracingSink};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Occupancy and visitor totals for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ZoneStats {
    /// People inside the zone in the latest frame. Always 0 for disabled zones.
    pub current_count: usize,
    /// Distinct identities ever observed inside the zone since start or last reset.
    pub total_visitors: usize,
}

/// Everything a dashboard needs, read in one shared section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_count: usize,
    pub zones: BTreeMap<String, ZoneStats>,
    pub last_update: Option<DateTime<Utc>>,
    pub detection_running: bool,
    pub alert_status: BTreeMap<AlertSource, AlertSourceStatus>,
    pub global_threshold: u32,
    pub zone_thresholds: BTreeMap<String, Option<u32>>,
}

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub snapshot: Snapshot,
    /// Alerts raised by this frame, in evaluation order (global first).
    pub alerts: Vec<AlertRecord>,
    /// (zone, identity) pairs seen for the first time in this frame.
    pub new_visitors: usize,
    /// Detections that failed validation and were reported.
    pub rejected: usize,
    /// Detections dropped by the quality filter.
    pub filtered: usize,
}

/// Who is inside one enabled zone in the current frame.
#[derive(Debug)]
struct ZoneOccupancy {
    name: String,
    threshold: Option<NonZeroU32>,
    occupants: Vec<Identity>,
}

#[derive(Debug)]
struct Inner {
    registry: ZoneRegistry,
    ledger: VisitorLedger,
    history: HistoryBuffer,
    heat: HeatAccumulator,
    alerts: AlertEngine,
    global_threshold: NonZeroU32,
    last_update: Option<DateTime<Utc>>,
    coordinates: Vec<Point>,
    detection_running: bool,
}

impl Inner {
    fn current_count(&self) -> usize {
        self.history.latest().map_or(0, |s| s.total_count)
    }

    fn zone_stats(&self) -> BTreeMap<String, ZoneStats> {
        let latest = self.history.latest();
        self.registry
            .iter()
            .map(|zone| {
                let current_count = if zone.enabled {
                    latest.map_or(0, |s| s.zone_count(&zone.name))
                } else {
                    0
                };
                let stats = ZoneStats {
                    current_count,
                    total_visitors: self.ledger.count(&zone.name),
                };
                (zone.name.clone(), stats)
            })
            .collect()
    }

    /// Drops alert state for a zone that can no longer alert.
    fn disarm_if_silent(&mut self, name: &str) {
        let silent = self
            .registry
            .get(name)
            .is_none_or(|z| !z.enabled || z.threshold.is_none());
        if silent {
            self.alerts.forget_zone(name);
        }
    }
}

pub struct SharedState {
    inner: RwLock<Inner>,
    sink: Arc<dyn EventSink>,
    filter: DetectionFilter,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("inner", &*self.inner.read())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl SharedState {
    /// Builds the engine from a configuration, logging events through `tracing`.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: &EngineConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;

        let (zones, rejected_zones) = config.build_zones();
        let mut registry = ZoneRegistry::new();
        for zone in zones {
            registry.upsert(zone)?;
        }
        let heat = HeatAccumulator::new(
            config.frame_width,
            config.frame_height,
            config.cell_width,
            config.cell_height,
        )?;

        tracing::info!(
            zones = registry.len(),
            frame_width = config.frame_width,
            frame_height = config.frame_height,
            history_capacity = config.history_capacity,
            global_threshold = config.global_threshold.get(),
            "Shared state initialised"
        );

        let state = Self {
            inner: RwLock::new(Inner {
                registry,
                ledger: VisitorLedger::new(),
                history: HistoryBuffer::new(config.history_capacity),
                heat,
                alerts: AlertEngine::new(),
                global_threshold: config.global_threshold,
                last_update: None,
                coordinates: Vec::new(),
                detection_running: false,
            }),
            sink,
            filter: config.detection_filter.clone(),
        };

        for rejected in &rejected_zones {
            tracing::warn!(
                zone = %rejected.name,
                error = %rejected.error,
                "Zone definition rejected"
            );
            state.emit(
                SystemAction::ZoneRejected,
                format!("zone {:?}: {}", rejected.name, rejected.error),
            );
        }
        Ok(state)
    }

    // --- Ingestion ---

    /// Folds one frame of tracked detections into the state.
    ///
    /// Invalid detections are skipped and reported; the rest of the frame is still processed.
    pub fn ingest(
        &self,
        detections: impl IntoIterator<Item = TrackedDetection>,
        timestamp: DateTime<Utc>,
    ) -> IngestReport {
        let mut accepted = Vec::new();
        let mut rejections: Vec<(Identity, ValidationError)> = Vec::new();
        let mut filtered = 0;
        for detection in detections {
            match detection.validate() {
                Err(err) => rejections.push((detection.identity, err)),
                Ok(()) if !self.filter.accepts(&detection) => {
                    tracing::debug!(
                        identity = detection.identity,
                        confidence = detection.confidence,
                        "Detection filtered"
                    );
                    filtered += 1;
                }
                Ok(()) => accepted.push(detection),
            }
        }
        let centers: Vec<Point> = accepted.iter().map(TrackedDetection::center).collect();

        let view = self.inner.read().registry.view();
        let mut occupancy = occupancy_of(&view, &accepted, &centers);

        let (snapshot, alerts, new_visitors) = {
            let mut inner = self.inner.write();
            if inner.registry.generation() != view.generation() {
                tracing::trace!("Zone registry changed mid-frame, recomputing membership");
                occupancy = occupancy_of(&inner.registry.view(), &accepted, &centers);
            }

            let mut new_visitors = 0;
            let mut per_zone_count = BTreeMap::new();
            for zone in &occupancy {
                for &identity in &zone.occupants {
                    if inner.ledger.observe(&zone.name, identity) {
                        new_visitors += 1;
                    }
                }
                per_zone_count.insert(zone.name.clone(), zone.occupants.len());
            }

            let snapshot = Snapshot {
                timestamp,
                total_count: accepted.len(),
                per_zone_count,
            };
            inner.history.append(snapshot.clone());

            for center in &centers {
                inner.heat.add(center.x, center.y, 1.0);
            }

            let global_threshold = inner.global_threshold;
            let thresholds = occupancy
                .iter()
                .filter_map(|z| z.threshold.map(|t| (z.name.as_str(), t)));
            let alerts = inner.alerts.evaluate(&snapshot, global_threshold, thresholds);

            inner.last_update = Some(timestamp);
            inner.coordinates = centers;
            (snapshot, alerts, new_visitors)
        };

        for (identity, err) in &rejections {
            self.sink.system_event(&SystemEvent::new(
                SystemAction::DetectionRejected,
                format!("identity {identity}: {err}"),
            ));
        }
        for alert in &alerts {
            self.sink.alert_raised(alert);
        }

        IngestReport {
            snapshot,
            alerts,
            new_visitors,
            rejected: rejections.len(),
            filtered,
        }
    }

    // --- Accessors ---

    /// People in the latest frame.
    pub fn current_count(&self) -> usize {
        self.inner.read().current_count()
    }

    /// Stats for every registered zone, disabled ones included.
    pub fn zone_stats(&self) -> BTreeMap<String, ZoneStats> {
        self.inner.read().zone_stats()
    }

    /// Snapshots with `since <= timestamp <= until`, oldest first.
    pub fn history(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<Snapshot> {
        self.inner.read().history.range(since, until).cloned().collect()
    }

    /// The newest `limit` snapshots, oldest first.
    pub fn recent_history(&self, limit: usize) -> Vec<Snapshot> {
        self.inner.read().history.recent(limit).cloned().collect()
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.inner.read().history.latest().cloned()
    }

    pub fn heatmap_snapshot(&self) -> HeatmapSnapshot {
        self.inner.read().heat.snapshot()
    }

    pub fn alert_status(&self) -> BTreeMap<AlertSource, AlertSourceStatus> {
        self.inner.read().alerts.status()
    }

    pub fn summary(&self) -> Summary {
        let inner = self.inner.read();
        Summary {
            total_count: inner.current_count(),
            zones: inner.zone_stats(),
            last_update: inner.last_update,
            detection_running: inner.detection_running,
            alert_status: inner.alerts.status(),
            global_threshold: inner.global_threshold.get(),
            zone_thresholds: inner
                .registry
                .iter()
                .map(|z| (z.name.clone(), z.threshold.map(NonZeroU32::get)))
                .collect(),
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_update
    }

    /// Centers of the detections in the latest frame.
    pub fn coordinates(&self) -> Vec<Point> {
        self.inner.read().coordinates.clone()
    }

    /// Registered zones in insertion order.
    pub fn zones(&self) -> Vec<Zone> {
        self.inner.read().registry.iter().cloned().collect()
    }

    pub fn global_threshold(&self) -> NonZeroU32 {
        self.inner.read().global_threshold
    }

    pub fn is_detection_running(&self) -> bool {
        self.inner.read().detection_running
    }

    pub fn visitors(&self, zone: &str) -> Vec<Identity> {
        self.inner.read().ledger.visitors(zone)
    }

    // --- Admin operations ---

    pub fn upsert_zone(&self, zone: Zone) -> Result<UpsertOutcome> {
        let name = zone.name.clone();
        let outcome = {
            let mut inner = self.inner.write();
            let outcome = inner.registry.upsert(zone);
            if outcome.is_ok() {
                inner.disarm_if_silent(&name);
            }
            outcome
        };

        match outcome {
            Ok(outcome) => {
                tracing::info!(zone = %name, ?outcome, "Zone saved");
                self.emit(SystemAction::ZoneUpserted, format!("zone {name} {outcome:?}"));
                Ok(outcome)
            }
            Err(err) => {
                self.emit(SystemAction::ZoneRejected, format!("zone {name:?}: {err}"));
                Err(err.into())
            }
        }
    }

    /// Deletes a zone together with its visitor set and alert state.
    pub fn remove_zone(&self, name: &str) -> Result<Zone> {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner
                .registry
                .remove(name)
                .ok_or_else(|| EngineError::UnknownZone(name.to_string()))?;
            inner.ledger.remove(name);
            inner.alerts.forget_zone(name);
            removed
        };
        tracing::info!(zone = %name, "Zone removed");
        self.emit(SystemAction::ZoneRemoved, format!("zone {name}"));
        Ok(removed)
    }

    pub fn set_zone_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        {
            let mut inner = self.inner.write();
            inner.registry.set_enabled(name, enabled)?;
            inner.disarm_if_silent(name);
        }
        tracing::info!(zone = %name, enabled, "Zone toggled");
        self.emit(SystemAction::ZoneToggled, format!("zone {name} enabled={enabled}"));
        Ok(())
    }

    /// Sets or clears a zone's alert threshold. Applies from the next frame.
    pub fn set_zone_threshold(&self, name: &str, threshold: Option<NonZeroU32>) -> Result<()> {
        {
            let mut inner = self.inner.write();
            inner.registry.set_threshold(name, threshold)?;
            inner.disarm_if_silent(name);
        }
        let threshold = threshold.map(NonZeroU32::get);
        tracing::info!(zone = %name, ?threshold, "Zone threshold changed");
        self.emit(
            SystemAction::ThresholdChanged,
            format!("zone {name} threshold={threshold:?}"),
        );
        Ok(())
    }

    /// Applies from the next frame.
    pub fn set_global_threshold(&self, threshold: NonZeroU32) {
        self.inner.write().global_threshold = threshold;
        tracing::info!(threshold = threshold.get(), "Global threshold changed");
        self.emit(
            SystemAction::ThresholdChanged,
            format!("global threshold={threshold}"),
        );
    }

    pub fn reset_heatmap(&self) {
        self.inner.write().heat.reset();
        tracing::info!("Heatmap reset");
        self.emit(SystemAction::HeatmapReset, "heatmap zeroed");
    }

    /// Recreates a zeroed heat grid for a new frame resolution.
    pub fn resize_heatmap(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        self.inner.write().heat.resize(frame_width, frame_height)?;
        tracing::info!(frame_width, frame_height, "Heatmap resized");
        self.emit(
            SystemAction::HeatmapResized,
            format!("{frame_width}x{frame_height}"),
        );
        Ok(())
    }

    /// Clears the visitor set of one zone, or of every zone when `zone` is `None`.
    /// Returns the number of identities forgotten.
    pub fn reset_visitors(&self, zone: Option<&str>) -> Result<usize> {
        let dropped = {
            let mut inner = self.inner.write();
            match zone {
                Some(name) => {
                    if inner.registry.get(name).is_none() {
                        return Err(EngineError::UnknownZone(name.to_string()));
                    }
                    inner.ledger.reset(name)
                }
                None => inner.ledger.reset_all(),
            }
        };
        let scope = zone.unwrap_or("all zones");
        tracing::info!(zone = scope, dropped, "Visitors reset");
        self.emit(SystemAction::VisitorsReset, format!("{scope}: {dropped} visitors"));
        Ok(dropped)
    }

    pub fn clear_history(&self) {
        let dropped = {
            let mut inner = self.inner.write();
            let dropped = inner.history.len();
            inner.history.clear();
            dropped
        };
        tracing::info!(dropped, "History cleared");
        self.emit(SystemAction::HistoryCleared, format!("{dropped} snapshots"));
    }

    pub fn set_detection_running(&self, running: bool) {
        let changed = {
            let mut inner = self.inner.write();
            std::mem::replace(&mut inner.detection_running, running) != running
        };
        if changed {
            tracing::info!(running, "Detection running flag changed");
        }
    }

    /// Reports a frame that never reached `ingest`.
    pub fn report_dropped_frame(&self, details: impl Into<String>) {
        self.emit(SystemAction::FrameDropped, details);
    }

    fn emit(&self, action: SystemAction, details: impl Into<String>) {
        self.sink.system_event(&SystemEvent::new(action, details));
    }
}

/// Membership of each detection in each enabled zone of `view`.
fn occupancy_of(
    view: &RegistryView,
    detections: &[TrackedDetection],
    centers: &[Point],
) -> Vec<ZoneOccupancy> {
    view.enabled()
        .map(|zone| ZoneOccupancy {
            name: zone.name.clone(),
            threshold: zone.threshold,
            occupants: detections
                .iter()
                .zip(centers)
                .filter(|(_, center)| zone.contains(**center))
                .map(|(d, _)| d.identity)
                .collect(),
        })
        .collect()
}
