// THEORY:
// The engine produces two kinds of notable events: alert records (a threshold was breached)
// and system events (an input was rejected, an operator reset something). Persisting or
// delivering them is somebody else's job; the `EventSink` trait is the seam where that
// somebody plugs in.
//
// Two sinks ship with the crate. `TracingSink` simply turns events into structured log lines
// and is the default. `MemoryEventLog` keeps a bounded, queryable alert history with
// acknowledgement, which is what a dashboard backend needs when no database is around.
//
// Sinks are always called after the engine has released its state lock.

use crate::core_modules::alert::{AlertKind, AlertRecord};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of alerts and system events kept by `MemoryEventLog`.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogCategory {
    Alert,
    Config,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemAction {
    DetectionRejected,
    ZoneRejected,
    FrameDropped,
    ZoneUpserted,
    ZoneRemoved,
    ZoneToggled,
    ThresholdChanged,
    VisitorsReset,
    HeatmapReset,
    HeatmapResized,
    HistoryCleared,
}

impl SystemAction {
    pub fn category(self) -> LogCategory {
        match self {
            SystemAction::DetectionRejected
            | SystemAction::ZoneRejected
            | SystemAction::FrameDropped => LogCategory::System,
            _ => LogCategory::Config,
        }
    }
}

/// A non-alert event worth recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemEvent {
    pub timestamp: DateTime<Utc>,
    pub category: LogCategory,
    pub action: SystemAction,
    pub details: String,
}

impl SystemEvent {
    pub fn new(action: SystemAction, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category: action.category(),
            action,
            details: details.into(),
        }
    }
}

/// Receives events from the engine. Implementations must not block for long.
pub trait EventSink: Send + Sync {
    fn alert_raised(&self, alert: &AlertRecord);
    fn system_event(&self, event: &SystemEvent);
}

/// Writes events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn alert_raised(&self, alert: &AlertRecord) {
        tracing::warn!(
            alert_id = alert.id,
            alert_type = ?alert.alert_type,
            zone = alert.zone_name.as_deref().unwrap_or("-"),
            threshold = alert.threshold,
            actual_count = alert.actual_count,
            "Threshold exceeded"
        );
    }

    fn system_event(&self, event: &SystemEvent) {
        match event.category {
            LogCategory::System => {
                tracing::warn!(action = ?event.action, details = %event.details, "System event")
            }
            _ => tracing::info!(action = ?event.action, details = %event.details, "Config change"),
        }
    }
}

/// Filter for `MemoryEventLog::alerts`.
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    pub alert_type: Option<AlertKind>,
    pub zone_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of records returned; `None` means no limit.
    pub limit: Option<usize>,
}

/// Bounded in-memory alert history and system event log.
#[derive(Debug)]
pub struct MemoryEventLog {
    alerts: Mutex<VecDeque<AlertRecord>>,
    events: Mutex<VecDeque<SystemEvent>>,
    capacity: usize,
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl MemoryEventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity)),
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Matching alerts, newest first.
    pub fn alerts(&self, query: &AlertQuery) -> Vec<AlertRecord> {
        let alerts = self.alerts.lock();
        alerts
            .iter()
            .rev()
            .filter(|a| query.alert_type.is_none_or(|t| a.alert_type == t))
            .filter(|a| {
                query
                    .zone_name
                    .as_deref()
                    .is_none_or(|z| a.zone_name.as_deref() == Some(z))
            })
            .filter(|a| query.since.is_none_or(|t| a.timestamp >= t))
            .filter(|a| query.until.is_none_or(|t| a.timestamp <= t))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn unacknowledged(&self) -> usize {
        self.alerts.lock().iter().filter(|a| !a.acknowledged).count()
    }

    /// Marks an alert as acknowledged. Returns false if the id is unknown.
    pub fn acknowledge(&self, alert_id: u64, by: &str) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                alert.acknowledged_by = Some(by.to_string());
                alert.acknowledged_at = Some(Utc::now());
                tracing::info!(alert_id, acknowledged_by = by, "Alert acknowledged");
                true
            }
            None => false,
        }
    }

    /// Most recent system events, newest first.
    pub fn system_events(&self, limit: usize) -> Vec<SystemEvent> {
        self.events.lock().iter().rev().take(limit).cloned().collect()
    }

    fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
        if queue.len() == capacity {
            queue.pop_front();
        }
        queue.push_back(item);
    }
}

impl EventSink for MemoryEventLog {
    fn alert_raised(&self, alert: &AlertRecord) {
        Self::push_bounded(&mut self.alerts.lock(), alert.clone(), self.capacity);
    }

    fn system_event(&self, event: &SystemEvent) {
        Self::push_bounded(&mut self.events.lock(), event.clone(), self.capacity);
    }
}
