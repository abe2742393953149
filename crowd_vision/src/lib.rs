// THEORY:
// This file is the main entry point for the `crowd_vision` library crate.
// It defines the public API exposed to the processes that embed the engine (a detection loop,
// a web backend, the `crowd_replay` tool).
//
// The primary export is `SharedState`, the aggregator that turns per-frame tracker output into
// occupancy, visitor counts, history, a heatmap and alerts, together with `IngestWorker` for
// running it as a single-writer task. The leaf components live in `core_modules` and are public
// so that callers can build zones and detections, but most consumers only need the re-exports
// below.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod event_log;
pub mod ingest_worker;
pub mod shared_state;

pub use config::{EngineConfig, RejectedZone};
pub use core_modules::alert::{AlertKind, AlertRecord, AlertSource, AlertSourceStatus, AlertState};
pub use core_modules::detection::{BoundingBox, DetectionFilter, Identity, TrackedDetection};
pub use core_modules::geometry::{Point, Polygon};
pub use core_modules::heatmap::HeatmapSnapshot;
pub use core_modules::history::Snapshot;
pub use core_modules::zone::{UpsertOutcome, Zone, ZoneDefinition};
pub use error::{EngineError, Result, ValidationError};
pub use event_log::{AlertQuery, EventSink, MemoryEventLog, SystemAction, SystemEvent, TracingSink};
pub use ingest_worker::{FrameResult, IngestWorker, StateUpdate};
pub use shared_state::{IngestReport, SharedState, Summary, ZoneStats};
