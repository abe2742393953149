// THEORY:
// The `ingest_worker` module decouples the detection loop from aggregation. The detector
// produces frames at its own pace and hands them to a bounded queue; one dedicated tokio task
// drains the queue and is the only caller of `SharedState::ingest`. Because there is exactly
// one consumer, frames are applied in submission order and the single-writer discipline holds
// no matter how many producers share the handle.
//
// Key architectural principles:
// 1.  **Bounded Backpressure**: The queue has a fixed depth. `submit` waits for room;
//     `try_submit` never waits and drops the frame instead, reporting it as a system event.
//     A slow consumer can delay the detector but can never grow memory without bound.
// 2.  **Fan-Out Updates**: After every frame the worker publishes a `StateUpdate` on a
//     broadcast channel, the shape a WebSocket layer pushes to browsers. Slow subscribers lag
//     and skip updates; they never slow the worker down.
// 3.  **Stoppable Between Frames**: `shutdown` closes the queue, lets the worker drain what
//     was already accepted and joins it. A frame is never abandoned halfway through `ingest`.

use crate::core_modules::alert::AlertRecord;
use crate::core_modules::detection::TrackedDetection;
use crate::core_modules::history::Snapshot;
use crate::error::{EngineError, Result};
use crate::shared_state::{SharedState, ZoneStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Number of updates a subscriber may fall behind before it starts skipping.
const UPDATE_BUFFER: usize = 64;

/// One frame of tracker output.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub detections: Vec<TrackedDetection>,
    pub timestamp: DateTime<Utc>,
}

impl FrameResult {
    pub fn new(detections: Vec<TrackedDetection>, timestamp: DateTime<Utc>) -> Self {
        Self {
            detections,
            timestamp,
        }
    }
}

/// Published after each ingested frame.
#[derive(Debug, Clone, Serialize)]
pub struct StateUpdate {
    pub snapshot: Snapshot,
    /// Zone stats read immediately after the frame was applied.
    pub zone_stats: BTreeMap<String, ZoneStats>,
    /// Alerts raised by this frame.
    pub alerts: Vec<AlertRecord>,
}

pub struct IngestWorker {
    state: Arc<SharedState>,
    frames: mpsc::Sender<FrameResult>,
    updates: broadcast::Sender<StateUpdate>,
    handle: JoinHandle<u64>,
}

impl IngestWorker {
    /// Starts the aggregation task. Must be called from within a tokio runtime.
    pub fn spawn(state: Arc<SharedState>, queue_depth: usize) -> Self {
        let queue_depth = queue_depth.max(1);
        let (frames, mut receiver) = mpsc::channel::<FrameResult>(queue_depth);
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);

        let worker_state = Arc::clone(&state);
        let worker_updates = updates.clone();
        let handle = tokio::spawn(async move {
            tracing::info!(queue_depth, "Ingest worker started");
            worker_state.set_detection_running(true);

            let mut processed = 0u64;
            while let Some(frame) = receiver.recv().await {
                let report = worker_state.ingest(frame.detections, frame.timestamp);
                let update = StateUpdate {
                    snapshot: report.snapshot,
                    zone_stats: worker_state.zone_stats(),
                    alerts: report.alerts,
                };
                // No subscribers is not an error.
                let _ = worker_updates.send(update);
                processed += 1;
            }

            worker_state.set_detection_running(false);
            tracing::info!(processed, "Ingest worker stopped");
            processed
        });

        Self {
            state,
            frames,
            updates,
            handle,
        }
    }

    /// Queues a frame, waiting for room if the queue is full.
    pub async fn submit(&self, frame: FrameResult) -> Result<()> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| EngineError::WorkerClosed)
    }

    /// Queues a frame without waiting. A full queue drops the frame.
    pub fn try_submit(&self, frame: FrameResult) -> Result<()> {
        match self.frames.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::warn!(timestamp = %frame.timestamp, "Ingest queue full, dropping frame");
                self.state.report_dropped_frame(format!(
                    "frame at {} with {} detections",
                    frame.timestamp,
                    frame.detections.len()
                ));
                Err(EngineError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EngineError::WorkerClosed),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Closes the queue, waits for accepted frames to be applied and returns how many frames
    /// the worker processed.
    pub async fn shutdown(self) -> Result<u64> {
        drop(self.frames);
        self.handle.await.map_err(|err| {
            tracing::error!(error = %err, "Ingest worker panicked");
            EngineError::WorkerClosed
        })
    }
}
