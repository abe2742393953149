// THEORY:
// The `history` module keeps the recent past of the scene as a sequence of immutable
// `Snapshot`s, one per processed frame, for charting and export.
//
// Key architectural principles:
// 1.  **Fixed Arena**: The buffer is a `Vec` that grows to its capacity exactly once and is
//     then overwritten in place. A `head` index marks the oldest entry. Appending is O(1) and
//     never reallocates after warm-up, so the size bound is part of the data structure rather
//     than something trimmed after the fact.
// 2.  **Chronological Views**: Iteration always starts at the oldest snapshot and walks
//     forward, wrapping around the arena. `range` filters that walk by timestamp lazily; the
//     iterator is `Clone`, so a consumer can restart it without touching the buffer again.
// 3.  **Value Semantics**: Snapshots are stored by value and never mutated once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of snapshots retained: one hour at one frame per second.
pub const DEFAULT_HISTORY_CAPACITY: usize = 3600;

/// Point-in-time aggregate of one ingested frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Number of people in the frame, each counted once regardless of zones.
    pub total_count: usize,
    /// Current occupants of each enabled zone.
    pub per_zone_count: BTreeMap<String, usize>,
}

impl Snapshot {
    pub fn zone_count(&self, zone: &str) -> usize {
        self.per_zone_count.get(zone).copied().unwrap_or(0)
    }
}

/// Fixed-capacity ring of snapshots, oldest evicted first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    slots: Vec<Snapshot>,
    /// Index of the oldest snapshot. Stays 0 until the arena is full.
    head: usize,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends a snapshot, evicting the oldest one when full.
    pub fn append(&mut self, snapshot: Snapshot) {
        if self.slots.len() < self.capacity {
            self.slots.push(snapshot);
        } else {
            self.slots[self.head] = snapshot;
            self.head = (self.head + 1) % self.capacity;
        }
        debug_assert!(
            self.slots.len() <= self.capacity,
            "history grew past its capacity"
        );
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        if self.slots.is_empty() {
            return None;
        }
        let last = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots.get(last)
    }

    /// The `index`-th snapshot counting from the oldest.
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    /// All snapshots, oldest first.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            buffer: self,
            front: 0,
            back: self.slots.len(),
        }
    }

    /// Snapshots with `since <= timestamp <= until`, oldest first. Open bounds when `None`.
    pub fn range(&self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Range<'_> {
        Range {
            inner: self.iter(),
            since,
            until,
        }
    }

    /// The newest `limit` snapshots, oldest first.
    pub fn recent(&self, limit: usize) -> Iter<'_> {
        let mut iter = self.iter();
        iter.front = self.slots.len().saturating_sub(limit);
        iter
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}

/// Chronological iterator over a `HistoryBuffer`.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    buffer: &'a HistoryBuffer,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Snapshot;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = self.buffer.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.saturating_sub(self.front);
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.buffer.get(self.back)
    }
}

impl ExactSizeIterator for Iter<'_> {}

/// Lazy, restartable (via `Clone`) time-window view over a `HistoryBuffer`.
#[derive(Debug, Clone)]
pub struct Range<'a> {
    inner: Iter<'a>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl<'a> Iterator for Range<'a> {
    type Item = &'a Snapshot;

    fn next(&mut self) -> Option<Self::Item> {
        let (since, until) = (self.since, self.until);
        self.inner.by_ref().find(|s| {
            since.is_none_or(|t| s.timestamp >= t) && until.is_none_or(|t| s.timestamp <= t)
        })
    }
}
