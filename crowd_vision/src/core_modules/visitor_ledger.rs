// THEORY:
// The `VisitorLedger` gives the engine its memory of *who has been where*. Occupancy ("how
// many people are in the zone right now") is transient and is recomputed from geometry every
// frame; visitor history ("how many different people have ever entered") is permanent and
// lives here.
//
// Key architectural principles:
// 1.  **Identity Sets**: Each zone owns a `HashSet` of tracker identities. Insertion is
//     idempotent, so an identity that lingers for a thousand frames is still one visitor.
// 2.  **Monotonic Growth**: Identities are never removed one at a time. The only way a set
//     shrinks is an explicit reset (an admin action) or the deletion of the zone itself.
// 3.  **No Occupancy**: The ledger deliberately does not track who is *currently* inside.
//     That answer belongs to the frame, not to history.

use crate::core_modules::detection::Identity;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct VisitorLedger {
    visitors: HashMap<String, HashSet<Identity>>,
}

impl VisitorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `identity` was inside `zone`.
    /// Returns true if this is the first time the identity has been seen there.
    pub fn observe(&mut self, zone: &str, identity: Identity) -> bool {
        match self.visitors.get_mut(zone) {
            Some(set) => set.insert(identity),
            None => {
                self.visitors
                    .insert(zone.to_string(), HashSet::from([identity]));
                true
            }
        }
    }

    /// Unique visitors ever observed in `zone`.
    pub fn count(&self, zone: &str) -> usize {
        self.visitors.get(zone).map_or(0, HashSet::len)
    }

    pub fn contains(&self, zone: &str, identity: Identity) -> bool {
        self.visitors
            .get(zone)
            .is_some_and(|set| set.contains(&identity))
    }

    /// Sorted identities for `zone`, for reporting.
    pub fn visitors(&self, zone: &str) -> Vec<Identity> {
        let mut ids: Vec<_> = self
            .visitors
            .get(zone)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Clears one zone's set, returning how many visitors were dropped.
    pub fn reset(&mut self, zone: &str) -> usize {
        self.visitors
            .get_mut(zone)
            .map(|set| {
                let dropped = set.len();
                set.clear();
                dropped
            })
            .unwrap_or(0)
    }

    pub fn reset_all(&mut self) -> usize {
        let dropped = self.visitors.values().map(HashSet::len).sum();
        self.visitors.values_mut().for_each(HashSet::clear);
        dropped
    }

    /// Forgets a zone entirely (used when the zone is deleted).
    pub fn remove(&mut self, zone: &str) {
        self.visitors.remove(zone);
    }
}
