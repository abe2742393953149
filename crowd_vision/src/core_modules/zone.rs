// THEORY:
// The `zone` module holds the regions of interest an operator has drawn over the camera
// view and the registry that keeps them in order.
//
// Key architectural principles:
// 1.  **Name as Key**: A zone is identified by its name. Every per-zone structure elsewhere in
//     the engine (visitor sets, alert states, snapshot counts) is keyed by that name.
// 2.  **Copy-on-Write Views**: The registry stores its zones behind an `Arc<[Zone]>`. A reader
//     takes a `RegistryView` (one reference-count bump) and gets a point-in-time list that
//     later admin edits can never change under its feet. Edits build a new list and swap it
//     in, bumping a generation counter so holders of an old view can tell it went stale.
// 3.  **Enabled Filtering**: The aggregator only ever iterates `RegistryView::enabled()`.
//     Disabled zones stay registered (and keep their visitor history) but are invisible to
//     membership and alerting.

use crate::core_modules::geometry::{Point, Polygon};
use crate::error::{EngineError, ValidationError};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;

/// A named polygonal region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Unique key of the zone.
    pub name: String,
    /// Region outline in frame coordinates. Serialized as `points` for `zones.json` compatibility.
    #[serde(rename = "points")]
    pub polygon: Polygon,
    /// Disabled zones produce no membership and no alerts.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Occupancy at which the zone breaches. `None` means the zone never alerts.
    #[serde(default)]
    pub threshold: Option<NonZeroU32>,
}

fn default_enabled() -> bool {
    true
}

impl Zone {
    pub fn new(name: impl Into<String>, vertices: Vec<Point>) -> Result<Self, ValidationError> {
        let zone = Self {
            name: name.into(),
            polygon: Polygon::new(vertices)?,
            enabled: true,
            threshold: None,
        };
        zone.validate()?;
        Ok(zone)
    }

    /// Sets the breach threshold; zero clears it.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = NonZeroU32::new(threshold);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyZoneName);
        }
        Ok(())
    }

    pub fn contains(&self, point: Point) -> bool {
        self.polygon.contains(point)
    }
}

/// A zone as written in a configuration file, before validation.
/// Every field is optional on the wire so that one bad entry can be rejected on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub threshold: Option<u32>,
}

impl TryFrom<ZoneDefinition> for Zone {
    type Error = ValidationError;

    fn try_from(definition: ZoneDefinition) -> Result<Self, Self::Error> {
        let threshold = match definition.threshold {
            Some(0) => return Err(ValidationError::ZeroThreshold),
            threshold => threshold.and_then(NonZeroU32::new),
        };
        let zone = Zone {
            name: definition.name,
            polygon: Polygon::new(definition.points)?,
            enabled: definition.enabled,
            threshold,
        };
        zone.validate()?;
        Ok(zone)
    }
}

impl From<Zone> for ZoneDefinition {
    fn from(zone: Zone) -> Self {
        Self {
            name: zone.name,
            points: zone.polygon.into(),
            enabled: zone.enabled,
            threshold: zone.threshold.map(NonZeroU32::get),
        }
    }
}

/// Whether an upsert created a zone or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// A point-in-time, immutable list of zones.
#[derive(Debug, Clone)]
pub struct RegistryView {
    zones: Arc<[Zone]>,
    generation: u64,
}

impl RegistryView {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(|z| z.enabled)
    }
}

/// Ordered collection of zones, in insertion order.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Arc<[Zone]>,
    generation: u64,
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self {
            zones: Arc::from(Vec::new()),
            generation: 0,
        }
    }

    pub fn view(&self) -> RegistryView {
        RegistryView {
            zones: Arc::clone(&self.zones),
            generation: self.generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// Inserts a zone, or replaces the zone with the same name in place.
    pub fn upsert(&mut self, zone: Zone) -> Result<UpsertOutcome, ValidationError> {
        zone.validate()?;
        let mut zones = self.zones.to_vec();
        let outcome = match zones.iter_mut().find(|z| z.name == zone.name) {
            Some(existing) => {
                *existing = zone;
                UpsertOutcome::Replaced
            }
            None => {
                zones.push(zone);
                UpsertOutcome::Inserted
            }
        };
        self.publish(zones);
        Ok(outcome)
    }

    pub fn remove(&mut self, name: &str) -> Option<Zone> {
        let index = self.zones.iter().position(|z| z.name == name)?;
        let mut zones = self.zones.to_vec();
        let removed = zones.remove(index);
        self.publish(zones);
        Some(removed)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.edit(name, |zone| zone.enabled = enabled)
    }

    pub fn set_threshold(
        &mut self,
        name: &str,
        threshold: Option<NonZeroU32>,
    ) -> Result<(), EngineError> {
        self.edit(name, |zone| zone.threshold = threshold)
    }

    fn edit(&mut self, name: &str, apply: impl FnOnce(&mut Zone)) -> Result<(), EngineError> {
        let mut zones = self.zones.to_vec();
        let zone = zones
            .iter_mut()
            .find(|z| z.name == name)
            .ok_or_else(|| EngineError::UnknownZone(name.to_string()))?;
        apply(zone);
        self.publish(zones);
        Ok(())
    }

    fn publish(&mut self, zones: Vec<Zone>) {
        self.zones = Arc::from(zones);
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Zone {
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

    #[test]
    fn upsert_keeps_insertion_order_and_replaces_by_name() {
        let mut registry = ZoneRegistry::new();
        assert_eq!(registry.upsert(rect("A", 0.0, 0.0, 1.0, 1.0)), Ok(UpsertOutcome::Inserted));
        assert_eq!(registry.upsert(rect("B", 0.0, 0.0, 2.0, 2.0)), Ok(UpsertOutcome::Inserted));
        assert_eq!(
            registry.upsert(rect("A", 5.0, 5.0, 9.0, 9.0)),
            Ok(UpsertOutcome::Replaced)
        );

        let names: Vec<_> = registry.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
        assert!(registry.get("A").unwrap().contains(Point::new(6.0, 6.0)));
    }

    #[test]
    fn views_are_unaffected_by_later_edits() {
        let mut registry = ZoneRegistry::new();
        registry.upsert(rect("A", 0.0, 0.0, 1.0, 1.0)).unwrap();
        let view = registry.view();

        registry.set_enabled("A", false).unwrap();
        registry.upsert(rect("B", 0.0, 0.0, 1.0, 1.0)).unwrap();

        assert_eq!(view.zones().len(), 1);
        assert_eq!(view.enabled().count(), 1);
        assert_ne!(view.generation(), registry.generation());
        assert_eq!(registry.view().enabled().count(), 1);
    }

    #[test]
    fn edits_on_unknown_zone_fail() {
        let mut registry = ZoneRegistry::new();
        assert!(matches!(
            registry.set_threshold("ghost", NonZeroU32::new(3)),
            Err(EngineError::UnknownZone(name)) if name == "ghost"
        ));
        assert!(registry.remove("ghost").is_none());
        assert_eq!(registry.generation(), 0);
    }

    #[test]
    fn zone_rejects_blank_name() {
        let err = Zone::new(
            "  ",
            vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)],
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyZoneName);
    }

    #[test]
    fn zone_json_shape() {
        let zone: Zone = serde_json::from_str(
            r#"{"name": "Entry", "points": [[100,100],[300,100],[300,300],[100,300]],
                "color": [0,255,0], "threshold": 4}"#,
        )
        .unwrap();
        assert!(zone.enabled);
        assert_eq!(zone.threshold, NonZeroU32::new(4));

        let two_points = r#"{"name": "X", "points": [[0,0],[1,1]]}"#;
        assert!(serde_json::from_str::<Zone>(two_points).is_err());
        let zero = r#"{"name": "X", "points": [[0,0],[1,0],[1,1]], "threshold": 0}"#;
        assert!(serde_json::from_str::<Zone>(zero).is_err());
    }

    #[test]
    fn definitions_validate_one_by_one() {
        let check = |json: &str| {
            let definition: ZoneDefinition = serde_json::from_str(json).unwrap();
            Zone::try_from(definition)
        };

        let good = check(r#"{"name": "A", "points": [[0,0],[4,0],[4,4]], "threshold": 2}"#);
        assert_eq!(good.unwrap().threshold, NonZeroU32::new(2));

        assert_eq!(
            check(r#"{"name": "B", "points": [[0,0],[1,1]]}"#),
            Err(ValidationError::TooFewVertices { count: 2 })
        );
        assert_eq!(
            check(r#"{"points": [[0,0],[1,0],[1,1]]}"#),
            Err(ValidationError::EmptyZoneName)
        );
        assert_eq!(
            check(r#"{"name": "C", "points": [[0,0],[1,0],[1,1]], "threshold": 0}"#),
            Err(ValidationError::ZeroThreshold)
        );

        let zone = rect("D", 0.0, 0.0, 2.0, 2.0).with_threshold(5);
        assert_eq!(Zone::try_from(ZoneDefinition::from(zone.clone())), Ok(zone));
    }
}
