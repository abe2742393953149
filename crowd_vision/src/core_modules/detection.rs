// THEORY:
// A `TrackedDetection` is the unit of input handed to the engine by the external
// detector/tracker: one person, in one frame, with an identity that the tracker promises to
// keep stable across frames. Like the other data containers in this crate it is "dumb": it
// knows how to validate itself and where its center is, nothing more.
//
// The `DetectionFilter` is a separate, optional quality gate. Invalid detections (NaN boxes,
// impossible confidences) are errors and get reported; detections that are merely unlikely to
// be a real person (tiny boxes, odd aspect ratios, low confidence) are quietly dropped.

use crate::core_modules::geometry::Point;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Persistent identity assigned by the upstream tracker.
pub type Identity = u64;

/// The only class the engine counts.
pub const PERSON_CLASS: &str = "person";

/// An axis-aligned bounding box in pixel coordinates. Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One tracked person in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    /// Tracker-assigned identity, stable across frames for the same subject.
    #[serde(rename = "id")]
    pub identity: Identity,
    pub bbox: BoundingBox,
    /// The point used for zone membership and heat accumulation.
    /// Derived from the bounding box when absent on the wire.
    #[serde(default)]
    pub center: Option<Point>,
    pub confidence: f32,
    #[serde(default = "default_class")]
    pub class: String,
}

fn default_class() -> String {
    PERSON_CLASS.to_string()
}

impl TrackedDetection {
    /// Builds a detection whose center is the middle of its bounding box.
    pub fn new(identity: Identity, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            identity,
            center: Some(bbox.center()),
            bbox,
            confidence,
            class: default_class(),
        }
    }

    /// Builds a detection at an explicit center point with a degenerate box around it.
    pub fn at(identity: Identity, center: Point) -> Self {
        Self {
            identity,
            bbox: BoundingBox::new(center.x, center.y, center.x, center.y),
            center: Some(center),
            confidence: 1.0,
            class: default_class(),
        }
    }

    pub fn center(&self) -> Point {
        self.center.unwrap_or_else(|| self.bbox.center())
    }

    /// Checks the invariants the aggregator relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(self.confidence));
        }
        if !self.bbox.is_finite() {
            return Err(ValidationError::NonFiniteCoordinate {
                context: "detection bounding box",
            });
        }
        if !self.center().is_finite() {
            return Err(ValidationError::NonFiniteCoordinate {
                context: "detection center",
            });
        }
        Ok(())
    }
}

/// Detector-style quality gates applied before aggregation.
/// The default only insists on the person class; every other gate is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    /// Minimum confidence score to accept a detection.
    pub min_confidence: f32,
    /// Minimum bounding box area in square pixels. Degenerate (point) boxes bypass this check.
    pub min_box_area: f64,
    /// Allowed width/height ratio range, e.g. `(0.15, 2.0)` for standing people.
    pub aspect_ratio: Option<(f64, f64)>,
    /// When set, detections of any other class are dropped. On by default.
    pub person_only: bool,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            min_box_area: 0.0,
            aspect_ratio: None,
            person_only: true,
        }
    }
}

impl DetectionFilter {
    pub fn accepts(&self, detection: &TrackedDetection) -> bool {
        if detection.confidence < self.min_confidence {
            return false;
        }
        if self.person_only && detection.class != PERSON_CLASS {
            return false;
        }

        let bbox = &detection.bbox;
        let area = bbox.area();
        if area > 0.0 && area < self.min_box_area {
            return false;
        }
        if let Some((min_ratio, max_ratio)) = self.aspect_ratio {
            if bbox.height() > 0.0 {
                let ratio = bbox.width() / bbox.height().max(1.0);
                if ratio < min_ratio || ratio > max_ratio {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_comes_from_bbox() {
        let d = TrackedDetection::new(7, BoundingBox::new(100.0, 100.0, 200.0, 300.0), 0.9);
        assert_eq!(d.center(), Point::new(150.0, 200.0));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn invalid_detections_are_rejected() {
        let mut d = TrackedDetection::new(1, BoundingBox::new(0.0, 0.0, 10.0, 10.0), 1.5);
        assert_eq!(d.validate(), Err(ValidationError::ConfidenceOutOfRange(1.5)));

        d.confidence = -0.1;
        assert!(d.validate().is_err());

        d.confidence = 0.5;
        d.bbox.x2 = f64::INFINITY;
        d.center = None;
        assert!(matches!(
            d.validate(),
            Err(ValidationError::NonFiniteCoordinate { .. })
        ));
    }

    #[test]
    fn deserializes_tracker_wire_shape() {
        let d: TrackedDetection =
            serde_json::from_str(r#"{"id": 3, "bbox": [10, 20, 30, 60], "confidence": 0.8}"#)
                .unwrap();
        assert_eq!(d.identity, 3);
        assert_eq!(d.center(), Point::new(20.0, 40.0));
        assert_eq!(d.class, PERSON_CLASS);
    }

    #[test]
    fn filter_applies_quality_gates() {
        let filter = DetectionFilter {
            min_confidence: 0.5,
            min_box_area: 1500.0,
            aspect_ratio: Some((0.15, 2.0)),
            person_only: true,
        };

        let good = TrackedDetection::new(1, BoundingBox::new(0.0, 0.0, 40.0, 100.0), 0.9);
        assert!(filter.accepts(&good));

        let faint = TrackedDetection { confidence: 0.3, ..good.clone() };
        assert!(!filter.accepts(&faint));

        let tiny = TrackedDetection::new(2, BoundingBox::new(0.0, 0.0, 10.0, 20.0), 0.9);
        assert!(!filter.accepts(&tiny));

        let lying_down = TrackedDetection::new(3, BoundingBox::new(0.0, 0.0, 300.0, 60.0), 0.9);
        assert!(!filter.accepts(&lying_down));

        let bicycle = TrackedDetection { class: "bicycle".into(), ..good };
        assert!(!filter.accepts(&bicycle));

        let defaults = DetectionFilter::default();
        assert!(defaults.accepts(&TrackedDetection::at(9, Point::new(1.0, 1.0))));
    }

    #[test]
    fn default_filter_counts_people_only() {
        let defaults = DetectionFilter::default();
        let mut dog = TrackedDetection::new(4, BoundingBox::new(0.0, 0.0, 30.0, 20.0), 0.95);
        dog.class = "dog".into();
        assert!(!defaults.accepts(&dog));

        let lenient = DetectionFilter {
            person_only: false,
            ..DetectionFilter::default()
        };
        assert!(lenient.accepts(&dog));
    }
}
