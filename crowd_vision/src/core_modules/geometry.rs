// THEORY:
// The `geometry` module answers the single spatial question the engine asks every frame:
// "is this tracked point inside that zone?" It is a pure, stateless utility.
//
// Key architectural principles:
// 1.  **Ray Casting**: Containment uses the even-odd rule. A horizontal ray is cast from the
//     point and the polygon edges it crosses are counted; an odd count means inside. This
//     works for convex and concave (non self-intersecting) polygons alike.
// 2.  **Boundary Convention**: A point lying exactly on an edge or on a vertex is classified
//     as INSIDE. The edge test runs before the ray test so the answer never flips between
//     calls, which matters for someone standing on the painted line of a zone.
// 3.  **Validated Construction**: A `Polygon` can only be built from three or more finite
//     vertices. Everything downstream can therefore call `contains` without a failure path.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Tolerance used when deciding that a point sits on an edge, relative to the edge length.
const EDGE_EPSILON: f64 = 1e-9;

/// A point in frame (pixel) coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A closed polygon with at least three finite vertices.
/// The closing edge from the last vertex back to the first is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct Polygon {
    vertices: Vec<Point>,
    /// Inclusive axis-aligned bounds, used to reject far-away points cheaply.
    min: Point,
    max: Point,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Result<Self, ValidationError> {
        if vertices.len() < 3 {
            return Err(ValidationError::TooFewVertices {
                count: vertices.len(),
            });
        }
        if !vertices.iter().all(Point::is_finite) {
            return Err(ValidationError::NonFiniteCoordinate {
                context: "zone polygon",
            });
        }

        let mut min = vertices[0];
        let mut max = vertices[0];
        for v in &vertices[1..] {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }

        Ok(Self { vertices, min, max })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Returns true when `point` is inside the polygon or on its boundary.
    pub fn contains(&self, point: Point) -> bool {
        if !point.is_finite() {
            return false;
        }
        if point.x < self.min.x - EDGE_EPSILON
            || point.x > self.max.x + EDGE_EPSILON
            || point.y < self.min.y - EDGE_EPSILON
            || point.y > self.max.y + EDGE_EPSILON
        {
            return false;
        }
        ray_cast(&self.vertices, point)
    }
}

impl TryFrom<Vec<Point>> for Polygon {
    type Error = ValidationError;

    fn try_from(vertices: Vec<Point>) -> Result<Self, Self::Error> {
        Polygon::new(vertices)
    }
}

impl From<Polygon> for Vec<Point> {
    fn from(polygon: Polygon) -> Self {
        polygon.vertices
    }
}

/// Containment test over a raw vertex list.
/// Fails only when the list cannot describe a polygon.
pub fn contains(vertices: &[Point], point: Point) -> Result<bool, ValidationError> {
    if vertices.len() < 3 {
        return Err(ValidationError::TooFewVertices {
            count: vertices.len(),
        });
    }
    Ok(point.is_finite() && ray_cast(vertices, point))
}

fn ray_cast(vertices: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[j];

        if on_segment(a, b, p) {
            return true;
        }

        // Only edges that straddle the ray's y can be crossed; this also keeps b.y - a.y non-zero.
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let length = (b.x - a.x).hypot(b.y - a.y);
    if cross.abs() > EDGE_EPSILON * length.max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}
