//! Static building geometry: floors, rooms, and containment queries.
//!
//! Geometry is read-only at runtime. A [`Building`] is rebuilt from
//! configuration on every reload and swapped in as a whole, so locators
//! always see a consistent set of floors.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::point::{Point2D, Point3D};
use crate::config::EngineConfig;

/// Axis-aligned bounding box of a floor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner
    pub min: Point3D,
    /// Maximum corner
    pub max: Point3D,
}

impl Bounds {
    /// Create bounds from two corners, normalizing so that `min <= max`.
    pub fn new(a: Point3D, b: Point3D) -> Self {
        Self {
            min: Point3D::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3D::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// True if the point lies inside or on the box.
    pub fn contains(&self, p: &Point3D) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True if the height lies within the box's z range.
    pub fn contains_z(&self, z: f64) -> bool {
        z >= self.min.z && z <= self.max.z
    }

    /// Clamp a point into the box.
    pub fn clamp(&self, p: &Point3D) -> Point3D {
        Point3D::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Euclidean distance from the point to the box (zero inside).
    pub fn distance_outside(&self, p: &Point3D) -> f64 {
        let dx = (self.min.x - p.x).max(p.x - self.max.x).max(0.0);
        let dy = (self.min.y - p.y).max(p.y - self.max.y).max(0.0);
        let dz = (self.min.z - p.z).max(p.z - self.max.z).max(0.0);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Closed polygon on the floor plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point2D>,
}

impl Polygon {
    /// Create a polygon; needs at least three vertices.
    pub fn new(points: Vec<Point2D>) -> Option<Self> {
        (points.len() >= 3).then_some(Self { points })
    }

    /// Polygon vertices.
    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    /// Even-odd ray casting containment test.
    pub fn encloses(&self, p: &Point2D) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[j];
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
}

/// A room on a floor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Outline, absent when the config gives fewer than three points
    pub polygon: Option<Polygon>,
}

impl Room {
    /// True if the room outline contains the projection of the point.
    pub fn encloses(&self, p: &Point3D) -> bool {
        self.polygon.as_ref().is_some_and(|poly| poly.encloses(&p.to_2d()))
    }
}

/// A floor with its bounding box and rooms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    /// Floor identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Bounding box, absent when not configured
    pub bounds: Option<Bounds>,
    /// Rooms in configuration order
    pub rooms: Vec<Room>,
}

impl Floor {
    /// True if the height lies within this floor's z range.
    pub fn contains_z(&self, z: f64) -> bool {
        self.bounds.is_some_and(|b| b.contains_z(z))
    }

    /// True if the point lies within this floor's bounding box.
    pub fn contains(&self, p: &Point3D) -> bool {
        self.bounds.is_some_and(|b| b.contains(p))
    }

    /// Clamp a point into the floor bounds (identity when unbounded).
    pub fn clamp(&self, p: &Point3D) -> Point3D {
        match &self.bounds {
            Some(b) => b.clamp(p),
            None => *p,
        }
    }

    /// First room whose outline contains the point.
    pub fn room_at(&self, p: &Point3D) -> Option<&Room> {
        self.rooms.iter().find(|r| r.encloses(p))
    }

    /// Room whose id or name matches, ignoring case.
    pub fn room_named(&self, name: &str) -> Option<&Room> {
        self.rooms
            .iter()
            .find(|r| r.id.eq_ignore_ascii_case(name) || r.name.eq_ignore_ascii_case(name))
    }
}

/// Immutable view of the configured building.
#[derive(Clone, Debug, Default)]
pub struct Building {
    floors: Vec<Arc<Floor>>,
    nodes_per_floor: HashMap<String, usize>,
    node_count: usize,
}

impl Building {
    /// Create a building from floors and the per-floor node counts.
    pub fn new(floors: Vec<Floor>, nodes_per_floor: HashMap<String, usize>, node_count: usize) -> Self {
        Self {
            floors: floors.into_iter().map(Arc::new).collect(),
            nodes_per_floor,
            node_count,
        }
    }

    /// Build geometry from configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let floors: Vec<Floor> = config.floors.iter().map(|f| f.to_floor()).collect();

        let mut nodes_per_floor: HashMap<String, usize> = HashMap::new();
        let mut node_count = 0;
        for node in config.nodes.iter().filter(|n| n.enabled) {
            node_count += 1;
            match &node.floors {
                Some(ids) => {
                    for id in ids {
                        *nodes_per_floor.entry(id.clone()).or_default() += 1;
                    }
                }
                None => {
                    for floor in &floors {
                        *nodes_per_floor.entry(floor.id.clone()).or_default() += 1;
                    }
                }
            }
        }

        Self::new(floors, nodes_per_floor, node_count)
    }

    /// Floors in configuration order.
    pub fn floors(&self) -> &[Arc<Floor>] {
        &self.floors
    }

    /// Look up a floor by id.
    pub fn floor(&self, id: &str) -> Option<&Arc<Floor>> {
        self.floors.iter().find(|f| f.id == id)
    }

    /// Number of enabled nodes able to hear on a floor.
    pub fn nodes_on_floor(&self, floor_id: &str) -> usize {
        self.nodes_per_floor.get(floor_id).copied().unwrap_or(0)
    }

    /// Number of enabled nodes in the building.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// First floor whose z range contains the height.
    pub fn floor_containing_z(&self, z: f64) -> Option<&Arc<Floor>> {
        self.floors.iter().find(|f| f.contains_z(z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            Point2D::new(x0, y0),
            Point2D::new(x0 + size, y0),
            Point2D::new(x0 + size, y0 + size),
            Point2D::new(x0, y0 + size),
        ])
        .unwrap()
    }

    #[test]
    fn test_bounds_clamp_and_contains() {
        let b = Bounds::new(Point3D::new(10.0, 10.0, 3.0), Point3D::new(0.0, 0.0, 0.0));
        assert_eq!(b.min, Point3D::new(0.0, 0.0, 0.0));
        assert!(b.contains(&Point3D::new(5.0, 5.0, 1.0)));
        assert!(!b.contains(&Point3D::new(11.0, 5.0, 1.0)));
        assert_eq!(
            b.clamp(&Point3D::new(-1.0, 12.0, 1.0)),
            Point3D::new(0.0, 10.0, 1.0)
        );
    }

    #[test]
    fn test_distance_outside() {
        let b = Bounds::new(Point3D::ORIGIN, Point3D::new(10.0, 10.0, 3.0));
        assert_eq!(b.distance_outside(&Point3D::new(5.0, 5.0, 1.0)), 0.0);
        assert!((b.distance_outside(&Point3D::new(13.0, 14.0, 1.0)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_polygon_encloses() {
        let poly = square(0.0, 0.0, 2.0);
        assert!(poly.encloses(&Point2D::new(1.0, 1.0)));
        assert!(!poly.encloses(&Point2D::new(3.0, 1.0)));
        assert!(Polygon::new(vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)]).is_none());
    }

    #[test]
    fn test_concave_polygon() {
        // L-shape
        let poly = Polygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(4.0, 0.0),
            Point2D::new(4.0, 1.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(1.0, 4.0),
            Point2D::new(0.0, 4.0),
        ])
        .unwrap();
        assert!(poly.encloses(&Point2D::new(0.5, 3.0)));
        assert!(!poly.encloses(&Point2D::new(3.0, 3.0)));
    }

    #[test]
    fn test_floor_room_lookup() {
        let floor = Floor {
            id: "ground".into(),
            name: "Ground".into(),
            bounds: Some(Bounds::new(Point3D::ORIGIN, Point3D::new(10.0, 10.0, 3.0))),
            rooms: vec![Room {
                id: "kitchen".into(),
                name: "Kitchen".into(),
                polygon: Some(square(0.0, 0.0, 5.0)),
            }],
        };
        assert_eq!(
            floor.room_at(&Point3D::new(1.0, 1.0, 1.0)).map(|r| r.id.as_str()),
            Some("kitchen")
        );
        assert!(floor.room_at(&Point3D::new(7.0, 7.0, 1.0)).is_none());
        assert!(floor.room_named("KITCHEN").is_some());
        assert!(floor.contains_z(2.0));
        assert!(!floor.contains_z(4.0));
    }
}
