//! Point types for building coordinates.
//!
//! All coordinates are in meters in the building frame configured by the
//! floor bounds. Z is height above the building origin.

use std::ops::{Add, Mul, Sub};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A 3D point in building coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    /// X coordinate (meters)
    pub x: f64,
    /// Y coordinate (meters)
    pub y: f64,
    /// Z coordinate (meters)
    pub z: f64,
}

impl Point3D {
    /// Origin point.
    pub const ORIGIN: Point3D = Point3D {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new point.
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build a point from a config array `[x, y, z]`.
    ///
    /// Returns `None` when fewer than three coordinates are given.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x, y, z, ..] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance_to(&self, other: &Point3D) -> f64 {
        (*self - *other).norm()
    }

    /// Length of the vector from the origin to this point.
    #[inline]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Cross product, treating both points as vectors.
    #[inline]
    pub fn cross(&self, other: &Point3D) -> Point3D {
        Point3D::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit vector in the direction of this point, or `None` for a zero vector.
    pub fn normalized(&self) -> Option<Point3D> {
        let n = self.norm();
        if n > f64::EPSILON {
            Some(*self * (1.0 / n))
        } else {
            None
        }
    }

    /// Midpoint between two points.
    #[inline]
    pub fn midpoint(a: &Point3D, b: &Point3D) -> Point3D {
        Point3D::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0, (a.z + b.z) / 2.0)
    }

    /// Centroid of a set of points, or `None` when empty.
    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Point3D>) -> Option<Point3D> {
        let mut sum = Point3D::ORIGIN;
        let mut count = 0usize;
        for p in points {
            sum = sum + *p;
            count += 1;
        }
        (count > 0).then(|| sum * (1.0 / count as f64))
    }

    /// Projection onto the floor plane.
    #[inline]
    pub fn to_2d(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// True if all coordinates are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Convert to a nalgebra vector.
    #[inline]
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Convert from a nalgebra vector.
    #[inline]
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl Add for Point3D {
    type Output = Point3D;

    fn add(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3D {
    type Output = Point3D;

    fn sub(self, rhs: Point3D) -> Point3D {
        Point3D::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3D {
    type Output = Point3D;

    fn mul(self, rhs: f64) -> Point3D {
        Point3D::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::fmt::Display for Point3D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// A 2D point on the floor plane, used for room polygons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// X coordinate (meters)
    pub x: f64,
    /// Y coordinate (meters)
    pub y: f64,
}

impl Point2D {
    /// Create a new 2D point.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build from a config array `[x, y]`.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x, y, ..] => Some(Self::new(*x, *y)),
            _ => None,
        }
    }
}
