//! Core geometry and numerics.

mod geometry;
mod math;
mod point;
mod simplex;

pub use geometry::{Bounds, Building, Floor, Polygon, Room};
pub use math::{fit_line, pearson_correlation};
pub use point::{Point2D, Point3D};
pub use simplex::{Minimum, NelderMeadSimplex, SimplexError};
