//! Mathematical structs and functions.

use cgmath::{Point2, Vector2};
use std::f64::consts::PI;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// An oriented planar pose: position plus heading angle in radians.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    pub position: Point2d,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            position: Point2d::new(x, y),
            heading,
        }
    }

    /// The unit tangent vector of the heading.
    pub fn direction(&self) -> Vector2d {
        Vector2d::new(self.heading.cos(), self.heading.sin())
    }

    /// The quantised cell/bin key used for pose equality and hashing.
    ///
    /// Positions round to cells of `cell_size`; headings are normalised to
    /// `[0, 2π)` and round to bins of `angle_resolution`.
    pub fn key(&self, cell_size: f64, angle_resolution: f64) -> PoseKey {
        let bins = (2.0 * PI / angle_resolution).round() as i64;
        let bin = (normalize_angle_positive(self.heading) / angle_resolution).round() as i64;
        PoseKey {
            x: (self.position.x / cell_size).round() as i64,
            y: (self.position.y / cell_size).round() as i64,
            heading: bin.rem_euclid(bins),
        }
    }
}

/// Quantised pose identity. See [`Pose::key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoseKey {
    pub x: i64,
    pub y: i64,
    pub heading: i64,
}

/// Normalises an angle into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Normalises an angle into `[0, 2π)`.
pub fn normalize_angle_positive(angle: f64) -> f64 {
    let a = angle % (2.0 * PI);
    if a < 0.0 {
        a + 2.0 * PI
    } else {
        a
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Point2d, b: Point2d) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    (dx * dx + dy * dy).sqrt()
}

/// Squared euclidean distance between two points.
pub fn distance2(a: Point2d, b: Point2d) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dx * dx + dy * dy
}
