//! Dubins geometry kernel.
//!
//! Every roadmap edge pre-bakes the shortest Dubins curve between its two
//! oriented poses into a fixed-step polyline, so that sampling the pose at
//! an arbitrary wall-clock time is a constant-time array index.

use crate::error::{Error, Result};
use crate::math::{distance, Pose};
use dubins_paths::{DubinsPath, PosRot, SegmentType};
use log::warn;
use std::f64::consts::PI;

/// Positions closer than this are treated as coincident.
const COINCIDENT_EPS: f64 = 1e-6;

/// Arc-length validation tolerance in metres.
const LENGTH_TOLERANCE: f64 = 0.1;

fn pos_rot(pose: Pose) -> PosRot {
    [pose.position.x, pose.position.y, pose.heading].into()
}

fn pose_from(q: PosRot) -> Pose {
    Pose::new(q.x(), q.y(), q.rot())
}

/// Total left- and right-turn angle of the shortest Dubins word between
/// two poses at the given radius. Used to prune roadmap edges that would
/// require more steering than a car can comfortably perform.
pub fn turn_totals(a: Pose, b: Pose, radius: f64) -> Result<(f64, f64)> {
    let path = DubinsPath::shortest_from(pos_rot(a), pos_rot(b), radius)
        .map_err(|_| Error::GeometryDegenerate)?;
    let mut left = 0.0;
    let mut right = 0.0;
    for (kind, param) in path.path_type.to_segment_types().iter().zip(path.param) {
        match kind {
            SegmentType::L => left += param,
            SegmentType::R => right += param,
            SegmentType::S => {}
        }
    }
    Ok((left, right))
}

/// A pre-baked Dubins curve between two oriented poses.
///
/// The polyline is sampled once at construction with a fixed arc-length
/// step and never mutated afterwards, so interpolators can be shared by
/// reference across planner threads.
#[derive(Clone, Debug)]
pub struct DubinsInterpolator {
    start: Pose,
    end: Pose,
    distance: f64,
    samples: Vec<Pose>,
}

impl DubinsInterpolator {
    /// Bakes the shortest Dubins curve from `start` to `end` at the given
    /// turning radius, sampling every `step` metres.
    ///
    /// The computed arc length is validated against the straight-line
    /// distance; a length outside `[straight − 0.1, straight + 2πr]`
    /// indicates the degenerate co-linear case and falls back to the
    /// straight-line distance for the time mapping, while the polyline
    /// keeps the sampled Dubins geometry. Coincident endpoints with
    /// distinct headings fail with [`Error::GeometryDegenerate`];
    /// callers treat such edges as zero-length.
    pub fn new(start: Pose, end: Pose, radius: f64, step: f64) -> Result<Self> {
        let straight = distance(start.position, end.position);
        if straight < COINCIDENT_EPS {
            if (start.heading - end.heading).abs() < COINCIDENT_EPS {
                return Ok(Self::zero_length(start));
            }
            return Err(Error::GeometryDegenerate);
        }

        let path = DubinsPath::shortest_from(pos_rot(start), pos_rot(end), radius)
            .map_err(|_| Error::GeometryDegenerate)?;
        let length = path.length();

        let mut distance = length;
        if length > straight + 2.0 * PI * radius {
            warn!("dubins length {length:.2} is far too long for straight {straight:.2}");
            distance = straight;
        }
        if length + LENGTH_TOLERANCE < straight {
            warn!("dubins length {length:.2} is too short for straight {straight:.2}");
            distance = straight;
        }

        let intervals = usize::max((length / step).ceil() as usize, 1);
        let mut samples = Vec::with_capacity(intervals + 1);
        samples.push(start);
        for i in 1..intervals {
            let at = length * i as f64 / intervals as f64;
            samples.push(pose_from(path.sample(at)));
        }
        samples.push(end);

        Ok(Self {
            start,
            end,
            distance,
            samples,
        })
    }

    /// A zero-length interpolator for co-located poses.
    pub fn zero_length(pose: Pose) -> Self {
        Self {
            start: pose,
            end: pose,
            distance: 0.0,
            samples: vec![pose],
        }
    }

    /// Arc length of the curve in metres.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn start(&self) -> Pose {
        self.start
    }

    pub fn end(&self) -> Pose {
        self.end
    }

    /// Traversal time under a linear speed ramp from `v0` to `v1`.
    pub fn duration(&self, v0: f64, v1: f64) -> f64 {
        if self.distance == 0.0 {
            return 0.0;
        }
        2.0 * self.distance / (v0 + v1)
    }

    /// The pose at fractional arc length `s ∈ [0, 1]`.
    pub fn interpolate(&self, s: f64) -> Pose {
        let last = self.samples.len() - 1;
        let idx = (s * last as f64).round();
        let idx = (idx.max(0.0) as usize).min(last);
        self.samples[idx]
    }

    /// The pose at wall-clock time `t ∈ [0, T]`, where `T` is the
    /// traversal time and speed varies linearly from `v0` to `v1`.
    pub fn pose_at_time(&self, v0: f64, v1: f64, t: f64) -> Pose {
        if self.distance == 0.0 {
            return self.start;
        }
        let acc = (v1 * v1 - v0 * v0) / (2.0 * self.distance);
        let s = (0.5 * acc * t * t + v0 * t) / self.distance;
        self.interpolate(s.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn straight_segment_length() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(100.0, 0.0, 0.0);
        let interp = DubinsInterpolator::new(a, b, 4.0, 0.5).unwrap();
        assert_approx_eq!(interp.distance(), 100.0, 0.1);
    }

    #[test]
    fn endpoints_round_trip() {
        let a = Pose::new(5.0, 10.0, 0.3);
        let b = Pose::new(40.0, 25.0, 1.2);
        let interp = DubinsInterpolator::new(a, b, 4.0, 0.5).unwrap();
        let s0 = interp.interpolate(0.0);
        let s1 = interp.interpolate(1.0);
        assert_approx_eq!(s0.position.x, a.position.x);
        assert_approx_eq!(s0.position.y, a.position.y);
        assert_approx_eq!(s1.position.x, b.position.x);
        assert_approx_eq!(s1.position.y, b.position.y);
    }

    #[test]
    fn arc_at_least_straight_line() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(30.0, 12.0, 1.0);
        let interp = DubinsInterpolator::new(a, b, 4.0, 0.5).unwrap();
        let straight = distance(a.position, b.position);
        assert!(interp.distance() + 0.1 >= straight);
        assert!(interp.distance() <= straight + 2.0 * PI * 4.0);
    }

    #[test]
    fn pose_at_time_ramp() {
        // Constant speed: halfway in time is halfway along the curve.
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(50.0, 0.0, 0.0);
        let interp = DubinsInterpolator::new(a, b, 4.0, 0.5).unwrap();
        let t = interp.duration(10.0, 10.0);
        let mid = interp.pose_at_time(10.0, 10.0, t / 2.0);
        assert_approx_eq!(mid.position.x, 25.0, 0.6);
    }

    #[test]
    fn coincident_headings_degenerate() {
        let a = Pose::new(3.0, 3.0, 0.0);
        let b = Pose::new(3.0, 3.0, PI);
        assert!(matches!(
            DubinsInterpolator::new(a, b, 4.0, 0.5),
            Err(Error::GeometryDegenerate)
        ));
        let same = DubinsInterpolator::new(a, a, 4.0, 0.5).unwrap();
        assert_eq!(same.distance(), 0.0);
    }

    #[test]
    fn turn_totals_straight() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(100.0, 0.0, 0.0);
        let (left, right) = turn_totals(a, b, 4.0).unwrap();
        assert!(left < 1e-6 && right < 1e-6);
    }

    #[test]
    fn monotone_along_curve() {
        // Progress along the baked polyline is monotone in s.
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(60.0, 20.0, 0.5);
        let interp = DubinsInterpolator::new(a, b, 4.0, 0.5).unwrap();
        let mut travelled = 0.0;
        let mut prev = interp.interpolate(0.0);
        for k in 1..=50 {
            let next = interp.interpolate(k as f64 / 50.0);
            let step = distance(prev.position, next.position);
            travelled += step;
            prev = next;
        }
        assert_approx_eq!(travelled, interp.distance(), 0.01 * interp.distance());
    }
}
