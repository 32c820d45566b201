//! The roadmap: a directed graph of oriented poses with annotated edges.
//!
//! Poses and edges live in slotmap arenas and refer to each other by id,
//! never by owning pointers; the graph is cyclic. Pose identity is
//! quantised (see [`Pose::key`]), so nearby samples collapse onto one
//! node. The roadmap is built once per run and is read-only during
//! planning, which lets every planner thread share it without locks.

use crate::dubins::DubinsInterpolator;
use crate::math::{Point2d, Pose, PoseKey};
use crate::{EdgeId, PoseId};
use rand::Rng;
use slotmap::SlotMap;
use smallvec::SmallVec;
use std::collections::HashMap;

mod build;

/// A pose node and its outgoing edges.
pub(crate) struct PoseNode {
    pub pose: Pose,
    pub edges: SmallVec<[EdgeId; 8]>,
}

/// A directed roadmap edge.
pub struct Edge {
    pub from: PoseId,
    pub to: PoseId,
    /// Largest speed at which the car can hold the curve (m/s).
    pub max_speed: f64,
    /// Turning radius the annotation was computed at (m).
    pub turning_radius: f64,
    /// Geometric length of the Dubins curve (m).
    pub distance: f64,
    /// Whether the edge runs with the configured traffic side.
    pub right_way: bool,
    interp: DubinsInterpolator,
}

/// Directed graph of oriented poses extracted from a city map.
pub struct Roadmap {
    poses: SlotMap<PoseId, PoseNode>,
    edges: SlotMap<EdgeId, Edge>,
    lookup: HashMap<PoseKey, PoseId>,
    width: f64,
    height: f64,
    cell_size: f64,
    angle_resolution: f64,
}

impl Roadmap {
    /// The outgoing edges of a pose.
    pub fn neighbors(&self, pose: PoseId) -> &[EdgeId] {
        &self.poses[pose].edges
    }

    pub fn edge(&self, edge: EdgeId) -> &Edge {
        &self.edges[edge]
    }

    pub fn pose(&self, pose: PoseId) -> Pose {
        self.poses[pose].pose
    }

    /// The pre-baked Dubins interpolator of an edge.
    pub fn interpolator(&self, edge: EdgeId) -> &DubinsInterpolator {
        &self.edges[edge].interp
    }

    /// Iterates over every pose in insertion order.
    pub fn all_poses(&self) -> impl Iterator<Item = PoseId> + '_ {
        self.poses.keys()
    }

    pub fn all_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys()
    }

    pub fn num_poses(&self) -> usize {
        self.poses.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Resolves a pose to its interned node under quantised equality.
    pub fn find(&self, pose: &Pose) -> Option<PoseId> {
        self.lookup
            .get(&pose.key(self.cell_size, self.angle_resolution))
            .copied()
    }

    /// A uniformly random roadmap pose, used for start/goal selection.
    pub fn random_pose<R: Rng>(&self, rng: &mut R) -> PoseId {
        let idx = rng.gen_range(0..self.poses.len());
        self.poses.keys().nth(idx).expect("roadmap has poses")
    }

    /// A pose on the margin just outside the map rectangle, heading
    /// toward the map centre. Spawn slots out here are guaranteed free
    /// of road traffic.
    pub fn random_free_pose<R: Rng>(&self, rng: &mut R, margin: f64) -> Pose {
        let (w, h) = (self.width, self.height);
        let (x, y) = match rng.gen_range(0..4u8) {
            0 => (rng.gen_range(0.0..w), -margin),
            1 => (rng.gen_range(0.0..w), h + margin),
            2 => (-margin, rng.gen_range(0.0..h)),
            _ => (w + margin, rng.gen_range(0.0..h)),
        };
        let centre = Point2d::new(w / 2.0, h / 2.0);
        let heading = (centre.y - y).atan2(centre.x - x);
        Pose::new(x, y, heading)
    }

    /// Map width in metres.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Map height in metres.
    pub fn height(&self) -> f64 {
        self.height
    }
}
