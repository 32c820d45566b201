//! Single-agent kinodynamic search over the roadmap.
//!
//! The search state is the product of a roadmap pose, a quantised speed
//! and the incoming edge; the incoming edge distinguishes arrivals at the
//! same pose and speed via different Dubins curves, which carry different
//! traversal costs. Two planners share this machinery: the conflict-free
//! planner in [`astar`] and the constraint-aware planner in [`timed`].

use crate::config::PlannerConfig;
use crate::roadmap::Edge;
use crate::{EdgeId, PoseId};
use std::cmp::Ordering;

pub mod astar;
pub mod timed;

/// One state of the kinodynamic search.
#[derive(Clone, Copy, Debug)]
pub struct SearchNode {
    pub pose: PoseId,
    /// Speed on arrival (m/s).
    pub speed: f64,
    /// Predecessor pose and the edge used to arrive; `None` tags the
    /// start node.
    pub arc_from: Option<(PoseId, EdgeId)>,
}

impl SearchNode {
    /// The initial state: standing still, no incoming arc.
    pub fn start(pose: PoseId) -> Self {
        Self {
            pose,
            speed: 0.0,
            arc_from: None,
        }
    }

    pub fn is_start(&self) -> bool {
        self.arc_from.is_none()
    }

    pub(crate) fn key(&self, speed_resolution: f64) -> NodeKey {
        NodeKey {
            pose: self.pose,
            speed: (self.speed / speed_resolution).round() as i64,
            arc: self.arc_from.map(|(_, edge)| edge),
        }
    }
}

/// Quantised search-state identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pose: PoseId,
    speed: i64,
    arc: Option<EdgeId>,
}

/// A planned single-agent path, start to goal, with its total duration.
#[derive(Clone, Debug, Default)]
pub struct PlannedPath {
    pub nodes: Vec<SearchNode>,
    pub duration: f64,
}

impl PlannedPath {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Open-set entry: ordered by ascending f-score, ties broken by
/// insertion order. The `Ord` impl is inverted so that
/// `std::collections::BinaryHeap` pops the smallest f first.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OpenEntry {
    pub f: f64,
    pub seq: u64,
    pub key: NodeKey,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Collects the candidate successor speeds for traversing `edge` at
/// entry speed `speed`: the entry speed itself, the accel-limited
/// ceiling, the decel-limited floor (clamped to zero when braking
/// overshoots), and evenly spaced intermediates toward each bound.
/// Samples below the speed resolution are discarded.
pub(crate) fn successor_speeds(
    speed: f64,
    edge: &Edge,
    config: &PlannerConfig,
    out: &mut Vec<f64>,
) {
    out.clear();
    out.push(speed);

    let d = edge.distance;
    let accel_ceiling = (speed * speed + 2.0 * config.car_acceleration * d).sqrt();
    let decel_sq = speed * speed - 2.0 * config.car_deceleration * d;
    let decel_floor = if decel_sq > 0.0 { decel_sq.sqrt() } else { 0.0 };

    if accel_ceiling > edge.max_speed && speed < edge.max_speed {
        push_towards(speed, edge.max_speed, config, out);
    } else if accel_ceiling < edge.max_speed {
        push_towards(speed, accel_ceiling, config, out);
    }

    if decel_floor > 0.0 || speed > 0.0 {
        push_towards(speed, decel_floor, config, out);
    }
}

fn push_towards(from: f64, target: f64, config: &PlannerConfig, out: &mut Vec<f64>) {
    let divisions = config.num_speed_divisions;
    for i in 1..=divisions {
        let sample = from + (target - from) * i as f64 / divisions as f64;
        if sample >= config.speed_resolution {
            out.push(sample);
        }
    }
}
