//! Agent state: one car requiring a path.

use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::math::{distance, Point2d, Pose, Vector2d};
use crate::roadmap::Roadmap;
use crate::search::PlannedPath;
use crate::util::Interval;
use crate::PoseId;
use cgmath::prelude::*;
use log::debug;
use pathfinding::directed::dijkstra::dijkstra;
use rand::Rng;

/// Start and goal poses must be at least this far apart when spawning
/// random agents (m).
const MIN_SPAWN_SEPARATION: f64 = 100.0;

/// Attempts at pairing a start with a reachable goal before giving up.
const MAX_SPAWN_ATTEMPTS: usize = 256;

/// A car with a fixed start and goal and, once planned, a
/// time-parameterised path sampled at the simulation tick.
pub struct Agent {
    start: PoseId,
    goal: PoseId,
    nodes: PlannedPath,
    samples: Vec<Pose>,
    tick: usize,
}

impl Agent {
    pub fn new(start: PoseId, goal: PoseId) -> Self {
        Self {
            start,
            goal,
            nodes: PlannedPath::default(),
            samples: Vec::new(),
            tick: 0,
        }
    }

    pub fn start(&self) -> PoseId {
        self.start
    }

    pub fn goal(&self) -> PoseId {
        self.goal
    }

    /// Assigns a planned node path and interpolates it into per-tick
    /// pose samples.
    pub fn assign_path(&mut self, path: PlannedPath, roadmap: &Roadmap, config: &PlannerConfig) {
        self.samples = sample_path(&path, roadmap, config);
        self.nodes = path;
        self.tick = 0;
    }

    pub fn nodes(&self) -> &PlannedPath {
        &self.nodes
    }

    /// The pointwise path, one pose per simulation tick.
    pub fn samples(&self) -> &[Pose] {
        &self.samples
    }

    pub fn num_ticks(&self) -> usize {
        self.samples.len()
    }

    /// The pose at the current tick; `None` once the path is exhausted.
    pub fn position(&self) -> Option<Pose> {
        self.samples.get(self.tick).copied()
    }

    /// Steps the agent one tick along its path.
    pub fn advance(&mut self) {
        if self.tick < self.samples.len() {
            self.tick += 1;
        }
    }

    /// Total planned travel time in seconds.
    pub fn path_duration(&self) -> f64 {
        self.nodes.duration
    }

    /// Remaining travel time, optionally measured from the path start.
    pub fn remaining_time(&self, from_start: bool, config: &PlannerConfig) -> f64 {
        let from = if from_start { 0 } else { self.tick };
        self.samples.len().saturating_sub(from) as f64 * config.sim_step_time
    }

    /// Mean speed over the ticks spent inside the map bounds.
    pub fn average_speed(&self, width: f64, height: f64, config: &PlannerConfig) -> f64 {
        let margin = config.car_length;
        let x_span = Interval::new(-margin, width + margin);
        let y_span = Interval::new(-margin, height + margin);
        let in_bounds =
            |p: &Pose| x_span.contains(p.position.x) && y_span.contains(p.position.y);
        let mut total = 0.0;
        let mut ticks = 0usize;
        for pair in self.samples.windows(2) {
            if in_bounds(&pair[0]) && in_bounds(&pair[1]) {
                total += distance(pair[0].position, pair[1].position);
                ticks += 1;
            }
        }
        if ticks == 0 {
            return 0.0;
        }
        total / (ticks as f64 * config.sim_step_time)
    }
}

/// Interpolates a node path into poses sampled at the simulation tick,
/// with a continuous clock running across the legs. A start-equals-goal
/// path collapses to a single sample.
pub fn sample_path(path: &PlannedPath, roadmap: &Roadmap, config: &PlannerConfig) -> Vec<Pose> {
    if path.is_empty() {
        return Vec::new();
    }
    if path.nodes.len() == 1 {
        return vec![roadmap.pose(path.nodes[0].pose)];
    }

    let dt = config.sim_step_time;
    let mut out = Vec::new();
    let mut t = 0.0;
    let mut elapsed = 0.0;

    for pair in path.nodes.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let Some((_, edge_id)) = cur.arc_from else {
            continue;
        };
        let interp = roadmap.interpolator(edge_id);
        let leg = interp.duration(prev.speed, cur.speed);
        if leg == 0.0 {
            continue;
        }
        while t < elapsed + leg {
            out.push(interp.pose_at_time(prev.speed, cur.speed, t - elapsed));
            t += dt;
        }
        elapsed += leg;
    }

    if out.is_empty() {
        out.push(roadmap.pose(path.nodes[0].pose));
    }
    out
}

/// Tests whether two car bodies overlap, by separating axes over the
/// two oriented `car_length` × `car_width` rectangles.
pub fn bodies_overlap(a: Pose, b: Pose, config: &PlannerConfig) -> bool {
    let (half_len, half_wid) = (config.car_length / 2.0, config.car_width / 2.0);
    let corners = |p: Pose| -> [Point2d; 4] {
        let tan = p.direction();
        let perp = Vector2d::new(-tan.y, tan.x);
        [
            p.position + half_len * tan + half_wid * perp,
            p.position + half_len * tan - half_wid * perp,
            p.position - half_len * tan + half_wid * perp,
            p.position - half_len * tan - half_wid * perp,
        ]
    };
    let ca = corners(a);
    let cb = corners(b);

    let project = |axis: Vector2d, corners: &[Point2d; 4]| {
        let mut span = Interval::new(f64::INFINITY, f64::NEG_INFINITY);
        for corner in corners {
            span.expand(axis.dot(corner.to_vec()));
        }
        span
    };

    for pose in [a, b] {
        let tan = pose.direction();
        for axis in [tan, Vector2d::new(-tan.y, tan.x)] {
            if !project(axis, &ca).overlaps(&project(axis, &cb)) {
                return false;
            }
        }
    }
    true
}

/// Pairs random start and goal poses for `count` agents. Each pair is
/// at least 100 m apart and connected in the raw edge graph; the cheap
/// Dijkstra probe avoids burning kinodynamic searches on dead pairings.
pub fn spawn_random_pairs<R: Rng>(
    roadmap: &Roadmap,
    count: usize,
    config: &PlannerConfig,
    rng: &mut R,
) -> Result<Vec<(PoseId, PoseId)>> {
    let mut pairs = Vec::with_capacity(count);
    for agent in 0..count {
        let mut attempts = 0;
        let pair = loop {
            attempts += 1;
            if attempts > MAX_SPAWN_ATTEMPTS {
                return Err(Error::Infeasible { agent });
            }
            let start = roadmap.random_pose(rng);
            let goal = roadmap.random_pose(rng);
            if distance(roadmap.pose(start).position, roadmap.pose(goal).position)
                < MIN_SPAWN_SEPARATION
            {
                continue;
            }
            if !graph_reachable(roadmap, start, goal, config) {
                continue;
            }
            break (start, goal);
        };
        debug!("agent {agent} spawned after {attempts} attempt(s)");
        pairs.push(pair);
    }
    Ok(pairs)
}

/// Whether the goal is reachable from the start over raw roadmap edges,
/// ignoring kinodynamics but honouring the traffic-side filter.
pub fn graph_reachable(
    roadmap: &Roadmap,
    start: PoseId,
    goal: PoseId,
    config: &PlannerConfig,
) -> bool {
    dijkstra(
        &start,
        |&p| {
            roadmap
                .neighbors(p)
                .iter()
                .filter_map(|&id| {
                    let edge = roadmap.edge(id);
                    if config.road_enable_right_hand_traffic && !edge.right_way {
                        return None;
                    }
                    let cost = (10.0 * edge.distance / edge.max_speed.max(0.1)) as u64;
                    Some((edge.to, cost))
                })
                .collect::<Vec<_>>()
        },
        |&p| p == goal,
    )
    .is_some()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn overlapping_bodies_detected() {
        let config = PlannerConfig::default();
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(1.0, 0.5, 0.3);
        assert!(bodies_overlap(a, b, &config));
    }

    #[test]
    fn distant_bodies_clear() {
        let config = PlannerConfig::default();
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(20.0, 0.0, 0.0);
        assert!(!bodies_overlap(a, b, &config));
    }

    #[test]
    fn nose_to_tail_edge_case() {
        let config = PlannerConfig::default();
        // Two cars in file, gap larger than a car length.
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(config.car_length + 0.5, 0.0, 0.0);
        assert!(!bodies_overlap(a, b, &config));
        // Side by side in adjacent lanes.
        let c = Pose::new(0.0, config.car_width + 0.4, 0.0);
        assert!(!bodies_overlap(a, c, &config));
        // Crossing at right angles through the same cell.
        let d = Pose::new(0.5, 0.0, PI / 2.0);
        assert!(bodies_overlap(a, d, &config));
    }
}
