//! Constraint-aware kinodynamic A*.
//!
//! The same search core as [`super::astar`], except that every candidate
//! edge traversal is tested against the constraint store before it may
//! be relaxed: the g-score of a node is its arrival time, so a traversal
//! starting there is sampled tick by tick along the edge's interpolator.

use super::astar::reconstruct;
use super::{successor_speeds, NodeKey, OpenEntry, PlannedPath, SearchNode};
use crate::config::PlannerConfig;
use crate::constraint::ConstraintStore;
use crate::error::{Error, Result};
use crate::math::distance;
use crate::roadmap::Roadmap;
use crate::PoseId;
use log::{debug, warn};
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Plans a path for `agent` that keeps clear of every constraint
/// addressed to it, including the global lane. [`Error::NoPath`] means
/// no admissible path exists within the iteration cap; the conflict
/// search treats that as a dead branch, never as a failure.
pub fn plan(
    roadmap: &Roadmap,
    start: PoseId,
    goal: PoseId,
    agent: usize,
    store: &ConstraintStore,
    config: &PlannerConfig,
) -> Result<PlannedPath> {
    let goal_position = roadmap.pose(goal).position;
    let heuristic =
        |pose: PoseId| distance(roadmap.pose(pose).position, goal_position) / config.car_max_speed_ms;

    let start_node = SearchNode::start(start);
    let start_key = start_node.key(config.speed_resolution);

    let mut open = BinaryHeap::new();
    let mut g_score: HashMap<NodeKey, f64> = HashMap::new();
    let mut nodes: HashMap<NodeKey, SearchNode> = HashMap::new();
    let mut came_from: HashMap<NodeKey, NodeKey> = HashMap::new();
    let mut closed: HashSet<NodeKey> = HashSet::new();
    let mut seq = 0u64;

    g_score.insert(start_key, 0.0);
    nodes.insert(start_key, start_node);
    open.push(OpenEntry {
        f: heuristic(start),
        seq,
        key: start_key,
    });

    let mut speeds = Vec::new();
    let mut iterations = 0usize;

    while let Some(entry) = open.pop() {
        if !closed.insert(entry.key) {
            continue;
        }
        iterations += 1;
        if iterations > config.astar_max_iterations {
            warn!("timed search for agent {agent} hit the iteration cap");
            return Err(Error::NoPath);
        }

        let current = nodes[&entry.key];
        if current.pose == goal {
            debug!("timed path for agent {agent} found in {iterations} pops");
            return Ok(reconstruct(&came_from, &nodes, entry.key, g_score[&entry.key]));
        }
        let g_u = g_score[&entry.key];

        for &edge_id in roadmap.neighbors(current.pose) {
            let edge = roadmap.edge(edge_id);
            if current.speed > edge.max_speed {
                continue;
            }
            if config.road_enable_right_hand_traffic && !edge.right_way {
                continue;
            }

            let arc_from = Some((current.pose, edge_id));

            if edge.distance == 0.0 {
                let neighbor = SearchNode {
                    pose: edge.to,
                    speed: current.speed,
                    arc_from,
                };
                relax(
                    neighbor, g_u, entry.key, heuristic(edge.to), config, &mut g_score,
                    &mut nodes, &mut came_from, &mut open, &mut seq,
                );
                continue;
            }

            let interp = roadmap.interpolator(edge_id);
            successor_speeds(current.speed, edge, config, &mut speeds);
            for i in 0..speeds.len() {
                let v_w = speeds[i];
                if v_w > config.car_max_speed_ms || v_w > edge.max_speed || v_w < 0.0 {
                    continue;
                }
                if v_w == current.speed && v_w == 0.0 {
                    continue;
                }
                if store.check(agent, current.speed, v_w, g_u, interp, config) {
                    continue;
                }
                let tentative = g_u + 2.0 * edge.distance / (current.speed + v_w);
                let neighbor = SearchNode {
                    pose: edge.to,
                    speed: v_w,
                    arc_from,
                };
                relax(
                    neighbor, tentative, entry.key, heuristic(edge.to), config, &mut g_score,
                    &mut nodes, &mut came_from, &mut open, &mut seq,
                );
            }
        }
    }

    debug!("timed search for agent {agent} exhausted its open set");
    Err(Error::NoPath)
}

#[allow(clippy::too_many_arguments)]
fn relax(
    neighbor: SearchNode,
    tentative: f64,
    from: NodeKey,
    h: f64,
    config: &PlannerConfig,
    g_score: &mut HashMap<NodeKey, f64>,
    nodes: &mut HashMap<NodeKey, SearchNode>,
    came_from: &mut HashMap<NodeKey, NodeKey>,
    open: &mut BinaryHeap<OpenEntry>,
    seq: &mut u64,
) {
    let key = neighbor.key(config.speed_resolution);
    if g_score.get(&key).is_some_and(|&old| tentative >= old) {
        return;
    }
    g_score.insert(key, tentative);
    nodes.insert(key, neighbor);
    came_from.insert(key, from);
    *seq += 1;
    open.push(OpenEntry {
        f: tentative + h,
        seq: *seq,
        key,
    });
}
