//! Priority-based conflict resolution (OCBS).
//!
//! Unlike the tree search in [`crate::cbs`], this variant keeps a single
//! mutable plan and a registry of conflict zones keyed by (agent,
//! position cell, time bucket). Each detected conflict replans only the
//! agent judged more responsible — the one whose cost has grown least
//! relative to its unconstrained base cost — after forbidding the other
//! agent's instantaneous position in that agent's future expansions.
//! The zone lookup happens directly during edge expansion, so no
//! constraint store is carried at all.

use crate::agent::sample_path;
use crate::cbs::conflict::find_first_conflict;
use crate::cbs::{AgentSpec, Solution};
use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::math::{distance, Point2d};
use crate::roadmap::Roadmap;
use crate::search::{astar, successor_speeds, OpenEntry, PlannedPath, SearchNode};
use log::{debug, info, warn};
use smallvec::SmallVec;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Conflict-resolution rounds before the run is declared unresolved.
const MAX_ROUNDS: usize = 4096;

/// Registry key: which agent, which position cell, which time bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ZoneKey {
    agent: usize,
    cell: (i64, i64),
    bucket: i64,
}

type ZoneRegistry = HashMap<ZoneKey, SmallVec<[Point2d; 2]>>;

pub struct OcbsPlanner<'a> {
    roadmap: &'a Roadmap,
    config: &'a PlannerConfig,
}

impl<'a> OcbsPlanner<'a> {
    pub fn new(roadmap: &'a Roadmap, config: &'a PlannerConfig) -> Self {
        Self { roadmap, config }
    }

    /// Resolves conflicts by repeatedly replanning the more responsible
    /// agent of each conflict until the plan is clean.
    pub fn solve(&self, agents: &[AgentSpec]) -> Result<Solution> {
        let config = self.config;
        info!("planning paths for {} agent(s) using OCBS", agents.len());

        let mut paths = Vec::with_capacity(agents.len());
        for (agent, spec) in agents.iter().enumerate() {
            let path = astar::plan(self.roadmap, spec.start, spec.goal, config)
                .map_err(|_| Error::Infeasible { agent })?;
            paths.push(path);
        }
        let mut samples: Vec<_> = paths
            .iter()
            .map(|p| sample_path(p, self.roadmap, config))
            .collect();
        let mut costs: Vec<f64> = paths.iter().map(|p| p.duration).collect();
        let base: Vec<f64> = costs.clone();
        let mut registry = ZoneRegistry::new();
        let mut splits = 0usize;

        for _ in 0..MAX_ROUNDS {
            let conflict = find_first_conflict(
                &samples,
                self.roadmap.width(),
                self.roadmap.height(),
                config,
            );
            let Some(conflict) = conflict else {
                let cost = costs.iter().sum();
                info!("resolved all conflicts with cost {cost:.1}");
                return Ok(Solution {
                    paths,
                    samples,
                    costs,
                    cost,
                    resolved: true,
                    used_decomposition: false,
                    splits,
                });
            };

            // The agent that has been penalised least so far yields.
            let ratio = |agent: usize| costs[agent] / base[agent];
            let (replan, other_pose) = if ratio(conflict.first) <= ratio(conflict.second) {
                (conflict.first, conflict.second_pose)
            } else {
                (conflict.second, conflict.first_pose)
            };
            debug!(
                "conflict between agents {} and {} at tick {}; replanning {replan}",
                conflict.first, conflict.second, conflict.tick
            );

            splits += 1;
            let time = conflict.tick as f64 * config.sim_step_time;
            let key = self.zone_key(replan, other_pose.position, time);
            registry.entry(key).or_default().push(other_pose.position);

            let spec = agents[replan];
            let Ok(path) = self.plan_avoiding_zones(spec, replan, &registry) else {
                warn!("agent {replan} has no path around its conflict zones");
                return Err(Error::Unresolved);
            };
            costs[replan] = path.duration;
            samples[replan] = sample_path(&path, self.roadmap, config);
            paths[replan] = path;
        }

        Err(Error::Unresolved)
    }

    fn zone_key(&self, agent: usize, position: Point2d, time: f64) -> ZoneKey {
        ZoneKey {
            agent,
            cell: (
                (position.x / self.config.cell_size).round() as i64,
                (position.y / self.config.cell_size).round() as i64,
            ),
            bucket: (time / self.config.ocbs_conflict_range).round() as i64,
        }
    }

    /// True if the traversal passes through any of the agent's
    /// registered conflict zones.
    fn traversal_blocked(
        &self,
        agent: usize,
        v_u: f64,
        v_w: f64,
        start_time: f64,
        edge: crate::EdgeId,
        registry: &ZoneRegistry,
    ) -> bool {
        let interp = self.roadmap.interpolator(edge);
        let d = interp.distance();
        if d == 0.0 {
            return false;
        }
        let threshold = self.config.collision_safety_factor * self.config.car_length;
        let duration = 2.0 * d / (v_u + v_w);
        let mut tt = 0.0;
        while tt < duration {
            let pose = interp.pose_at_time(v_u, v_w, tt);
            let key = self.zone_key(agent, pose.position, start_time + tt);
            if let Some(zones) = registry.get(&key) {
                if zones
                    .iter()
                    .any(|&zone| distance(pose.position, zone) < threshold)
                {
                    return true;
                }
            }
            tt += self.config.sim_step_time;
        }
        false
    }

    /// The kinodynamic A* core, with the conflict-zone registry
    /// consulted on every candidate traversal.
    fn plan_avoiding_zones(
        &self,
        spec: AgentSpec,
        agent: usize,
        registry: &ZoneRegistry,
    ) -> Result<PlannedPath> {
        let (roadmap, config) = (self.roadmap, self.config);
        let goal_position = roadmap.pose(spec.goal).position;
        let heuristic = |pose: crate::PoseId| {
            distance(roadmap.pose(pose).position, goal_position) / config.car_max_speed_ms
        };

        let start_node = SearchNode::start(spec.start);
        let start_key = start_node.key(config.speed_resolution);

        let mut open = BinaryHeap::new();
        let mut g_score = HashMap::new();
        let mut nodes = HashMap::new();
        let mut came_from = HashMap::new();
        let mut closed = HashSet::new();
        let mut seq = 0u64;

        g_score.insert(start_key, 0.0);
        nodes.insert(start_key, start_node);
        open.push(OpenEntry {
            f: heuristic(spec.start),
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
                return Err(Error::NoPath);
            }

            let current = nodes[&entry.key];
            if current.pose == spec.goal {
                return Ok(astar::reconstruct(
                    &came_from,
                    &nodes,
                    entry.key,
                    g_score[&entry.key],
                ));
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
                let keep_speed = [current.speed];
                let candidates: &[f64] = if edge.distance == 0.0 {
                    &keep_speed
                } else {
                    successor_speeds(current.speed, edge, config, &mut speeds);
                    &speeds
                };

                for i in 0..candidates.len() {
                    let v_w = candidates[i];
                    if v_w > config.car_max_speed_ms || v_w > edge.max_speed || v_w < 0.0 {
                        continue;
                    }
                    let tentative = if edge.distance == 0.0 {
                        g_u
                    } else {
                        if v_w == current.speed && v_w == 0.0 {
                            continue;
                        }
                        if self.traversal_blocked(agent, current.speed, v_w, g_u, edge_id, registry)
                        {
                            continue;
                        }
                        g_u + 2.0 * edge.distance / (current.speed + v_w)
                    };

                    let neighbor = SearchNode {
                        pose: edge.to,
                        speed: v_w,
                        arc_from,
                    };
                    let key = neighbor.key(config.speed_resolution);
                    if g_score.get(&key).is_some_and(|&old| tentative >= old) {
                        continue;
                    }
                    g_score.insert(key, tentative);
                    nodes.insert(key, neighbor);
                    came_from.insert(key, entry.key);
                    seq += 1;
                    open.push(OpenEntry {
                        f: tentative + heuristic(edge.to),
                        seq,
                        key,
                    });
                }
            }
        }
        Err(Error::NoPath)
    }
}
