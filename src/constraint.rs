//! Spatio-temporal constraints produced by the conflict search.
//!
//! A constraint forbids an agent from occupying a body pose that
//! conflicts with a recorded pose at a given tick. The store keeps one
//! lane of constraints per agent plus a global lane that binds every
//! agent; rows are hash maps keyed by tick so branch clones stay cheap
//! as the tree deepens.

use crate::agent::bodies_overlap;
use crate::config::PlannerConfig;
use crate::dubins::DubinsInterpolator;
use crate::math::{distance2, Pose};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A forbidden (agent, tick, pose) occupancy.
#[derive(Clone, Copy, Debug)]
pub struct Constraint {
    pub agent: usize,
    pub tick: u32,
    /// The body pose the agent must keep clear of.
    pub pose: Pose,
}

/// Which lane of the store a constraint lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Binds only the constraint's agent.
    Agent,
    /// Binds every agent.
    Global,
}

type Row = HashMap<u32, SmallVec<[Constraint; 2]>>;

/// Per-agent and global bags of forbidden occupancies.
///
/// Constraints are never removed once added on a branch; sibling
/// branches of the conflict tree hold independent clones.
#[derive(Clone, Debug, Default)]
pub struct ConstraintStore {
    agents: Vec<Row>,
    global: Row,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.agents.iter().all(|row| row.is_empty())
    }

    /// Number of constraints across all lanes.
    pub fn len(&self) -> usize {
        let per_agent: usize = self
            .agents
            .iter()
            .flat_map(|row| row.values())
            .map(|list| list.len())
            .sum();
        per_agent + self.global.values().map(|list| list.len()).sum::<usize>()
    }

    pub fn add(&mut self, constraint: Constraint, scope: Scope) {
        let row = match scope {
            Scope::Global => &mut self.global,
            Scope::Agent => {
                if self.agents.len() <= constraint.agent {
                    self.agents.resize_with(constraint.agent + 1, Row::default);
                }
                &mut self.agents[constraint.agent]
            }
        };
        row.entry(constraint.tick).or_default().push(constraint);
    }

    /// Membership test with a tolerance window: a stored constraint
    /// within `cbs_precision_factor` ticks of the query, at the same
    /// quantised pose, counts as present.
    pub fn has(&self, constraint: &Constraint, scope: Scope, config: &PlannerConfig) -> bool {
        let row = match scope {
            Scope::Global => &self.global,
            Scope::Agent => match self.agents.get(constraint.agent) {
                Some(row) => row,
                None => return false,
            },
        };
        let window = config.cbs_precision_factor;
        let key = constraint
            .pose
            .key(config.cell_size, config.angle_resolution);
        let lo = constraint.tick.saturating_sub(window);
        (lo..constraint.tick + window).any(|tick| {
            row.get(&tick).is_some_and(|list| {
                list.iter().any(|c| {
                    (scope == Scope::Global || c.agent == constraint.agent)
                        && c.pose.key(config.cell_size, config.angle_resolution) == key
                })
            })
        })
    }

    /// Deep copy retaining only the per-agent lanes in `ids`, renumbered
    /// to the slice order. The global lane always survives.
    pub fn clone_for_agents(&self, ids: &[usize]) -> Self {
        Self {
            agents: ids
                .iter()
                .map(|&id| self.agents.get(id).cloned().unwrap_or_default())
                .collect(),
            global: self.global.clone(),
        }
    }

    /// Tests a candidate edge traversal starting at time `start_time`
    /// with a linear speed ramp `v_u` → `v_w` against every constraint
    /// addressed to `agent` (and the global lane). Returns true if any
    /// sampled tick collides.
    pub fn check(
        &self,
        agent: usize,
        v_u: f64,
        v_w: f64,
        start_time: f64,
        interp: &DubinsInterpolator,
        config: &PlannerConfig,
    ) -> bool {
        let d = interp.distance();
        if d == 0.0 {
            return false;
        }

        let agent_row = self.agents.get(agent);
        if agent_row.is_none_or(|row| row.is_empty()) && self.global.is_empty() {
            return false;
        }

        let dt = config.sim_step_time;
        let duration = 2.0 * d / (v_u + v_w);
        let t_min = (start_time / dt).ceil().max(0.0) as u32;
        let t_max = ((start_time + duration) / dt).floor() as u32;
        let stride = config.cbs_precision_factor;

        let (a, b) = (interp.start(), interp.end());
        let acc = (v_w * v_w - v_u * v_u) / (2.0 * d);
        let fraction = |t: f64| ((0.5 * acc * t * t + v_u * t) / d).clamp(0.0, 1.0);
        let near = (2.0 * config.car_length).max(5.0 * config.cbs_min_spacing);
        let near2 = near * near;

        let mut k = t_min;
        while k <= t_max {
            // Cheap pre-filter position: linear interpolation between
            // the edge endpoints at the stride tick.
            let s = fraction(k as f64 * dt - start_time);
            let coarse = a.position + (b.position - a.position) * s;

            for tick in k..(k + stride).min(t_max + 1) {
                let mut precise: Option<Pose> = None;
                let lanes = [
                    agent_row.and_then(|row| row.get(&tick)),
                    self.global.get(&tick),
                ];
                for constraint in lanes.into_iter().flatten().flat_map(|list| list.iter()) {
                    if distance2(coarse, constraint.pose.position) >= near2 {
                        continue;
                    }
                    let pose = *precise.get_or_insert_with(|| {
                        interp.pose_at_time(v_u, v_w, tick as f64 * dt - start_time)
                    });
                    if bodies_overlap(pose, constraint.pose, config) {
                        return true;
                    }
                }
            }
            k += stride;
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn constraint(agent: usize, tick: u32, x: f64) -> Constraint {
        Constraint {
            agent,
            tick,
            pose: Pose::new(x, 0.0, 0.0),
        }
    }

    #[test]
    fn membership_window() {
        let config = PlannerConfig::default();
        let mut store = ConstraintStore::new();
        store.add(constraint(0, 100, 10.0), Scope::Agent);

        // Exact and near ticks count as present.
        assert!(store.has(&constraint(0, 100, 10.0), Scope::Agent, &config));
        assert!(store.has(&constraint(0, 103, 10.0), Scope::Agent, &config));
        // Outside the window, a different place, or a different agent
        // do not.
        assert!(!store.has(&constraint(0, 120, 10.0), Scope::Agent, &config));
        assert!(!store.has(&constraint(0, 100, 50.0), Scope::Agent, &config));
        assert!(!store.has(&constraint(1, 100, 10.0), Scope::Agent, &config));
    }

    #[test]
    fn clone_for_agents_renumbers_and_keeps_global() {
        let config = PlannerConfig::default();
        let mut store = ConstraintStore::new();
        store.add(constraint(0, 5, 1.0), Scope::Agent);
        store.add(constraint(2, 7, 2.0), Scope::Agent);
        store.add(constraint(0, 9, 3.0), Scope::Global);

        let sliced = store.clone_for_agents(&[2]);
        // Agent 2's lane is now lane 0.
        assert!(sliced.has(&constraint(0, 7, 2.0), Scope::Agent, &config));
        assert!(!sliced.has(&constraint(0, 5, 1.0), Scope::Agent, &config));
        assert!(sliced.has(&constraint(9, 9, 3.0), Scope::Global, &config));
    }

    #[test]
    fn clones_are_independent() {
        let config = PlannerConfig::default();
        let mut parent = ConstraintStore::new();
        parent.add(constraint(0, 5, 1.0), Scope::Agent);

        let mut child = parent.clone();
        child.add(constraint(0, 6, 2.0), Scope::Agent);

        assert!(!parent.has(&constraint(0, 6, 2.0), Scope::Agent, &config));
        assert!(child.has(&constraint(0, 5, 1.0), Scope::Agent, &config));
    }
}
