//! Recursive decomposition of an over-budget conflict search.
//!
//! When a search blows its wall-clock budget, the agent list is split
//! in half: the first half is planned on its own, its trajectories are
//! frozen into global constraints (one per sampled tick), and the
//! second half plans around them. This trades completeness and solution
//! quality for bounded runtime, so every solution produced this way is
//! flagged.

use super::{AgentSpec, CbsPlanner, Solution};
use crate::constraint::{Constraint, ConstraintStore, Scope};
use crate::error::{Error, Result};
use log::info;

impl CbsPlanner<'_> {
    pub(crate) fn decompose(&self, agents: &[AgentSpec]) -> Result<Solution> {
        info!(
            "search budget exceeded, decomposing {} agents into halves",
            agents.len()
        );

        let mid = agents.len() / 2;
        let (first, second) = (&agents[..mid], &agents[mid..]);

        let first_half = self.solve_with_store(first, ConstraintStore::new(), true)?;

        // Freeze the first half's trajectories so the second half
        // plans around them.
        let mut store = ConstraintStore::new();
        for (agent, samples) in first_half.samples.iter().enumerate() {
            for (tick, pose) in samples.iter().enumerate() {
                store.add(
                    Constraint {
                        agent,
                        tick: tick as u32,
                        pose: *pose,
                    },
                    Scope::Global,
                );
            }
        }

        let second_half = match self.solve_with_store(second, store, true) {
            Ok(solution) => solution,
            // A root failure against the frozen paths means the
            // decomposition, not the problem, was at fault.
            Err(Error::Infeasible { .. }) => return Err(Error::Unresolved),
            Err(other) => return Err(other),
        };

        let mut merged = Solution {
            paths: first_half.paths,
            samples: first_half.samples,
            costs: first_half.costs,
            cost: first_half.cost + second_half.cost,
            resolved: first_half.resolved && second_half.resolved,
            used_decomposition: true,
            splits: first_half.splits + second_half.splits,
        };
        merged.paths.extend(second_half.paths);
        merged.samples.extend(second_half.samples);
        merged.costs.extend(second_half.costs);

        Ok(merged)
    }
}
