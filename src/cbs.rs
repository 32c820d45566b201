//! Conflict-Based Search over a tree of constraint sets.
//!
//! The outer search pops the cheapest constraint-set node from a bounded
//! frontier, scans its paths for the earliest inter-agent conflict and,
//! if one exists, branches: each of the two agents gets the other's
//! pose at the conflict tick added to its constraint lane and is
//! replanned with the timed A*. A node whose paths are conflict-free is
//! the solution.
//!
//! The roadmap is shared read-only across expansions; every node owns
//! its constraint store and paths, so frontier nodes can be expanded by
//! a worker pool without any shared mutable state beyond the frontier
//! itself.

use crate::agent::sample_path;
use crate::cbs::conflict::find_first_conflict;
use crate::cbs::openset::BoundedOpenSet;
use crate::config::PlannerConfig;
use crate::constraint::{Constraint, ConstraintStore, Scope};
use crate::error::{Error, Result};
use crate::math::Pose;
use crate::roadmap::Roadmap;
use crate::search::{timed, PlannedPath};
use crate::PoseId;
use log::{debug, info};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

pub mod conflict;
mod openset;
mod subsearch;

pub use conflict::Conflict;

/// One agent's planning request.
#[derive(Clone, Copy, Debug)]
pub struct AgentSpec {
    pub start: PoseId,
    pub goal: PoseId,
}

/// A complete multi-agent plan.
#[derive(Clone, Debug)]
pub struct Solution {
    /// Per-agent node paths.
    pub paths: Vec<PlannedPath>,
    /// Per-agent poses sampled at the simulation tick.
    pub samples: Vec<Vec<Pose>>,
    /// Per-agent path durations (s).
    pub costs: Vec<f64>,
    /// Total cost: the sum of path durations.
    pub cost: f64,
    /// False only when the engine was configured to hand back the best
    /// conflicted node instead of reporting `Unresolved`.
    pub resolved: bool,
    /// True when the agent set was split recursively; such runs carry
    /// no optimality or completeness guarantee.
    pub used_decomposition: bool,
    /// Number of conflicts the engine branched on along the way.
    pub splits: usize,
}

/// A node of the conflict tree.
#[derive(Clone)]
struct CbsNode {
    paths: Vec<PlannedPath>,
    samples: Vec<Vec<Pose>>,
    store: ConstraintStore,
    costs: Vec<f64>,
    cost: f64,
    depth: u32,
}

impl PartialEq for CbsNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CbsNode {}

impl PartialOrd for CbsNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CbsNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.depth.cmp(&other.depth))
    }
}

enum Expansion {
    Resolved(Box<CbsNode>),
    Children(Vec<CbsNode>),
}

/// The multi-agent conflict-search engine.
pub struct CbsPlanner<'a> {
    roadmap: &'a Roadmap,
    config: &'a PlannerConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> CbsPlanner<'a> {
    pub fn new(roadmap: &'a Roadmap, config: &'a PlannerConfig) -> Self {
        Self {
            roadmap,
            config,
            cancel: None,
        }
    }

    /// Installs a cancellation flag, polled between frontier pops.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Plans conflict-free paths for every agent.
    ///
    /// Failure of the root plan for any agent is [`Error::Infeasible`];
    /// an exhausted frontier is [`Error::Unresolved`] unless the
    /// configuration asks for the best conflicted paths instead.
    pub fn solve(&self, agents: &[AgentSpec]) -> Result<Solution> {
        info!("planning paths for {} agent(s)", agents.len());
        self.solve_with_store(agents, ConstraintStore::new(), true)
    }

    pub(crate) fn solve_with_store(
        &self,
        agents: &[AgentSpec],
        root_store: ConstraintStore,
        allow_decomposition: bool,
    ) -> Result<Solution> {
        let started = Instant::now();
        let root = self.root_node(agents, root_store)?;

        let mut open = BoundedOpenSet::new(self.config.cbs_max_openset_size);
        open.push(root);

        if self.config.parallel_workers > 0 {
            self.run_parallel(agents, open, started, allow_decomposition)
        } else {
            self.run_sequential(agents, open, started, allow_decomposition)
        }
    }

    fn run_sequential(
        &self,
        agents: &[AgentSpec],
        mut open: BoundedOpenSet<CbsNode>,
        started: Instant,
        allow_decomposition: bool,
    ) -> Result<Solution> {
        let mut best: Option<CbsNode> = None;
        let mut splits = 0usize;

        while let Some(node) = open.pop() {
            self.check_cancelled()?;
            if allow_decomposition && self.over_budget(started) {
                if agents.len() >= 4 {
                    return self.decompose(agents);
                }
                info!("search budget exceeded with too few agents to decompose");
                return self.unresolved(best, splits);
            }

            match self.expand(node, agents) {
                Expansion::Resolved(node) => return Ok(self.emit(*node, true, splits)),
                Expansion::Children(children) => {
                    splits += 1;
                    if self.config.return_best_on_unresolved {
                        for child in &children {
                            if best.as_ref().is_none_or(|b| child < b) {
                                best = Some(child.clone());
                            }
                        }
                    }
                    for child in children {
                        open.push(child);
                    }
                }
            }
        }

        self.unresolved(best, splits)
    }

    fn run_parallel(
        &self,
        agents: &[AgentSpec],
        open: BoundedOpenSet<CbsNode>,
        started: Instant,
        allow_decomposition: bool,
    ) -> Result<Solution> {
        let open = Mutex::new(open);
        let best: Mutex<Option<CbsNode>> = Mutex::new(None);
        let resolved: Mutex<Option<CbsNode>> = Mutex::new(None);
        let splits = AtomicUsize::new(0);

        loop {
            self.check_cancelled()?;
            if allow_decomposition && self.over_budget(started) {
                if agents.len() >= 4 {
                    return self.decompose(agents);
                }
                info!("search budget exceeded with too few agents to decompose");
                return self.unresolved(best.lock().take(), splits.load(AtomicOrdering::Relaxed));
            }

            let batch = open.lock().pop_batch(self.config.parallel_workers);
            if batch.is_empty() {
                break;
            }

            std::thread::scope(|scope| {
                for node in batch {
                    scope.spawn(|| match self.expand(node, agents) {
                        Expansion::Resolved(done) => {
                            let mut slot = resolved.lock();
                            if slot.as_ref().is_none_or(|held| done.as_ref() < held) {
                                *slot = Some(*done);
                            }
                        }
                        Expansion::Children(children) => {
                            splits.fetch_add(1, AtomicOrdering::Relaxed);
                            if self.config.return_best_on_unresolved {
                                let mut best = best.lock();
                                for child in &children {
                                    if best.as_ref().is_none_or(|b| child < b) {
                                        *best = Some(child.clone());
                                    }
                                }
                            }
                            let mut open = open.lock();
                            for child in children {
                                open.push(child);
                            }
                        }
                    });
                }
            });

            if let Some(node) = resolved.lock().take() {
                return Ok(self.emit(node, true, splits.load(AtomicOrdering::Relaxed)));
            }
        }

        self.unresolved(best.into_inner(), splits.load(AtomicOrdering::Relaxed))
    }

    /// Detects the earliest conflict of a node and either declares it
    /// resolved or produces its children.
    fn expand(&self, node: CbsNode, agents: &[AgentSpec]) -> Expansion {
        let config = self.config;
        let conflict = find_first_conflict(
            &node.samples,
            self.roadmap.width(),
            self.roadmap.height(),
            config,
        );

        let Some(conflict) = conflict else {
            return Expansion::Resolved(Box::new(node));
        };

        debug!(
            "conflict between agents {} and {} at tick {} (cost {:.1}, depth {})",
            conflict.first, conflict.second, conflict.tick, node.cost, node.depth
        );

        let splits = [
            (conflict.first, conflict.second_pose),
            (conflict.second, conflict.first_pose),
        ];

        let mut children = Vec::with_capacity(2);
        for (agent, other_pose) in splits {
            let constraint = Constraint {
                agent,
                tick: conflict.tick,
                pose: other_pose,
            };
            // A constraint the branch already carries would loop forever.
            if node.store.has(&constraint, Scope::Agent, config) {
                continue;
            }

            let mut store = node.store.clone();
            store.add(constraint, Scope::Agent);

            let spec = agents[agent];
            let Ok(path) =
                timed::plan(self.roadmap, spec.start, spec.goal, agent, &store, config)
            else {
                continue;
            };

            let mut child = node.clone();
            child.cost = node.cost - node.costs[agent] + path.duration;
            child.costs[agent] = path.duration;
            child.samples[agent] = sample_path(&path, self.roadmap, config);
            child.paths[agent] = path;
            child.store = store;
            child.depth = node.depth + 1;
            children.push(child);
        }

        Expansion::Children(children)
    }

    /// Plans every agent independently against the root store.
    fn root_node(&self, agents: &[AgentSpec], store: ConstraintStore) -> Result<CbsNode> {
        let mut paths = Vec::with_capacity(agents.len());
        for (agent, spec) in agents.iter().enumerate() {
            let path = timed::plan(
                self.roadmap,
                spec.start,
                spec.goal,
                agent,
                &store,
                self.config,
            )
            .map_err(|_| Error::Infeasible { agent })?;
            paths.push(path);
        }

        let samples: Vec<_> = paths
            .iter()
            .map(|p| sample_path(p, self.roadmap, self.config))
            .collect();
        let costs: Vec<_> = paths.iter().map(|p| p.duration).collect();
        let cost = costs.iter().sum();

        Ok(CbsNode {
            paths,
            samples,
            store,
            costs,
            cost,
            depth: 0,
        })
    }

    fn emit(&self, node: CbsNode, resolved: bool, splits: usize) -> Solution {
        Solution {
            paths: node.paths,
            samples: node.samples,
            costs: node.costs,
            cost: node.cost,
            resolved,
            used_decomposition: false,
            splits,
        }
    }

    fn unresolved(&self, best: Option<CbsNode>, splits: usize) -> Result<Solution> {
        if self.config.return_best_on_unresolved {
            if let Some(node) = best {
                info!("frontier exhausted; returning best conflicted node");
                return Ok(self.emit(node, false, splits));
            }
        }
        Err(Error::Unresolved)
    }

    fn over_budget(&self, started: Instant) -> bool {
        started.elapsed().as_secs_f64() > self.config.cbs_max_sub_time
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(AtomicOrdering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}
