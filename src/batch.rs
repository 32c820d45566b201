//! Batch data generation.
//!
//! Runs the planner repeatedly over randomly spawned agent sets and
//! appends one CSV row per successful run:
//! `numCars;carDensity;avgSpeed_1;avgSpeed_2;…` where the density is
//! cars per square kilometre and speeds are per-agent averages over
//! in-bounds ticks. Failed runs (infeasible or unresolved) are logged
//! and skipped; runs are independent of each other.

use crate::agent::{spawn_random_pairs, Agent};
use crate::cbs::{AgentSpec, CbsPlanner};
use crate::config::PlannerConfig;
use crate::error::{Error, Result};
use crate::roadmap::Roadmap;
use itertools::Itertools;
use log::{info, warn};
use rand::Rng;
use std::fmt;
use std::io::Write;

/// One CSV row of batch output.
#[derive(Clone, Debug)]
pub struct BatchRow {
    pub num_cars: usize,
    /// Cars per square kilometre of map area.
    pub car_density: f64,
    /// Per-agent mean speeds over in-bounds ticks (m/s).
    pub avg_speeds: Vec<f64>,
}

impl fmt::Display for BatchRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{:.4};{}",
            self.num_cars,
            self.car_density,
            self.avg_speeds.iter().map(|s| format!("{s:.3}")).join(";")
        )
    }
}

/// Repeated-run driver around the conflict search.
pub struct BatchRunner<'a> {
    roadmap: &'a Roadmap,
    config: &'a PlannerConfig,
}

impl<'a> BatchRunner<'a> {
    pub fn new(roadmap: &'a Roadmap, config: &'a PlannerConfig) -> Self {
        Self { roadmap, config }
    }

    /// Executes `runs` planning runs of `num_cars` agents each, writing
    /// a row per resolved run. Returns the number of rows written.
    pub fn run<R: Rng>(
        &self,
        runs: usize,
        num_cars: usize,
        rng: &mut R,
        out: &mut dyn Write,
    ) -> Result<usize> {
        let mut written = 0;
        for run in 0..runs {
            match self.single_run(num_cars, rng) {
                Ok(row) => {
                    writeln!(out, "{row}")?;
                    written += 1;
                    info!("run {}/{} complete: {row}", run + 1, runs);
                }
                Err(Error::Infeasible { agent }) => {
                    warn!("run {}/{} infeasible for agent {agent}, skipped", run + 1, runs);
                }
                Err(Error::Unresolved) => {
                    warn!("run {}/{} unresolved, skipped", run + 1, runs);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(written)
    }

    fn single_run<R: Rng>(&self, num_cars: usize, rng: &mut R) -> Result<BatchRow> {
        let pairs = spawn_random_pairs(self.roadmap, num_cars, self.config, rng)?;
        let specs: Vec<AgentSpec> = pairs
            .iter()
            .map(|&(start, goal)| AgentSpec { start, goal })
            .collect();

        let solution = CbsPlanner::new(self.roadmap, self.config).solve(&specs)?;
        if !solution.resolved {
            return Err(Error::Unresolved);
        }

        let (width, height) = (self.roadmap.width(), self.roadmap.height());
        let avg_speeds = specs
            .iter()
            .zip(&solution.paths)
            .map(|(spec, path)| {
                let mut agent = Agent::new(spec.start, spec.goal);
                agent.assign_path(path.clone(), self.roadmap, self.config);
                agent.average_speed(width, height, self.config)
            })
            .collect();

        Ok(BatchRow {
            num_cars,
            car_density: 1e6 * num_cars as f64 / (width * height),
            avg_speeds,
        })
    }
}
