use slotmap::new_key_type;

pub mod agent;
pub mod batch;
pub mod cbs;
pub mod config;
pub mod constraint;
pub mod dubins;
pub mod error;
pub mod map;
pub mod math;
pub mod ocbs;
pub mod roadmap;
pub mod search;
mod util;

pub use agent::Agent;
pub use cbs::{AgentSpec, CbsPlanner, Solution};
pub use config::PlannerConfig;
pub use error::{Error, Result};
pub use map::CityMap;
pub use ocbs::OcbsPlanner;
pub use roadmap::Roadmap;

new_key_type! {
    /// Index of a pose in the roadmap arena.
    pub struct PoseId;
    /// Index of a directed edge in the roadmap arena.
    pub struct EdgeId;
}
