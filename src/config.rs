//! Planner configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Planner settings: vehicle kinodynamics, quantisation resolutions and
/// search budgets. All values are metric (metres, seconds, m/s).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Position quantisation for pose equality and hashing (m).
    #[serde(default = "defaults::cell_size")]
    pub cell_size: f64,

    /// Heading quantisation (radians).
    #[serde(default = "defaults::angle_resolution")]
    pub angle_resolution: f64,

    /// Speed quantisation (m/s).
    #[serde(default = "defaults::speed_resolution")]
    pub speed_resolution: f64,

    /// Simulation tick length (s).
    #[serde(default = "defaults::sim_step_time")]
    pub sim_step_time: f64,

    /// Tick stride for collision sampling.
    #[serde(default = "defaults::cbs_precision_factor")]
    pub cbs_precision_factor: u32,

    /// Wall-clock budget (s) before the agent set is split recursively.
    #[serde(default = "defaults::cbs_max_sub_time")]
    pub cbs_max_sub_time: f64,

    /// Bounded open set capacity; lowest-priority overflow is discarded.
    #[serde(default = "defaults::cbs_max_openset_size")]
    pub cbs_max_openset_size: usize,

    /// Body-overlap radius multiplier (times `car_length`).
    #[serde(default = "defaults::collision_safety_factor")]
    pub collision_safety_factor: f64,

    /// Minimum spacing between car body centres; a floor on the
    /// conflict-declaration distance and the constraint pre-filter (m).
    #[serde(default = "defaults::cbs_min_spacing")]
    pub cbs_min_spacing: f64,

    /// Minimum turning radius of the car (m).
    #[serde(default = "defaults::car_min_turning_radius")]
    pub car_min_turning_radius: f64,

    /// Maximum speed of the car (m/s).
    #[serde(default = "defaults::car_max_speed_ms")]
    pub car_max_speed_ms: f64,

    /// Maximum sustained lateral acceleration (m/s²).
    #[serde(default = "defaults::car_max_g_force")]
    pub car_max_g_force: f64,

    /// Longitudinal acceleration limit (m/s²).
    #[serde(default = "defaults::car_acceleration")]
    pub car_acceleration: f64,

    /// Longitudinal deceleration limit (m/s²).
    #[serde(default = "defaults::car_deceleration")]
    pub car_deceleration: f64,

    /// Car body length (m).
    #[serde(default = "defaults::car_length")]
    pub car_length: f64,

    /// Car body width (m).
    #[serde(default = "defaults::car_width")]
    pub car_width: f64,

    /// Polyline sampling stride for pre-baked Dubins curves (m).
    #[serde(default = "defaults::dubins_interpolation_step")]
    pub dubins_interpolation_step: f64,

    /// Pose spacing along lane centre-lines (m).
    #[serde(default = "defaults::graph_point_distance")]
    pub graph_point_distance: f64,

    /// If true, only right-way edges are traversable.
    #[serde(default)]
    pub road_enable_right_hand_traffic: bool,

    /// Hard cap on A* pops.
    #[serde(default = "defaults::astar_max_iterations")]
    pub astar_max_iterations: usize,

    /// Intermediate speed samples per traversal.
    #[serde(default = "defaults::num_speed_divisions")]
    pub num_speed_divisions: usize,

    /// Time bucket (s) for the priority-variant conflict registry.
    #[serde(default = "defaults::ocbs_conflict_range")]
    pub ocbs_conflict_range: f64,

    /// Return the best paths seen when the open set runs dry.
    #[serde(default)]
    pub return_best_on_unresolved: bool,

    /// Frontier expansion workers; 0 keeps the engine sequential
    /// and deterministic.
    #[serde(default)]
    pub parallel_workers: usize,
}

mod defaults {
    pub fn cell_size() -> f64 {
        1.0
    }
    pub fn angle_resolution() -> f64 {
        0.1
    }
    pub fn speed_resolution() -> f64 {
        0.5
    }
    pub fn sim_step_time() -> f64 {
        0.03
    }
    pub fn cbs_precision_factor() -> u32 {
        5
    }
    pub fn cbs_max_sub_time() -> f64 {
        10.0
    }
    pub fn cbs_max_openset_size() -> usize {
        4096
    }
    pub fn collision_safety_factor() -> f64 {
        1.5
    }
    pub fn cbs_min_spacing() -> f64 {
        2.0
    }
    pub fn car_min_turning_radius() -> f64 {
        4.0
    }
    pub fn car_max_speed_ms() -> f64 {
        50.0 / 3.6
    }
    pub fn car_max_g_force() -> f64 {
        9.0
    }
    pub fn car_acceleration() -> f64 {
        1.0
    }
    pub fn car_deceleration() -> f64 {
        1.0
    }
    pub fn car_length() -> f64 {
        4.2
    }
    pub fn car_width() -> f64 {
        1.6
    }
    pub fn dubins_interpolation_step() -> f64 {
        0.5
    }
    pub fn graph_point_distance() -> f64 {
        7.0
    }
    pub fn astar_max_iterations() -> usize {
        100_000
    }
    pub fn num_speed_divisions() -> usize {
        3
    }
    pub fn ocbs_conflict_range() -> f64 {
        0.1
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cell_size: defaults::cell_size(),
            angle_resolution: defaults::angle_resolution(),
            speed_resolution: defaults::speed_resolution(),
            sim_step_time: defaults::sim_step_time(),
            cbs_precision_factor: defaults::cbs_precision_factor(),
            cbs_max_sub_time: defaults::cbs_max_sub_time(),
            cbs_max_openset_size: defaults::cbs_max_openset_size(),
            collision_safety_factor: defaults::collision_safety_factor(),
            cbs_min_spacing: defaults::cbs_min_spacing(),
            car_min_turning_radius: defaults::car_min_turning_radius(),
            car_max_speed_ms: defaults::car_max_speed_ms(),
            car_max_g_force: defaults::car_max_g_force(),
            car_acceleration: defaults::car_acceleration(),
            car_deceleration: defaults::car_deceleration(),
            car_length: defaults::car_length(),
            car_width: defaults::car_width(),
            dubins_interpolation_step: defaults::dubins_interpolation_step(),
            graph_point_distance: defaults::graph_point_distance(),
            road_enable_right_hand_traffic: false,
            astar_max_iterations: defaults::astar_max_iterations(),
            num_speed_divisions: defaults::num_speed_divisions(),
            ocbs_conflict_range: defaults::ocbs_conflict_range(),
            return_best_on_unresolved: false,
            parallel_workers: 0,
        }
    }
}

impl PlannerConfig {
    /// Checks that every resolution and budget is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cell_size", self.cell_size),
            ("angle_resolution", self.angle_resolution),
            ("speed_resolution", self.speed_resolution),
            ("sim_step_time", self.sim_step_time),
            ("car_min_turning_radius", self.car_min_turning_radius),
            ("car_max_speed_ms", self.car_max_speed_ms),
            ("car_max_g_force", self.car_max_g_force),
            ("car_acceleration", self.car_acceleration),
            ("car_deceleration", self.car_deceleration),
            ("car_length", self.car_length),
            ("car_width", self.car_width),
            ("dubins_interpolation_step", self.dubins_interpolation_step),
            ("graph_point_distance", self.graph_point_distance),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if self.cbs_precision_factor == 0 {
            return Err(Error::Config("cbs_precision_factor must be at least 1".into()));
        }
        if self.cbs_max_openset_size == 0 {
            return Err(Error::Config("cbs_max_openset_size must be at least 1".into()));
        }
        if self.num_speed_divisions == 0 {
            return Err(Error::Config("num_speed_divisions must be at least 1".into()));
        }
        Ok(())
    }

    /// The turning radius a car needs at the given speed.
    pub fn turning_radius(&self, speed: f64) -> f64 {
        (speed * speed / self.car_max_g_force).max(self.car_min_turning_radius)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PlannerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cell_size, 1.0);
        assert!((config.car_max_speed_ms - 13.888).abs() < 0.001);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"cell_size": 2.0, "parallel_workers": 4}"#).unwrap();
        assert_eq!(config.cell_size, 2.0);
        assert_eq!(config.parallel_workers, 4);
        assert_eq!(config.num_speed_divisions, 3);
    }

    #[test]
    fn rejects_zero_resolution() {
        let mut config = PlannerConfig::default();
        config.speed_resolution = 0.0;
        assert!(config.validate().is_err());
    }
}
