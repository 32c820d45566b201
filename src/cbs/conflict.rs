//! Inter-agent conflict detection over sampled trajectories.

use crate::config::PlannerConfig;
use crate::math::{distance, Pose};
use crate::util::Interval;

/// Two agents whose bodies come too close at a common tick.
#[derive(Clone, Copy, Debug)]
pub struct Conflict {
    pub first: usize,
    pub second: usize,
    pub tick: u32,
    pub first_pose: Pose,
    pub second_pose: Pose,
}

/// Scans the sampled trajectories for the earliest conflict, ties broken
/// by the lowest agent pair. Agents outside the map margin or past their
/// path end are skipped at that tick.
pub(crate) fn find_first_conflict(
    paths: &[Vec<Pose>],
    width: f64,
    height: f64,
    config: &PlannerConfig,
) -> Option<Conflict> {
    let max_ticks = paths.iter().map(Vec::len).max().unwrap_or(0);
    let margin = config.car_length;
    // Bodies are in conflict within the safety radius, and never closer
    // than the minimum spacing.
    let threshold = (config.collision_safety_factor * config.car_length).max(config.cbs_min_spacing);

    let x_span = Interval::new(-margin, width + margin);
    let y_span = Interval::new(-margin, height + margin);
    let in_bounds =
        |pose: &Pose| x_span.contains(pose.position.x) && y_span.contains(pose.position.y);

    let mut tick = 0usize;
    while tick < max_ticks {
        for i in 0..paths.len() {
            let Some(pi) = paths[i].get(tick) else {
                continue;
            };
            if !in_bounds(pi) {
                continue;
            }
            for j in (i + 1)..paths.len() {
                let Some(pj) = paths[j].get(tick) else {
                    continue;
                };
                if !in_bounds(pj) {
                    continue;
                }
                if distance(pi.position, pj.position) < threshold {
                    return Some(Conflict {
                        first: i,
                        second: j,
                        tick: tick as u32,
                        first_pose: oriented(&paths[i], tick),
                        second_pose: oriented(&paths[j], tick),
                    });
                }
            }
        }
        tick += config.cbs_precision_factor as usize;
    }
    None
}

/// The pose at a tick with its heading re-derived from the next sampled
/// point, which reflects the actual direction of travel.
fn oriented(path: &[Pose], tick: usize) -> Pose {
    let here = path[tick];
    match path.get(tick + 1) {
        Some(next) if distance(here.position, next.position) > 1e-9 => Pose {
            position: here.position,
            heading: (next.position.y - here.position.y).atan2(next.position.x - here.position.x),
        },
        _ => here,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn straight_path(y: f64, ticks: usize, step: f64) -> Vec<Pose> {
        (0..ticks)
            .map(|t| Pose::new(t as f64 * step, y, 0.0))
            .collect()
    }

    #[test]
    fn parallel_lanes_never_conflict() {
        let config = PlannerConfig::default();
        let paths = vec![straight_path(0.0, 100, 0.4), straight_path(50.0, 100, 0.4)];
        assert!(find_first_conflict(&paths, 200.0, 100.0, &config).is_none());
    }

    #[test]
    fn head_on_collision_found_at_earliest_tick() {
        let config = PlannerConfig::default();
        let forward = straight_path(0.0, 200, 0.5);
        let backward: Vec<Pose> = (0..200)
            .map(|t| Pose::new(100.0 - t as f64 * 0.5, 0.0, std::f64::consts::PI))
            .collect();
        let conflict =
            find_first_conflict(&vec![forward, backward], 200.0, 100.0, &config).unwrap();
        assert_eq!((conflict.first, conflict.second), (0, 1));
        // They meet near the middle of the 100 m stretch.
        assert!((conflict.first_pose.position.x - 50.0).abs() < 10.0);
    }

    #[test]
    fn minimum_spacing_floors_the_threshold() {
        // A tiny safety factor alone would let bodies approach within
        // half a metre; the spacing floor still keeps them apart.
        let config = PlannerConfig {
            collision_safety_factor: 0.1,
            ..PlannerConfig::default()
        };
        assert!(config.collision_safety_factor * config.car_length < config.cbs_min_spacing);

        let paths = vec![
            straight_path(0.0, 50, 0.4),
            straight_path(config.cbs_min_spacing * 0.75, 50, 0.4),
        ];
        assert!(find_first_conflict(&paths, 200.0, 100.0, &config).is_some());
    }

    #[test]
    fn short_path_agents_are_skipped_past_their_end() {
        let config = PlannerConfig::default();
        let long = straight_path(0.0, 200, 0.5);
        let short: Vec<Pose> = (0..5).map(|_| Pose::new(50.0, 0.0, 0.0)).collect();
        // The short path sits at x=50 but ends after 5 ticks; the long
        // path only reaches that spot afterwards.
        let conflict = find_first_conflict(&vec![long, short], 200.0, 100.0, &config);
        assert!(conflict.is_none());
    }
}
