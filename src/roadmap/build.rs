//! One-shot roadmap construction from the map collaborator's data.

use super::{Edge, PoseNode, Roadmap};
use crate::config::PlannerConfig;
use crate::dubins::{turn_totals, DubinsInterpolator};
use crate::error::Result;
use crate::map::{CityMap, Road};
use crate::math::{distance, normalize_angle, Point2d, Pose, Vector2d};
use crate::PoseId;
use log::{debug, info};
use slotmap::{SlotMap, SparseSecondaryMap};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

/// Dubins paths needing more total turn than this are dropped.
const TURN_BUDGET: f64 = 0.75 * PI;

/// Step size of the upward speed scan (m/s).
const SPEED_SCAN_STEP: f64 = 0.1;

impl Roadmap {
    /// Builds the roadmap for a city map. Deterministic given the map.
    pub fn build(map: &CityMap, config: &PlannerConfig) -> Result<Self> {
        map.validate()?;
        config.validate()?;

        let mut builder = Builder {
            config,
            poses: SlotMap::with_key(),
            lookup: HashMap::new(),
            right_side: SparseSecondaryMap::new(),
            candidates: Vec::new(),
            seen: HashSet::new(),
        };
        builder.lay_roads(map);
        builder.link_intersections(map);
        builder.annotate(map)
    }
}

struct Builder<'a> {
    config: &'a PlannerConfig,
    poses: SlotMap<PoseId, PoseNode>,
    lookup: HashMap<crate::math::PoseKey, PoseId>,
    /// Whether travel in the pose's heading keeps to the configured side.
    right_side: SparseSecondaryMap<PoseId, bool>,
    candidates: Vec<(PoseId, PoseId)>,
    seen: HashSet<(PoseId, PoseId)>,
}

/// Lateral offset of a lane centre-line from the road centre-line.
fn lane_offset(road: &Road, lane: u32) -> f64 {
    let lanes = road.num_lanes as f64;
    (lane as f64 - lanes / 2.0) * road.width / lanes + road.width / (2.0 * lanes)
}

/// The lateral unit vector of a segment direction.
fn lateral(angle: f64) -> Vector2d {
    Vector2d::new(angle.sin(), -angle.cos())
}

impl Builder<'_> {
    /// Lays poses along every lane centre-line and links them: chains
    /// within a lane, periodic cross-links between adjacent lanes, and
    /// joins between consecutive segments.
    fn lay_roads(&mut self, map: &CityMap) {
        let spacing = self.config.graph_point_distance;

        for road in &map.roads {
            for (seg_idx, segment) in road.segments.iter().enumerate() {
                if seg_idx > 0 {
                    let prev = &road.segments[seg_idx - 1];
                    for lane in 0..road.num_lanes {
                        let off = lane_offset(road, lane);
                        self.link(
                            prev.p2_offset + off * lateral(prev.angle),
                            prev.angle,
                            off,
                            segment.p1_offset + off * lateral(segment.angle),
                            segment.angle,
                            off,
                        );
                    }
                }

                let seg_len = distance(segment.p1_offset, segment.p2_offset);
                let num_points = (seg_len / spacing) as usize;
                let lat = lateral(segment.angle);

                for lane in 0..road.num_lanes {
                    let off = lane_offset(road, lane);

                    if num_points == 0 {
                        self.link(
                            segment.p1_offset + off * lat,
                            segment.angle,
                            off,
                            segment.p2_offset + off * lat,
                            segment.angle,
                            off,
                        );
                        continue;
                    }

                    let step = (segment.p2_offset - segment.p1_offset) / num_points as f64;
                    for i in 1..=num_points {
                        let here = segment.p1_offset + step * i as f64 + off * lat;
                        let back = segment.p1_offset + step * (i - 1) as f64;
                        if i == 1 || i == num_points || i % 3 == 0 {
                            // Cross-link to the previous rank on every
                            // lane, permitting lane changes.
                            for lane2 in 0..road.num_lanes {
                                let off2 = lane_offset(road, lane2);
                                self.link(
                                    here,
                                    segment.angle,
                                    off,
                                    back + off2 * lat,
                                    segment.angle,
                                    off2,
                                );
                            }
                        } else {
                            self.link(here, segment.angle, off, back + off * lat, segment.angle, off);
                        }
                    }
                }
            }
        }
    }

    /// Cross-links the offset endpoints of every incident road
    /// segment/lane pair of each intersection, in both directions.
    fn link_intersections(&mut self, map: &CityMap) {
        for inter in &map.intersections {
            for &(road1, seg1) in &inter.road_segments {
                for &(road2, seg2) in &inter.road_segments {
                    let (ra, rb) = (&map.roads[road1], &map.roads[road2]);
                    let (sa, sb) = (&ra.segments[seg1], &rb.segments[seg2]);

                    let end_a = if distance(sa.p1, inter.centre) < distance(sa.p2, inter.centre) {
                        sa.p1_offset
                    } else {
                        sa.p2_offset
                    };
                    let end_b = if distance(sb.p1, inter.centre) < distance(sb.p2, inter.centre) {
                        sb.p1_offset
                    } else {
                        sb.p2_offset
                    };

                    for lane_a in 0..ra.num_lanes {
                        let off_a = lane_offset(ra, lane_a);
                        for lane_b in 0..rb.num_lanes {
                            let off_b = lane_offset(rb, lane_b);
                            self.link(
                                end_a + off_a * lateral(sa.angle),
                                sa.angle,
                                off_a,
                                end_b + off_b * lateral(sb.angle),
                                sb.angle,
                                off_b,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Interns a pose, recording which travel side its heading serves.
    fn intern(&mut self, position: Point2d, heading: f64, offset: f64, forward: bool) -> PoseId {
        let pose = Pose {
            position,
            heading: normalize_angle(heading),
        };
        let key = pose.key(self.config.cell_size, self.config.angle_resolution);
        let id = *self.lookup.entry(key).or_insert_with(|| {
            self.poses.insert(PoseNode {
                pose,
                edges: Default::default(),
            })
        });
        if !self.right_side.contains_key(id) {
            let side = if forward { offset >= 0.0 } else { offset <= 0.0 };
            self.right_side.insert(id, side);
        }
        id
    }

    /// Registers candidate directed edges between two lane points for
    /// all four heading combinations, in both directions.
    fn link(
        &mut self,
        pos_a: Point2d,
        angle_a: f64,
        off_a: f64,
        pos_b: Point2d,
        angle_b: f64,
        off_b: f64,
    ) {
        for flip_a in [false, true] {
            let heading_a = if flip_a { angle_a + PI } else { angle_a };
            let a = self.intern(pos_a, heading_a, off_a, !flip_a);
            for flip_b in [false, true] {
                let heading_b = if flip_b { angle_b + PI } else { angle_b };
                let b = self.intern(pos_b, heading_b, off_b, !flip_b);
                if a == b {
                    continue;
                }
                for pair in [(a, b), (b, a)] {
                    if self.seen.insert(pair) {
                        self.candidates.push(pair);
                    }
                }
            }
        }
    }

    /// Prunes candidates that turn too sharply, annotates the survivors
    /// with their speed limit and radius, and bakes their interpolators.
    fn annotate(mut self, map: &CityMap) -> Result<Roadmap> {
        let config = self.config;
        let budget_ok = |a: Pose, b: Pose, radius: f64| {
            matches!(
                turn_totals(a, b, radius),
                Ok((left, right)) if left < TURN_BUDGET && right < TURN_BUDGET
            )
        };

        let mut edges = SlotMap::with_key();
        let mut dropped = 0usize;

        for &(from, to) in &self.candidates {
            let a = self.poses[from].pose;
            let b = self.poses[to].pose;
            let right_way = |id: PoseId| self.right_side.get(id).copied().unwrap_or(true);

            let (ka, kb) = (
                a.key(config.cell_size, config.angle_resolution),
                b.key(config.cell_size, config.angle_resolution),
            );
            if (ka.x, ka.y) == (kb.x, kb.y) {
                // Co-located heading change: a zero-length edge.
                let id = edges.insert(Edge {
                    from,
                    to,
                    max_speed: config.car_max_speed_ms,
                    turning_radius: config.car_min_turning_radius,
                    distance: 0.0,
                    right_way: right_way(to),
                    interp: DubinsInterpolator::zero_length(a),
                });
                self.poses[from].edges.push(id);
                continue;
            }

            if !budget_ok(a, b, config.car_min_turning_radius) {
                dropped += 1;
                continue;
            }

            // Scan upward for the largest speed whose turning radius
            // still satisfies the turn budget.
            let floor = (config.car_min_turning_radius * config.car_max_g_force).sqrt();
            let mut v = floor.min(config.car_max_speed_ms);
            while v + SPEED_SCAN_STEP <= config.car_max_speed_ms
                && budget_ok(a, b, config.turning_radius(v + SPEED_SCAN_STEP))
            {
                v += SPEED_SCAN_STEP;
            }
            let max_speed = v - SPEED_SCAN_STEP;
            if max_speed < config.speed_resolution {
                dropped += 1;
                continue;
            }

            let turning_radius = config.turning_radius(max_speed);
            if !budget_ok(a, b, turning_radius) {
                dropped += 1;
                continue;
            }
            let interp = match DubinsInterpolator::new(
                a,
                b,
                turning_radius,
                config.dubins_interpolation_step,
            ) {
                Ok(interp) => interp,
                Err(_) => DubinsInterpolator::zero_length(a),
            };

            let id = edges.insert(Edge {
                from,
                to,
                max_speed,
                turning_radius,
                distance: interp.distance(),
                right_way: right_way(from) && right_way(to),
                interp,
            });
            self.poses[from].edges.push(id);
        }

        info!(
            "roadmap built: {} poses, {} edges ({} candidates pruned)",
            self.poses.len(),
            edges.len(),
            dropped
        );
        debug!("map extent {:.0}x{:.0} m", map.width, map.height);

        Ok(Roadmap {
            poses: self.poses,
            edges,
            lookup: self.lookup,
            width: map.width,
            height: map.height,
            cell_size: config.cell_size,
            angle_resolution: config.angle_resolution,
        })
    }
}
