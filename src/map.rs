//! Map collaborator contract.
//!
//! The planner does not parse OSM itself; an external collaborator hands
//! over the geometric road network in this form. The origin is the
//! upper-left corner and all units are metres.

use crate::error::{Error, Result};
use crate::math::{distance, Point2d};
use serde::{Deserialize, Serialize};

/// A straight piece of a road centre-line.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Segment {
    /// Centre-line endpoints.
    pub p1: Point2d,
    pub p2: Point2d,
    /// Endpoints pulled back from intersections, where the lane poses lie.
    pub p1_offset: Point2d,
    pub p2_offset: Point2d,
    /// Direction of the segment in radians.
    pub angle: f64,
}

impl Segment {
    /// Builds a segment whose offset endpoints coincide with the
    /// geometric endpoints.
    pub fn from_ends(p1: Point2d, p2: Point2d) -> Self {
        let angle = (p2.y - p1.y).atan2(p2.x - p1.x);
        Self {
            p1,
            p2,
            p1_offset: p1,
            p2_offset: p2,
            angle,
        }
    }
}

/// A road: one or more consecutive segments carrying `num_lanes` lanes
/// spread over `width` metres.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Road {
    pub width: f64,
    pub num_lanes: u32,
    pub segments: Vec<Segment>,
}

/// A junction between road segments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intersection {
    pub centre: Point2d,
    pub radius: f64,
    /// Incident `(road index, segment index)` pairs.
    pub road_segments: Vec<(usize, usize)>,
}

/// The geometric road network of one city map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CityMap {
    pub roads: Vec<Road>,
    pub intersections: Vec<Intersection>,
    pub width: f64,
    pub height: f64,
}

impl CityMap {
    /// Parses a map from its JSON form.
    pub fn from_json(data: &str) -> Result<Self> {
        let map: CityMap =
            serde_json::from_str(data).map_err(|e| Error::MapInvalid(e.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    /// Loads a map from an lz4-compressed BSON snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let raw = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| Error::Snapshot(e.to_string()))?;
        let map: CityMap = bson::from_slice(&raw).map_err(|e| Error::Snapshot(e.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    /// Checks the collaborator data before the planner touches it.
    /// Any inconsistency is fatal at load time.
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::MapInvalid("map dimensions must be positive".into()));
        }
        if self.roads.is_empty() {
            return Err(Error::MapInvalid("map has no roads".into()));
        }
        for (i, road) in self.roads.iter().enumerate() {
            if road.width <= 0.0 {
                return Err(Error::MapInvalid(format!("road {i} has non-positive width")));
            }
            if road.num_lanes == 0 {
                return Err(Error::MapInvalid(format!("road {i} has no lanes")));
            }
            if road.segments.is_empty() {
                return Err(Error::MapInvalid(format!("road {i} has no segments")));
            }
            for (j, seg) in road.segments.iter().enumerate() {
                if distance(seg.p1, seg.p2) == 0.0 {
                    return Err(Error::MapInvalid(format!(
                        "road {i} segment {j} has zero length"
                    )));
                }
            }
        }
        for (i, inter) in self.intersections.iter().enumerate() {
            for &(road, segment) in &inter.road_segments {
                let ok = self
                    .roads
                    .get(road)
                    .is_some_and(|r| segment < r.segments.len());
                if !ok {
                    return Err(Error::MapInvalid(format!(
                        "intersection {i} references missing segment ({road}, {segment})"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn one_road_map() -> CityMap {
        CityMap {
            roads: vec![Road {
                width: 7.0,
                num_lanes: 2,
                segments: vec![Segment::from_ends(
                    Point2d::new(0.0, 50.0),
                    Point2d::new(200.0, 50.0),
                )],
            }],
            intersections: vec![],
            width: 200.0,
            height: 100.0,
        }
    }

    #[test]
    fn valid_map_passes() {
        one_road_map().validate().unwrap();
    }

    #[test]
    fn dangling_intersection_is_fatal() {
        let mut map = one_road_map();
        map.intersections.push(Intersection {
            centre: Point2d::new(0.0, 0.0),
            radius: 5.0,
            road_segments: vec![(0, 3)],
        });
        assert!(matches!(map.validate(), Err(Error::MapInvalid(_))));
    }

    #[test]
    fn json_round_trip() {
        let map = one_road_map();
        let json = serde_json::to_string(&map).unwrap();
        let back = CityMap::from_json(&json).unwrap();
        assert_eq!(back.roads.len(), 1);
        assert_eq!(back.roads[0].num_lanes, 2);
    }
}
