use crate::model::{Node, RoadGraph};

use super::config::SearchConfig;
use super::label::Direction;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_meters(a: &Node, b: &Node) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat * 0.5).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Admissible lower bound on remaining travel time: straight-line distance
/// to the relevant endpoint divided by the configured maximum speed.
pub struct RemainingTimeBound<'a> {
    graph: &'a RoadGraph,
    source: u32,
    destination: u32,
    speed_m_per_min: f64,
}

impl<'a> RemainingTimeBound<'a> {
    pub fn new(graph: &'a RoadGraph, config: &SearchConfig, source: u32, destination: u32) -> Self {
        Self {
            graph,
            source,
            destination,
            speed_m_per_min: config.max_speed_m_per_min().max(1.0),
        }
    }

    /// Minutes still needed, at best, to complete a path through `node`
    /// in the given direction.
    pub fn bound(&self, node: u32, direction: Direction) -> f64 {
        let target = match direction {
            Direction::Forward => self.destination,
            Direction::Backward => self.source,
        };
        haversine_meters(self.graph.node(node), self.graph.node(target)) / self.speed_m_per_min
    }
}
