use super::graph::RoadGraph;

/// Maneuver class for a traversal `(edge_in, edge_out)` through their
/// shared node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Straight,
    Right,
    Sharp,
    Uturn,
}

/// Heading vector of an edge under a local equirectangular projection,
/// x east / y north. Not normalized; callers only need its direction.
fn heading(graph: &RoadGraph, edge_id: u32) -> (f64, f64) {
    let edge = graph.edge(edge_id);
    let tail = graph.node(edge.from);
    let head = graph.node(edge.to);
    let mean_lat = ((tail.lat + head.lat) * 0.5).to_radians();
    let dx = (head.lon - tail.lon) * mean_lat.cos();
    let dy = head.lat - tail.lat;
    (dx, dy)
}

/// Signed angle in degrees from `edge_in`'s heading to `edge_out`'s,
/// clockwise positive, in (-180, 180].
pub fn turn_angle(graph: &RoadGraph, edge_in: u32, edge_out: u32) -> f64 {
    let (ax, ay) = heading(graph, edge_in);
    let (bx, by) = heading(graph, edge_out);
    let cross = ax * by - ay * bx;
    let dot = ax * bx + ay * by;
    -cross.atan2(dot).to_degrees()
}

/// Classifies the maneuver between two consecutive edges.
///
/// Structural reversal (the outgoing edge returns to the incoming edge's
/// tail) is a U-turn. Otherwise: clockwise angle in [45, 135) is a right
/// turn, magnitude >= 135 on either side is sharp, the rest is straight.
pub fn classify_turn(graph: &RoadGraph, edge_in: u32, edge_out: u32) -> TurnKind {
    if graph.edge(edge_out).to == graph.edge(edge_in).from {
        return TurnKind::Uturn;
    }
    let angle = turn_angle(graph, edge_in, edge_out);
    if (45.0..135.0).contains(&angle) {
        TurnKind::Right
    } else if angle.abs() >= 135.0 {
        TurnKind::Sharp
    } else {
        TurnKind::Straight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{Edge, Node};

    fn star_graph() -> RoadGraph {
        // Node 0 at the origin; spokes toward the compass points plus a
        // 150-degree-clockwise-from-north direction, all via node 0.
        let coords = [
            (0.0, 0.0),            // 0 center
            (-0.001, 0.0),         // 1 south of center
            (0.001, 0.0),          // 2 north of center
            (0.0, 0.001),          // 3 east of center
            (-0.000_866, 0.000_5), // 4: 150 deg clockwise from north
        ];
        let nodes = coords
            .iter()
            .enumerate()
            .map(|(id, (lat, lon))| Node {
                id: id as u32,
                lat: *lat,
                lon: *lon,
                cluster: None,
            })
            .collect();
        // Edge 0: 1 -> 0 heading north (the incoming edge for all cases).
        let pairs = [(1, 0), (0, 2), (0, 3), (0, 1), (0, 4)];
        let edges = pairs
            .iter()
            .enumerate()
            .map(|(id, (from, to))| Edge {
                id: id as u32,
                from: *from,
                to: *to,
                distance: 100.0,
                travel_times: vec![1.0, 1.0],
                base_width: 3.5,
                rush_width: 3.5,
            })
            .collect();
        RoadGraph::new(nodes, edges, vec![0.0, 1440.0]).expect("valid graph")
    }

    #[test]
    fn straight_ahead_is_straight() {
        let graph = star_graph();
        assert_eq!(classify_turn(&graph, 0, 1), TurnKind::Straight);
        assert!(turn_angle(&graph, 0, 1).abs() < 1.0);
    }

    #[test]
    fn east_after_north_is_right() {
        let graph = star_graph();
        let angle = turn_angle(&graph, 0, 2);
        assert!((angle - 90.0).abs() < 1.0, "angle {angle}");
        assert_eq!(classify_turn(&graph, 0, 2), TurnKind::Right);
    }

    #[test]
    fn reversal_is_uturn() {
        let graph = star_graph();
        assert_eq!(classify_turn(&graph, 0, 3), TurnKind::Uturn);
    }

    #[test]
    fn steep_clockwise_is_sharp() {
        let graph = star_graph();
        let angle = turn_angle(&graph, 0, 4);
        assert!((angle - 150.0).abs() < 2.0, "angle {angle}");
        assert_eq!(classify_turn(&graph, 0, 4), TurnKind::Sharp);
    }
}
