use rayon::prelude::*;
use tracing::debug;

use crate::model::{
    classify_turn, AlternateRoute, CoreError, RoadGraph, Route, RoutingMode, TurnKind,
};

use super::driver::SearchOutcome;
use super::label_set::LabelStore;
use super::COST_EPS;

/// One admissible `(forward, backward)` pairing at a meeting node.
#[derive(Debug, Clone)]
struct JoinCandidate {
    node: u32,
    forward: u32,
    backward: u32,
    total_cost: f64,
    wideness_sum: f64,
    distance_sum: f64,
    right_turns: u32,
    sharp_turns: u32,
    wideness_percentage: f64,
}

/// Cartesian-combines the survivors of both directions at one meeting
/// node, applying time consistency, the budget, and the seam turn.
fn candidates_at(
    graph: &RoadGraph,
    outcome: &SearchOutcome,
    budget: f64,
    node: u32,
) -> Vec<JoinCandidate> {
    let mut out = Vec::new();
    for &f_idx in outcome.forward.survivors(node) {
        let fwd = outcome.forward.label(f_idx);
        for &b_idx in outcome.backward.survivors(node) {
            let bwd = outcome.backward.label(b_idx);
            if fwd.time > bwd.time + COST_EPS {
                continue;
            }
            let total_cost = fwd.elapsed_cost + bwd.elapsed_cost;
            if total_cost > budget + COST_EPS {
                continue;
            }

            let mut right_turns = fwd.right_turns + bwd.right_turns;
            let mut sharp_turns = fwd.sharp_turns + bwd.sharp_turns;
            // The backward label's last edge is the first edge the full
            // path takes after the meeting node.
            if let (Some(edge_in), Some(edge_out)) = (fwd.last_edge, bwd.last_edge) {
                match classify_turn(graph, edge_in, edge_out) {
                    TurnKind::Uturn => continue,
                    TurnKind::Right => right_turns += 1,
                    TurnKind::Sharp => sharp_turns += 1,
                    TurnKind::Straight => {}
                }
            }

            let distance_sum = fwd.distance_sum + bwd.distance_sum;
            if distance_sum <= 0.0 {
                continue;
            }
            let wideness_sum = fwd.wideness_sum + bwd.wideness_sum;
            out.push(JoinCandidate {
                node,
                forward: f_idx,
                backward: b_idx,
                total_cost,
                wideness_sum,
                distance_sum,
                right_turns,
                sharp_turns,
                wideness_percentage: 100.0 * wideness_sum / distance_sum,
            });
        }
    }
    out
}

/// Node sequence and wide-edge ids of the full path behind a candidate.
/// Wide flags come from `wideness_sum` deltas along the predecessor
/// chains, so they always agree with the accumulated totals.
fn reconstruct(
    forward: &LabelStore,
    backward: &LabelStore,
    candidate: &JoinCandidate,
) -> (Vec<u32>, Vec<u32>) {
    let mut path_nodes = Vec::new();
    let mut wide_edges = Vec::new();

    let mut fwd_chain = forward.arena().chain(candidate.forward);
    fwd_chain.reverse();
    for idx in &fwd_chain {
        path_nodes.push(forward.label(*idx).node);
    }
    for pair in fwd_chain.windows(2) {
        let parent = forward.label(pair[0]);
        let child = forward.label(pair[1]);
        if let Some(edge) = child.last_edge {
            if child.wideness_sum > parent.wideness_sum + COST_EPS {
                wide_edges.push(edge);
            }
        }
    }

    let bwd_chain = backward.arena().chain(candidate.backward);
    for pair in bwd_chain.windows(2) {
        let child = backward.label(pair[0]);
        let parent = backward.label(pair[1]);
        path_nodes.push(parent.node);
        if let Some(edge) = child.last_edge {
            if child.wideness_sum > parent.wideness_sum + COST_EPS {
                wide_edges.push(edge);
            }
        }
    }

    (path_nodes, wide_edges)
}

fn route_from(
    forward: &LabelStore,
    backward: &LabelStore,
    candidate: &JoinCandidate,
) -> Route {
    let (path_nodes, wide_edge_indices) = reconstruct(forward, backward, candidate);
    Route {
        path_nodes,
        wide_edge_indices,
        travel_time: candidate.total_cost,
        total_distance: candidate.distance_sum,
        wideness_percentage: candidate.wideness_percentage,
        right_turns: candidate.right_turns,
        sharp_turns: candidate.sharp_turns,
        alternates: Vec::new(),
    }
}

/// Deterministic tie-break shared by every output policy.
fn identity_order(a: &JoinCandidate, b: &JoinCandidate) -> std::cmp::Ordering {
    a.node
        .cmp(&b.node)
        .then_with(|| a.forward.cmp(&b.forward))
        .then_with(|| a.backward.cmp(&b.backward))
}

fn wideness_order(a: &JoinCandidate, b: &JoinCandidate) -> std::cmp::Ordering {
    b.wideness_percentage
        .total_cmp(&a.wideness_percentage)
        .then_with(|| a.total_cost.total_cmp(&b.total_cost))
        .then_with(|| identity_order(a, b))
}

fn turns_order(a: &JoinCandidate, b: &JoinCandidate) -> std::cmp::Ordering {
    a.right_turns
        .cmp(&b.right_turns)
        .then_with(|| a.sharp_turns.cmp(&b.sharp_turns))
        .then_with(|| a.total_cost.total_cmp(&b.total_cost))
        .then_with(|| identity_order(a, b))
}

/// Strict dominance over `(wideness_percentage up, right_turns down)`.
fn pareto_dominates(a: &JoinCandidate, b: &JoinCandidate) -> bool {
    a.wideness_percentage >= b.wideness_percentage
        && a.right_turns <= b.right_turns
        && (a.wideness_percentage > b.wideness_percentage || a.right_turns < b.right_turns)
}

/// Joins the quiesced search state into the mode's output: the single
/// best route, or the primary plus the rest of the Pareto frontier.
pub fn build_route(
    graph: &RoadGraph,
    mode: RoutingMode,
    outcome: &SearchOutcome,
    budget: f64,
) -> Result<Route, CoreError> {
    let per_meeting: Vec<Vec<JoinCandidate>> = outcome
        .meetings
        .par_iter()
        .map(|node| candidates_at(graph, outcome, budget, *node))
        .collect();
    let mut candidates: Vec<JoinCandidate> = per_meeting.into_iter().flatten().collect();
    if candidates.is_empty() {
        return Err(CoreError::Unreachable(
            "fronts met but no time-consistent join fits the budget".to_string(),
        ));
    }
    debug!(
        "join: {} candidates across {} meeting nodes",
        candidates.len(),
        outcome.meetings.len()
    );

    match mode {
        RoutingMode::WidenessOnly => {
            candidates.sort_by(wideness_order);
            Ok(route_from(&outcome.forward, &outcome.backward, &candidates[0]))
        }
        RoutingMode::MinTurnsOnly => {
            candidates.sort_by(turns_order);
            Ok(route_from(&outcome.forward, &outcome.backward, &candidates[0]))
        }
        RoutingMode::WidenessAndTurns => {
            let mut survivors: Vec<JoinCandidate> = candidates
                .iter()
                .filter(|candidate| {
                    !candidates
                        .iter()
                        .any(|other| pareto_dominates(other, candidate))
                })
                .cloned()
                .collect();
            survivors.sort_by(wideness_order);

            let mut routes: Vec<Route> = Vec::new();
            for candidate in &survivors {
                let route = route_from(&outcome.forward, &outcome.backward, candidate);
                // The same full path shows up once per meeting node it
                // crosses; keep the first build.
                if routes.iter().any(|seen| seen.path_nodes == route.path_nodes) {
                    continue;
                }
                routes.push(route);
            }

            let mut primary = routes.remove(0);
            primary.alternates = routes
                .into_iter()
                .map(|route| AlternateRoute {
                    path_nodes: route.path_nodes,
                    wideness_percentage: route.wideness_percentage,
                    right_turns: route.right_turns,
                    distance: route.total_distance,
                })
                .collect();
            Ok(primary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CancelToken, Edge, Node};
    use crate::search::config::SearchConfig;
    use crate::search::driver::{run_search, SearchRequest};

    // The seed scenario grid:
    //   3 - 4 - 5
    //   |   |   |
    //   0 - 1 - 2
    // Uniform base width 3.5; the edges 0-3, 3-4 and 4-5 widen to 4.5 at
    // rush, so the top path is fully wide for a morning departure but
    // costs one right turn; the bottom path is narrow and turn-free.
    fn scenario_graph() -> RoadGraph {
        let mut nodes = Vec::new();
        for row in 0..2u32 {
            for col in 0..3u32 {
                nodes.push(Node {
                    id: row * 3 + col,
                    lat: 0.001 * f64::from(row),
                    lon: 0.001 * f64::from(col),
                    cluster: None,
                });
            }
        }
        let links = [(0, 1), (1, 2), (3, 4), (4, 5), (0, 3), (1, 4), (2, 5)];
        let clearways = [(3, 4), (4, 5), (0, 3)];
        let mut edges = Vec::new();
        for (a, b) in links {
            let rush_width = if clearways.contains(&(a, b)) { 4.5 } else { 3.5 };
            for (from, to) in [(a, b), (b, a)] {
                edges.push(Edge {
                    id: edges.len() as u32,
                    from,
                    to,
                    distance: 111.0,
                    travel_times: vec![2.0, 2.0],
                    base_width: 3.5,
                    rush_width,
                });
            }
        }
        RoadGraph::new(nodes, edges, vec![0.0, 1440.0]).expect("valid graph")
    }

    fn solve(mode: RoutingMode, budget: f64) -> Result<Route, CoreError> {
        let graph = scenario_graph();
        let config = SearchConfig::default();
        let cancel = CancelToken::new();
        let req = SearchRequest {
            graph: &graph,
            config: &config,
            mode,
            source: 0,
            destination: 5,
            departure: 480.0,
            budget,
            cancel: &cancel,
            deadline: None,
        };
        let outcome = run_search(&req, false)?;
        build_route(&graph, mode, &outcome, budget)
    }

    #[test]
    fn wideness_mode_prefers_the_clearway_path() {
        let route = solve(RoutingMode::WidenessOnly, 100.0).expect("route exists");
        assert_eq!(route.path_nodes, vec![0, 3, 4, 5]);
        assert!((route.wideness_percentage - 100.0).abs() < 1e-6);
        assert_eq!(route.wide_edge_indices.len(), 3);
        assert!((route.total_distance - 333.0).abs() < 1e-6);
        assert!((route.travel_time - 6.0).abs() < 1e-9);
    }

    #[test]
    fn min_turns_mode_prefers_the_straight_path() {
        let route = solve(RoutingMode::MinTurnsOnly, 100.0).expect("route exists");
        assert_eq!(route.path_nodes, vec![0, 1, 2, 5]);
        assert_eq!(route.right_turns, 0);
        assert_eq!(route.sharp_turns, 0);
    }

    #[test]
    fn pareto_mode_returns_non_dominated_alternates() {
        let route = solve(RoutingMode::WidenessAndTurns, 100.0).expect("route exists");
        // Primary maximizes wideness; at least one turn-free alternate.
        assert_eq!(route.path_nodes, vec![0, 3, 4, 5]);
        assert!((route.wideness_percentage - 100.0).abs() < 1e-6);
        assert!(!route.alternates.is_empty());
        assert!(route
            .alternates
            .iter()
            .any(|alternate| alternate.right_turns == 0));
        // No alternate dominates another, the primary included.
        let mut points: Vec<(f64, u32)> = vec![(route.wideness_percentage, route.right_turns)];
        points.extend(
            route
                .alternates
                .iter()
                .map(|alternate| (alternate.wideness_percentage, alternate.right_turns)),
        );
        for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate() {
                if i == j {
                    continue;
                }
                let dominates =
                    a.0 >= b.0 && a.1 <= b.1 && (a.0 > b.0 || a.1 < b.1);
                assert!(!dominates, "{a:?} dominates {b:?}");
            }
        }
    }

    #[test]
    fn budget_equal_to_fastest_time_admits_exactly_the_fastest_path() {
        let route = solve(RoutingMode::WidenessAndTurns, 6.0).expect("route exists");
        assert!((route.travel_time - 6.0).abs() < 1e-9);
        for alternate in &route.alternates {
            assert_eq!(alternate.path_nodes.len(), 4);
        }
    }

    #[test]
    fn reconstructed_distance_matches_edge_sum() {
        let graph = scenario_graph();
        let route = solve(RoutingMode::WidenessOnly, 100.0).expect("route exists");
        let mut summed = 0.0;
        for pair in route.path_nodes.windows(2) {
            let edge_id = graph
                .neighbors_out(pair[0])
                .iter()
                .copied()
                .find(|edge| graph.edge(*edge).to == pair[1])
                .expect("consecutive path nodes are adjacent");
            let edge = graph.edge(edge_id);
            assert!(edge.distance > 0.0);
            summed += edge.distance;
        }
        assert!((summed - route.total_distance).abs() < 1e-6);
    }
}
