use std::time::Instant;

use tracing::debug;

use crate::model::{CancelToken, CoreError, Query, RoadGraph, Route, RouteResult, RoutingMode};

use super::config::SearchConfig;
use super::driver::{run_search, SearchRequest};
use super::join::build_route;

/// Per-call execution knobs, independent of the search configuration.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
    pub parallel_driver: bool,
}

/// Entry point: owns the immutable graph and the mutable default search
/// configuration that new queries inherit.
pub struct RouteEngine {
    graph: RoadGraph,
    defaults: SearchConfig,
}

impl RouteEngine {
    pub fn new(graph: RoadGraph) -> Self {
        Self::with_config(graph, SearchConfig::default())
    }

    pub fn with_config(graph: RoadGraph, defaults: SearchConfig) -> Self {
        Self { graph, defaults }
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn config(&self) -> &SearchConfig {
        &self.defaults
    }

    /// Overrides the width threshold, heuristic speed and frontier
    /// threshold that subsequent queries start from.
    pub fn configure_defaults(
        &mut self,
        width_threshold: f64,
        max_speed_kmh: f64,
        frontier_threshold: u32,
    ) {
        self.defaults.width_threshold = width_threshold;
        self.defaults.max_speed_kmh = max_speed_kmh;
        self.defaults.frontier_threshold = frontier_threshold;
    }

    pub fn set_aggressive_mode(&mut self) {
        self.defaults.set_aggressive();
    }

    pub fn set_balanced_mode(&mut self) {
        self.defaults.set_balanced();
    }

    pub fn run_single_query(&self, query: &Query) -> RouteResult {
        self.run_query_with(query, &QueryOptions::default())
    }

    /// Runs the query, sweeping departure instants when an interval is
    /// set, and folds every failure into a `RouteResult`.
    pub fn run_query_with(&self, query: &Query, options: &QueryOptions) -> RouteResult {
        let mode = query.routing_mode;
        if let Err(err) = self.validate(query) {
            return RouteResult::from_error(&err, mode, query.departure_time);
        }

        let departures: Vec<f64> = if query.interval > 0.0 {
            let steps = self.graph.breakpoints().len();
            (0..=steps)
                .map(|k| query.departure_time + query.interval * k as f64)
                .collect()
        } else {
            vec![query.departure_time]
        };

        let mut best: Option<(f64, Route)> = None;
        let mut first_error: Option<CoreError> = None;
        for departure in departures {
            match self.solve(query, departure, options) {
                Ok(route) => {
                    let wins = match &best {
                        None => true,
                        Some((_, current)) => preferred(mode, &route, current),
                    };
                    if wins {
                        best = Some((departure, route));
                    }
                }
                Err(CoreError::Canceled) => {
                    return RouteResult::from_error(
                        &CoreError::Canceled,
                        mode,
                        query.departure_time,
                    );
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match best {
            Some((departure, route)) => {
                debug!(
                    "query {} -> {} done: departure={} travel_time={:.2} wideness={:.1}%",
                    query.source,
                    query.destination,
                    departure,
                    route.travel_time,
                    route.wideness_percentage
                );
                RouteResult::from_route(route, mode, departure)
            }
            None => {
                let err = first_error.unwrap_or_else(|| {
                    CoreError::Unreachable("no departure instant produced a route".to_string())
                });
                RouteResult::from_error(&err, mode, query.departure_time)
            }
        }
    }

    fn validate(&self, query: &Query) -> Result<(), CoreError> {
        let node_count = self.graph.node_count() as u32;
        if query.source >= node_count {
            return Err(CoreError::InvalidQuery(format!(
                "source {} outside [0, {node_count})",
                query.source
            )));
        }
        if query.destination >= node_count {
            return Err(CoreError::InvalidQuery(format!(
                "destination {} outside [0, {node_count})",
                query.destination
            )));
        }
        if !query.budget.is_finite() || query.budget < 0.0 {
            return Err(CoreError::InvalidQuery(format!(
                "budget {} must be a non-negative number of minutes",
                query.budget
            )));
        }
        if !query.departure_time.is_finite() {
            return Err(CoreError::InvalidQuery(
                "departure time must be finite".to_string(),
            ));
        }
        if !query.interval.is_finite() || query.interval < 0.0 {
            return Err(CoreError::InvalidQuery(format!(
                "interval {} must be a non-negative number of minutes",
                query.interval
            )));
        }
        if query.source == query.destination {
            return Err(CoreError::Unreachable(format!(
                "source and destination are both node {}",
                query.source
            )));
        }
        Ok(())
    }

    fn solve(
        &self,
        query: &Query,
        departure: f64,
        options: &QueryOptions,
    ) -> Result<Route, CoreError> {
        let req = SearchRequest {
            graph: &self.graph,
            config: &self.defaults,
            mode: query.routing_mode,
            source: query.source,
            destination: query.destination,
            departure,
            budget: query.budget,
            cancel: &options.cancel,
            deadline: options.deadline,
        };
        let outcome = run_search(&req, options.parallel_driver)?;
        build_route(&self.graph, query.routing_mode, &outcome, query.budget)
    }
}

/// Whether `candidate` strictly beats `current` under the mode's output
/// policy; ties keep the incumbent, so the earliest departure wins.
///
/// `WidenessAndTurns` departures are ranked by their primary route
/// (higher wideness, then lower travel time); the winning departure's
/// alternates ride along unchanged.
fn preferred(mode: RoutingMode, candidate: &Route, current: &Route) -> bool {
    let order = match mode {
        RoutingMode::WidenessOnly | RoutingMode::WidenessAndTurns => current
            .wideness_percentage
            .total_cmp(&candidate.wideness_percentage)
            .then_with(|| candidate.travel_time.total_cmp(&current.travel_time)),
        RoutingMode::MinTurnsOnly => candidate
            .right_turns
            .cmp(&current.right_turns)
            .then_with(|| candidate.sharp_turns.cmp(&current.sharp_turns))
            .then_with(|| candidate.travel_time.total_cmp(&current.travel_time)),
    };
    order == std::cmp::Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    // Same seeded grid as the join tests: clearways along 0-3-4-5.
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

    fn query(mode: RoutingMode) -> Query {
        Query {
            source: 0,
            destination: 5,
            departure_time: 480.0,
            interval: 0.0,
            budget: 100.0,
            routing_mode: mode,
        }
    }

    #[test]
    fn mode_presets_update_the_default_config() {
        use crate::search::config::{
            AGGRESSIVE_FRONTIER_THRESHOLD, BALANCED_FRONTIER_THRESHOLD,
        };
        let mut engine = RouteEngine::new(scenario_graph());
        engine.set_aggressive_mode();
        assert_eq!(
            engine.config().frontier_threshold,
            AGGRESSIVE_FRONTIER_THRESHOLD
        );
        engine.set_balanced_mode();
        assert_eq!(
            engine.config().frontier_threshold,
            BALANCED_FRONTIER_THRESHOLD
        );
        engine.configure_defaults(4.2, 110.0, 25);
        assert_eq!(engine.config().width_threshold, 4.2);
        assert_eq!(engine.config().max_speed_kmh, 110.0);
        assert_eq!(engine.config().frontier_threshold, 25);
    }

    #[test]
    fn out_of_range_destination_is_an_invalid_query() {
        let engine = RouteEngine::new(scenario_graph());
        let result = engine.run_single_query(&Query {
            destination: 99,
            ..query(RoutingMode::WidenessOnly)
        });
        assert!(!result.success);
        let message = result.error_message.expect("message present");
        assert!(message.contains("invalid query"), "{message}");
    }

    #[test]
    fn source_equals_destination_is_unreachable() {
        let engine = RouteEngine::new(scenario_graph());
        let result = engine.run_single_query(&Query {
            source: 3,
            destination: 3,
            ..query(RoutingMode::WidenessOnly)
        });
        assert!(!result.success);
        let message = result.error_message.expect("message present");
        assert!(message.contains("both node 3"), "{message}");
    }

    #[test]
    fn repeated_queries_are_deterministic() {
        let engine = RouteEngine::new(scenario_graph());
        let first = engine.run_single_query(&query(RoutingMode::WidenessAndTurns));
        let second = engine.run_single_query(&query(RoutingMode::WidenessAndTurns));
        assert!(first.success);
        assert_eq!(first.path_nodes, second.path_nodes);
        assert_eq!(first.wideness_percentage, second.wideness_percentage);
        assert_eq!(first.alternates.len(), second.alternates.len());
    }

    #[test]
    fn parallel_driver_matches_sequential_output() {
        let engine = RouteEngine::new(scenario_graph());
        let sequential = engine.run_single_query(&query(RoutingMode::WidenessOnly));
        let parallel = engine.run_query_with(
            &query(RoutingMode::WidenessOnly),
            &QueryOptions {
                parallel_driver: true,
                ..QueryOptions::default()
            },
        );
        assert!(sequential.success && parallel.success);
        assert_eq!(sequential.path_nodes, parallel.path_nodes);
        assert_eq!(sequential.wideness_percentage, parallel.wideness_percentage);
    }

    #[test]
    fn result_metrics_are_internally_consistent() {
        let engine = RouteEngine::new(scenario_graph());
        let result = engine.run_single_query(&query(RoutingMode::WidenessOnly));
        assert!(result.success);
        assert_eq!(result.wide_edge_count, result.wide_edge_indices.len());
        let wide_sum: f64 = result
            .wide_edge_indices
            .iter()
            .map(|edge| engine.graph().edge(*edge).distance)
            .sum();
        let expected = 100.0 * wide_sum / result.total_distance;
        assert!((result.wideness_percentage - expected).abs() < 1e-6);
        assert_eq!(result.optimal_departure_time, 480.0);
    }

    #[test]
    fn departure_sweep_reports_the_best_instant() {
        // One road whose travel time falls steeply across the morning
        // rush: leaving later is much faster. The budget is kept tight so
        // the backward seed cannot slide the whole departure window
        // forward on its own.
        let nodes = (0..2)
            .map(|id| Node {
                id,
                lat: 0.0,
                lon: 0.001 * f64::from(id),
                cluster: None,
            })
            .collect();
        let edges = vec![
            Edge {
                id: 0,
                from: 0,
                to: 1,
                distance: 111.0,
                travel_times: vec![30.0, 5.0],
                base_width: 3.5,
                rush_width: 3.5,
            },
            Edge {
                id: 1,
                from: 1,
                to: 0,
                distance: 111.0,
                travel_times: vec![30.0, 5.0],
                base_width: 3.5,
                rush_width: 3.5,
            },
        ];
        let graph = RoadGraph::new(nodes, edges, vec![480.0, 540.0]).expect("valid graph");
        let engine = RouteEngine::new(graph);

        let fixed = engine.run_single_query(&Query {
            source: 0,
            destination: 1,
            departure_time: 480.0,
            interval: 0.0,
            budget: 32.0,
            routing_mode: RoutingMode::WidenessOnly,
        });
        let swept = engine.run_single_query(&Query {
            source: 0,
            destination: 1,
            departure_time: 480.0,
            interval: 10.0,
            budget: 32.0,
            routing_mode: RoutingMode::WidenessOnly,
        });
        assert!(fixed.success && swept.success);
        assert_eq!(fixed.optimal_departure_time, 480.0);
        assert!(fixed.travel_time > 28.0 && fixed.travel_time < 30.0);
        // Two breakpoints allow k = 0..=2; the latest instant is fastest.
        assert_eq!(swept.optimal_departure_time, 500.0);
        assert!(swept.travel_time < fixed.travel_time);
    }

    #[test]
    fn pareto_sweep_ranks_departures_by_primary_wideness() {
        // Departing before the rush window leaves every clearway at base
        // width; the sweep reaches 420, where the top path turns fully
        // wide. The tight budget rules out waiting at meeting nodes.
        let engine = RouteEngine::new(scenario_graph());
        let swept = engine.run_single_query(&Query {
            source: 0,
            destination: 5,
            departure_time: 400.0,
            interval: 10.0,
            budget: 6.0,
            routing_mode: RoutingMode::WidenessAndTurns,
        });
        assert!(swept.success);
        assert_eq!(swept.optimal_departure_time, 420.0);
        assert_eq!(swept.path_nodes, vec![0, 3, 4, 5]);
        assert!((swept.wideness_percentage - 100.0).abs() < 1e-6);
        // The winning departure carries its full Pareto set.
        assert!(!swept.alternates.is_empty());
        assert!(swept
            .alternates
            .iter()
            .any(|alternate| alternate.right_turns == 0));
    }

    #[test]
    fn deadline_in_the_past_cancels_the_query() {
        let engine = RouteEngine::new(scenario_graph());
        let result = engine.run_query_with(
            &query(RoutingMode::WidenessOnly),
            &QueryOptions {
                deadline: Some(Instant::now()),
                ..QueryOptions::default()
            },
        );
        assert!(!result.success);
        let message = result.error_message.expect("message present");
        assert!(message.contains("canceled"), "{message}");
    }
}
