use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Objective selection for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoutingMode {
    /// Maximize preferred-road coverage under the budget.
    WidenessOnly,
    /// Minimize right turns, then sharp turns, under the budget.
    MinTurnsOnly,
    /// Full Pareto frontier between wideness and right turns.
    WidenessAndTurns,
}

/// One routing request. Times are minutes from midnight, the budget is
/// travel-time minutes.
#[derive(Debug, Clone)]
pub struct Query {
    pub source: u32,
    pub destination: u32,
    pub departure_time: f64,
    /// When positive, the engine sweeps departures spaced this many
    /// minutes apart and reports the winning instant.
    pub interval: f64,
    pub budget: f64,
    pub routing_mode: RoutingMode,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),
    #[error("query canceled")]
    Canceled,
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// Cooperative cancellation flag, observed between expansions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A non-primary Pareto candidate attached to a `WidenessAndTurns` result.
#[derive(Debug, Clone, Serialize)]
pub struct AlternateRoute {
    pub path_nodes: Vec<u32>,
    pub wideness_percentage: f64,
    pub right_turns: u32,
    pub distance: f64,
}

/// A fully joined route, before query metadata is attached.
#[derive(Debug, Clone)]
pub struct Route {
    pub path_nodes: Vec<u32>,
    pub wide_edge_indices: Vec<u32>,
    pub travel_time: f64,
    pub total_distance: f64,
    pub wideness_percentage: f64,
    pub right_turns: u32,
    pub sharp_turns: u32,
    pub alternates: Vec<AlternateRoute>,
}

/// Query outcome as handed back to callers. Failures carry a message and
/// leave the metric fields zeroed.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub path_nodes: Vec<u32>,
    pub wide_edge_indices: Vec<u32>,
    pub travel_time: f64,
    pub total_distance: f64,
    pub wideness_percentage: f64,
    pub wide_edge_count: usize,
    pub right_turns: u32,
    pub sharp_turns: u32,
    pub optimal_departure_time: f64,
    pub routing_mode: RoutingMode,
    pub alternates: Vec<AlternateRoute>,
}

impl RouteResult {
    pub fn from_route(route: Route, mode: RoutingMode, departure: f64) -> Self {
        Self {
            success: true,
            error_message: None,
            wide_edge_count: route.wide_edge_indices.len(),
            path_nodes: route.path_nodes,
            wide_edge_indices: route.wide_edge_indices,
            travel_time: route.travel_time,
            total_distance: route.total_distance,
            wideness_percentage: route.wideness_percentage,
            right_turns: route.right_turns,
            sharp_turns: route.sharp_turns,
            optimal_departure_time: departure,
            routing_mode: mode,
            alternates: route.alternates,
        }
    }

    pub fn from_error(error: &CoreError, mode: RoutingMode, departure: f64) -> Self {
        Self {
            success: false,
            error_message: Some(error.to_string()),
            path_nodes: Vec::new(),
            wide_edge_indices: Vec::new(),
            travel_time: 0.0,
            total_distance: 0.0,
            wideness_percentage: 0.0,
            wide_edge_count: 0,
            right_turns: 0,
            sharp_turns: 0,
            optimal_departure_time: departure,
            routing_mode: mode,
            alternates: Vec::new(),
        }
    }
}
