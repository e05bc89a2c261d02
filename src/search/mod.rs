mod config;
mod driver;
mod facade;
mod frontier;
mod heuristic;
mod join;
mod label;
mod label_set;

/// Slack applied to budget and time-consistency comparisons so that a
/// path exactly at the budget stays admissible under float summation.
pub(crate) const COST_EPS: f64 = 1e-9;

pub use config::{
    SearchConfig, AGGRESSIVE_FRONTIER_THRESHOLD, BALANCED_FRONTIER_THRESHOLD,
};
pub use driver::{run_search, SearchOutcome, SearchRequest};
pub use facade::{QueryOptions, RouteEngine};
pub use frontier::FrontierQueue;
pub use heuristic::{haversine_meters, RemainingTimeBound};
pub use join::build_route;
pub use label::{Direction, Label, LabelArena};
pub use label_set::LabelStore;
