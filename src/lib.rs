//! FlexiRoute: a bidirectional, label-setting, time-dependent,
//! multi-objective route engine for road networks. Given an origin, a
//! destination, a departure window and a travel-time budget, it returns
//! either the single best path for the chosen quality objective
//! (preferred-road coverage or turn count) or the full Pareto frontier
//! between the two.

pub mod io;
pub mod model;
pub mod search;

pub use model::{
    AlternateRoute, CancelToken, CoreError, Query, RoadGraph, Route, RouteResult, RoutingMode,
};
pub use search::{QueryOptions, RouteEngine, SearchConfig};
