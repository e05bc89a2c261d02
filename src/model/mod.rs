mod graph;
mod query;
mod turn;

pub use graph::{Edge, Node, RoadGraph};
pub use query::{
    AlternateRoute, CancelToken, CoreError, Query, Route, RouteResult, RoutingMode,
};
pub use turn::{classify_turn, turn_angle, TurnKind};
