mod loader;
mod settings;

pub use loader::{load_graph, parse_edges, parse_nodes};
pub use settings::{load_search_config, parse_search_config};
