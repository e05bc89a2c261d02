use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::model::{Edge, Node, RoadGraph};

/// Loads a graph from the `nodes_<N>.txt` / `edges_<N>.txt` pair.
///
/// Node lines are `<id> <latitude> <longitude> <cluster_id>` with ids
/// contiguous after renumbering. The edge file starts with the
/// arrival-time breakpoints (comma-separated minutes), then the
/// width-time breakpoints (a placeholder of equal cardinality), then one
/// `<src> <dst> <costs_csv> <base_width> <rush_width> <distance>` line
/// per edge.
pub fn load_graph(nodes_path: &Path, edges_path: &Path) -> Result<RoadGraph> {
    let nodes_text = fs::read_to_string(nodes_path)
        .with_context(|| format!("failed to read node file {}", nodes_path.display()))?;
    let edges_text = fs::read_to_string(edges_path)
        .with_context(|| format!("failed to read edge file {}", edges_path.display()))?;

    let nodes = parse_nodes(&nodes_text)?;
    let (breakpoints, edges) = parse_edges(&edges_text)?;
    let graph = RoadGraph::new(nodes, edges, breakpoints)?;
    if let Some((edge, segment)) = graph.fifo_violation() {
        warn!(
            "edge {} violates FIFO in segment {}; time-dependent queries on it will fail",
            edge, segment
        );
    }
    Ok(graph)
}

pub fn parse_nodes(text: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            bail!(
                "node line {}: expected 4 fields, found {}",
                line_no + 1,
                fields.len()
            );
        }
        let id: u32 = fields[0]
            .parse()
            .with_context(|| format!("node line {}: bad id {:?}", line_no + 1, fields[0]))?;
        let lat: f64 = fields[1]
            .parse()
            .with_context(|| format!("node line {}: bad latitude", line_no + 1))?;
        let lon: f64 = fields[2]
            .parse()
            .with_context(|| format!("node line {}: bad longitude", line_no + 1))?;
        let cluster: i64 = fields[3]
            .parse()
            .with_context(|| format!("node line {}: bad cluster id", line_no + 1))?;
        nodes.push(Node {
            id,
            lat,
            lon,
            cluster: u32::try_from(cluster).ok(),
        });
    }
    nodes.sort_by_key(|node| node.id);
    Ok(nodes)
}

fn parse_minute_list(text: &str, what: &str) -> Result<Vec<f64>> {
    text.split(',')
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .with_context(|| format!("bad {what} value {:?}", field.trim()))
        })
        .collect()
}

pub fn parse_edges(text: &str) -> Result<(Vec<f64>, Vec<Edge>)> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, breakpoint_line) = lines
        .next()
        .context("edge file is missing the arrival-time breakpoint line")?;
    let breakpoints = parse_minute_list(breakpoint_line.trim(), "arrival-time breakpoint")?;

    let (_, width_line) = lines
        .next()
        .context("edge file is missing the width-time breakpoint line")?;
    let width_breakpoints = parse_minute_list(width_line.trim(), "width-time breakpoint")?;
    if width_breakpoints.len() != breakpoints.len() {
        bail!(
            "width-time breakpoints ({}) do not match arrival-time breakpoints ({})",
            width_breakpoints.len(),
            breakpoints.len()
        );
    }

    let mut edges = Vec::new();
    for (line_no, raw) in lines {
        let fields: Vec<&str> = raw.trim().split_whitespace().collect();
        if fields.len() != 6 {
            bail!(
                "edge line {}: expected 6 fields, found {}",
                line_no + 1,
                fields.len()
            );
        }
        let from: u32 = fields[0]
            .parse()
            .with_context(|| format!("edge line {}: bad source", line_no + 1))?;
        let to: u32 = fields[1]
            .parse()
            .with_context(|| format!("edge line {}: bad destination", line_no + 1))?;
        let travel_times = parse_minute_list(fields[2], "travel-time sample")
            .with_context(|| format!("edge line {}", line_no + 1))?;
        if travel_times.len() != breakpoints.len() {
            bail!(
                "edge line {}: {} travel-time samples for {} breakpoints",
                line_no + 1,
                travel_times.len(),
                breakpoints.len()
            );
        }
        let base_width: f64 = fields[3]
            .parse()
            .with_context(|| format!("edge line {}: bad base width", line_no + 1))?;
        let rush_width: f64 = fields[4]
            .parse()
            .with_context(|| format!("edge line {}: bad rush width", line_no + 1))?;
        let distance: f64 = fields[5]
            .parse()
            .with_context(|| format!("edge line {}: bad distance", line_no + 1))?;
        edges.push(Edge {
            id: edges.len() as u32,
            from,
            to,
            distance,
            travel_times,
            base_width,
            rush_width,
        });
    }

    Ok((breakpoints, edges))
}
