use anyhow::{bail, Result};

/// Immutable road-network node. Ids are dense in `[0, N)` after load.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u32,
    pub lat: f64,
    pub lon: f64,
    pub cluster: Option<u32>,
}

/// Directed arc with a per-breakpoint travel-time profile.
///
/// `travel_times` is sampled on the breakpoint grid owned by the graph;
/// widths are meters, `distance` is meters, times are minutes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: u32,
    pub from: u32,
    pub to: u32,
    pub distance: f64,
    pub travel_times: Vec<f64>,
    pub base_width: f64,
    pub rush_width: f64,
}

/// Read-only graph and time-profile store.
#[derive(Debug, Clone)]
pub struct RoadGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    breakpoints: Vec<f64>,
    out_edges: Vec<Vec<u32>>,
    in_edges: Vec<Vec<u32>>,
}

impl RoadGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>, breakpoints: Vec<f64>) -> Result<Self> {
        if breakpoints.len() < 2 {
            bail!("profile needs at least two breakpoints");
        }
        for pair in breakpoints.windows(2) {
            if pair[1] <= pair[0] {
                bail!("breakpoints must be strictly increasing");
            }
        }
        let node_count = nodes.len() as u32;
        for (idx, node) in nodes.iter().enumerate() {
            if node.id != idx as u32 {
                bail!("node ids must be dense, found {} at index {idx}", node.id);
            }
        }
        let mut out_edges = vec![Vec::new(); nodes.len()];
        let mut in_edges = vec![Vec::new(); nodes.len()];
        for (idx, edge) in edges.iter().enumerate() {
            if edge.id != idx as u32 {
                bail!("edge ids must be dense, found {} at index {idx}", edge.id);
            }
            if edge.from >= node_count || edge.to >= node_count {
                bail!("edge {} endpoints out of range", edge.id);
            }
            if edge.from == edge.to {
                bail!("edge {} is a self loop", edge.id);
            }
            if edge.travel_times.len() != breakpoints.len() {
                bail!(
                    "edge {} has {} samples, profile has {} breakpoints",
                    edge.id,
                    edge.travel_times.len(),
                    breakpoints.len()
                );
            }
            if !(edge.distance.is_finite() && edge.distance > 0.0) {
                bail!("edge {} distance must be positive", edge.id);
            }
            if edge
                .travel_times
                .iter()
                .any(|cost| !cost.is_finite() || *cost <= 0.0)
            {
                bail!("edge {} travel times must be positive", edge.id);
            }
            out_edges[edge.from as usize].push(edge.id);
            in_edges[edge.to as usize].push(edge.id);
        }
        for list in out_edges.iter_mut().chain(in_edges.iter_mut()) {
            list.sort_unstable();
        }

        Ok(Self {
            nodes,
            edges,
            breakpoints,
            out_edges,
            in_edges,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: u32) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn edge(&self, id: u32) -> &Edge {
        &self.edges[id as usize]
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn neighbors_out(&self, node: u32) -> &[u32] {
        &self.out_edges[node as usize]
    }

    pub fn neighbors_in(&self, node: u32) -> &[u32] {
        &self.in_edges[node as usize]
    }

    /// Travel time for departing the edge tail at minute `t`, by linear
    /// interpolation between the enclosing breakpoints, clamped to the
    /// first/last sample outside the grid.
    pub fn travel_time(&self, edge_id: u32, t: f64) -> f64 {
        let edge = self.edge(edge_id);
        let samples = &edge.travel_times;
        let grid = &self.breakpoints;

        if t <= grid[0] {
            return samples[0];
        }
        let last = grid.len() - 1;
        if t >= grid[last] {
            return samples[last];
        }
        let mut hi = 1;
        while grid[hi] < t {
            hi += 1;
        }
        let lo = hi - 1;
        let span = grid[hi] - grid[lo];
        let frac = (t - grid[lo]) / span;
        samples[lo] + frac * (samples[hi] - samples[lo])
    }

    /// Latest departure from the edge tail that arrives at the head by
    /// minute `arrival`, inverting the arrival function `t + tau(t)`
    /// segment by segment. FIFO makes the arrival function non-decreasing;
    /// a decreasing segment is a profile bug and yields `None`.
    pub fn latest_departure(&self, edge_id: u32, arrival: f64) -> Option<f64> {
        let edge = self.edge(edge_id);
        let samples = &edge.travel_times;
        let grid = &self.breakpoints;
        let last = grid.len() - 1;

        // Inversion needs a non-decreasing arrival function.
        for seg in 1..=last {
            if grid[seg] + samples[seg] < grid[seg - 1] + samples[seg - 1] {
                return None;
            }
        }

        // Constant travel time outside the grid. Equality falls through
        // to the segment scan so a flat first segment still resolves to
        // its latest departure.
        if arrival < grid[0] + samples[0] {
            return Some(arrival - samples[0]);
        }
        if arrival >= grid[last] + samples[last] {
            return Some(arrival - samples[last]);
        }

        for hi in 1..=last {
            let lo = hi - 1;
            let arr_lo = grid[lo] + samples[lo];
            let arr_hi = grid[hi] + samples[hi];
            if arrival > arr_hi {
                continue;
            }
            let span = arr_hi - arr_lo;
            if span == 0.0 {
                // Flat arrival segment: every departure in it arrives at
                // the same minute, the latest one wins.
                return Some(grid[hi]);
            }
            let frac = (arrival - arr_lo) / span;
            return Some(grid[lo] + frac * (grid[hi] - grid[lo]));
        }

        Some(arrival - samples[last])
    }

    /// Width in effect when departing the edge tail at minute `t`:
    /// `rush_width` inside a rush window, `base_width` otherwise.
    pub fn effective_width(&self, edge_id: u32, t: f64, rush_windows: &[(f64, f64)]) -> f64 {
        let edge = self.edge(edge_id);
        let in_rush = rush_windows
            .iter()
            .any(|(start, end)| t >= *start && t < *end);
        if in_rush {
            edge.rush_width
        } else {
            edge.base_width
        }
    }

    /// First FIFO violation in any edge profile, if one exists. Reported as
    /// `(edge_id, segment_index)`.
    pub fn fifo_violation(&self) -> Option<(u32, usize)> {
        for edge in &self.edges {
            for seg in 1..self.breakpoints.len() {
                let arr_lo = self.breakpoints[seg - 1] + edge.travel_times[seg - 1];
                let arr_hi = self.breakpoints[seg] + edge.travel_times[seg];
                if arr_hi < arr_lo {
                    return Some((edge.id, seg - 1));
                }
            }
        }
        None
    }
}
