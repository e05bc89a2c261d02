use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use flexiroute::io::{load_graph, load_search_config};
use flexiroute::model::{CancelToken, Edge, Node, Query, RoadGraph, RoutingMode};
use flexiroute::search::{QueryOptions, RouteEngine, SearchConfig};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "route_bench")]
#[command(about = "Benchmark the route engine on synthetic road grids")]
struct Args {
    #[arg(long, default_value_t = 12)]
    rows: u32,
    #[arg(long, default_value_t = 12)]
    cols: u32,
    #[arg(long, default_value_t = 3)]
    seeds: usize,
    #[arg(long, default_value_t = 1)]
    start_seed: u64,
    #[arg(long, default_value_t = 8)]
    iterations: usize,
    #[arg(long, default_value_t = 480.0)]
    departure: f64,
    #[arg(long, default_value_t = 120.0)]
    budget: f64,
    #[arg(long, default_value_t = 0.0)]
    interval: f64,
    #[arg(long)]
    parallel: bool,
    #[arg(long)]
    nodes_file: Option<PathBuf>,
    #[arg(long)]
    edges_file: Option<PathBuf>,
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    output_json: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct LcgRng {
    state: u64,
}

impl LcgRng {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        self.state
    }

    fn next_f64(&mut self) -> f64 {
        let raw = self.next_u64() >> 11;
        (raw as f64) / ((1_u64 << 53) as f64)
    }

    fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (q.clamp(0.0, 1.0) * (n - 1) as f64).round() as usize;
    sorted[rank]
}

const BREAKPOINTS: [f64; 12] = [
    360.0, 420.0, 480.0, 540.0, 600.0, 660.0, 720.0, 780.0, 840.0, 900.0, 1020.0, 1140.0,
];

/// Four-neighbor grid with randomized profiles. Rush-hour samples are
/// inflated, which keeps FIFO intact because the inflation is far
/// smaller than the breakpoint spacing; roughly a third of the links are
/// clearways that widen at rush.
fn generate_grid(seed: u64, rows: u32, cols: u32) -> Result<RoadGraph> {
    let mut rng = LcgRng::new(seed);
    let mut nodes = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            nodes.push(Node {
                id: row * cols + col,
                lat: 0.0009 * f64::from(row),
                lon: 0.0009 * f64::from(col),
                cluster: Some(row / 4),
            });
        }
    }

    let mut edges: Vec<Edge> = Vec::new();
    let link = |edges: &mut Vec<Edge>, rng: &mut LcgRng, a: u32, b: u32| {
        let base_time = rng.range_f64(1.5, 3.5);
        let travel_times: Vec<f64> = BREAKPOINTS
            .iter()
            .map(|minute| {
                let rush = (420.0..570.0).contains(minute) || (1020.0..1170.0).contains(minute);
                if rush {
                    base_time * rng.range_f64(1.2, 1.8)
                } else {
                    base_time
                }
            })
            .collect();
        let base_width = rng.range_f64(3.0, 4.4);
        let rush_width = if rng.next_f64() < 0.35 {
            base_width + rng.range_f64(0.5, 1.5)
        } else {
            base_width
        };
        for (from, to) in [(a, b), (b, a)] {
            edges.push(Edge {
                id: edges.len() as u32,
                from,
                to,
                distance: rng.range_f64(80.0, 140.0),
                travel_times: travel_times.clone(),
                base_width,
                rush_width,
            });
        }
    };

    for row in 0..rows {
        for col in 0..cols {
            let id = row * cols + col;
            if col + 1 < cols {
                link(&mut edges, &mut rng, id, id + 1);
            }
            if row + 1 < rows {
                link(&mut edges, &mut rng, id, id + cols);
            }
        }
    }

    RoadGraph::new(nodes, edges, BREAKPOINTS.to_vec())
}

fn bench_mode(
    engine: &RouteEngine,
    mode: RoutingMode,
    name: &str,
    args: &Args,
    options: &QueryOptions,
) -> Value {
    let destination = engine.graph().node_count() as u32 - 1;
    let query = Query {
        source: 0,
        destination,
        departure_time: args.departure,
        interval: args.interval,
        budget: args.budget,
        routing_mode: mode,
    };

    let mut latencies_ms = Vec::new();
    let mut last = None;
    for _ in 0..args.iterations.max(1) {
        if options.cancel.is_canceled() {
            break;
        }
        let start = Instant::now();
        let result = engine.run_query_with(&query, options);
        latencies_ms.push(start.elapsed().as_secs_f64() * 1000.0);
        last = Some(result);
    }
    latencies_ms.sort_by(|a, b| a.total_cmp(b));

    let mut row = json!({
        "mode": name,
        "runs": latencies_ms.len(),
        "p50_ms": percentile(&latencies_ms, 0.50),
        "p95_ms": percentile(&latencies_ms, 0.95),
    });
    if let (Some(result), Some(map)) = (last, row.as_object_mut()) {
        map.insert("success".to_string(), json!(result.success));
        map.insert("travel_time".to_string(), json!(result.travel_time));
        map.insert(
            "wideness_percentage".to_string(),
            json!(result.wideness_percentage),
        );
        map.insert("right_turns".to_string(), json!(result.right_turns));
        map.insert("alternates".to_string(), json!(result.alternates.len()));
        map.insert(
            "optimal_departure_time".to_string(),
            json!(result.optimal_departure_time),
        );
        if let Some(message) = result.error_message {
            map.insert("error".to_string(), json!(message));
        }
    }
    row
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("failed to install signal handler")?;
    let options = QueryOptions {
        cancel: cancel.clone(),
        deadline: None,
        parallel_driver: args.parallel,
    };

    let config = match &args.settings {
        Some(path) => load_search_config(path)?,
        None => SearchConfig::default(),
    };

    let modes = [
        (RoutingMode::WidenessOnly, "wideness_only"),
        (RoutingMode::MinTurnsOnly, "min_turns_only"),
        (RoutingMode::WidenessAndTurns, "wideness_and_turns"),
    ];

    let mut seed_rows = Vec::new();
    match (&args.nodes_file, &args.edges_file) {
        (Some(nodes_path), Some(edges_path)) => {
            let graph = load_graph(nodes_path, edges_path)?;
            let engine = RouteEngine::with_config(graph, config);
            let results: Vec<Value> = modes
                .iter()
                .map(|(mode, name)| bench_mode(&engine, *mode, name, &args, &options))
                .collect();
            seed_rows.push(json!({
                "graph": "loaded",
                "nodes": engine.graph().node_count(),
                "edges": engine.graph().edge_count(),
                "modes": results,
            }));
        }
        (None, None) => {
            for offset in 0..args.seeds.max(1) {
                if cancel.is_canceled() {
                    break;
                }
                let seed = args.start_seed + offset as u64;
                let graph = generate_grid(seed, args.rows.max(2), args.cols.max(2))?;
                let engine = RouteEngine::with_config(graph, config.clone());
                let results: Vec<Value> = modes
                    .iter()
                    .map(|(mode, name)| bench_mode(&engine, *mode, name, &args, &options))
                    .collect();
                seed_rows.push(json!({
                    "seed": seed,
                    "nodes": engine.graph().node_count(),
                    "edges": engine.graph().edge_count(),
                    "modes": results,
                }));
            }
        }
        _ => anyhow::bail!("--nodes-file and --edges-file must be given together"),
    }

    let payload = json!({
        "config": {
            "rows": args.rows,
            "cols": args.cols,
            "seeds": args.seeds,
            "start_seed": args.start_seed,
            "iterations": args.iterations,
            "departure": args.departure,
            "budget": args.budget,
            "interval": args.interval,
            "parallel": args.parallel,
        },
        "runs": seed_rows,
        "canceled": cancel.is_canceled(),
    });

    if let Some(path) = args.output_json {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(&payload)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }

    Ok(())
}
