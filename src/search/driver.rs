use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, warn};

use crate::model::{classify_turn, CancelToken, CoreError, RoadGraph, RoutingMode, TurnKind};

use super::config::SearchConfig;
use super::frontier::FrontierQueue;
use super::heuristic::RemainingTimeBound;
use super::label::{Direction, Label};
use super::label_set::LabelStore;
use super::COST_EPS;

const INF_BITS: u64 = f64::INFINITY.to_bits();

/// One bidirectional search over a fixed departure instant.
pub struct SearchRequest<'a> {
    pub graph: &'a RoadGraph,
    pub config: &'a SearchConfig,
    pub mode: RoutingMode,
    pub source: u32,
    pub destination: u32,
    pub departure: f64,
    pub budget: f64,
    pub cancel: &'a CancelToken,
    pub deadline: Option<Instant>,
}

/// Quiesced search state handed to the join step.
#[derive(Debug)]
pub struct SearchOutcome {
    pub forward: LabelStore,
    pub backward: LabelStore,
    pub meetings: Vec<u32>,
    pub expansions: [usize; 2],
}

struct DirectionState {
    dir: Direction,
    store: LabelStore,
    queue: FrontierQueue,
    last_popped: f64,
}

impl DirectionState {
    fn new(dir: Direction, mode: RoutingMode, node_count: usize) -> Self {
        Self {
            dir,
            store: LabelStore::new(mode, node_count),
            queue: FrontierQueue::new(node_count),
            last_popped: 0.0,
        }
    }

    fn top_cost(&mut self) -> Option<f64> {
        let Self { store, queue, .. } = self;
        queue.peek_min_cost(|node, label| !store.contains(node, label))
    }
}

/// State shared between the two fronts. Per-node best costs, the meeting
/// set and the best feasible meeting cost are the only cross-direction
/// channels; label sets stay private to their direction until the join.
struct MeetState {
    best_cost: [Vec<AtomicU64>; 2],
    meetings: Mutex<BTreeSet<u32>>,
    cstar: AtomicU64,
    budget_rejects: AtomicUsize,
    expansions: [AtomicUsize; 2],
    stop: AtomicBool,
}

impl MeetState {
    fn new(node_count: usize) -> Self {
        let make = || (0..node_count).map(|_| AtomicU64::new(INF_BITS)).collect();
        Self {
            best_cost: [make(), make()],
            meetings: Mutex::new(BTreeSet::new()),
            cstar: AtomicU64::new(INF_BITS),
            budget_rejects: AtomicUsize::new(0),
            expansions: [AtomicUsize::new(0), AtomicUsize::new(0)],
            stop: AtomicBool::new(false),
        }
    }

    fn total_expansions(&self) -> usize {
        self.expansions[0].load(Ordering::Relaxed) + self.expansions[1].load(Ordering::Relaxed)
    }
}

fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

/// Monotone minimum; valid because all stored values are non-negative,
/// where the bit pattern orders like the float.
fn store_min_f64(cell: &AtomicU64, value: f64) {
    cell.fetch_min(value.to_bits(), Ordering::SeqCst);
}

fn lock_meetings(meet: &MeetState) -> std::sync::MutexGuard<'_, BTreeSet<u32>> {
    match meet.meetings.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn check_interrupt(req: &SearchRequest) -> Result<(), CoreError> {
    if req.cancel.is_canceled() {
        return Err(CoreError::Canceled);
    }
    if let Some(deadline) = req.deadline {
        if Instant::now() >= deadline {
            return Err(CoreError::Canceled);
        }
    }
    Ok(())
}

/// Publishes a retained label's cost for its node and, when the other
/// direction already reached the node, records the meeting and tightens
/// the best feasible meeting cost.
fn record_meeting(meet: &MeetState, dir: Direction, node: u32, cost: f64, budget: f64) {
    store_min_f64(&meet.best_cost[dir.index()][node as usize], cost);
    // SeqCst store-then-load: when both directions land on a node at the
    // same time, at least one of them observes the other's cost.
    let opposite = f64::from_bits(
        meet.best_cost[dir.opposite().index()][node as usize].load(Ordering::SeqCst),
    );
    if !opposite.is_finite() {
        return;
    }
    lock_meetings(meet).insert(node);
    let total = cost + opposite;
    if total <= budget + COST_EPS {
        meet.cstar.fetch_min(total.to_bits(), Ordering::Relaxed);
    }
}

/// Pops and relaxes one label in the given direction. Returns false when
/// the direction's queue is exhausted.
fn expand_once(
    req: &SearchRequest,
    heuristic: &RemainingTimeBound,
    state: &mut DirectionState,
    meet: &MeetState,
) -> Result<bool, CoreError> {
    let dir = state.dir;
    let popped = {
        let DirectionState { store, queue, .. } = state;
        queue.pop_min(|node, label| !store.contains(node, label))
    };
    let Some((node, label_idx, cost)) = popped else {
        return Ok(false);
    };

    if cost + COST_EPS < state.last_popped {
        debug_assert!(false, "expansion order regressed: {cost} after {}", state.last_popped);
        warn!(
            "expansion order regressed in {:?}: {} after {}",
            dir, cost, state.last_popped
        );
    }
    state.last_popped = state.last_popped.max(cost);

    let label = state.store.label(label_idx).clone();
    let edges = match dir {
        Direction::Forward => req.graph.neighbors_out(node),
        Direction::Backward => req.graph.neighbors_in(node),
    };

    for &edge_id in edges {
        let edge = req.graph.edge(edge_id);
        let (next_node, next_time, width_time, traversal) = match dir {
            Direction::Forward => {
                let traversal = req.graph.travel_time(edge_id, label.time);
                (edge.to, label.time + traversal, label.time, traversal)
            }
            Direction::Backward => {
                let Some(depart) = req.graph.latest_departure(edge_id, label.time) else {
                    return Err(CoreError::InternalInvariant(format!(
                        "edge {edge_id} profile violates FIFO"
                    )));
                };
                (edge.from, depart, depart, label.time - depart)
            }
        };
        if !traversal.is_finite() || traversal < 0.0 {
            return Err(CoreError::InternalInvariant(format!(
                "edge {edge_id} produced traversal time {traversal}"
            )));
        }

        let next_cost = label.elapsed_cost + traversal;
        // This gate and the heuristic gate below are the only budget
        // checks; the label store tests dominance only.
        if next_cost > req.budget + COST_EPS {
            meet.budget_rejects.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let mut right_turns = label.right_turns;
        let mut sharp_turns = label.sharp_turns;
        if let Some(prev) = label.last_edge {
            // Backward labels extend the path on its source side, so the
            // new edge precedes the previous one in forward orientation.
            let (edge_in, edge_out) = match dir {
                Direction::Forward => (prev, edge_id),
                Direction::Backward => (edge_id, prev),
            };
            match classify_turn(req.graph, edge_in, edge_out) {
                TurnKind::Uturn => continue,
                TurnKind::Right => right_turns += 1,
                TurnKind::Sharp => sharp_turns += 1,
                TurnKind::Straight => {}
            }
        }

        let remaining = heuristic.bound(next_node, dir);
        if next_cost + remaining > req.budget + COST_EPS {
            meet.budget_rejects.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        if state.queue.frontier_count(next_node) > req.config.frontier_threshold {
            let cstar = load_f64(&meet.cstar);
            if cstar.is_finite() && next_cost + remaining > cstar * req.config.prune_factor {
                continue;
            }
        }

        let mut wideness_sum = label.wideness_sum;
        if req.graph.effective_width(edge_id, width_time, &req.config.rush_windows)
            >= req.config.width_threshold
        {
            wideness_sum += edge.distance;
        }

        let candidate = Label {
            node: next_node,
            time: next_time,
            elapsed_cost: next_cost,
            wideness_sum,
            distance_sum: label.distance_sum + edge.distance,
            right_turns,
            sharp_turns,
            last_edge: Some(edge_id),
            predecessor: Some(label_idx),
        };
        if let Some(idx) = state.store.insert(candidate) {
            state.queue.push(next_node, idx, next_cost);
            record_meeting(meet, dir, next_node, next_cost, req.budget);
        }
    }

    meet.expansions[dir.index()].fetch_add(1, Ordering::Relaxed);
    Ok(true)
}

/// Cooperative driver: alternates toward the direction whose next label
/// is cheaper, ties to the smaller queue. Runs until both queues drain
/// under the budget gates; stopping any earlier can drop feasible
/// meetings against already-settled opposite labels. Returns whether the
/// step cap cut the search short.
fn drive_sequential(
    req: &SearchRequest,
    heuristic: &RemainingTimeBound,
    forward: &mut DirectionState,
    backward: &mut DirectionState,
    meet: &MeetState,
) -> Result<bool, CoreError> {
    loop {
        check_interrupt(req)?;
        if meet.total_expansions() >= req.config.max_expansions {
            return Ok(true);
        }

        let top_f = forward.top_cost();
        let top_b = backward.top_cost();
        let chosen = match (top_f, top_b) {
            (None, None) => return Ok(false),
            (Some(_), None) => Direction::Forward,
            (None, Some(_)) => Direction::Backward,
            (Some(cost_f), Some(cost_b)) => match cost_f.total_cmp(&cost_b) {
                std::cmp::Ordering::Less => Direction::Forward,
                std::cmp::Ordering::Greater => Direction::Backward,
                std::cmp::Ordering::Equal => {
                    if forward.queue.len() <= backward.queue.len() {
                        Direction::Forward
                    } else {
                        Direction::Backward
                    }
                }
            },
        };

        let state = match chosen {
            Direction::Forward => &mut *forward,
            Direction::Backward => &mut *backward,
        };
        expand_once(req, heuristic, state, meet)?;
    }
}

/// Worker loop for the two-thread driver. Each direction owns its label
/// store and queue and drains it independently; the stop flag only
/// relays cancellation, step-cap exhaustion and errors to the peer.
fn drive_worker(
    req: &SearchRequest,
    heuristic: &RemainingTimeBound,
    state: &mut DirectionState,
    meet: &MeetState,
) -> Result<bool, CoreError> {
    loop {
        if meet.stop.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if let Err(err) = check_interrupt(req) {
            meet.stop.store(true, Ordering::Relaxed);
            return Err(err);
        }
        if meet.total_expansions() >= req.config.max_expansions {
            meet.stop.store(true, Ordering::Relaxed);
            return Ok(true);
        }

        match expand_once(req, heuristic, state, meet) {
            // This worker is the only pusher for its queue; once drained
            // it stays drained.
            Ok(false) => return Ok(false),
            Ok(true) => {}
            Err(err) => {
                meet.stop.store(true, Ordering::Relaxed);
                return Err(err);
            }
        }
    }
}

fn drive_parallel(
    req: &SearchRequest,
    heuristic: &RemainingTimeBound,
    forward: &mut DirectionState,
    backward: &mut DirectionState,
    meet: &MeetState,
) -> Result<bool, CoreError> {
    let (result_f, result_b) = std::thread::scope(|scope| {
        let handle = scope.spawn(|| drive_worker(req, heuristic, backward, meet));
        let result_f = drive_worker(req, heuristic, forward, meet);
        let result_b = handle.join().unwrap_or_else(|_| {
            Err(CoreError::InternalInvariant(
                "backward worker panicked".to_string(),
            ))
        });
        (result_f, result_b)
    });
    let cap_f = result_f?;
    let cap_b = result_b?;
    Ok(cap_f || cap_b)
}

/// Runs the bidirectional label-setting search and returns the quiesced
/// label stores, the meeting set and per-direction expansion counts.
pub fn run_search(req: &SearchRequest, parallel: bool) -> Result<SearchOutcome, CoreError> {
    let node_count = req.graph.node_count();
    let heuristic = RemainingTimeBound::new(req.graph, req.config, req.source, req.destination);
    let mut forward = DirectionState::new(Direction::Forward, req.mode, node_count);
    let mut backward = DirectionState::new(Direction::Backward, req.mode, node_count);
    let meet = MeetState::new(node_count);

    if let Some(idx) = forward
        .store
        .insert(Label::seed(req.source, req.departure))
    {
        forward.queue.push(req.source, idx, 0.0);
        record_meeting(&meet, Direction::Forward, req.source, 0.0, req.budget);
    }
    let latest_arrival = req.departure + req.budget;
    if let Some(idx) = backward
        .store
        .insert(Label::seed(req.destination, latest_arrival))
    {
        backward.queue.push(req.destination, idx, 0.0);
        record_meeting(&meet, Direction::Backward, req.destination, 0.0, req.budget);
    }

    let cap_exceeded = if parallel {
        drive_parallel(req, &heuristic, &mut forward, &mut backward, &meet)?
    } else {
        drive_sequential(req, &heuristic, &mut forward, &mut backward, &meet)?
    };

    let meetings: Vec<u32> = lock_meetings(&meet).iter().copied().collect();
    let expansions = [
        meet.expansions[0].load(Ordering::Relaxed),
        meet.expansions[1].load(Ordering::Relaxed),
    ];
    debug!(
        "search quiesced: {} -> {} meetings={} expansions={}/{} cstar={:.2} cap_exceeded={}",
        req.source,
        req.destination,
        meetings.len(),
        expansions[0],
        expansions[1],
        load_f64(&meet.cstar),
        cap_exceeded
    );

    if meetings.is_empty() {
        if cap_exceeded || meet.budget_rejects.load(Ordering::Relaxed) > 0 {
            return Err(CoreError::BudgetExhausted(format!(
                "no path from {} to {} fits the {:.1} minute budget",
                req.source, req.destination, req.budget
            )));
        }
        return Err(CoreError::Unreachable(format!(
            "forward and backward searches never met between {} and {}",
            req.source, req.destination
        )));
    }

    Ok(SearchOutcome {
        forward: forward.store,
        backward: backward.store,
        meetings,
        expansions,
    })
}
