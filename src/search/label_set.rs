use crate::model::RoutingMode;

use super::label::{Label, LabelArena};

/// Objective vector driving dominance for the active routing mode. Lower
/// is better in every component; maximized quantities enter negated.
fn objective(mode: RoutingMode, label: &Label) -> [f64; 3] {
    match mode {
        RoutingMode::WidenessOnly => [label.elapsed_cost, -label.wideness_sum, 0.0],
        RoutingMode::MinTurnsOnly => [
            label.elapsed_cost,
            f64::from(label.right_turns),
            f64::from(label.sharp_turns),
        ],
        RoutingMode::WidenessAndTurns => [
            label.elapsed_cost,
            f64::from(label.right_turns),
            -label.wideness_sum,
        ],
    }
}

/// All components no worse; covers exact ties.
fn weakly_dominates(a: &[f64; 3], b: &[f64; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x <= y)
}

/// All components no worse and at least one strictly better.
fn strictly_dominates(a: &[f64; 3], b: &[f64; 3]) -> bool {
    weakly_dominates(a, b) && a.iter().zip(b.iter()).any(|(x, y)| x < y)
}

/// Per-direction label store: the arena plus one mutually non-dominated
/// set of arena indices per node. Mutated only by the owning direction;
/// the join reads it after the search quiesces. Budget gating happens in
/// the driver before labels reach this store.
#[derive(Debug)]
pub struct LabelStore {
    mode: RoutingMode,
    arena: LabelArena,
    per_node: Vec<Vec<u32>>,
}

impl LabelStore {
    pub fn new(mode: RoutingMode, node_count: usize) -> Self {
        Self {
            mode,
            arena: LabelArena::default(),
            per_node: vec![Vec::new(); node_count],
        }
    }

    /// Attempts to add a label under the active dominance relation and
    /// returns its arena index when retained. Retained labels evict
    /// residents they strictly dominate; once evicted a label never
    /// re-enters.
    pub fn insert(&mut self, label: Label) -> Option<u32> {
        let node = label.node as usize;
        let candidate = objective(self.mode, &label);
        let residents = &self.per_node[node];
        if residents
            .iter()
            .any(|idx| weakly_dominates(&objective(self.mode, self.arena.get(*idx)), &candidate))
        {
            return None;
        }

        let mode = self.mode;
        let arena = &self.arena;
        self.per_node[node]
            .retain(|idx| !strictly_dominates(&candidate, &objective(mode, arena.get(*idx))));

        let idx = self.arena.push(label);
        self.per_node[node].push(idx);
        Some(idx)
    }

    pub fn survivors(&self, node: u32) -> &[u32] {
        &self.per_node[node as usize]
    }

    pub fn contains(&self, node: u32, idx: u32) -> bool {
        self.per_node[node as usize].contains(&idx)
    }

    pub fn has_labels(&self, node: u32) -> bool {
        !self.per_node[node as usize].is_empty()
    }

    /// Smallest elapsed cost among the node's survivors.
    pub fn best_cost(&self, node: u32) -> Option<f64> {
        self.per_node[node as usize]
            .iter()
            .map(|idx| self.arena.get(*idx).elapsed_cost)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Survivor minimizing `key`, ties to the earliest-inserted label.
    pub fn best_by<F>(&self, node: u32, key: F) -> Option<&Label>
    where
        F: Fn(&Label) -> f64,
    {
        self.per_node[node as usize]
            .iter()
            .min_by(|a, b| {
                key(self.arena.get(**a))
                    .total_cmp(&key(self.arena.get(**b)))
                    .then_with(|| a.cmp(b))
            })
            .map(|idx| self.arena.get(*idx))
    }

    pub fn label(&self, idx: u32) -> &Label {
        self.arena.get(idx)
    }

    pub fn arena(&self) -> &LabelArena {
        &self.arena
    }

    /// Test hook: true when some pair of survivors at `node` violates
    /// mutual non-dominance.
    pub fn dominance_violation(&self, node: u32) -> bool {
        let residents = &self.per_node[node as usize];
        for (i, a) in residents.iter().enumerate() {
            for b in residents.iter().skip(i + 1) {
                let va = objective(self.mode, self.arena.get(*a));
                let vb = objective(self.mode, self.arena.get(*b));
                if weakly_dominates(&va, &vb) || weakly_dominates(&vb, &va) {
                    return true;
                }
            }
        }
        false
    }
}
