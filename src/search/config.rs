/// Frontier-size preset that trades completeness pressure for speed.
pub const AGGRESSIVE_FRONTIER_THRESHOLD: u32 = 10;
pub const BALANCED_FRONTIER_THRESHOLD: u32 = 50;

/// Per-query search knobs. Engines hold a mutable default copy that new
/// queries inherit, so parallel queries can run with different settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Minimum effective width (meters) for an edge to count as wide.
    pub width_threshold: f64,
    /// Speed assumed by the admissible remaining-time bound.
    pub max_speed_kmh: f64,
    /// Per-node frontier size above which the aggressive pruning rule
    /// activates.
    pub frontier_threshold: u32,
    /// Tightening factor applied to the best meeting cost in the
    /// aggressive pruning rule.
    pub prune_factor: f64,
    /// Minute windows during which `rush_width` replaces `base_width`.
    pub rush_windows: Vec<(f64, f64)>,
    /// Step cap across both directions.
    pub max_expansions: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            width_threshold: 4.0,
            max_speed_kmh: 130.0,
            frontier_threshold: BALANCED_FRONTIER_THRESHOLD,
            prune_factor: 1.25,
            rush_windows: vec![(420.0, 570.0), (1020.0, 1170.0)],
            max_expansions: 2_000_000,
        }
    }
}

impl SearchConfig {
    pub fn set_aggressive(&mut self) {
        self.frontier_threshold = AGGRESSIVE_FRONTIER_THRESHOLD;
    }

    pub fn set_balanced(&mut self) {
        self.frontier_threshold = BALANCED_FRONTIER_THRESHOLD;
    }

    /// Heuristic speed in meters per minute.
    pub fn max_speed_m_per_min(&self) -> f64 {
        self.max_speed_kmh * 1000.0 / 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_toggle_frontier_threshold() {
        let mut config = SearchConfig::default();
        assert_eq!(config.frontier_threshold, BALANCED_FRONTIER_THRESHOLD);
        config.set_aggressive();
        assert_eq!(config.frontier_threshold, AGGRESSIVE_FRONTIER_THRESHOLD);
        config.set_balanced();
        assert_eq!(config.frontier_threshold, BALANCED_FRONTIER_THRESHOLD);
    }
}
