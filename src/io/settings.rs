use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::search::{
    SearchConfig, AGGRESSIVE_FRONTIER_THRESHOLD, BALANCED_FRONTIER_THRESHOLD,
};

#[derive(Debug, Deserialize)]
struct RawRushWindow {
    start: f64,
    end: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFrontierThreshold {
    Count(u32),
    Preset(String),
}

#[derive(Debug, Deserialize, Default)]
struct RawSettings {
    width_threshold: Option<f64>,
    max_speed_kmh: Option<f64>,
    frontier_threshold: Option<RawFrontierThreshold>,
    prune_factor: Option<f64>,
    rush_windows: Option<Vec<RawRushWindow>>,
    max_expansions: Option<usize>,
}

/// Reads a YAML settings file into a `SearchConfig`, starting from the
/// defaults and overriding only what the file mentions.
pub fn load_search_config(path: &Path) -> Result<SearchConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    parse_search_config(&text)
}

pub fn parse_search_config(text: &str) -> Result<SearchConfig> {
    let raw: RawSettings = serde_yaml::from_str(text).context("failed to parse settings yaml")?;
    let mut config = SearchConfig::default();

    if let Some(width_threshold) = raw.width_threshold {
        if !(width_threshold.is_finite() && width_threshold > 0.0) {
            bail!("width_threshold must be positive, got {width_threshold}");
        }
        config.width_threshold = width_threshold;
    }
    if let Some(max_speed_kmh) = raw.max_speed_kmh {
        if !(max_speed_kmh.is_finite() && max_speed_kmh > 0.0) {
            bail!("max_speed_kmh must be positive, got {max_speed_kmh}");
        }
        config.max_speed_kmh = max_speed_kmh;
    }
    match raw.frontier_threshold {
        Some(RawFrontierThreshold::Count(count)) => config.frontier_threshold = count,
        Some(RawFrontierThreshold::Preset(name)) => match name.to_lowercase().as_str() {
            "aggressive" => config.frontier_threshold = AGGRESSIVE_FRONTIER_THRESHOLD,
            "balanced" => config.frontier_threshold = BALANCED_FRONTIER_THRESHOLD,
            other => bail!("unknown frontier_threshold preset {other:?}"),
        },
        None => {}
    }
    if let Some(prune_factor) = raw.prune_factor {
        if !(prune_factor.is_finite() && prune_factor >= 1.0) {
            bail!("prune_factor must be at least 1.0, got {prune_factor}");
        }
        config.prune_factor = prune_factor;
    }
    if let Some(windows) = raw.rush_windows {
        let mut parsed = Vec::new();
        for window in windows {
            if !(window.start.is_finite() && window.end.is_finite() && window.start < window.end) {
                bail!(
                    "rush window {}..{} is not a valid minute range",
                    window.start,
                    window.end
                );
            }
            parsed.push((window.start, window.end));
        }
        config.rush_windows = parsed;
    }
    if let Some(max_expansions) = raw.max_expansions {
        if max_expansions == 0 {
            bail!("max_expansions must be positive");
        }
        config.max_expansions = max_expansions;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_keep_defaults() {
        let config = parse_search_config("{}").expect("empty settings parse");
        let defaults = SearchConfig::default();
        assert_eq!(config.width_threshold, defaults.width_threshold);
        assert_eq!(config.frontier_threshold, defaults.frontier_threshold);
    }

    #[test]
    fn preset_names_map_to_thresholds() {
        let aggressive = parse_search_config("frontier_threshold: aggressive")
            .expect("preset parses");
        assert_eq!(
            aggressive.frontier_threshold,
            AGGRESSIVE_FRONTIER_THRESHOLD
        );
        let numeric = parse_search_config("frontier_threshold: 25").expect("count parses");
        assert_eq!(numeric.frontier_threshold, 25);
    }

    #[test]
    fn full_settings_override_every_field() {
        let text = "\
width_threshold: 4.2
max_speed_kmh: 110
frontier_threshold: balanced
prune_factor: 1.5
rush_windows:
  - start: 400
    end: 560
max_expansions: 50000
";
        let config = parse_search_config(text).expect("full settings parse");
        assert_eq!(config.width_threshold, 4.2);
        assert_eq!(config.max_speed_kmh, 110.0);
        assert_eq!(config.frontier_threshold, BALANCED_FRONTIER_THRESHOLD);
        assert_eq!(config.prune_factor, 1.5);
        assert_eq!(config.rush_windows, vec![(400.0, 560.0)]);
        assert_eq!(config.max_expansions, 50_000);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse_search_config("width_threshold: -1").is_err());
        assert!(parse_search_config("frontier_threshold: frantic").is_err());
        assert!(parse_search_config("prune_factor: 0.5").is_err());
        assert!(parse_search_config("rush_windows:\n  - start: 600\n    end: 500").is_err());
    }
}
