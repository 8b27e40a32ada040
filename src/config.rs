use crate::grid::bounds::Bounds;
use serde::Deserialize;
use serde::Serialize;

/// every tuning knob in one place, grouped per component. all groups
/// default to the documented values and deserialize from the config
/// file the binary accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub hints: HintConfig,
    pub recognizer: RecognizerConfig,
    pub frontier: FrontierConfig,
    pub csp: CspConfig,
    pub queue: QueueConfig,
    pub executor: ExecutorConfig,
    pub density: DensityConfig,
    pub path: PathConfig,
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// stable fingerprint recorded in session metadata
    pub fn hash(&self) -> u64 {
        use std::hash::Hash;
        use std::hash::Hasher;
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        serde_json::to_string(self)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// pre-size the store; None starts empty and grows on demand
    pub initial_bounds: Option<Bounds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HintConfig {
    pub max_hints: usize,
    pub max_clusters: usize,
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            max_hints: 1000,
            max_clusters: 100,
            ttl_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub adaptive_thresholds: bool,
    pub color_threshold: f32,
    pub template_threshold: f32,
    pub cell_size: usize,
    pub patch_margin: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            adaptive_thresholds: true,
            color_threshold: crate::COLOR_THRESHOLD,
            template_threshold: crate::TEMPLATE_THRESHOLD,
            cell_size: crate::CELL_SIZE,
            patch_margin: crate::PATCH_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    pub neighbor_weight: f32,
    pub distance_weight: f32,
    pub confidence_weight: f32,
    pub high_priority_threshold: f32,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            neighbor_weight: crate::NEIGHBOR_WEIGHT,
            distance_weight: crate::DISTANCE_WEIGHT,
            confidence_weight: crate::CONFIDENCE_WEIGHT,
            high_priority_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CspConfig {
    pub max_solutions: usize,
    pub min_zone_size: usize,
    pub max_zone_size: usize,
    pub strategy: crate::solver::hybrid::Strategy,
    pub timeout_secs: u64,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            max_solutions: crate::MAX_SOLUTIONS,
            min_zone_size: crate::MIN_ZONE_SIZE,
            max_zone_size: crate::MAX_ZONE_SIZE,
            strategy: crate::solver::hybrid::Strategy::HybridCspMc,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub cluster_radius: f32,
    pub enable_clustering: bool,
    pub dedup: bool,
    pub max_retries: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: crate::MAX_QUEUE_SIZE,
            cluster_radius: crate::CLUSTER_RADIUS,
            enable_clustering: true,
            dedup: true,
            max_retries: crate::MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_retries: usize,
    pub execution_timeout_ms: u64,
    pub settling_delay_ms: u64,
    pub verification: bool,
    pub pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::MAX_RETRIES,
            execution_timeout_ms: 5000,
            settling_delay_ms: 100,
            verification: true,
            pool_size: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    pub hotspot_threshold: f32,
    pub enable_clustering: bool,
    pub window_size: usize,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            hotspot_threshold: 0.7,
            enable_clustering: true,
            window_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub strategy: crate::pathfinder::planner::PathStrategy,
    pub max_step: i32,
    pub min_movement: i32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            strategy: crate::pathfinder::planner::PathStrategy::Adaptive,
            max_step: 50,
            min_movement: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert!(back.hash() == config.hash());
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"csp": {"max_solutions": 4}}"#).unwrap();
        assert!(parsed.csp.max_solutions == 4);
        assert!(parsed.csp.max_zone_size == crate::MAX_ZONE_SIZE);
        assert!(parsed.queue.max_queue_size == crate::MAX_QUEUE_SIZE);
    }

    #[test]
    fn hash_tracks_content() {
        let a = Config::default();
        let mut b = Config::default();
        b.executor.pool_size = 7;
        assert!(a.hash() != b.hash());
    }
}
