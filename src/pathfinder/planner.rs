use super::density::DensityMap;
use super::density::Hotspot;
use crate::config::PathConfig;
use crate::grid::bounds::Bounds;
use crate::Point;
use crate::Priority;
use std::sync::Mutex;

/// movement policies over the density surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PathStrategy {
    /// head for the density-squared weighted centroid of the peaks
    Barycenter,
    /// jump straight at the strongest peak
    HighestDensity,
    /// stay local: best nearby peak discounted by distance
    SlidingWindow,
    /// pick one of the above from the surface's statistics
    Adaptive,
}

/// executor-side knowledge about regions fed back into planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStatus {
    Resolved,
    Blocked,
    Critical,
}

/// one viewport move the driver should make
#[derive(Debug, Clone)]
pub struct MovementVector {
    pub dx: i32,
    pub dy: i32,
    pub priority: Priority,
    pub reasoning: String,
    pub target: Option<Bounds>,
    pub distance: f32,
}

#[derive(Debug, Default, Clone)]
pub struct PlannerStats {
    pub plans: u64,
    pub still: u64,
    pub blocked_dropped: u64,
}

/// turns the density surface plus executor feedback into the next
/// viewport move. blocked zones are dead to us; critical zones pull
/// harder; moves under the movement threshold are suppressed so the
/// viewport does not dither.
pub struct PathPlanner {
    config: PathConfig,
    zones: Mutex<Vec<(Bounds, ZoneStatus)>>,
    stats: Mutex<PlannerStats>,
}

impl PathPlanner {
    pub fn new(config: PathConfig) -> Self {
        Self {
            config,
            zones: Mutex::new(Vec::new()),
            stats: Mutex::new(PlannerStats::default()),
        }
    }

    pub fn update_zone(&self, bounds: Bounds, status: ZoneStatus) {
        let mut zones = self.zones.lock().expect("zone lock");
        zones.retain(|(b, _)| *b != bounds);
        zones.push((bounds, status));
    }

    pub fn plan(&self, map: &DensityMap, position: Point) -> Option<MovementVector> {
        self.stats.lock().expect("planner stats").plans += 1;
        let candidates = self.candidates(map);
        if candidates.is_empty() {
            self.stats.lock().expect("planner stats").still += 1;
            return None;
        }
        let strategy = match self.config.strategy {
            PathStrategy::Adaptive => Self::adapt(map),
            fixed => fixed,
        };
        let vector = match strategy {
            PathStrategy::Barycenter => self.barycenter(&candidates, position),
            PathStrategy::HighestDensity => self.highest(&candidates, position),
            PathStrategy::SlidingWindow => self.sliding(&candidates, position),
            PathStrategy::Adaptive => unreachable!("resolved above"),
        }?;
        if vector.dx.abs() + vector.dy.abs() < self.config.min_movement {
            self.stats.lock().expect("planner stats").still += 1;
            return None;
        }
        Some(vector)
    }

    pub fn stats(&self) -> PlannerStats {
        self.stats.lock().expect("planner stats").clone()
    }

    /// hotspots surviving zone feedback, with critical boosts applied
    fn candidates(&self, map: &DensityMap) -> Vec<Hotspot> {
        let zones = self.zones.lock().expect("zone lock");
        let mut dropped = 0u64;
        let survivors = map
            .hotspots
            .iter()
            .filter_map(|spot| {
                let cell = Bounds::cell(spot.at);
                let blocked = zones
                    .iter()
                    .any(|(b, s)| *s == ZoneStatus::Blocked && b.intersects(&cell));
                if blocked {
                    dropped += 1;
                    return None;
                }
                let critical = zones
                    .iter()
                    .any(|(b, s)| *s == ZoneStatus::Critical && b.intersects(&cell));
                Some(Hotspot {
                    at: spot.at,
                    density: match critical {
                        true => (spot.density * 1.5).min(2.0),
                        false => spot.density,
                    },
                })
            })
            .collect();
        self.stats.lock().expect("planner stats").blocked_dropped += dropped;
        survivors
    }

    fn adapt(map: &DensityMap) -> PathStrategy {
        if map.frontier_ratio > 0.3 {
            PathStrategy::SlidingWindow
        } else if map.max > 0.9 && map.mean < 0.2 {
            PathStrategy::HighestDensity
        } else {
            PathStrategy::Barycenter
        }
    }

    fn barycenter(&self, candidates: &[Hotspot], position: Point) -> Option<MovementVector> {
        let weight_sum: f32 = candidates.iter().map(|s| s.density * s.density).sum();
        if weight_sum <= 0.0 {
            return None;
        }
        let tx = candidates
            .iter()
            .map(|s| s.at.0 as f32 * s.density * s.density)
            .sum::<f32>()
            / weight_sum;
        let ty = candidates
            .iter()
            .map(|s| s.at.1 as f32 * s.density * s.density)
            .sum::<f32>()
            / weight_sum;
        let target = (tx.round() as i32, ty.round() as i32);
        Some(self.toward(position, target, self.config.max_step, "barycenter of hotspots", 0.7))
    }

    fn highest(&self, candidates: &[Hotspot], position: Point) -> Option<MovementVector> {
        let best = candidates
            .iter()
            .max_by(|a, b| a.density.total_cmp(&b.density).then(b.at.cmp(&a.at)))?;
        Some(self.toward(position, best.at, self.config.max_step, "strongest hotspot", 0.9))
    }

    fn sliding(&self, candidates: &[Hotspot], position: Point) -> Option<MovementVector> {
        let window = self.config.max_step;
        let best = candidates
            .iter()
            .filter(|s| {
                (s.at.0 - position.0).abs() <= window && (s.at.1 - position.1).abs() <= window
            })
            .max_by(|a, b| {
                let score = |s: &Hotspot| s.density / (1.0 + crate::distance(s.at, position) / 20.0);
                score(a).total_cmp(&score(b)).then(b.at.cmp(&a.at))
            })?;
        Some(self.toward(position, best.at, self.config.max_step / 2, "windowed hotspot", 0.6))
    }

    fn toward(
        &self,
        from: Point,
        to: Point,
        step: i32,
        reasoning: &str,
        priority: Priority,
    ) -> MovementVector {
        let dx = (to.0 - from.0).clamp(-step, step);
        let dy = (to.1 - from.1).clamp(-step, step);
        MovementVector {
            dx,
            dy,
            priority,
            reasoning: reasoning.into(),
            target: Some(Bounds::cell(to)),
            distance: crate::distance(from, to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(hotspots: Vec<Hotspot>) -> DensityMap {
        DensityMap {
            hotspots,
            ..DensityMap::empty(Bounds::new(0, 0, 100, 100))
        }
    }

    fn planner(strategy: PathStrategy) -> PathPlanner {
        PathPlanner::new(PathConfig {
            strategy,
            ..PathConfig::default()
        })
    }

    #[test]
    fn barycenter_points_into_the_mass() {
        let map = map_with(vec![
            Hotspot { at: (20, 20), density: 1.0 },
            Hotspot { at: (24, 20), density: 1.0 },
        ]);
        let vector = planner(PathStrategy::Barycenter).plan(&map, (0, 0)).unwrap();
        assert!(vector.dx > 0 && vector.dy > 0);
        assert!(vector.dx.abs() + vector.dy.abs() <= 2 * 50);
        assert!(vector.dx <= 50 && vector.dy <= 50);
    }

    #[test]
    fn steps_clamp_to_max() {
        let map = map_with(vec![Hotspot { at: (500, 0), density: 1.0 }]);
        let vector = planner(PathStrategy::HighestDensity).plan(&map, (0, 0)).unwrap();
        assert!(vector.dx == 50);
        assert!(vector.dy == 0);
    }

    #[test]
    fn tiny_moves_are_suppressed() {
        let map = map_with(vec![Hotspot { at: (1, 0), density: 1.0 }]);
        assert!(planner(PathStrategy::HighestDensity).plan(&map, (0, 0)).is_none());
    }

    #[test]
    fn blocked_zones_drop_candidates() {
        let map = map_with(vec![Hotspot { at: (30, 30), density: 1.0 }]);
        let p = planner(PathStrategy::HighestDensity);
        p.update_zone(Bounds::new(20, 20, 40, 40), ZoneStatus::Blocked);
        assert!(p.plan(&map, (0, 0)).is_none());
        assert!(p.stats().blocked_dropped == 1);
    }

    #[test]
    fn critical_zones_win_ties() {
        let map = map_with(vec![
            Hotspot { at: (30, 0), density: 0.8 },
            Hotspot { at: (-30, 0), density: 0.8 },
        ]);
        let p = planner(PathStrategy::HighestDensity);
        p.update_zone(Bounds::new(-40, -5, -20, 5), ZoneStatus::Critical);
        let vector = p.plan(&map, (0, 0)).unwrap();
        assert!(vector.dx < 0);
    }

    #[test]
    fn sliding_window_stays_local() {
        let map = map_with(vec![
            Hotspot { at: (200, 200), density: 1.0 },
            Hotspot { at: (10, 10), density: 0.75 },
        ]);
        let vector = planner(PathStrategy::SlidingWindow).plan(&map, (0, 0)).unwrap();
        assert!(vector.dx == 10 && vector.dy == 10);
    }

    #[test]
    fn empty_map_plans_nothing() {
        let map = map_with(Vec::new());
        assert!(planner(PathStrategy::Adaptive).plan(&map, (0, 0)).is_none());
    }
}
