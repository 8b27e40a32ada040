use super::action::ActionKind;
use super::action::EngineKind;
use super::action::SolverAction;
use super::engine::CspEngine;
use super::segmentation::TensorFrontier;
use super::solution::Verdict;
use super::zone::Zone;
use super::zone::ZoneKind;
use crate::grid::bounds::Bounds;
use crate::grid::view::SolverView;
use crate::hints::cache::HintCache;
use crate::Point;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// top-level solving strategies. each is a dispatch policy over zone
/// kinds, not a separate engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Strategy {
    CspOnly,
    HybridCspMc,
    HybridFull,
    /// at most the 3 top-priority zones, 2 s sub-deadline each
    FastMode,
}

impl Strategy {
    const FAST_ZONES: usize = 3;
    const FAST_BUDGET: Duration = Duration::from_secs(2);
}

/// one solving pass over the current snapshot
#[derive(Debug, Clone, Default)]
pub struct SolveResult {
    pub actions: Vec<SolverAction>,
    pub zones: usize,
    pub zones_solved: usize,
    pub solutions: usize,
    pub infeasible_zones: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct SolverStats {
    pub passes: u64,
    pub actions_emitted: u64,
    pub zones_solved: u64,
    pub zones_infeasible: u64,
    pub timeouts: u64,
}

/// the hybrid solver: segmentation, exact search where affordable, and
/// documented low-confidence guessers everywhere else
pub struct HybridSolver {
    engine: CspEngine,
    frontier: TensorFrontier,
    strategy: Mutex<Strategy>,
    timeout: Duration,
    mc_guesses: usize,
    na_guesses: usize,
    stats: Mutex<SolverStats>,
}

impl Default for HybridSolver {
    fn default() -> Self {
        Self::new(
            CspEngine::default(),
            TensorFrontier::default(),
            Strategy::HybridCspMc,
            Duration::from_secs(30),
        )
    }
}

impl HybridSolver {
    pub fn new(
        engine: CspEngine,
        frontier: TensorFrontier,
        strategy: Strategy,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            frontier,
            strategy: Mutex::new(strategy),
            timeout,
            mc_guesses: 5,
            na_guesses: 3,
            stats: Mutex::new(SolverStats::default()),
        }
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        *self.strategy.lock().expect("strategy lock") = strategy;
    }
    pub fn strategy(&self) -> Strategy {
        *self.strategy.lock().expect("strategy lock")
    }
    pub fn stats(&self) -> SolverStats {
        self.stats.lock().expect("solver stats").clone()
    }

    /// segment the snapshot, attack each zone per the active strategy,
    /// and feed success back to the hint bus. timeouts return whatever
    /// accumulated.
    pub fn solve(
        &self,
        view: &SolverView,
        bounds: Option<Bounds>,
        hints: &HintCache,
    ) -> SolveResult {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let strategy = self.strategy();
        let mut zones = self.frontier.zones(view, bounds);
        zones.sort_by(|a, b| b.priority.total_cmp(&a.priority).then(a.id.cmp(&b.id)));
        if strategy == Strategy::FastMode {
            zones.truncate(Strategy::FAST_ZONES);
        }
        let mut result = SolveResult {
            zones: zones.len(),
            ..SolveResult::default()
        };
        for zone in zones.iter() {
            if Instant::now() >= deadline {
                result.timed_out = true;
                break;
            }
            if zone.is_trivial() {
                continue;
            }
            let zone_deadline = match strategy {
                Strategy::FastMode => (Instant::now() + Strategy::FAST_BUDGET).min(deadline),
                _ => deadline,
            };
            // saturated and zeroed counts resolve without search, no
            // matter how the complexity score classified the zone
            let actions = match self.forced(zone) {
                None => {
                    result.infeasible_zones += 1;
                    log::warn!("zone {} contradicts its counts over {}", zone.id, zone.bounds);
                    continue;
                }
                Some(forced) if !forced.is_empty() => forced,
                Some(_) => match (strategy, zone.kind) {
                    (_, ZoneKind::Trivial) => Vec::new(),
                    (_, ZoneKind::CspSolvable) => {
                        self.exact(zone, zone_deadline, strategy, &mut result)
                    }
                    (Strategy::CspOnly, _) => Vec::new(),
                    (_, ZoneKind::MonteCarlo) => self.monte_carlo(zone),
                    (Strategy::HybridFull | Strategy::FastMode, ZoneKind::NeuralAssist) => {
                        self.neural_assist(zone)
                    }
                    (_, ZoneKind::NeuralAssist) => Vec::new(),
                },
            };
            let deterministic = actions.iter().any(|a| a.confidence == 1.0);
            if deterministic {
                result.zones_solved += 1;
                hints.solver_feedback(zone.bounds, 1.0);
            }
            result.actions.extend(actions);
        }
        result.elapsed = start.elapsed();
        let mut stats = self.stats.lock().expect("solver stats");
        stats.passes += 1;
        stats.actions_emitted += result.actions.len() as u64;
        stats.zones_solved += result.zones_solved as u64;
        stats.zones_infeasible += result.infeasible_zones as u64;
        stats.timeouts += result.timed_out as u64;
        result
    }

    /// counts that already pin their neighborhood: expected zero means
    /// every adjacent unknown is safe, expected equal to the adjacent
    /// unknown count means every one is a mine. None on contradiction.
    fn forced(&self, zone: &Zone) -> Option<Vec<SolverAction>> {
        let mut pinned: std::collections::BTreeMap<Point, ActionKind> =
            std::collections::BTreeMap::new();
        for (&anchor, &expected) in zone.numbers.iter() {
            let adjacent = crate::neighbors(anchor)
                .into_iter()
                .filter(|n| zone.cells.contains(n))
                .collect::<Vec<_>>();
            let kind = match expected as usize {
                0 => ActionKind::Reveal,
                e if e == adjacent.len() => ActionKind::Flag,
                e if e > adjacent.len() => return None,
                _ => continue,
            };
            for at in adjacent {
                match pinned.insert(at, kind) {
                    Some(previous) if previous != kind => return None,
                    _ => {}
                }
            }
        }
        Some(
            pinned
                .into_iter()
                .map(|(at, kind)| match kind {
                    ActionKind::Flag => SolverAction::flag(at, "count saturated"),
                    _ => SolverAction::reveal(at, "count satisfied"),
                })
                .collect(),
        )
    }

    /// exact enumeration; unanimous conclusions become certainties, and
    /// undecided zones surface their best guesses unless the strategy
    /// is exact-only
    fn exact(
        &self,
        zone: &Zone,
        deadline: Instant,
        strategy: Strategy,
        result: &mut SolveResult,
    ) -> Vec<SolverAction> {
        let solved = self.engine.solve(zone, Some(deadline));
        result.timed_out |= solved.timed_out;
        result.solutions += solved.solutions.len();
        if solved.infeasible {
            result.infeasible_zones += 1;
            log::warn!("zone {} contradicts its counts over {}", zone.id, zone.bounds);
            return Vec::new();
        }
        let verdict = Verdict::from(solved.solutions.as_slice());
        let mut actions = Vec::new();
        for &at in verdict.safe.iter() {
            actions.push(SolverAction::reveal(
                at,
                format!("empty in all {} solutions", verdict.solution_count),
            ));
        }
        for &at in verdict.mines.iter() {
            actions.push(SolverAction::flag(
                at,
                format!("mined in all {} solutions", verdict.solution_count),
            ));
        }
        if actions.is_empty() && strategy != Strategy::CspOnly {
            actions.extend(
                verdict
                    .guesses(self.mc_guesses)
                    .into_iter()
                    .map(|(at, _)| SolverAction::guess(at, 0.3, EngineKind::Csp)),
            );
        }
        actions
    }

    /// placeholder sampler: lowest estimated mine probability first,
    /// index order on ties, capped and low-confidence by contract
    fn monte_carlo(&self, zone: &Zone) -> Vec<SolverAction> {
        self.ranked(zone)
            .into_iter()
            .take(self.mc_guesses)
            .map(|at| SolverAction::guess(at, 0.3, EngineKind::MonteCarlo))
            .collect()
    }

    fn neural_assist(&self, zone: &Zone) -> Vec<SolverAction> {
        self.ranked(zone)
            .into_iter()
            .take(self.na_guesses)
            .map(|at| SolverAction::guess(at, 0.4, EngineKind::NeuralAssist))
            .collect()
    }

    /// cheap local mine-probability estimate: the worst saturation of
    /// any number touching the cell, 0.2 when unconstrained
    fn ranked(&self, zone: &Zone) -> Vec<Point> {
        let mut scored = zone
            .cells
            .iter()
            .map(|&at| {
                let estimate = crate::neighbors(at)
                    .iter()
                    .filter_map(|n| zone.numbers.get(n))
                    .map(|&expected| {
                        let unknowns = crate::neighbors(at)
                            .iter()
                            .filter(|m| zone.cells.contains(m))
                            .count()
                            .max(1);
                        expected as f32 / unknowns as f32
                    })
                    .fold(0.0f32, f32::max);
                let estimate = match estimate {
                    e if e > 0.0 => e,
                    _ => 0.2,
                };
                (at, estimate)
            })
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.into_iter().map(|(at, _)| at).collect()
    }
}
