use super::constraint::Constraint;
use super::solution::Solution;
use super::variable::Value;
use super::variable::Variable;
use super::zone::Zone;
use crate::MAX_SOLUTIONS;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// outcome of exact search over one zone
#[derive(Debug, Clone)]
pub struct CspResult {
    pub solutions: Vec<Solution>,
    pub backtracks: u64,
    pub propagations: u64,
    pub timed_out: bool,
    pub infeasible: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    pub attempts: u64,
    pub solutions_found: u64,
    pub backtracks: u64,
    pub propagations: u64,
    pub timeouts: u64,
}

/// exact enumeration by backtracking with forward checking.
///
/// variable order is mrv with degree tie-break; value order leans Mine
/// when the surrounding constraints are near saturation. forced
/// assignments ride the same trail as search decisions and unwind with
/// them. enumeration stops at `max_solutions` or the deadline,
/// whichever lands first.
pub struct CspEngine {
    max_solutions: usize,
    stats: Mutex<EngineStats>,
}

impl Default for CspEngine {
    fn default() -> Self {
        Self::new(MAX_SOLUTIONS)
    }
}

impl CspEngine {
    pub fn new(max_solutions: usize) -> Self {
        Self {
            max_solutions,
            stats: Mutex::new(EngineStats::default()),
        }
    }

    pub fn solve(&self, zone: &Zone, deadline: Option<Instant>) -> CspResult {
        let start = Instant::now();
        self.stats.lock().expect("engine stats").attempts += 1;
        let mut search = Search::build(zone, self.max_solutions, deadline);
        let infeasible = !search.root_feasible();
        if !infeasible {
            search.run(0);
        }
        let result = CspResult {
            solutions: search.solutions,
            backtracks: search.backtracks,
            propagations: search.propagations,
            timed_out: search.timed_out,
            infeasible,
            elapsed: start.elapsed(),
        };
        let mut stats = self.stats.lock().expect("engine stats");
        stats.solutions_found += result.solutions.len() as u64;
        stats.backtracks += result.backtracks;
        stats.propagations += result.propagations;
        stats.timeouts += result.timed_out as u64;
        result
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.lock().expect("engine stats").clone()
    }
}

struct Search {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    /// per-constraint running counters
    assigned_mines: Vec<usize>,
    assigned_total: Vec<usize>,
    /// assigned variable indices in assignment order, for unwinding
    trail: Vec<usize>,
    solutions: Vec<Solution>,
    max_solutions: usize,
    deadline: Option<Instant>,
    timed_out: bool,
    backtracks: u64,
    propagations: u64,
}

impl Search {
    fn build(zone: &Zone, max_solutions: usize, deadline: Option<Instant>) -> Self {
        let mut variables = zone
            .cells
            .iter()
            .map(|&at| Variable::new(at))
            .collect::<Vec<_>>();
        let index = variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.at, i))
            .collect::<BTreeMap<_, _>>();
        let mut constraints = Vec::new();
        for (&anchor, &expected) in zone.numbers.iter() {
            let members = crate::neighbors(anchor)
                .iter()
                .filter_map(|n| index.get(n).copied())
                .collect::<Vec<_>>();
            if members.is_empty() {
                continue;
            }
            constraints.push(Constraint::mine_count(anchor, expected, members));
        }
        constraints.push(Constraint::distribution((0..variables.len()).collect()));
        for (ci, constraint) in constraints.iter().enumerate() {
            for &vi in constraint.variables.iter() {
                variables[vi].constraints.push(ci);
            }
        }
        let n = constraints.len();
        Self {
            variables,
            constraints,
            assigned_mines: vec![0; n],
            assigned_total: vec![0; n],
            trail: Vec::new(),
            solutions: Vec::new(),
            max_solutions,
            deadline,
            timed_out: false,
            backtracks: 0,
            propagations: 0,
        }
    }

    /// a contradiction before any assignment, e.g. a number demanding
    /// more mines than it has unrevealed neighbors
    fn root_feasible(&self) -> bool {
        self.constraints
            .iter()
            .enumerate()
            .all(|(ci, c)| c.feasible(0, c.variables.len() - self.assigned_total[ci]))
    }

    fn expired(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.timed_out = true;
                return true;
            }
        }
        false
    }

    fn run(&mut self, depth: usize) {
        if self.expired() || self.solutions.len() >= self.max_solutions {
            return;
        }
        let Some(next) = self.select() else {
            self.record();
            return;
        };
        for value in self.value_order(next) {
            if !self.variables[next].domain.admits(value) {
                continue;
            }
            let mark = self.trail.len();
            if self.assign(next, value) && self.propagate(mark) {
                self.run(depth + 1);
            }
            self.unwind(mark);
            self.backtracks += 1;
            if self.expired() || self.solutions.len() >= self.max_solutions {
                return;
            }
        }
    }

    /// mrv, tie-broken by degree descending then by coordinate
    fn select(&self) -> Option<usize> {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.assigned.is_none())
            .min_by(|(_, a), (_, b)| {
                a.domain
                    .size()
                    .cmp(&b.domain.size())
                    .then(b.degree().cmp(&a.degree()))
                    .then(a.at.cmp(&b.at))
            })
            .map(|(i, _)| i)
    }

    /// Mine first when any touching count constraint is at least half
    /// saturated relative to its remaining unknowns
    fn value_order(&self, vi: usize) -> [Value; 2] {
        let saturated = self.variables[vi].constraints.iter().any(|&ci| {
            let constraint = &self.constraints[ci];
            if !constraint.is_hard() {
                return false;
            }
            let expected = match constraint.kind {
                super::constraint::ConstraintKind::MineCount { expected, .. } => expected as usize,
                _ => 0,
            };
            let unassigned = constraint.variables.len() - self.assigned_total[ci];
            let needed = expected.saturating_sub(self.assigned_mines[ci]);
            unassigned > 0 && needed * 2 >= unassigned
        });
        match saturated {
            true => [Value::Mine, Value::Empty],
            false => [Value::Empty, Value::Mine],
        }
    }

    /// apply one assignment, updating counters; false on infeasibility.
    /// only hard constraints prune; the distribution prior is tracked
    /// but never vetoes an assignment the counts force.
    fn assign(&mut self, vi: usize, value: Value) -> bool {
        self.variables[vi].assigned = Some(value);
        self.trail.push(vi);
        let mut feasible = true;
        for ci in self.variables[vi].constraints.clone() {
            self.assigned_total[ci] += 1;
            if value == Value::Mine {
                self.assigned_mines[ci] += 1;
            }
            let constraint = &self.constraints[ci];
            if constraint.is_hard() {
                let unassigned = constraint.variables.len() - self.assigned_total[ci];
                feasible &= constraint.feasible(self.assigned_mines[ci], unassigned);
            }
        }
        feasible
    }

    /// forward checking to fixpoint: saturated constraints force their
    /// remaining unknowns Empty, starved ones force them Mine
    fn propagate(&mut self, _mark: usize) -> bool {
        loop {
            if self.expired() {
                return false;
            }
            let mut forced: Option<(usize, Value)> = None;
            for (ci, constraint) in self.constraints.iter().enumerate() {
                if !constraint.is_hard() {
                    continue;
                }
                let expected = match constraint.kind {
                    super::constraint::ConstraintKind::MineCount { expected, .. } => {
                        expected as usize
                    }
                    _ => continue,
                };
                let unassigned = constraint.variables.len() - self.assigned_total[ci];
                if unassigned == 0 {
                    continue;
                }
                let value = if self.assigned_mines[ci] == expected {
                    Value::Empty
                } else if expected - self.assigned_mines[ci] == unassigned {
                    Value::Mine
                } else {
                    continue;
                };
                let vi = constraint
                    .variables
                    .iter()
                    .copied()
                    .find(|&vi| self.variables[vi].assigned.is_none())
                    .expect("unassigned counted");
                forced = Some((vi, value));
                break;
            }
            let Some((vi, value)) = forced else {
                return true;
            };
            self.propagations += 1;
            if !self.variables[vi].domain.admits(value) || !self.assign(vi, value) {
                return false;
            }
        }
    }

    /// pop every assignment made since `mark`
    fn unwind(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let vi = self.trail.pop().expect("trail nonempty");
            let value = self.variables[vi].assigned.take().expect("was assigned");
            for ci in self.variables[vi].constraints.clone() {
                self.assigned_total[ci] -= 1;
                if value == Value::Mine {
                    self.assigned_mines[ci] -= 1;
                }
            }
        }
    }

    /// a complete assignment; keep it iff every hard constraint lands
    fn record(&mut self) {
        let satisfied = self
            .constraints
            .iter()
            .enumerate()
            .filter(|(ci, c)| c.satisfied(self.assigned_mines[*ci]))
            .count();
        let hard_ok = self
            .constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_hard())
            .all(|(ci, c)| c.satisfied(self.assigned_mines[ci]));
        if !hard_ok {
            return;
        }
        let assignments = self
            .variables
            .iter()
            .map(|v| (v.at, v.assigned.expect("complete")))
            .collect();
        let total = self.constraints.len();
        self.solutions.push(Solution {
            assignments,
            confidence: satisfied as f32 / total.max(1) as f32,
            satisfied,
            total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::solution::Verdict;
    use std::collections::BTreeSet;

    fn zone(unknowns: &[crate::Point], numbers: &[(crate::Point, u8)]) -> Zone {
        Zone::new(
            0,
            unknowns.iter().copied().collect::<BTreeSet<_>>(),
            numbers.iter().copied().collect(),
        )
    }

    #[test]
    fn one_neighbor_of_a_one_is_forced_mine() {
        let z = zone(&[(0, 1)], &[((0, 0), 1)]);
        let result = CspEngine::default().solve(&z, None);
        assert!(result.solutions.len() == 1);
        assert!(!result.infeasible);
        let verdict = Verdict::from(result.solutions.as_slice());
        assert!(verdict.mines == vec![(0, 1)]);
        assert!(verdict.safe.is_empty());
    }

    #[test]
    fn zero_demand_forces_all_safe() {
        let z = zone(&[(0, 1), (1, 1)], &[((0, 0), 0)]);
        let result = CspEngine::default().solve(&z, None);
        let verdict = Verdict::from(result.solutions.as_slice());
        assert!(result.solutions.len() == 1);
        assert!(verdict.safe.len() == 2);
        assert!(verdict.mines.is_empty());
    }

    #[test]
    fn eight_neighbors_of_a_one_enumerate_eight_ways() {
        let unknowns = crate::neighbors((5, 5));
        let z = zone(&unknowns, &[((5, 5), 1)]);
        let result = CspEngine::new(16).solve(&z, None);
        assert!(result.solutions.len() == 8);
        let verdict = Verdict::from(result.solutions.as_slice());
        assert!(verdict.safe.is_empty());
        assert!(verdict.mines.is_empty());
        for &at in unknowns.iter() {
            assert!((verdict.probabilities[&at] - 1.0 / 8.0).abs() < 1e-6);
        }
    }

    #[test]
    fn solutions_respect_every_count() {
        let z = zone(
            &[(0, 1), (1, 1), (2, 1)],
            &[((0, 0), 1), ((1, 0), 2), ((2, 0), 1)],
        );
        let result = CspEngine::default().solve(&z, None);
        assert!(!result.solutions.is_empty());
        for s in result.solutions.iter() {
            for (&anchor, &expected) in z.numbers.iter() {
                let mines = crate::neighbors(anchor)
                    .iter()
                    .filter(|n| s.assignments.get(n) == Some(&Value::Mine))
                    .count();
                assert!(mines == expected as usize);
            }
        }
    }

    #[test]
    fn contradictions_are_reported_infeasible() {
        let z = zone(&[(0, 1)], &[((0, 0), 2)]);
        let result = CspEngine::default().solve(&z, None);
        assert!(result.infeasible);
        assert!(result.solutions.is_empty());
    }

    #[test]
    fn determinism_across_runs() {
        let unknowns = [(0, 1), (1, 1), (2, 1), (3, 1)];
        let z = zone(&unknowns, &[((1, 0), 2), ((2, 0), 2)]);
        let engine = CspEngine::default();
        let a = engine.solve(&z, None);
        let b = engine.solve(&z, None);
        let va = Verdict::from(a.solutions.as_slice());
        let vb = Verdict::from(b.solutions.as_slice());
        assert!(va.safe == vb.safe);
        assert!(va.mines == vb.mines);
        assert!(va.probabilities == vb.probabilities);
    }

    #[test]
    fn expired_deadline_returns_partial() {
        let unknowns = (0..16).map(|i| (i % 8, 1 + i / 8)).collect::<Vec<_>>();
        let numbers = (0..8).map(|x| ((x, 0), 1)).collect::<Vec<_>>();
        let z = zone(&unknowns, &numbers);
        let result = CspEngine::new(1000).solve(&z, Some(Instant::now()));
        assert!(result.timed_out);
    }
}
