use crate::Point;
use crate::MAX_MINE_RATIO;

/// the constraint forms the board induces. MineCount is the load-
/// bearing one; Distribution is a soft global prior on total mine
/// share and can be tuned or dropped without correctness impact.
#[derive(Debug, Clone)]
pub enum ConstraintKind {
    /// a revealed number demanding exactly `expected` mines among its
    /// unrevealed neighbors, already net of flags around it
    MineCount { anchor: Point, expected: u8 },
    /// soft cap on the fraction of variables assigned Mine
    Distribution { max_ratio: f32 },
    /// marks variables on the edge of the component; no pruning power,
    /// retained for diagnostics
    Boundary,
}

/// a constraint over an ordered list of variables (by index into the
/// component's variable table)
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub variables: Vec<usize>,
}

impl Constraint {
    pub fn mine_count(anchor: Point, expected: u8, variables: Vec<usize>) -> Self {
        Self {
            kind: ConstraintKind::MineCount { anchor, expected },
            variables,
        }
    }
    pub fn distribution(variables: Vec<usize>) -> Self {
        Self {
            kind: ConstraintKind::Distribution { max_ratio: MAX_MINE_RATIO },
            variables,
        }
    }

    /// feasibility under a partial assignment: infeasible iff the
    /// assigned mines already exceed the target, or cannot reach it
    /// even if every unassigned variable goes Mine
    pub fn feasible(&self, assigned_mines: usize, unassigned: usize) -> bool {
        match self.kind {
            ConstraintKind::MineCount { expected, .. } => {
                assigned_mines <= expected as usize
                    && assigned_mines + unassigned >= expected as usize
            }
            ConstraintKind::Distribution { max_ratio } => {
                // soft prior: only prune when already violated
                let n = self.variables.len().max(1);
                (assigned_mines as f32 / n as f32) <= max_ratio.max(0.0) + f32::EPSILON
                    || assigned_mines + unassigned == 0
            }
            ConstraintKind::Boundary => true,
        }
    }

    /// a complete assignment satisfies a MineCount iff the count is
    /// exact; the soft prior iff the final ratio is under the cap
    pub fn satisfied(&self, assigned_mines: usize) -> bool {
        match self.kind {
            ConstraintKind::MineCount { expected, .. } => assigned_mines == expected as usize,
            ConstraintKind::Distribution { max_ratio } => {
                let n = self.variables.len().max(1);
                (assigned_mines as f32 / n as f32) <= max_ratio + f32::EPSILON
            }
            ConstraintKind::Boundary => true,
        }
    }

    pub const fn is_hard(&self) -> bool {
        matches!(self.kind, ConstraintKind::MineCount { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mine_count_feasibility_window() {
        let c = Constraint::mine_count((0, 0), 2, vec![0, 1, 2]);
        assert!(c.feasible(0, 3));
        assert!(c.feasible(2, 0));
        assert!(!c.feasible(3, 0));
        assert!(!c.feasible(0, 1));
        assert!(c.satisfied(2));
        assert!(!c.satisfied(1));
    }

    #[test]
    fn distribution_is_soft() {
        let c = Constraint::distribution((0..10).collect());
        assert!(c.feasible(3, 7));
        assert!(!c.feasible(4, 6));
        assert!(c.satisfied(3));
        assert!(!c.satisfied(9));
    }
}
