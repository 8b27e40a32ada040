use super::variable::Value;
use crate::Confidence;
use crate::Point;
use std::collections::BTreeMap;

/// one complete satisfying assignment of a component
#[derive(Debug, Clone)]
pub struct Solution {
    pub assignments: BTreeMap<Point, Value>,
    pub confidence: Confidence,
    pub satisfied: usize,
    pub total: usize,
}

impl Solution {
    pub fn is_valid(&self) -> bool {
        self.confidence > 0.5 && self.satisfied == self.total
    }
}

/// what a set of enumerated solutions collectively proves.
/// safe and mine sets are unanimous verdicts; everything else gets a
/// per-cell mine probability.
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    pub safe: Vec<Point>,
    pub mines: Vec<Point>,
    pub probabilities: BTreeMap<Point, f32>,
    pub solution_count: usize,
}

impl From<&[Solution]> for Verdict {
    fn from(solutions: &[Solution]) -> Self {
        let mut verdict = Verdict {
            solution_count: solutions.len(),
            ..Verdict::default()
        };
        let Some(first) = solutions.first() else {
            return verdict;
        };
        for &at in first.assignments.keys() {
            let mined = solutions
                .iter()
                .filter(|s| s.assignments.get(&at) == Some(&Value::Mine))
                .count();
            let probability = mined as f32 / solutions.len() as f32;
            verdict.probabilities.insert(at, probability);
            if mined == 0 {
                verdict.safe.push(at);
            } else if mined == solutions.len() {
                verdict.mines.push(at);
            }
        }
        verdict
    }
}

impl Verdict {
    /// guess candidates: lowest mine probability first, index order on
    /// ties so re-runs are deterministic
    pub fn guesses(&self, limit: usize) -> Vec<(Point, f32)> {
        let mut open = self
            .probabilities
            .iter()
            .filter(|(at, _)| !self.safe.contains(at) && !self.mines.contains(at))
            .map(|(&at, &p)| (at, p))
            .collect::<Vec<_>>();
        open.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        open.truncate(limit);
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(cells: &[(Point, Value)]) -> Solution {
        Solution {
            assignments: cells.iter().copied().collect(),
            confidence: 1.0,
            satisfied: 1,
            total: 1,
        }
    }

    #[test]
    fn unanimity_makes_verdicts() {
        let solutions = vec![
            solution(&[((0, 0), Value::Empty), ((1, 0), Value::Mine), ((2, 0), Value::Mine)]),
            solution(&[((0, 0), Value::Empty), ((1, 0), Value::Empty), ((2, 0), Value::Mine)]),
        ];
        let verdict = Verdict::from(solutions.as_slice());
        assert!(verdict.safe == vec![(0, 0)]);
        assert!(verdict.mines == vec![(2, 0)]);
        assert!(verdict.probabilities[&(1, 0)] == 0.5);
    }

    #[test]
    fn guesses_prefer_low_probability_then_index() {
        let solutions = vec![
            solution(&[((0, 0), Value::Mine), ((1, 0), Value::Empty), ((5, 5), Value::Empty)]),
            solution(&[((0, 0), Value::Empty), ((1, 0), Value::Mine), ((5, 5), Value::Empty)]),
            solution(&[((0, 0), Value::Mine), ((1, 0), Value::Empty), ((5, 5), Value::Mine)]),
        ];
        let verdict = Verdict::from(solutions.as_slice());
        let guesses = verdict.guesses(2);
        assert!(guesses.len() == 2);
        assert!(guesses[0].0 == (1, 0) || guesses[0].1 <= guesses[1].1);
    }

    #[test]
    fn empty_solutions_empty_verdict() {
        let verdict = Verdict::from(&[] as &[Solution]);
        assert!(verdict.safe.is_empty() && verdict.mines.is_empty());
        assert!(verdict.solution_count == 0);
    }
}
