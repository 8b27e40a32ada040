use crate::grid::bounds::Bounds;
use crate::Point;
use crate::Priority;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// how a zone should be attacked, assigned by complexity thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    /// no unknowns left; nothing to solve
    Trivial,
    /// small and tight enough for exact enumeration
    CspSolvable,
    /// too entangled for exact search in budget; sample it
    MonteCarlo,
    /// pathological; hand it to the assist engine
    NeuralAssist,
}

impl ZoneKind {
    pub fn from_complexity(complexity: f32, unknowns: usize) -> Self {
        match () {
            _ if unknowns == 0 => Self::Trivial,
            _ if complexity < 0.3 => Self::CspSolvable,
            _ if complexity < 0.7 => Self::MonteCarlo,
            _ => Self::NeuralAssist,
        }
    }
}

/// one independent component of the frontier: its unknown cells, the
/// numbers constraining them (net of flags), and the scores that drive
/// strategy selection
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: usize,
    pub cells: BTreeSet<Point>,
    pub numbers: BTreeMap<Point, u8>,
    pub bounds: Bounds,
    pub complexity: f32,
    pub priority: Priority,
    pub kind: ZoneKind,
}

impl Zone {
    pub fn new(id: usize, cells: BTreeSet<Point>, numbers: BTreeMap<Point, u8>) -> Self {
        let bounds = cells
            .iter()
            .chain(numbers.keys())
            .copied()
            .collect::<Bounds>();
        let complexity = Self::complexity(&cells, &numbers);
        let priority = Self::priority(&cells, &numbers, complexity, &bounds);
        let kind = ZoneKind::from_complexity(complexity, cells.len());
        Self {
            id,
            cells,
            numbers,
            bounds,
            complexity,
            priority,
            kind,
        }
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }
    pub fn is_trivial(&self) -> bool {
        self.kind == ZoneKind::Trivial
    }
    /// constraints per unknown cell
    pub fn constraint_density(&self) -> f32 {
        match self.cells.len() {
            0 => 0.0,
            n => self.numbers.len() as f32 / n as f32,
        }
    }

    /// 0.3 number-to-unknown ratio + 0.4 average number value
    /// + 0.3 size, all normalized to [0, 1]
    fn complexity(cells: &BTreeSet<Point>, numbers: &BTreeMap<Point, u8>) -> f32 {
        if cells.is_empty() {
            return 0.0;
        }
        let ratio = (numbers.len() as f32 / cells.len() as f32).min(1.0);
        let average = match numbers.len() {
            0 => 0.0,
            n => numbers.values().map(|&v| v as f32).sum::<f32>() / n as f32,
        };
        0.3 * ratio + 0.4 * (average / 8.0) + 0.3 * (cells.len() as f32 / 20.0).min(1.0)
    }

    fn priority(
        cells: &BTreeSet<Point>,
        numbers: &BTreeMap<Point, u8>,
        complexity: f32,
        bounds: &Bounds,
    ) -> Priority {
        let size_factor = (cells.len() as f32 / 10.0).min(1.0);
        let density = match bounds.area() {
            0 => 0.0,
            area => ((cells.len() + numbers.len()) as f32 / area as f32).min(1.0),
        };
        0.4 * size_factor + 0.3 * (1.0 - complexity) + 0.3 * density
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(unknowns: &[Point], numbers: &[(Point, u8)]) -> Zone {
        Zone::new(
            0,
            unknowns.iter().copied().collect(),
            numbers.iter().copied().collect(),
        )
    }

    #[test]
    fn small_low_numbers_are_csp_solvable() {
        let z = zone(&[(1, 0), (1, 1)], &[((0, 0), 1)]);
        assert!(z.kind == ZoneKind::CspSolvable);
        assert!(z.complexity < 0.3);
    }

    #[test]
    fn empty_zone_is_trivial() {
        let z = zone(&[], &[]);
        assert!(z.is_trivial());
    }

    #[test]
    fn dense_high_numbers_escalate() {
        let unknowns = (0..20).map(|i| (i, 0)).collect::<Vec<_>>();
        let numbers = (0..20).map(|i| ((i, 1), 8)).collect::<Vec<_>>();
        let z = zone(&unknowns, &numbers);
        assert!(z.kind == ZoneKind::NeuralAssist || z.kind == ZoneKind::MonteCarlo);
        assert!(z.complexity >= 0.3);
    }

    #[test]
    fn bounds_cover_numbers_and_cells() {
        let z = zone(&[(5, 5)], &[((0, 0), 2)]);
        assert!(z.bounds == Bounds::new(0, 0, 5, 5));
    }
}
