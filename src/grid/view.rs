use super::bounds::Bounds;
use super::raster::Raster;
use super::symbol::Symbol;
use crate::Confidence;
use crate::Point;
use crate::Tick;
use std::hash::Hash;
use std::hash::Hasher;

/// a consistent snapshot of the grid taken under its lock. the solver,
/// frontier extraction, and density analysis all work off one of these
/// so recognition can keep writing in parallel.
#[derive(Debug, Clone)]
pub struct SolverView {
    pub symbols: Raster<Symbol>,
    pub confidence: Raster<Confidence>,
    pub age: Raster<Tick>,
    pub frontier: Raster<bool>,
    pub origin: Point,
    pub last_update: Tick,
}

impl SolverView {
    /// an empty snapshot, for grids that have never been written
    pub fn empty() -> Self {
        Self {
            symbols: Raster::new(0, 0),
            confidence: Raster::new(0, 0),
            age: Raster::new(0, 0),
            frontier: Raster::new(0, 0),
            origin: (0, 0),
            last_update: 0,
        }
    }

    /// the rectangle this snapshot covers, None when empty
    pub fn bounds(&self) -> Option<Bounds> {
        match self.symbols.shape() {
            (0, _) | (_, 0) => None,
            (w, h) => Some(Bounds::new(
                self.origin.0,
                self.origin.1,
                self.origin.0 + w as i32 - 1,
                self.origin.1 + h as i32 - 1,
            )),
        }
    }

    /// global coordinate to local index, None outside the snapshot
    pub fn local(&self, at: Point) -> Option<(usize, usize)> {
        let x = at.0 - self.origin.0;
        let y = at.1 - self.origin.1;
        if x < 0 || y < 0 || x as usize >= self.symbols.width() || y as usize >= self.symbols.height() {
            None
        } else {
            Some((x as usize, y as usize))
        }
    }

    /// symbol at a global coordinate, Unknown outside the snapshot
    pub fn symbol(&self, at: Point) -> Symbol {
        self.local(at)
            .map(|(x, y)| *self.symbols.get(x, y))
            .unwrap_or(Symbol::Unknown)
    }
    pub fn confidence(&self, at: Point) -> Confidence {
        self.local(at)
            .map(|(x, y)| *self.confidence.get(x, y))
            .unwrap_or(0.0)
    }
    pub fn is_frontier(&self, at: Point) -> bool {
        self.local(at)
            .map(|(x, y)| *self.frontier.get(x, y))
            .unwrap_or(false)
    }

    pub fn unknown_count(&self) -> usize {
        self.symbols.values().iter().filter(|s| s.is_unrevealed()).count()
    }
    pub fn frontier_count(&self) -> usize {
        self.frontier.count()
    }

    /// cheap fingerprint for downstream result caches. collisions only
    /// cost a redundant recomputation, never a wrong answer.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.symbols.shape().hash(&mut hasher);
        self.origin.hash(&mut hasher);
        self.last_update.hash(&mut hasher);
        (self.unknown_count() as u64).hash(&mut hasher);
        (self.frontier_count() as u64).hash(&mut hasher);
        hasher.finish()
    }
}
