use super::cell::FrontierCell;
use super::cell::FrontierKind;
use crate::grid::bounds::Bounds;
use crate::grid::raster::Raster;
use crate::grid::tensor::RegionWrite;
use crate::grid::tensor::TensorGrid;
use crate::grid::view::SolverView;
use crate::hints::cache::HintCache;
use crate::hints::hint::Hint;
use crate::hints::hint::HintKind;
use crate::config::FrontierConfig;

/// everything one extraction pass found over a viewport
#[derive(Debug, Clone)]
pub struct FrontierResult {
    pub bounds: Bounds,
    pub cells: Vec<FrontierCell>,
    pub mask: Raster<bool>,
    pub revealed_count: usize,
}

impl FrontierResult {
    fn empty(bounds: Bounds) -> Self {
        Self {
            bounds,
            cells: Vec::new(),
            mask: Raster::new(bounds.width(), bounds.height()),
            revealed_count: 0,
        }
    }
    pub fn high_priority(&self) -> impl Iterator<Item = &FrontierCell> {
        self.cells.iter().filter(|c| c.kind == FrontierKind::HighPriority)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExtractorStats {
    pub passes: u64,
    pub cells_found: u64,
    pub hints_published: u64,
}

/// finds the boundary between what the board has shown us and what it
/// has not. a frontier cell is unrevealed, not flagged, and touches at
/// least one revealed number among its 8 neighbors.
pub struct FrontierExtractor {
    config: FrontierConfig,
    stats: std::sync::Mutex<ExtractorStats>,
}

impl Default for FrontierExtractor {
    fn default() -> Self {
        Self::new(FrontierConfig::default())
    }
}

impl FrontierExtractor {
    pub fn new(config: FrontierConfig) -> Self {
        Self {
            config,
            stats: std::sync::Mutex::new(ExtractorStats::default()),
        }
    }

    /// scan `bounds` in the given snapshot, score and classify every
    /// frontier cell, publish a FrontierUpdate hint, and write the mask
    /// back into the grid. soft-fails to an empty result, never raises.
    pub fn extract(
        &self,
        view: &SolverView,
        bounds: Bounds,
        grid: &TensorGrid,
        hints: &HintCache,
    ) -> FrontierResult {
        let mut result = self.scan(view, bounds);
        {
            let mut stats = self.stats.lock().expect("extractor lock");
            stats.passes += 1;
            stats.cells_found += result.cells.len() as u64;
        }
        if let Err(e) = grid.update_region(bounds, RegionWrite::frontier(result.mask.clone())) {
            log::warn!("frontier writeback failed: {}", e);
            return FrontierResult::empty(bounds);
        }
        if !result.cells.is_empty() {
            let best = result
                .cells
                .iter()
                .map(|c| c.priority)
                .fold(0.0f32, f32::max);
            let high = result.high_priority().map(|c| c.at).collect::<Vec<_>>();
            hints.publish(
                Hint::new(HintKind::FrontierUpdate, bounds, best)
                    .with_cells(high)
                    .with_note(result.cells.len() as f32),
            );
            self.stats.lock().expect("extractor lock").hints_published += 1;
        }
        result.cells.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        result
    }

    /// pure scan without side effects; used directly by tests and by
    /// the frontier-filtered capture path
    pub fn scan(&self, view: &SolverView, bounds: Bounds) -> FrontierResult {
        let mut result = FrontierResult::empty(bounds);
        let center = bounds.center();
        let (wn, wd, wc) = (
            self.config.neighbor_weight,
            self.config.distance_weight,
            self.config.confidence_weight,
        );
        for (row, y) in (bounds.y_min..=bounds.y_max).enumerate() {
            for (col, x) in (bounds.x_min..=bounds.x_max).enumerate() {
                let symbol = view.symbol((x, y));
                if symbol.is_revealed() {
                    result.revealed_count += 1;
                }
                if !symbol.is_unrevealed() {
                    continue;
                }
                let revealed = crate::neighbors((x, y))
                    .iter()
                    .filter(|&&n| view.symbol(n).is_number())
                    .count();
                if revealed == 0 {
                    continue;
                }
                let distance = crate::distance((x, y), center);
                let confidence = view.confidence((x, y));
                let priority = wn * (revealed as f32 / 8.0).min(1.0)
                    + wd * (1.0 - distance / 50.0).max(0.0)
                    + wc * confidence;
                result.mask.set(col, row, true);
                result.cells.push(FrontierCell {
                    at: (x, y),
                    kind: FrontierCell::classify(
                        priority,
                        revealed,
                        distance,
                        self.config.high_priority_threshold,
                    ),
                    priority,
                    revealed_neighbors: revealed,
                    distance_to_center: distance,
                    found_at: std::time::Instant::now(),
                });
            }
        }
        result
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats.lock().expect("extractor lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::symbol::Symbol;

    fn grid_with(cells: &[(crate::Point, Symbol)]) -> TensorGrid {
        let grid = TensorGrid::new();
        for &(at, s) in cells {
            grid.set_cell(at, s, 1.0, false).unwrap();
        }
        grid
    }

    #[test]
    fn frontier_cells_touch_numbers() {
        let grid = grid_with(&[
            ((0, 0), Symbol::Number(1)),
            ((1, 0), Symbol::Unknown),
            ((5, 5), Symbol::Unknown),
        ]);
        let hints = HintCache::default();
        let extractor = FrontierExtractor::default();
        let view = grid.solver_view();
        let result = extractor.extract(&view, Bounds::new(-1, -1, 6, 6), &grid, &hints);
        assert!(result.cells.len() >= 1);
        assert!(result.cells.iter().any(|c| c.at == (1, 0)));
        assert!(!result.cells.iter().any(|c| c.at == (5, 5)));
        for cell in result.cells.iter() {
            assert!(view.symbol(cell.at).is_unrevealed());
            assert!(crate::neighbors(cell.at)
                .iter()
                .any(|&n| view.symbol(n).is_number()));
        }
    }

    #[test]
    fn flagged_cells_are_not_frontier() {
        let grid = grid_with(&[((0, 0), Symbol::Number(1)), ((1, 0), Symbol::Flagged)]);
        let hints = HintCache::default();
        let extractor = FrontierExtractor::default();
        let view = grid.solver_view();
        let result = extractor.extract(&view, Bounds::new(-1, -1, 2, 2), &grid, &hints);
        assert!(!result.cells.iter().any(|c| c.at == (1, 0)));
    }

    #[test]
    fn mask_writes_back_into_grid() {
        let grid = grid_with(&[((0, 0), Symbol::Number(1))]);
        let hints = HintCache::default();
        let extractor = FrontierExtractor::default();
        let view = grid.solver_view();
        extractor.extract(&view, Bounds::new(-1, -1, 1, 1), &grid, &hints);
        let (_, _, _, frontier) = grid.get_cell((1, 0));
        assert!(frontier);
        let (_, _, _, not) = grid.get_cell((0, 0));
        assert!(!not);
    }

    #[test]
    fn update_hint_is_published() {
        let grid = grid_with(&[((0, 0), Symbol::Number(1))]);
        let hints = HintCache::default();
        let extractor = FrontierExtractor::default();
        let view = grid.solver_view();
        extractor.extract(&view, Bounds::new(-1, -1, 1, 1), &grid, &hints);
        let taken = hints.take(10, 0.0);
        assert!(taken.iter().any(|h| h.kind == HintKind::FrontierUpdate));
    }

    #[test]
    fn empty_viewport_is_empty_result() {
        let grid = TensorGrid::new();
        let hints = HintCache::default();
        let extractor = FrontierExtractor::default();
        let view = grid.solver_view();
        let result = extractor.extract(&view, Bounds::new(0, 0, 4, 4), &grid, &hints);
        assert!(result.cells.is_empty());
        assert!(result.mask.count() == 0);
        assert!(hints.take(10, 0.0).is_empty());
    }
}
