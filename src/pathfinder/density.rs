use crate::config::DensityConfig;
use crate::grid::bounds::Bounds;
use crate::grid::raster::Raster;
use crate::grid::view::SolverView;
use crate::Density;
use crate::Point;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Mutex;

/// a density peak worth steering toward
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotspot {
    pub at: Point,
    pub density: Density,
}

/// a contiguous high-density region with its composition
#[derive(Debug, Clone)]
pub struct RegionStat {
    pub bounds: Bounds,
    pub cells: usize,
    pub frontier_density: f32,
    pub unknown_density: f32,
    pub critical_density: f32,
    pub complexity: f32,
    pub priority: f32,
}

/// the analyzed opportunity surface over one snapshot
#[derive(Debug, Clone)]
pub struct DensityMap {
    pub bounds: Bounds,
    pub values: Raster<Density>,
    pub max: Density,
    pub mean: Density,
    pub frontier_ratio: f32,
    pub hotspots: Vec<Hotspot>,
    pub regions: Vec<RegionStat>,
}

impl DensityMap {
    pub fn empty(bounds: Bounds) -> Self {
        Self {
            bounds,
            values: Raster::new(0, 0),
            max: 0.0,
            mean: 0.0,
            frontier_ratio: 0.0,
            hotspots: Vec::new(),
            regions: Vec::new(),
        }
    }
    pub fn density_at(&self, at: Point) -> Density {
        let x = at.0 - self.bounds.x_min;
        let y = at.1 - self.bounds.y_min;
        self.values.at(x as isize, y as isize).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DensityStats {
    pub analyses: u64,
    pub cache_hits: u64,
}

/// turns the store's state into a smoothed opportunity surface:
/// frontier weight 0.6, raw unknowns 0.4, plus a 3x3 spread of
/// confidence-weighted numbers. blurred, max-normalized, peak-picked.
pub struct DensityAnalyzer {
    config: DensityConfig,
    cache: Mutex<Option<(u64, DensityMap)>>,
    stats: Mutex<DensityStats>,
}

impl DensityAnalyzer {
    pub fn new(config: DensityConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
            stats: Mutex::new(DensityStats::default()),
        }
    }

    pub fn analyze(&self, view: &SolverView, restrict: Option<Bounds>) -> DensityMap {
        let Some(bounds) = restrict.or(view.bounds()) else {
            return DensityMap::empty(Bounds::new(0, 0, 0, 0));
        };
        let bounds = self.window(bounds);
        let key = {
            use std::hash::Hash;
            use std::hash::Hasher;
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            view.fingerprint().hash(&mut hasher);
            bounds.hash(&mut hasher);
            hasher.finish()
        };
        if let Some((cached, map)) = self.cache.lock().expect("density cache").as_ref() {
            if *cached == key {
                self.stats.lock().expect("density stats").cache_hits += 1;
                return map.clone();
            }
        }
        let map = self.compute(view, bounds);
        *self.cache.lock().expect("density cache") = Some((key, map.clone()));
        self.stats.lock().expect("density stats").analyses += 1;
        map
    }

    pub fn stats(&self) -> DensityStats {
        self.stats.lock().expect("density stats").clone()
    }

    /// clamp oversized scans to the analysis window, centered, so one
    /// pass stays cheap no matter how far the session has sprawled
    fn window(&self, bounds: Bounds) -> Bounds {
        let size = self.config.window_size as i32;
        if size <= 0 || (bounds.width() as i32 <= size && bounds.height() as i32 <= size) {
            return bounds;
        }
        let (cx, cy) = bounds.center();
        let half = size / 2;
        Bounds::new(
            (cx - half).max(bounds.x_min),
            (cy - half).max(bounds.y_min),
            (cx + half).min(bounds.x_max),
            (cy + half).min(bounds.y_max),
        )
    }

    fn compute(&self, view: &SolverView, bounds: Bounds) -> DensityMap {
        let width = bounds.width();
        let height = bounds.height();
        let mut frontier = Raster::<f32>::new(width, height);
        let mut unknown = Raster::<f32>::new(width, height);
        let mut numbers = Raster::<f32>::new(width, height);
        for (row, y) in (bounds.y_min..=bounds.y_max).enumerate() {
            for (col, x) in (bounds.x_min..=bounds.x_max).enumerate() {
                let symbol = view.symbol((x, y));
                if view.is_frontier((x, y)) {
                    frontier.set(col, row, 1.0);
                }
                if symbol.is_unrevealed() {
                    unknown.set(col, row, 1.0);
                }
                if symbol.is_number() {
                    numbers.set(col, row, view.confidence((x, y)));
                }
            }
        }
        let spread = convolve3x3(&numbers);
        let mut base = Raster::<f32>::new(width, height);
        for y in 0..height {
            for x in 0..width {
                base.set(
                    x,
                    y,
                    0.6 * frontier.get(x, y) + 0.4 * unknown.get(x, y)
                        + 0.3 * spread.get(x, y) / 9.0,
                );
            }
        }
        let values = blur(&base).normalized();
        let max = values.max();
        let mean = values.mean();
        let cells = (width * height).max(1);
        let frontier_ratio = frontier.values().iter().sum::<f32>() / cells as f32;
        let hotspots = self.hotspots(&values, bounds);
        let regions = self.segments(&values, &frontier, &unknown, &numbers, bounds);
        DensityMap {
            bounds,
            values,
            max,
            mean,
            frontier_ratio,
            hotspots,
            regions,
        }
    }

    /// every cell over the threshold; collapsed to weighted k-means
    /// centroids when there are enough peaks to be redundant
    fn hotspots(&self, values: &Raster<f32>, bounds: Bounds) -> Vec<Hotspot> {
        let mut spots = values
            .iter()
            .filter(|&(_, &v)| v >= self.config.hotspot_threshold)
            .map(|((x, y), &v)| Hotspot {
                at: (bounds.x_min + x as i32, bounds.y_min + y as i32),
                density: v,
            })
            .collect::<Vec<_>>();
        spots.sort_by(|a, b| b.density.total_cmp(&a.density).then(a.at.cmp(&b.at)));
        if self.config.enable_clustering && spots.len() > 10 {
            spots = kmeans(&spots, 8);
        }
        spots
    }

    /// label 8-connected components over the 70th percentile of the
    /// positive densities; components under 5 cells are noise
    fn segments(
        &self,
        values: &Raster<f32>,
        frontier: &Raster<f32>,
        unknown: &Raster<f32>,
        numbers: &Raster<f32>,
        bounds: Bounds,
    ) -> Vec<RegionStat> {
        let mut positive = values
            .values()
            .iter()
            .copied()
            .filter(|&v| v > 0.0)
            .collect::<Vec<_>>();
        if positive.is_empty() {
            return Vec::new();
        }
        positive.sort_by(f32::total_cmp);
        let cut = positive[(positive.len() * 7 / 10).min(positive.len() - 1)];
        let mut seen = BTreeSet::new();
        let mut regions = Vec::new();
        for ((sx, sy), &v) in values.iter() {
            if v < cut || v <= 0.0 || !seen.insert((sx, sy)) {
                continue;
            }
            let mut members = vec![(sx, sy)];
            let mut queue = VecDeque::from([(sx, sy)]);
            while let Some((cx, cy)) = queue.pop_front() {
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        let nx = cx as isize + dx;
                        let ny = cy as isize + dy;
                        if let Some(&nv) = values.at(nx, ny) {
                            let n = (nx as usize, ny as usize);
                            if nv >= cut && nv > 0.0 && seen.insert(n) {
                                members.push(n);
                                queue.push_back(n);
                            }
                        }
                    }
                }
            }
            if members.len() < 5 {
                continue;
            }
            let n = members.len() as f32;
            let sum = |r: &Raster<f32>| members.iter().map(|&(x, y)| *r.get(x, y)).sum::<f32>();
            let region_bounds = members
                .iter()
                .map(|&(x, y)| (bounds.x_min + x as i32, bounds.y_min + y as i32))
                .collect::<Bounds>();
            let frontier_density = sum(frontier) / n;
            let unknown_density = sum(unknown) / n;
            let critical_density = sum(numbers) / n;
            let complexity = (0.5 * frontier_density + 0.5 * critical_density).min(1.0);
            regions.push(RegionStat {
                bounds: region_bounds,
                cells: members.len(),
                frontier_density,
                unknown_density,
                critical_density,
                complexity,
                priority: (sum(values) / n).min(1.0),
            });
        }
        regions.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        regions
    }
}

/// box-kernel 3x3 convolution, zero-padded
fn convolve3x3(input: &Raster<f32>) -> Raster<f32> {
    let mut out = Raster::new(input.width(), input.height());
    for y in 0..input.height() {
        for x in 0..input.width() {
            let mut sum = 0.0;
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    sum += input.at(x as isize + dx, y as isize + dy).copied().unwrap_or(0.0);
                }
            }
            out.set(x, y, sum);
        }
    }
    out
}

/// separable gaussian, sigma one, 5-tap binomial kernel
fn blur(input: &Raster<f32>) -> Raster<f32> {
    const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
    let mut horizontal = Raster::new(input.width(), input.height());
    for y in 0..input.height() {
        for x in 0..input.width() {
            let mut sum = 0.0;
            for (k, weight) in KERNEL.iter().enumerate() {
                sum += weight
                    * input
                        .at(x as isize + k as isize - 2, y as isize)
                        .copied()
                        .unwrap_or(0.0);
            }
            horizontal.set(x, y, sum);
        }
    }
    let mut out = Raster::new(input.width(), input.height());
    for y in 0..input.height() {
        for x in 0..input.width() {
            let mut sum = 0.0;
            for (k, weight) in KERNEL.iter().enumerate() {
                sum += weight
                    * horizontal
                        .at(x as isize, y as isize + k as isize - 2)
                        .copied()
                        .unwrap_or(0.0);
            }
            out.set(x, y, sum);
        }
    }
    out
}

/// density-squared weighted lloyd iterations, deterministically seeded
/// from the input so repeated analyses agree
fn kmeans(spots: &[Hotspot], k: usize) -> Vec<Hotspot> {
    let k = k.min(spots.len());
    let seed = spots
        .iter()
        .fold(0u64, |acc, s| acc ^ ((s.at.0 as u64) << 17) ^ (s.at.1 as u64));
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut centers = (0..k)
        .map(|_| {
            let pick = spots[rng.random_range(0..spots.len())];
            (pick.at.0 as f32, pick.at.1 as f32)
        })
        .collect::<Vec<_>>();
    for _ in 0..10 {
        let mut sums = vec![(0.0f32, 0.0f32, 0.0f32); k];
        for spot in spots {
            let nearest = centers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let da = (spot.at.0 as f32 - a.0).powi(2) + (spot.at.1 as f32 - a.1).powi(2);
                    let db = (spot.at.0 as f32 - b.0).powi(2) + (spot.at.1 as f32 - b.1).powi(2);
                    da.total_cmp(&db)
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            let weight = spot.density * spot.density;
            sums[nearest].0 += spot.at.0 as f32 * weight;
            sums[nearest].1 += spot.at.1 as f32 * weight;
            sums[nearest].2 += weight;
        }
        for (center, sum) in centers.iter_mut().zip(sums.iter()) {
            if sum.2 > 0.0 {
                *center = (sum.0 / sum.2, sum.1 / sum.2);
            }
        }
    }
    centers
        .into_iter()
        .map(|(x, y)| Hotspot {
            at: (x.round() as i32, y.round() as i32),
            density: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::symbol::Symbol;
    use crate::grid::tensor::RegionWrite;
    use crate::grid::tensor::TensorGrid;

    /// a 20x20 block whose left half is frontier unknowns
    fn frontier_block() -> TensorGrid {
        let grid = TensorGrid::new();
        let bounds = Bounds::new(0, 0, 19, 19);
        let mut symbols = Raster::filled(20, 20, Symbol::Empty);
        let mut frontier = Raster::new(20, 20);
        for y in 0..20 {
            for x in 0..10 {
                symbols.set(x, y, Symbol::Unknown);
                frontier.set(x, y, true);
            }
        }
        grid.update_region(
            bounds,
            RegionWrite {
                symbols: Some(symbols),
                confidence: Some(Raster::filled(20, 20, 1.0)),
                frontier: Some(frontier),
                dirty_mask: None,
            },
        )
        .unwrap();
        grid
    }

    #[test]
    fn dense_frontier_produces_a_hotspot_inside() {
        let grid = frontier_block();
        let analyzer = DensityAnalyzer::new(DensityConfig::default());
        let map = analyzer.analyze(&grid.solver_view(), None);
        assert!(!map.hotspots.is_empty());
        assert!(map.max == 1.0);
        let spot = map.hotspots[0];
        assert!(map.bounds.contains(spot.at));
        assert!(spot.at.0 < 10);
    }

    #[test]
    fn empty_view_is_flat() {
        let analyzer = DensityAnalyzer::new(DensityConfig::default());
        let map = analyzer.analyze(&SolverView::empty(), None);
        assert!(map.hotspots.is_empty());
        assert!(map.max == 0.0);
    }

    #[test]
    fn analysis_is_cached_per_snapshot() {
        let grid = frontier_block();
        let analyzer = DensityAnalyzer::new(DensityConfig::default());
        let view = grid.solver_view();
        analyzer.analyze(&view, None);
        analyzer.analyze(&view, None);
        assert!(analyzer.stats().analyses == 1);
        assert!(analyzer.stats().cache_hits == 1);
    }

    #[test]
    fn segments_report_composition() {
        let grid = frontier_block();
        let analyzer = DensityAnalyzer::new(DensityConfig::default());
        let map = analyzer.analyze(&grid.solver_view(), None);
        assert!(!map.regions.is_empty());
        let region = &map.regions[0];
        assert!(region.cells >= 5);
        assert!(region.frontier_density > 0.5);
        assert!(region.unknown_density > 0.5);
    }

    #[test]
    fn oversized_scans_clamp_to_the_window() {
        let grid = TensorGrid::new();
        grid.set_cell((0, 0), Symbol::Unknown, 0.0, true).unwrap();
        grid.set_cell((500, 500), Symbol::Unknown, 0.0, true).unwrap();
        let analyzer = DensityAnalyzer::new(DensityConfig {
            window_size: 64,
            ..DensityConfig::default()
        });
        let map = analyzer.analyze(&grid.solver_view(), None);
        assert!(map.bounds.width() <= 65);
        assert!(map.bounds.height() <= 65);
    }

    #[test]
    fn many_peaks_collapse_to_centroids() {
        let spots = (0..40)
            .map(|i| Hotspot {
                at: (i % 8 * 10, i / 8 * 10),
                density: 0.9,
            })
            .collect::<Vec<_>>();
        let centers = kmeans(&spots, 8);
        assert!(centers.len() == 8);
    }
}
