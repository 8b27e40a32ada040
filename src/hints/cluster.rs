use super::hint::HintKind;
use crate::grid::bounds::Bounds;
use crate::Point;
use crate::Priority;
use std::collections::BTreeSet;
use std::time::Instant;

/// a group of related cells discovered by one of the analysis layers.
/// clusters outlive the hints that announced them and are down-weighted
/// by solver feedback over the same region.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: u64,
    pub cells: BTreeSet<Point>,
    pub center: Point,
    pub bounds: Bounds,
    pub priority: Priority,
    pub kind: HintKind,
    pub created_at: Instant,
}

impl Cluster {
    pub fn new(id: u64, cells: BTreeSet<Point>, kind: HintKind, priority: Priority) -> Self {
        let bounds = cells.iter().copied().collect::<Bounds>();
        let n = cells.len().max(1) as i64;
        let (sx, sy) = cells
            .iter()
            .fold((0i64, 0i64), |(sx, sy), &(x, y)| (sx + x as i64, sy + y as i64));
        Self {
            id,
            cells,
            center: ((sx / n) as i32, (sy / n) as i32),
            bounds,
            priority,
            kind,
            created_at: Instant::now(),
        }
    }
    pub fn size(&self) -> usize {
        self.cells.len()
    }
    /// cells per covered area, in (0, 1]
    pub fn density(&self) -> f32 {
        self.cells.len() as f32 / self.bounds.area() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_density() {
        let cells = [(0, 0), (2, 0), (0, 2), (2, 2)].into_iter().collect();
        let cluster = Cluster::new(1, cells, HintKind::ClusterDiscovery, 0.5);
        assert!(cluster.center == (1, 1));
        assert!(cluster.bounds == Bounds::new(0, 0, 2, 2));
        assert!(cluster.size() == 4);
        assert!((cluster.density() - 4.0 / 9.0).abs() < 1e-6);
    }
}
