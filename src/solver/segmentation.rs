use super::zone::Zone;
use crate::grid::bounds::Bounds;
use crate::grid::view::SolverView;
use crate::Point;
use crate::MAX_ZONE_SIZE;
use crate::MIN_ZONE_SIZE;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default, Clone)]
pub struct SegmentationStats {
    pub extractions: u64,
    pub cache_hits: u64,
    pub zones_rejected: u64,
}

/// splits the frontier into independent components the engines can
/// attack separately. two unknown cells share a component iff they are
/// 8-connected through unknown frontier cells, which is exactly the
/// condition under which their constraints can interact.
pub struct TensorFrontier {
    min_size: usize,
    max_size: usize,
    cache: Mutex<Option<(u64, Vec<Zone>)>>,
    stats: Mutex<SegmentationStats>,
}

impl Default for TensorFrontier {
    fn default() -> Self {
        Self::new(MIN_ZONE_SIZE, MAX_ZONE_SIZE)
    }
}

impl TensorFrontier {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            cache: Mutex::new(None),
            stats: Mutex::new(SegmentationStats::default()),
        }
    }

    /// independent zones in the snapshot, cached per fingerprint.
    /// `bounds` restricts the scan; None covers the whole snapshot.
    pub fn zones(&self, view: &SolverView, bounds: Option<Bounds>) -> Vec<Zone> {
        let key = {
            use std::hash::Hash;
            use std::hash::Hasher;
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            view.fingerprint().hash(&mut hasher);
            bounds.hash(&mut hasher);
            hasher.finish()
        };
        if let Some((cached_key, zones)) = self.cache.lock().expect("segmentation lock").as_ref() {
            if *cached_key == key {
                self.stats.lock().expect("segmentation stats").cache_hits += 1;
                return zones.clone();
            }
        }
        let zones = self.extract(view, bounds);
        *self.cache.lock().expect("segmentation lock") = Some((key, zones.clone()));
        zones
    }

    pub fn invalidate(&self) {
        *self.cache.lock().expect("segmentation lock") = None;
    }
    pub fn stats(&self) -> SegmentationStats {
        self.stats.lock().expect("segmentation stats").clone()
    }

    fn extract(&self, view: &SolverView, bounds: Option<Bounds>) -> Vec<Zone> {
        self.stats.lock().expect("segmentation stats").extractions += 1;
        let Some(scan) = bounds.or(view.bounds()) else {
            return Vec::new();
        };
        // frontier membership: unrevealed with a numbered 8-neighbor
        let mut open = BTreeSet::new();
        for at in scan.cells() {
            if view.symbol(at).is_unrevealed()
                && crate::neighbors(at).iter().any(|&n| view.symbol(n).is_number())
            {
                open.insert(at);
            }
        }
        // 8-connected flood fill, smallest coordinate first so ids and
        // membership are deterministic
        let mut zones = Vec::new();
        let mut seen = BTreeSet::new();
        for &seed in open.iter() {
            if seen.contains(&seed) {
                continue;
            }
            let mut members = BTreeSet::new();
            let mut queue = VecDeque::from([seed]);
            seen.insert(seed);
            while let Some(at) = queue.pop_front() {
                members.insert(at);
                for n in crate::neighbors(at) {
                    if open.contains(&n) && seen.insert(n) {
                        queue.push_back(n);
                    }
                }
            }
            if members.len() < self.min_size || members.len() > self.max_size {
                self.stats.lock().expect("segmentation stats").zones_rejected += 1;
                continue;
            }
            let numbers = self.constraints_for(view, &members);
            zones.push(Zone::new(zones.len(), members, numbers));
        }
        zones
    }

    /// every revealed number touching the component, net of the flags
    /// already placed around it
    fn constraints_for(&self, view: &SolverView, members: &BTreeSet<Point>) -> BTreeMap<Point, u8> {
        let mut numbers = BTreeMap::new();
        for &at in members.iter() {
            for anchor in crate::neighbors(at) {
                let symbol = view.symbol(anchor);
                if !symbol.is_number() || numbers.contains_key(&anchor) {
                    continue;
                }
                let flagged = crate::neighbors(anchor)
                    .iter()
                    .filter(|&&n| view.symbol(n) == crate::grid::symbol::Symbol::Flagged)
                    .count() as u8;
                numbers.insert(anchor, symbol.count().saturating_sub(flagged));
            }
        }
        numbers
    }
}
