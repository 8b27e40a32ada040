use super::cluster::Cluster;
use super::hint::Hint;
use super::hint::HintKind;
use crate::grid::bounds::Bounds;
use crate::Point;
use crate::Priority;
use std::collections::BinaryHeap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

#[derive(Debug, Default, Clone)]
pub struct HintStats {
    pub published: u64,
    pub taken: u64,
    pub dropped: u64,
    pub clusters_created: u64,
    pub cleanups: u64,
}

/// the shared priority event bus between pipeline layers.
///
/// bounded both ways: the lowest-priority hint is dropped when the heap
/// is full, the oldest low-priority cluster when the cluster map is.
/// anything past the ttl is pruned by an opportunistic cleanup that runs
/// at most once per cleanup interval.
pub struct HintCache {
    state: Mutex<State>,
    max_hints: usize,
    max_clusters: usize,
    ttl: Duration,
    cleanup_interval: Duration,
}

struct State {
    hints: BinaryHeap<Hint>,
    clusters: HashMap<u64, Cluster>,
    dirty: Vec<(Bounds, Instant)>,
    next_cluster: u64,
    last_cleanup: Instant,
    stats: HintStats,
}

impl Default for HintCache {
    fn default() -> Self {
        Self::new(1000, 100, Duration::from_secs(300), Duration::from_secs(60))
    }
}

impl HintCache {
    pub fn new(max_hints: usize, max_clusters: usize, ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                hints: BinaryHeap::new(),
                clusters: HashMap::new(),
                dirty: Vec::new(),
                next_cluster: 0,
                last_cleanup: Instant::now(),
                stats: HintStats::default(),
            }),
            max_hints,
            max_clusters,
            ttl,
            cleanup_interval,
        }
    }

    pub fn publish(&self, hint: Hint) {
        let mut state = self.state.lock().expect("hint lock");
        state.stats.published += 1;
        if hint.kind == HintKind::DirtyRegion {
            state.dirty.push((hint.bounds, hint.at));
        }
        state.hints.push(hint);
        if state.hints.len() > self.max_hints {
            self.drop_lowest(&mut state);
        }
        self.maybe_cleanup(&mut state);
    }

    /// regions announced dirty and not yet marked processed
    pub fn dirty_regions(&self) -> Vec<(Bounds, Instant)> {
        self.state.lock().expect("hint lock").dirty.clone()
    }

    /// pop up to `max_count` hints at or above `min_priority`,
    /// best first
    pub fn take(&self, max_count: usize, min_priority: Priority) -> Vec<Hint> {
        let mut state = self.state.lock().expect("hint lock");
        let mut taken = Vec::new();
        while taken.len() < max_count {
            let qualifies = state
                .hints
                .peek()
                .map(|h| h.priority >= min_priority)
                .unwrap_or(false);
            if !qualifies {
                break;
            }
            taken.push(state.hints.pop().expect("peeked"));
        }
        state.stats.taken += taken.len() as u64;
        taken
    }

    pub fn create_cluster(&self, cells: BTreeSet<Point>, kind: HintKind, priority: Priority) -> u64 {
        let mut state = self.state.lock().expect("hint lock");
        let id = state.next_cluster;
        state.next_cluster += 1;
        state.clusters.insert(id, Cluster::new(id, cells, kind, priority));
        state.stats.clusters_created += 1;
        if state.clusters.len() > self.max_clusters {
            // evict the stalest of the low-priority half
            let evict = state
                .clusters
                .values()
                .min_by(|a, b| {
                    a.priority
                        .total_cmp(&b.priority)
                        .then(a.created_at.cmp(&b.created_at))
                })
                .map(|c| c.id);
            if let Some(evict) = evict {
                state.clusters.remove(&evict);
            }
        }
        id
    }

    pub fn cluster(&self, id: u64) -> Option<Cluster> {
        self.state.lock().expect("hint lock").clusters.get(&id).cloned()
    }

    pub fn clusters_by_kind(&self, kind: Option<HintKind>) -> Vec<Cluster> {
        let state = self.state.lock().expect("hint lock");
        let mut clusters = state
            .clusters
            .values()
            .filter(|c| kind.map(|k| c.kind == k).unwrap_or(true))
            .cloned()
            .collect::<Vec<_>>();
        clusters.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        clusters
    }

    /// drop every pending hint whose region overlaps `bounds`.
    /// idempotent: a second call over the same region is a no-op.
    pub fn mark_processed(&self, bounds: Bounds) {
        let mut state = self.state.lock().expect("hint lock");
        let before = state.hints.len();
        let kept = state
            .hints
            .drain()
            .filter(|h| !h.bounds.intersects(&bounds))
            .collect::<BinaryHeap<_>>();
        state.stats.dropped += (before - kept.len()) as u64;
        state.hints = kept;
        state.dirty.retain(|(b, _)| !b.intersects(&bounds));
    }

    /// publish a feedback hint and down-weight overlapping clusters by
    /// `1 - 0.5 * success_rate`
    pub fn solver_feedback(&self, bounds: Bounds, success_rate: f32) {
        let weight = 1.0 - 0.5 * success_rate.clamp(0.0, 1.0);
        {
            let mut state = self.state.lock().expect("hint lock");
            for cluster in state.clusters.values_mut() {
                if cluster.bounds.intersects(&bounds) {
                    cluster.priority *= weight;
                }
            }
        }
        self.publish(
            Hint::new(HintKind::SolverFeedback, bounds, success_rate).with_note(success_rate),
        );
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("hint lock").hints.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn stats(&self) -> HintStats {
        self.state.lock().expect("hint lock").stats.clone()
    }

    fn drop_lowest(&self, state: &mut State) {
        let mut hints = std::mem::take(&mut state.hints).into_sorted_vec();
        // sorted ascending, so the overflow sits at the front
        let excess = hints.len().saturating_sub(self.max_hints);
        hints.drain(..excess);
        state.stats.dropped += excess as u64;
        state.hints = hints.into_iter().collect();
    }

    fn maybe_cleanup(&self, state: &mut State) {
        if state.last_cleanup.elapsed() < self.cleanup_interval {
            return;
        }
        state.last_cleanup = Instant::now();
        state.stats.cleanups += 1;
        let ttl = self.ttl;
        let kept = state
            .hints
            .drain()
            .filter(|h| h.at.elapsed() < ttl)
            .collect::<BinaryHeap<_>>();
        state.hints = kept;
        state.clusters.retain(|_, c| c.created_at.elapsed() < ttl);
        state.dirty.retain(|(_, at)| at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> HintCache {
        HintCache::new(4, 2, Duration::from_secs(300), Duration::from_secs(60))
    }

    #[test]
    fn take_returns_best_first() {
        let cache = cache();
        cache.publish(Hint::new(HintKind::DirtyRegion, Bounds::new(0, 0, 1, 1), 0.3));
        cache.publish(Hint::new(HintKind::FrontierUpdate, Bounds::new(0, 0, 1, 1), 0.9));
        cache.publish(Hint::new(HintKind::PriorityHint, Bounds::new(0, 0, 1, 1), 0.6));
        let taken = cache.take(2, 0.0);
        assert!(taken.len() == 2);
        assert!(taken[0].priority == 0.9);
        assert!(taken[1].priority == 0.6);
        assert!(cache.len() == 1);
    }

    #[test]
    fn capacity_drops_lowest_priority() {
        let cache = cache();
        for priority in [0.5, 0.1, 0.9, 0.7, 0.3] {
            cache.publish(Hint::new(HintKind::DirtyRegion, Bounds::new(0, 0, 1, 1), priority));
        }
        assert!(cache.len() == 4);
        let priorities = cache
            .take(4, 0.0)
            .into_iter()
            .map(|h| h.priority)
            .collect::<Vec<_>>();
        assert!(!priorities.contains(&0.1));
    }

    #[test]
    fn min_priority_filters() {
        let cache = cache();
        cache.publish(Hint::new(HintKind::DirtyRegion, Bounds::new(0, 0, 1, 1), 0.2));
        assert!(cache.take(10, 0.5).is_empty());
        assert!(cache.len() == 1);
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let cache = cache();
        cache.publish(Hint::new(HintKind::DirtyRegion, Bounds::new(0, 0, 5, 5), 0.5));
        cache.publish(Hint::new(HintKind::DirtyRegion, Bounds::new(50, 50, 55, 55), 0.5));
        cache.mark_processed(Bounds::new(0, 0, 10, 10));
        assert!(cache.len() == 1);
        cache.mark_processed(Bounds::new(0, 0, 10, 10));
        assert!(cache.len() == 1);
    }

    #[test]
    fn dirty_regions_follow_publication_and_processing() {
        let cache = cache();
        cache.publish(Hint::new(HintKind::DirtyRegion, Bounds::new(0, 0, 3, 3), 0.5));
        cache.publish(Hint::new(HintKind::FrontierUpdate, Bounds::new(9, 9, 9, 9), 0.5));
        assert!(cache.dirty_regions().len() == 1);
        cache.mark_processed(Bounds::new(2, 2, 5, 5));
        assert!(cache.dirty_regions().is_empty());
    }

    #[test]
    fn feedback_downweights_overlapping_clusters() {
        let cache = cache();
        let id = cache.create_cluster(
            [(1, 1), (2, 2)].into_iter().collect(),
            HintKind::ClusterDiscovery,
            0.8,
        );
        cache.solver_feedback(Bounds::new(0, 0, 3, 3), 1.0);
        let cluster = cache.cluster(id).unwrap();
        assert!((cluster.priority - 0.4).abs() < 1e-6);
    }

    #[test]
    fn cluster_capacity_evicts_worst() {
        let cache = cache();
        cache.create_cluster([(0, 0)].into_iter().collect(), HintKind::ClusterDiscovery, 0.9);
        cache.create_cluster([(1, 1)].into_iter().collect(), HintKind::ClusterDiscovery, 0.1);
        cache.create_cluster([(2, 2)].into_iter().collect(), HintKind::ClusterDiscovery, 0.5);
        let clusters = cache.clusters_by_kind(None);
        assert!(clusters.len() == 2);
        assert!(clusters.iter().all(|c| c.priority != 0.1));
    }
}
