use super::queued::Priority;
use super::queued::QueuedAction;
use super::queued::Status;
use crate::config::QueueConfig;
use crate::grid::view::SolverView;
use crate::solver::action::ActionKind;
use crate::solver::action::SolverAction;
use crate::Point;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// aggregate queue occupancy
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued: usize,
    pub scheduled: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub enqueued: u64,
    pub rejected: u64,
    pub deduplicated: u64,
    pub pruned: u64,
    pub retried: u64,
}

/// the prioritized action scheduler between solver and executor.
///
/// admission is gated on the current snapshot (acting on anything but
/// an unrevealed cell is stale), duplicates collapse onto the higher
/// band, and nearby cells cluster so the executor sweeps one area at a
/// time with its flags placed before its reveals.
pub struct ActionQueue {
    config: QueueConfig,
    state: Mutex<State>,
}

struct State {
    actions: Vec<QueuedAction>,
    clusters: Vec<ClusterState>,
    next_id: u64,
    completed: usize,
    failed: usize,
    stats: QueueStats,
}

#[derive(Debug, Clone)]
struct ClusterState {
    center: (f32, f32),
    members: usize,
}

impl ActionQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                actions: Vec::new(),
                clusters: Vec::new(),
                next_id: 0,
                completed: 0,
                failed: 0,
                stats: QueueStats::default(),
            }),
        }
    }

    /// admit, dedup, band, and cluster a batch; returns ids of the
    /// actions actually admitted
    pub fn enqueue(&self, actions: Vec<SolverAction>, view: &SolverView) -> Vec<u64> {
        let mut state = self.state.lock().expect("queue lock");
        let mut admitted = Vec::new();
        for action in actions {
            if !view.symbol(action.at).is_unrevealed() {
                state.stats.rejected += 1;
                continue;
            }
            if self.config.dedup {
                if let Some(existing) = state
                    .actions
                    .iter_mut()
                    .find(|q| q.pending() && q.action.at == action.at && q.action.kind == action.kind)
                {
                    let score = QueuedAction::score_of(&action);
                    if score > existing.score {
                        existing.score = score;
                        existing.priority = Priority::from(score);
                        existing.action = action;
                    }
                    state.stats.deduplicated += 1;
                    continue;
                }
            }
            let id = state.next_id;
            state.next_id += 1;
            let mut queued = QueuedAction::new(id, action);
            if self.config.enable_clustering {
                queued.cluster = Some(state.assign_cluster(queued.action.at, self.config.cluster_radius));
            }
            state.actions.push(queued);
            state.stats.enqueued += 1;
            admitted.push(id);
        }
        self.prune(&mut state);
        admitted
    }

    /// pop up to `max_count` ready actions and mark them Scheduled.
    /// order: cluster by its best band, flags before reveals inside a
    /// cluster, then closest to the cluster's center.
    pub fn next_actions(&self, max_count: usize) -> Vec<QueuedAction> {
        let mut state = self.state.lock().expect("queue lock");
        let done = state
            .actions
            .iter()
            .filter(|q| q.status == Status::Completed)
            .map(|q| q.id)
            .collect::<std::collections::HashSet<_>>();
        let now = Instant::now();
        let mut ready = state
            .actions
            .iter()
            .filter(|q| q.status == Status::Queued)
            .filter(|q| q.scheduled_at.map(|t| t <= now).unwrap_or(true))
            .filter(|q| q.depends_on.iter().all(|d| done.contains(d)))
            .map(|q| (q.id, q.cluster, q.score, q.action.kind, q.action.at))
            .collect::<Vec<_>>();
        let cluster_rank: HashMap<Option<usize>, f32> =
            ready.iter().fold(HashMap::new(), |mut rank, entry| {
                let best = rank.entry(entry.1).or_insert(0.0);
                *best = best.max(entry.2);
                rank
            });
        let centers = state
            .clusters
            .iter()
            .map(|c| c.center)
            .collect::<Vec<_>>();
        ready.sort_by(|a, b| {
            let ra = cluster_rank[&a.1];
            let rb = cluster_rank[&b.1];
            rb.total_cmp(&ra)
                .then(a.1.cmp(&b.1))
                .then(Self::kind_rank(a.3).cmp(&Self::kind_rank(b.3)))
                .then_with(|| {
                    let da = Self::center_distance(a.4, a.1, &centers);
                    let db = Self::center_distance(b.4, b.1, &centers);
                    da.total_cmp(&db)
                })
                .then(a.0.cmp(&b.0))
        });
        ready.truncate(max_count);
        let ids = ready.iter().map(|r| r.0).collect::<Vec<_>>();
        let mut popped = Vec::new();
        for id in ids {
            let queued = state
                .actions
                .iter_mut()
                .find(|q| q.id == id)
                .expect("just listed");
            queued.status = Status::Scheduled;
            popped.push(queued.clone());
        }
        popped
    }

    pub fn mark_executing(&self, id: u64) {
        let mut state = self.state.lock().expect("queue lock");
        if let Some(q) = state.actions.iter_mut().find(|q| q.id == id) {
            q.status = Status::Executing;
        }
    }

    /// settle an execution. failures re-queue at a reduced score with a
    /// short delay until the retry budget runs out.
    pub fn complete(&self, id: u64, success: bool) {
        let mut state = self.state.lock().expect("queue lock");
        let max_retries = self.config.max_retries;
        let Some(q) = state.actions.iter_mut().find(|q| q.id == id) else {
            return;
        };
        if success {
            q.status = Status::Completed;
            state.completed += 1;
            // completed entries stay around to satisfy dependency
            // lookups, trimmed oldest-first past capacity
            let done = state
                .actions
                .iter()
                .filter(|q| q.status == Status::Completed)
                .count();
            if done > self.config.max_queue_size {
                let oldest = state
                    .actions
                    .iter()
                    .filter(|q| q.status == Status::Completed)
                    .min_by_key(|q| q.created_at)
                    .map(|q| q.id);
                if let Some(oldest) = oldest {
                    state.actions.retain(|q| q.id != oldest);
                }
            }
            return;
        }
        if q.retries < max_retries {
            q.retries += 1;
            q.score *= 0.8;
            q.priority = Priority::from(q.score);
            q.status = Status::Queued;
            q.scheduled_at = Some(Instant::now() + Duration::from_millis(100 * q.retries as u64));
            state.stats.retried += 1;
        } else {
            q.status = Status::Failed;
            state.failed += 1;
        }
    }

    pub fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().expect("queue lock");
        let mut status = QueueStatus {
            completed: state.completed,
            failed: state.failed,
            ..QueueStatus::default()
        };
        for q in state.actions.iter() {
            match q.status {
                Status::Queued => status.queued += 1,
                Status::Scheduled => status.scheduled += 1,
                Status::Executing => status.executing += 1,
                _ => {}
            }
        }
        status
    }

    pub fn stats(&self) -> QueueStats {
        self.state.lock().expect("queue lock").stats.clone()
    }

    /// flags sweep before reveals so a mis-ordered reveal can never
    /// open a cell the same cluster is about to flag
    fn kind_rank(kind: ActionKind) -> u8 {
        match kind {
            ActionKind::Flag => 0,
            ActionKind::Reveal => 1,
            ActionKind::Guess => 2,
        }
    }

    fn center_distance(at: Point, cluster: Option<usize>, centers: &[(f32, f32)]) -> f32 {
        match cluster.and_then(|c| centers.get(c)) {
            Some(&(cx, cy)) => {
                let dx = at.0 as f32 - cx;
                let dy = at.1 as f32 - cy;
                (dx * dx + dy * dy).sqrt()
            }
            None => 0.0,
        }
    }

    /// past capacity, the lowest-scoring fifth of pending work drops
    /// (more if a fifth is not enough to get back under the cap)
    fn prune(&self, state: &mut State) {
        let pending = state.actions.iter().filter(|q| q.pending()).count();
        if pending <= self.config.max_queue_size {
            return;
        }
        let mut queued = state
            .actions
            .iter()
            .filter(|q| q.status == Status::Queued)
            .map(|q| (q.id, q.score))
            .collect::<Vec<_>>();
        queued.sort_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        let excess = pending - self.config.max_queue_size;
        let drop = queued
            .into_iter()
            .take((pending / 5).max(excess))
            .map(|(id, _)| id)
            .collect::<std::collections::HashSet<_>>();
        let before = state.actions.len();
        state.actions.retain(|q| !drop.contains(&q.id));
        state.stats.pruned += (before - state.actions.len()) as u64;
    }
}

impl QueuedAction {
    fn pending(&self) -> bool {
        matches!(self.status, Status::Queued | Status::Scheduled | Status::Executing)
    }
}

impl State {
    /// greedy spatial clustering: join the first cluster whose center
    /// is within the radius, else open a new one. centers drift toward
    /// the running mean of their members.
    fn assign_cluster(&mut self, at: Point, radius: f32) -> usize {
        let (x, y) = (at.0 as f32, at.1 as f32);
        for (i, cluster) in self.clusters.iter_mut().enumerate() {
            let dx = x - cluster.center.0;
            let dy = y - cluster.center.1;
            if (dx * dx + dy * dy).sqrt() <= radius {
                let n = cluster.members as f32;
                cluster.center = (
                    (cluster.center.0 * n + x) / (n + 1.0),
                    (cluster.center.1 * n + y) / (n + 1.0),
                );
                cluster.members += 1;
                return i;
            }
        }
        self.clusters.push(ClusterState {
            center: (x, y),
            members: 1,
        });
        self.clusters.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::symbol::Symbol;
    use crate::grid::tensor::TensorGrid;
    use crate::solver::action::EngineKind;

    fn unknown_view(cells: &[Point]) -> std::sync::Arc<SolverView> {
        let grid = TensorGrid::new();
        for &at in cells {
            grid.set_cell(at, Symbol::Unknown, 0.0, false).unwrap();
        }
        grid.solver_view()
    }

    fn queue() -> ActionQueue {
        ActionQueue::new(QueueConfig::default())
    }

    #[test]
    fn admission_requires_unrevealed_cells() {
        let grid = TensorGrid::new();
        grid.set_cell((0, 0), Symbol::Empty, 1.0, false).unwrap();
        grid.set_cell((1, 0), Symbol::Unknown, 0.0, false).unwrap();
        let view = grid.solver_view();
        let q = queue();
        let ids = q.enqueue(
            vec![
                SolverAction::reveal((0, 0), "stale"),
                SolverAction::reveal((1, 0), "fresh"),
            ],
            &view,
        );
        assert!(ids.len() == 1);
        assert!(q.queue_status().queued == 1);
    }

    #[test]
    fn duplicate_coord_and_kind_collapse() {
        let view = unknown_view(&[(3, 3)]);
        let q = queue();
        q.enqueue(
            vec![
                SolverAction::guess((3, 3), 0.3, EngineKind::MonteCarlo),
                SolverAction::guess((3, 3), 0.4, EngineKind::NeuralAssist),
            ],
            &view,
        );
        assert!(q.queue_status().queued == 1);
        let popped = q.next_actions(10);
        assert!(popped.len() == 1);
        assert!(popped[0].action.confidence == 0.4);
    }

    #[test]
    fn flags_come_before_reveals_in_a_cluster() {
        let cells = (0..12).map(|i| (50 + i % 4, 50 + i / 4)).collect::<Vec<_>>();
        let view = unknown_view(&cells);
        let q = queue();
        let mut actions = cells
            .iter()
            .take(10)
            .map(|&at| SolverAction::reveal(at, "safe"))
            .collect::<Vec<_>>();
        actions.push(SolverAction::flag(cells[10], "mine"));
        actions.push(SolverAction::flag(cells[11], "mine"));
        q.enqueue(actions, &view);
        let popped = q.next_actions(12);
        assert!(popped.len() == 12);
        assert!(popped[0].action.kind == ActionKind::Flag);
        assert!(popped[1].action.kind == ActionKind::Flag);
        assert!(popped[2..].iter().all(|q| q.action.kind == ActionKind::Reveal));
    }

    #[test]
    fn next_actions_never_overdelivers() {
        let cells = (0..6).map(|i| (i, 0)).collect::<Vec<_>>();
        let view = unknown_view(&cells);
        let q = queue();
        q.enqueue(
            cells.iter().map(|&at| SolverAction::reveal(at, "r")).collect(),
            &view,
        );
        assert!(q.next_actions(4).len() == 4);
        assert!(q.next_actions(10).len() == 2);
        assert!(q.next_actions(10).is_empty());
    }

    #[test]
    fn dependencies_gate_delivery() {
        let view = unknown_view(&[(0, 0), (1, 0)]);
        let q = queue();
        let ids = q.enqueue(
            vec![
                SolverAction::flag((0, 0), "first"),
                SolverAction::reveal((1, 0), "second"),
            ],
            &view,
        );
        {
            let mut state = q.state.lock().unwrap();
            let dependent = state.actions.iter_mut().find(|a| a.id == ids[1]).unwrap();
            dependent.depends_on.push(ids[0]);
        }
        let first = q.next_actions(10);
        assert!(first.len() == 1);
        assert!(first[0].id == ids[0]);
        q.complete(ids[0], true);
        let second = q.next_actions(10);
        assert!(second.len() == 1);
        assert!(second[0].id == ids[1]);
    }

    #[test]
    fn failures_retry_then_fail() {
        let view = unknown_view(&[(0, 0)]);
        let q = ActionQueue::new(QueueConfig {
            max_retries: 2,
            ..QueueConfig::default()
        });
        let ids = q.enqueue(vec![SolverAction::reveal((0, 0), "r")], &view);
        let id = ids[0];
        for _ in 0..2 {
            q.complete(id, false);
            std::thread::sleep(Duration::from_millis(250));
            assert!(q.next_actions(1).len() == 1);
        }
        q.complete(id, false);
        assert!(q.queue_status().failed == 1);
        assert!(q.next_actions(1).is_empty());
    }

    #[test]
    fn capacity_prunes_the_bottom_fifth() {
        let cells = (0..30).map(|i| (i, 0)).collect::<Vec<_>>();
        let view = unknown_view(&cells);
        let q = ActionQueue::new(QueueConfig {
            max_queue_size: 20,
            ..QueueConfig::default()
        });
        let mut actions = cells
            .iter()
            .take(25)
            .map(|&at| SolverAction::flag(at, "f"))
            .collect::<Vec<_>>();
        actions.extend(
            cells
                .iter()
                .skip(25)
                .map(|&at| SolverAction::guess(at, 0.3, EngineKind::MonteCarlo)),
        );
        q.enqueue(actions, &view);
        assert!(q.queue_status().queued < 30);
        assert!(q.stats().pruned > 0);
    }
}
